//! RSSI 到距离转换模型
//!
//! 对数距离路径损耗模型: RSSI(d) = RSSI_1m - 10 * n * log10(d)

use std::fmt;

use crate::algorithms::{CalibrationRecord, Observation};

/// 对数距离路径损耗模型（距离单位为米）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathLossModel {
    /// 1 米处的参考功率 (dBm)
    pub rssi_at_1m: f64,
    /// 路径损耗指数 n
    pub path_loss_exponent: f64,
}

impl PathLossModel {
    pub fn new(rssi_at_1m: f64, path_loss_exponent: f64) -> Self {
        PathLossModel {
            rssi_at_1m,
            path_loss_exponent,
        }
    }

    /// 根据 RSSI 计算距离
    ///
    /// 反解对数距离模型: d = 10^((RSSI_1m - RSSI) / (10 * n))
    ///
    /// 信号越弱（与参考值差距越大），距离越远。
    pub fn rssi_to_distance(&self, rssi: i32) -> f64 {
        self.rssi_to_distance_f64(f64::from(rssi))
    }

    /// 根据任意 RSSI 值计算距离
    pub fn rssi_to_distance_f64(&self, rssi: f64) -> f64 {
        let exponent = (self.rssi_at_1m - rssi) / (10.0 * self.path_loss_exponent);
        10_f64.powf(exponent)
    }

    /// 根据距离计算 RSSI（正向模型）
    pub fn distance_to_rssi(&self, distance: f64) -> f64 {
        if distance <= 0.0 {
            return f64::INFINITY;
        }
        self.rssi_at_1m - 10.0 * self.path_loss_exponent * distance.log10()
    }
}

impl fmt::Display for PathLossModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "路径损耗模型 - RSSI@1m={:.2} dBm, n={:.2}",
            self.rssi_at_1m, self.path_loss_exponent
        )
    }
}

/// 由一次观测及其热点校准记录估计距离
pub fn estimate_distance(observation: &Observation, calibration: &CalibrationRecord) -> f64 {
    calibration
        .path_loss_model()
        .rssi_to_distance(observation.rssi)
}
