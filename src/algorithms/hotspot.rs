//! WiFi 热点校准记录与扫描观测定义

use serde::{Deserialize, Serialize};

use crate::algorithms::PathLossModel;

/// 单个热点的校准记录
///
/// 由校准存储维护，定位流水线只读使用。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    /// 热点唯一标识符（SSID）
    pub id: String,
    /// X 坐标（米）
    pub x: f64,
    /// Y 坐标（米）
    pub y: f64,
    /// 1 米处的参考 RSSI (dBm)
    pub rssi_at_1m: f64,
    /// 路径损耗指数 n，必须大于 0
    pub path_loss_exponent: f64,
}

impl CalibrationRecord {
    /// 创建新的校准记录
    pub fn new(
        id: impl Into<String>,
        x: f64,
        y: f64,
        rssi_at_1m: f64,
        path_loss_exponent: f64,
    ) -> Self {
        CalibrationRecord {
            id: id.into(),
            x,
            y,
            rssi_at_1m,
            path_loss_exponent,
        }
    }

    /// 获取热点的 2D 坐标
    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// 该热点的路径损耗模型
    pub fn path_loss_model(&self) -> PathLossModel {
        PathLossModel::new(self.rssi_at_1m, self.path_loss_exponent)
    }

    /// 计算与另一热点的平面距离
    pub fn distance_to(&self, other: &CalibrationRecord) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// 单次扫描得到的信号观测
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// 热点标识符
    pub id: String,
    /// 实测 RSSI (dBm)
    pub rssi: i32,
    /// 时间戳（可选，毫秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
}

impl Observation {
    pub fn new(id: impl Into<String>, rssi: i32) -> Self {
        Observation {
            id: id.into(),
            rssi,
            timestamp_ms: None,
        }
    }

    pub fn with_timestamp(id: impl Into<String>, rssi: i32, timestamp_ms: u64) -> Self {
        Observation {
            id: id.into(),
            rssi,
            timestamp_ms: Some(timestamp_ms),
        }
    }

    /// 从 (id, rssi) 对的向量批量创建
    pub fn from_pairs(pairs: &[(&str, i32)]) -> Vec<Observation> {
        pairs
            .iter()
            .map(|&(id, rssi)| Observation::new(id, rssi))
            .collect()
    }
}
