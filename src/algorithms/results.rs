//! 定位结果数据结构

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 单个扫描周期的定位结果
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    /// 平滑后的 X 坐标
    pub x: f64,
    /// 平滑后的 Y 坐标
    pub y: f64,
    /// 求解器输出的原始 X 坐标
    pub raw_x: f64,
    /// 求解器输出的原始 Y 坐标
    pub raw_y: f64,
    /// 参与求解的样本数量
    pub sample_count: usize,
    /// 原始解相对估计距离的均方根残差（米）
    pub residual: f64,
    /// 时间戳
    pub timestamp: DateTime<Utc>,
}

impl PositionFix {
    pub fn new(
        smoothed: (f64, f64),
        raw: (f64, f64),
        sample_count: usize,
        residual: f64,
    ) -> Self {
        Self::with_timestamp(smoothed, raw, sample_count, residual, Utc::now())
    }

    /// 创建具有自定义时间戳的结果
    pub fn with_timestamp(
        (x, y): (f64, f64),
        (raw_x, raw_y): (f64, f64),
        sample_count: usize,
        residual: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        PositionFix {
            x,
            y,
            raw_x,
            raw_y,
            sample_count,
            residual,
            timestamp,
        }
    }

    /// 平滑后的 2D 坐标
    pub fn xy(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn raw_xy(&self) -> (f64, f64) {
        (self.raw_x, self.raw_y)
    }

    /// 与另一结果的平面距离
    pub fn distance_to(&self, other: &PositionFix) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl fmt::Display for PositionFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.2}, {:.2}) [原始 ({:.2}, {:.2}), {} 个热点, 残差 {:.2}]",
            self.x, self.y, self.raw_x, self.raw_y, self.sample_count, self.residual
        )
    }
}
