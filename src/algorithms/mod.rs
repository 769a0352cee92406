//! 定位算法模块
//!
//! 该模块提供 WiFi 热点室内定位的各个组成部分：
//! - RSSI 转距离（对数距离路径损耗模型）
//! - 反平方加权的线性化最小二乘多边定位
//! - 数值稳定性校验
//! - 两轴独立的卡尔曼平滑

pub mod hotspot;
pub mod kalman;
pub mod location_algorithms;
pub mod results;
pub mod rssi_model;

pub use hotspot::*;
pub use kalman::*;
pub use location_algorithms::*;
pub use results::*;
pub use rssi_model::*;
