//! WiFi 热点 RSSI 室内定位
//!
//! - `algorithms`: RSSI 转距离、加权多边定位、稳定性校验、卡尔曼平滑
//! - `positioning`: 定位流水线与周期扫描驱动
//! - `store`: 固定容量的热点校准存储
//! - `config`: 流水线配置

pub mod algorithms;
pub mod config;
pub mod error;
pub mod positioning;
pub mod store;

pub use config::{PipelineConfig, SmootherConfig};
pub use error::{ConfigError, LocateError, LocateResult, StoreError, StoreResult};
