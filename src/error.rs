//! 错误类型
//!
//! 定位、校准存储与配置三类错误。定位错误均可恢复：本轮无定位结果，
//! 调用方在下一个扫描周期重试即可。

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// 定位结果类型
pub type LocateResult<T> = Result<T, LocateError>;

/// 校准存储结果类型
pub type StoreResult<T> = Result<T, StoreError>;

/// 定位流水线错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocateError {
    /// 输入观测数量不足
    #[error("观测数量不足: {found} < {required}")]
    InsufficientObservations { found: usize, required: usize },

    /// 过滤（信号阈值、缺失校准）后有效观测数量不足
    #[error("有效观测数量不足: {found} < {required}")]
    InsufficientValidObservations { found: usize, required: usize },

    /// 求解器收到的样本数量不足
    #[error("样本数量不足: {found} < {required}")]
    InsufficientSamples { found: usize, required: usize },

    /// 样本权重之和为零
    #[error("样本权重之和为零")]
    ZeroWeight,

    /// 线性方程组近奇异（信标共线或重合）
    #[error("方程组病态: 条件系数 {conditioning:e}")]
    IllConditioned { conditioning: f64 },

    /// 求解结果包含 NaN 或无穷大
    #[error("数值无效: ({x}, {y})")]
    InvalidNumeric { x: f64, y: f64 },

    /// 单个观测找不到校准记录（不致命，仅跳过该观测）
    #[error("缺少校准记录: {0}")]
    CalibrationMissing(String),
}

/// 校准存储错误
#[derive(Error, Debug)]
pub enum StoreError {
    /// 槽位已满，无法写入新的标识符
    #[error("校准表已满 (容量 {capacity})")]
    StoreFull { capacity: usize },

    /// 标识符为空
    #[error("标识符为空")]
    EmptyIdentifier,

    /// 标识符超出槽位长度
    #[error("标识符过长: {len} 字节 (上限 {max})")]
    IdentifierTooLong { len: usize, max: usize },

    /// 记录不满足写入约束
    #[error("校准记录无效: {0}")]
    InvalidRecord(String),

    /// 持久化镜像长度与槽位布局不符
    #[error("镜像损坏: 期望 {expected} 字节, 实际 {actual} 字节")]
    CorruptImage { expected: usize, actual: usize },

    /// 镜像 JSON 导入失败
    #[error("导入失败: {0}")]
    Import(#[from] serde_json::Error),

    /// 文件读写失败
    #[error("存储 I/O 错误: {0}")]
    Io(#[from] io::Error),
}

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件读写失败
    #[error("无法读写配置文件 {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON 解析失败
    #[error("配置解析失败: {0}")]
    Parse(#[from] serde_json::Error),

    /// 字段取值不合法
    #[error("配置项 `{field}` 无效: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid_value(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}
