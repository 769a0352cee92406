//! 定位流水线配置
//!
//! 所有可调常数（信号阈值、最少样本数、滤波噪声）集中在 [`PipelineConfig`]，
//! 在构造流水线时传入，可从 JSON 文件加载。

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::algorithms::{DEFAULT_CONDITIONING_EPSILON, MIN_SAMPLES};
use crate::error::ConfigError;

/// 默认信号阈值 (dBm)，不高于此值的观测被丢弃
pub const DEFAULT_RSSI_THRESHOLD_DBM: i32 = -90;

/// 卡尔曼平滑参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmootherConfig {
    /// 初始方差（代表完全未知）
    pub initial_variance: f64,
    /// 过程噪声
    pub process_noise: f64,
    /// 测量噪声
    pub measurement_noise: f64,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        SmootherConfig {
            initial_variance: 1000.0,
            process_noise: 0.01,
            measurement_noise: 1.0,
        }
    }
}

/// 定位流水线配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 信号阈值 (dBm)
    pub rssi_threshold_dbm: i32,
    /// 一次求解所需的最少样本数
    pub min_samples: usize,
    /// 条件系数阈值
    pub conditioning_epsilon: f64,
    /// 平滑参数
    pub smoother: SmootherConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            rssi_threshold_dbm: DEFAULT_RSSI_THRESHOLD_DBM,
            min_samples: MIN_SAMPLES,
            conditioning_epsilon: DEFAULT_CONDITIONING_EPSILON,
            smoother: SmootherConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// 从 JSON 文件加载配置并校验
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// 从 JSON 字符串解析配置并校验，缺省字段取默认值
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// 以格式化 JSON 写入文件，必要时创建父目录
    pub fn to_json(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::FileRead {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 校验各字段，返回发现的第一个问题
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_samples < MIN_SAMPLES {
            return Err(ConfigError::invalid_value(
                "min_samples",
                format!("至少为 {}，实际 {}", MIN_SAMPLES, self.min_samples),
            ));
        }
        if !(self.conditioning_epsilon.is_finite() && self.conditioning_epsilon > 0.0) {
            return Err(ConfigError::invalid_value(
                "conditioning_epsilon",
                "必须为正的有限值",
            ));
        }
        positive_finite("smoother.initial_variance", self.smoother.initial_variance)?;
        positive_finite("smoother.process_noise", self.smoother.process_noise)?;
        positive_finite("smoother.measurement_noise", self.smoother.measurement_noise)?;
        Ok(())
    }
}

fn positive_finite(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid_value(
            field,
            format!("必须为正的有限值，实际 {value}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.rssi_threshold_dbm, -90);
        assert_eq!(config.min_samples, 2);
        assert_eq!(config.smoother.process_noise, 0.01);
        assert_eq!(config.smoother.measurement_noise, 1.0);
    }

    #[test]
    fn test_json_round_trip() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("pipeline.json");

        let mut original = PipelineConfig::default();
        original.rssi_threshold_dbm = -80;
        original.smoother.measurement_noise = 2.5;
        original.to_json(&path).unwrap();

        let loaded = PipelineConfig::from_json(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            PipelineConfig::from_json_str(r#"{"rssi_threshold_dbm": -85, "smoother": {"process_noise": 0.5}}"#)
                .unwrap();
        assert_eq!(config.rssi_threshold_dbm, -85);
        assert_eq!(config.min_samples, 2);
        assert_eq!(config.smoother.process_noise, 0.5);
        assert_eq!(config.smoother.initial_variance, 1000.0);
    }

    #[test]
    fn test_min_samples_below_two_is_invalid() {
        let err = PipelineConfig::from_json_str(r#"{"min_samples": 1}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { field: "min_samples", .. }
        ));
    }

    #[test]
    fn test_non_positive_noise_is_invalid() {
        let mut config = PipelineConfig::default();
        config.smoother.measurement_noise = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.conditioning_epsilon = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let tmp = tempdir().unwrap();
        let err = PipelineConfig::from_json(&tmp.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }

    #[test]
    fn test_malformed_json() {
        let err = PipelineConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
