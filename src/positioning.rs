//! WiFi 热点室内定位
//!
//! 支持的功能：
//! - 按信号阈值过滤观测、查询热点校准记录
//! - RSSI 转距离与加权多边定位
//! - 数值稳定性校验与卡尔曼平滑
//! - 结构化事件回调（替代直接打印诊断信息）
//! - 周期性扫描驱动

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::algorithms::{
    Observation, PositionFix, StabilityGuard, TemporalSmoother, WeightedMultilaterator,
    WeightedSample, estimate_distance, rms_residual,
};
use crate::config::PipelineConfig;
use crate::error::{ConfigError, LocateError, LocateResult};
use crate::store::CalibrationLookup;

// ============================================================================
// 诊断事件
// ============================================================================

/// 定位过程中产生的诊断事件
#[derive(Clone, Debug, PartialEq)]
pub enum EstimationEvent {
    /// 观测信号不高于阈值，被丢弃
    ObservationFiltered { id: String, rssi: i32, threshold: i32 },
    /// 观测因缺少校准等原因被跳过
    ObservationSkipped { id: String, cause: LocateError },
    /// 本轮定位失败
    EstimateRejected { cause: LocateError },
    /// 本轮定位成功
    FixAccepted {
        raw: (f64, f64),
        smoothed: (f64, f64),
        samples: usize,
    },
}

/// 诊断事件接收者
pub trait EstimationObserver {
    fn on_event(&self, event: &EstimationEvent);
}

/// 将事件写入 tracing 日志
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl EstimationObserver for TracingObserver {
    fn on_event(&self, event: &EstimationEvent) {
        match event {
            EstimationEvent::ObservationFiltered { id, rssi, threshold } => {
                debug!(%id, rssi, threshold, "信号过弱，跳过");
            }
            EstimationEvent::ObservationSkipped { id, cause } => {
                debug!(%id, %cause, "跳过观测");
            }
            EstimationEvent::EstimateRejected { cause } => {
                warn!(%cause, "本轮无定位结果");
            }
            EstimationEvent::FixAccepted { raw, smoothed, samples } => {
                info!(
                    raw_x = raw.0,
                    raw_y = raw.1,
                    x = smoothed.0,
                    y = smoothed.1,
                    samples,
                    "定位更新"
                );
            }
        }
    }
}

// ============================================================================
// 定位流水线
// ============================================================================

/// 位置估计流水线
///
/// 每个被跟踪的接收端需要独立的流水线实例，平滑状态不可共享。
pub struct PositionEstimationPipeline {
    config: PipelineConfig,
    solver: WeightedMultilaterator,
    smoother: TemporalSmoother,
    observer: Box<dyn EstimationObserver + Send>,
}

impl PositionEstimationPipeline {
    /// 以校验后的配置创建流水线，事件输出到 tracing
    pub fn try_new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(PositionEstimationPipeline {
            solver: WeightedMultilaterator::new(config.min_samples, config.conditioning_epsilon),
            smoother: TemporalSmoother::new(&config.smoother),
            observer: Box::new(TracingObserver),
            config,
        })
    }

    /// 替换诊断事件接收者
    pub fn with_observer(mut self, observer: impl EstimationObserver + Send + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// 由一次扫描的观测计算定位结果
    ///
    /// # 参数
    /// - `observations`: 本轮扫描的观测
    /// - `calibrations`: 热点校准查询
    ///
    /// # 返回
    /// - 平滑后的定位结果；失败时平滑状态不变，调用方下一轮重试即可
    pub fn estimate<L>(
        &mut self,
        observations: &[Observation],
        calibrations: &L,
    ) -> LocateResult<PositionFix>
    where
        L: CalibrationLookup + ?Sized,
    {
        let result = self.try_estimate(observations, calibrations);
        if let Err(cause) = &result {
            self.observer.on_event(&EstimationEvent::EstimateRejected {
                cause: cause.clone(),
            });
        }
        result
    }

    fn try_estimate<L>(
        &mut self,
        observations: &[Observation],
        calibrations: &L,
    ) -> LocateResult<PositionFix>
    where
        L: CalibrationLookup + ?Sized,
    {
        let required = self.config.min_samples;
        if observations.len() < required {
            return Err(LocateError::InsufficientObservations {
                found: observations.len(),
                required,
            });
        }

        let threshold = self.config.rssi_threshold_dbm;
        let strong: Vec<&Observation> = observations
            .iter()
            .filter(|o| {
                let keep = o.rssi > threshold;
                if !keep {
                    self.observer.on_event(&EstimationEvent::ObservationFiltered {
                        id: o.id.clone(),
                        rssi: o.rssi,
                        threshold,
                    });
                }
                keep
            })
            .collect();
        if strong.len() < required {
            return Err(LocateError::InsufficientValidObservations {
                found: strong.len(),
                required,
            });
        }

        let samples: Vec<WeightedSample> = strong
            .into_iter()
            .filter_map(|o| match calibrations.lookup(&o.id) {
                Some(record) => {
                    let distance = estimate_distance(o, &record);
                    Some(WeightedSample::from_distance(record.x, record.y, distance))
                }
                None => {
                    self.observer.on_event(&EstimationEvent::ObservationSkipped {
                        id: o.id.clone(),
                        cause: LocateError::CalibrationMissing(o.id.clone()),
                    });
                    None
                }
            })
            .collect();
        if samples.len() < required {
            return Err(LocateError::InsufficientValidObservations {
                found: samples.len(),
                required,
            });
        }

        let (raw_x, raw_y) = self.solver.solve(&samples)?;
        let raw = StabilityGuard::validate(raw_x, raw_y)?;
        let smoothed = self.smoother.update(raw.0, raw.1);

        self.observer.on_event(&EstimationEvent::FixAccepted {
            raw,
            smoothed,
            samples: samples.len(),
        });

        Ok(PositionFix::new(
            smoothed,
            raw,
            samples.len(),
            rms_residual(&samples, raw.0, raw.1),
        ))
    }

    /// 当前平滑位置；尚无定位时为 (0, 0)
    pub fn current_estimate(&self) -> (f64, f64) {
        self.smoother.current_estimate()
    }

    pub fn smoother(&self) -> &TemporalSmoother {
        &self.smoother
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

impl Default for PositionEstimationPipeline {
    fn default() -> Self {
        let config = PipelineConfig::default();
        PositionEstimationPipeline {
            solver: WeightedMultilaterator::new(config.min_samples, config.conditioning_epsilon),
            smoother: TemporalSmoother::new(&config.smoother),
            observer: Box::new(TracingObserver),
            config,
        }
    }
}

// ============================================================================
// 周期扫描驱动
// ============================================================================

/// 扫描观测来源
pub trait ScanSource {
    /// 执行一次扫描；返回 `None` 表示来源已结束
    fn scan(&mut self) -> Option<Vec<Observation>>;
}

/// 回放预先记录的扫描序列
#[derive(Clone, Debug, Default)]
pub struct ReplaySource {
    scans: VecDeque<Vec<Observation>>,
}

impl ReplaySource {
    pub fn new(scans: impl IntoIterator<Item = Vec<Observation>>) -> Self {
        ReplaySource {
            scans: scans.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.scans.len()
    }
}

impl ScanSource for ReplaySource {
    fn scan(&mut self) -> Option<Vec<Observation>> {
        self.scans.pop_front()
    }
}

/// 按固定周期扫描并定位
pub struct ScanLoop<L, S> {
    pipeline: PositionEstimationPipeline,
    calibrations: L,
    source: S,
}

impl<L, S> ScanLoop<L, S>
where
    L: CalibrationLookup,
    S: ScanSource,
{
    pub fn new(pipeline: PositionEstimationPipeline, calibrations: L, source: S) -> Self {
        ScanLoop {
            pipeline,
            calibrations,
            source,
        }
    }

    /// 运行直到扫描来源结束
    ///
    /// 每个周期的结果（成功或失败）都交给 `on_cycle`，失败不会中断循环。
    /// 周期为 0 时按 1 毫秒处理。
    ///
    /// # 返回
    /// - 执行的周期数
    pub async fn run<F>(&mut self, period: Duration, mut on_cycle: F) -> usize
    where
        F: FnMut(&LocateResult<PositionFix>),
    {
        let mut ticker = interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut cycles = 0;
        loop {
            ticker.tick().await;
            let Some(observations) = self.source.scan() else {
                break;
            };
            let outcome = self.pipeline.estimate(&observations, &self.calibrations);
            on_cycle(&outcome);
            cycles += 1;
        }

        info!(cycles, "扫描来源已结束");
        cycles
    }

    pub fn pipeline(&self) -> &PositionEstimationPipeline {
        &self.pipeline
    }

    pub fn calibrations(&self) -> &L {
        &self.calibrations
    }

    /// 取回流水线（保留平滑状态）
    pub fn into_pipeline(self) -> PositionEstimationPipeline {
        self.pipeline
    }
}
