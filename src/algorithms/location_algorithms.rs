//! 加权多边定位算法
//!
//! 支持：
//! - 反平方距离加权的线性化最小二乘
//! - 病态几何（共线、重合热点）检测
//! - 数值稳定性校验

use crate::error::{LocateError, LocateResult};

/// 一次求解所需的最少样本数
pub const MIN_SAMPLES: usize = 2;

/// 默认条件系数阈值
pub const DEFAULT_CONDITIONING_EPSILON: f64 = 1e-6;

// ============================================================================
// 加权样本
// ============================================================================

/// 单个加权样本：已知位置、估计距离与权重
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightedSample {
    /// 热点 X 坐标
    pub x: f64,
    /// 热点 Y 坐标
    pub y: f64,
    /// 估计距离
    pub distance: f64,
    /// 权重（正常构造时大于 0）
    pub weight: f64,
}

impl WeightedSample {
    /// 以反平方距离权重构造样本
    ///
    /// 近处热点的距离估计更可靠，权重更大: w = 1 / d²
    pub fn from_distance(x: f64, y: f64, distance: f64) -> Self {
        WeightedSample {
            x,
            y,
            distance,
            weight: 1.0 / (distance * distance),
        }
    }

    /// 圆方程常数项 x² + y² - d²
    fn offset(&self) -> f64 {
        self.x * self.x + self.y * self.y - self.distance * self.distance
    }
}

// ============================================================================
// 加权多边定位求解器
// ============================================================================

/// 按总权重归一化的加权和
///
/// 均值项用于把每个圆方程减去加权平均方程，二阶矩项构成 2x2 正规方程。
#[derive(Clone, Copy, Debug, Default)]
struct NormalSums {
    mean_x: f64,
    mean_y: f64,
    mean_offset: f64,
    sxx: f64,
    syy: f64,
    sxy: f64,
    sx_offset: f64,
    sy_offset: f64,
}

impl NormalSums {
    fn accumulate(samples: &[WeightedSample], total_weight: f64) -> Self {
        let mut sums = NormalSums::default();

        for s in samples {
            sums.mean_x += s.x * s.weight;
            sums.mean_y += s.y * s.weight;
            sums.mean_offset += s.offset() * s.weight;
        }
        sums.mean_x /= total_weight;
        sums.mean_y /= total_weight;
        sums.mean_offset /= total_weight;

        for s in samples {
            let dx = s.x - sums.mean_x;
            let dy = s.y - sums.mean_y;
            let dq = s.offset() - sums.mean_offset;
            sums.sxx += dx * dx * s.weight;
            sums.syy += dy * dy * s.weight;
            sums.sxy += dx * dy * s.weight;
            sums.sx_offset += dx * dq * s.weight;
            sums.sy_offset += dy * dq * s.weight;
        }
        sums.sxx /= total_weight;
        sums.syy /= total_weight;
        sums.sxy /= total_weight;
        sums.sx_offset /= total_weight;
        sums.sy_offset /= total_weight;

        sums
    }

    fn determinant(&self) -> f64 {
        self.sxx * self.syy - self.sxy * self.sxy
    }

    /// 归一化条件系数 4·det / trace²，取值 [0, 1]
    ///
    /// 各向同性分布为 1，共线或重合为 0，与坐标尺度无关。
    fn conditioning(&self) -> f64 {
        let trace = self.sxx + self.syy;
        if trace <= 0.0 {
            return 0.0;
        }
        4.0 * self.determinant() / (trace * trace)
    }
}

/// 加权线性化最小二乘多边定位
///
/// 圆方程 (x - xi)² + (y - yi)² = di² 减去加权平均方程后得到线性方程
/// 2(xi - x̄)x + 2(yi - ȳ)y = qi - q̄，再按权重求最小二乘解。
#[derive(Clone, Debug)]
pub struct WeightedMultilaterator {
    min_samples: usize,
    conditioning_epsilon: f64,
}

impl WeightedMultilaterator {
    pub fn new(min_samples: usize, conditioning_epsilon: f64) -> Self {
        WeightedMultilaterator {
            min_samples,
            conditioning_epsilon,
        }
    }

    /// 求解 2D 位置
    ///
    /// # 返回
    /// - `Ok((x, y))` 原始解（未经稳定性校验）
    /// - `InsufficientSamples` 样本不足
    /// - `ZeroWeight` 权重之和为零
    /// - `IllConditioned` 几何近奇异
    pub fn solve(&self, samples: &[WeightedSample]) -> LocateResult<(f64, f64)> {
        if samples.len() < self.min_samples {
            return Err(LocateError::InsufficientSamples {
                found: samples.len(),
                required: self.min_samples,
            });
        }

        let total_weight: f64 = samples.iter().map(|s| s.weight).sum();
        if total_weight == 0.0 {
            return Err(LocateError::ZeroWeight);
        }

        let sums = NormalSums::accumulate(samples, total_weight);

        // NaN 不在此拦截，留给稳定性校验
        let conditioning = sums.conditioning();
        if conditioning < self.conditioning_epsilon {
            return Err(LocateError::IllConditioned { conditioning });
        }

        let denominator = 2.0 * sums.determinant();
        let x = (sums.syy * sums.sx_offset - sums.sxy * sums.sy_offset) / denominator;
        let y = (sums.sxx * sums.sy_offset - sums.sxy * sums.sx_offset) / denominator;

        Ok((x, y))
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }
}

impl Default for WeightedMultilaterator {
    fn default() -> Self {
        Self::new(MIN_SAMPLES, DEFAULT_CONDITIONING_EPSILON)
    }
}

// ============================================================================
// 稳定性校验
// ============================================================================

/// 拒绝 NaN 与无穷大坐标
pub struct StabilityGuard;

impl StabilityGuard {
    pub fn validate(x: f64, y: f64) -> LocateResult<(f64, f64)> {
        if x.is_finite() && y.is_finite() {
            Ok((x, y))
        } else {
            Err(LocateError::InvalidNumeric { x, y })
        }
    }
}

/// 定位结果相对各样本估计距离的均方根残差
pub fn rms_residual(samples: &[WeightedSample], x: f64, y: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_sq: f64 = samples
        .iter()
        .map(|s| {
            let range = ((x - s.x).powi(2) + (y - s.y).powi(2)).sqrt();
            (range - s.distance).powi(2)
        })
        .sum();

    (sum_sq / samples.len() as f64).sqrt()
}
