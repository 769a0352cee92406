//! 卡尔曼滤波时间序列平滑
//!
//! X、Y 两轴各自独立的一维滤波器，不建模运动，不考虑轴间协方差。

use crate::config::SmootherConfig;

/// 简单的 1D 卡尔曼滤波器
#[derive(Clone, Debug)]
pub struct AxisFilter {
    /// 过程噪声
    pub q: f64,
    /// 测量噪声
    pub r: f64,
    /// 估计方差
    pub p: f64,
    /// 当前估计值
    pub value: f64,
}

impl AxisFilter {
    /// 创建新的 1D 卡尔曼滤波器
    pub fn new(q: f64, r: f64, initial_variance: f64) -> Self {
        AxisFilter {
            q,
            r,
            p: initial_variance,
            value: 0.0,
        }
    }

    /// 更新滤波器
    pub fn update(&mut self, measurement: f64) -> f64 {
        // 预测
        self.p += self.q;

        // 卡尔曼增益
        let k = self.p / (self.p + self.r);

        // 更新
        self.value += k * (measurement - self.value);
        self.p *= 1.0 - k;

        self.value
    }
}

/// 2D 位置平滑器
///
/// 首次更新直接采用测量值，避免把第一个定位结果拉向原点。
#[derive(Clone, Debug)]
pub struct TemporalSmoother {
    x_filter: AxisFilter,
    y_filter: AxisFilter,
    initialized: bool,
}

impl TemporalSmoother {
    pub fn new(config: &SmootherConfig) -> Self {
        let axis = AxisFilter::new(
            config.process_noise,
            config.measurement_noise,
            config.initial_variance,
        );
        TemporalSmoother {
            x_filter: axis.clone(),
            y_filter: axis,
            initialized: false,
        }
    }

    /// 输入一个原始定位结果，返回平滑后的位置
    pub fn update(&mut self, x: f64, y: f64) -> (f64, f64) {
        if !self.initialized {
            self.x_filter.value = x;
            self.y_filter.value = y;
            self.initialized = true;
            return self.current_estimate();
        }

        (self.x_filter.update(x), self.y_filter.update(y))
    }

    /// 当前平滑位置；首次更新前为 (0, 0)
    pub fn current_estimate(&self) -> (f64, f64) {
        (self.x_filter.value, self.y_filter.value)
    }

    /// 两轴各自的估计方差
    pub fn variance(&self) -> (f64, f64) {
        (self.x_filter.p, self.y_filter.p)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl Default for TemporalSmoother {
    fn default() -> Self {
        Self::new(&SmootherConfig::default())
    }
}
