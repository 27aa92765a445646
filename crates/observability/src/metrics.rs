//! 融合管道指标收集模块
//!
//! 记录输入、缓冲区、同步与后端处理的运行指标，并提供内存聚合摘要。

use contracts::BundleStatistics;
use metrics::{counter, gauge, histogram};

/// 记录一次后端处理完成的测量包
pub fn record_bundle(stats: &BundleStatistics) {
    counter!("gvio_sync_bundles_processed_total").increment(1);
    gauge!("gvio_sync_last_bundle_id").set(stats.bundle_id as f64);
    histogram!("gvio_sync_backend_latency_ms").record(stats.backend_ms);
    histogram!("gvio_sync_bundle_imu_samples").record(stats.imu_count as f64);
    histogram!("gvio_sync_bundle_features").record(stats.feature_count as f64);

    if stats.satellite_count > 0 {
        counter!("gvio_sync_bundles_with_satellites_total").increment(1);
    }
    gauge!("gvio_sync_solver_ready").set(if stats.solver_ready { 1.0 } else { 0.0 });
}

/// 记录输入消息接收
pub fn record_measurement_received(channel: &str) {
    counter!(
        "gvio_sync_measurements_received_total",
        "channel" => channel.to_string()
    )
    .increment(1);
}

/// 记录乱序丢弃
pub fn record_disorder(channel: &str) {
    counter!(
        "gvio_sync_disorder_drops_total",
        "channel" => channel.to_string()
    )
    .increment(1);
}

/// 记录缓冲区满时的最旧元素驱逐
pub fn record_eviction(channel: &str) {
    counter!(
        "gvio_sync_buffer_evictions_total",
        "channel" => channel.to_string()
    )
    .increment(1);
}

/// 记录被降频策略丢弃的图像
pub fn record_decimated_image() {
    counter!("gvio_sync_images_decimated_total").increment(1);
}

/// 记录缓冲区深度
pub fn record_buffer_depths(imu: usize, features: usize, satellites: usize) {
    gauge!("gvio_sync_buffer_depth", "channel" => "imu").set(imu as f64);
    gauge!("gvio_sync_buffer_depth", "channel" => "features").set(features as f64);
    gauge!("gvio_sync_buffer_depth", "channel" => "satellites").set(satellites as f64);
}

/// 记录估计器重启
pub fn record_restart() {
    counter!("gvio_sync_restarts_total").increment(1);
}

/// 记录输出事件分发
pub fn record_event_dispatched(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "gvio_sync_events_dispatched_total",
        "sink" => sink_name.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 融合指标聚合器
///
/// 在内存中聚合每个测量包的统计，便于输出摘要。
#[derive(Debug, Clone, Default)]
pub struct FusionMetricsAggregator {
    /// 测量包总数
    pub total_bundles: u64,

    /// 含卫星观测的测量包数
    pub bundles_with_satellites: u64,

    /// 求解器就绪后的测量包数
    pub solver_ready_bundles: u64,

    /// 后端耗时统计 (ms)
    pub backend_ms: RunningStats,

    /// 每包 IMU 样本数统计
    pub imu_per_bundle: RunningStats,

    /// 每包特征数统计
    pub features_per_bundle: RunningStats,

    /// 相邻测量包图像时间间隔 (ms)
    pub bundle_interval_ms: RunningStats,

    last_timestamp: Option<f64>,
}

impl FusionMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, stats: &BundleStatistics) {
        self.total_bundles += 1;
        if stats.satellite_count > 0 {
            self.bundles_with_satellites += 1;
        }
        if stats.solver_ready {
            self.solver_ready_bundles += 1;
        }

        self.backend_ms.push(stats.backend_ms);
        self.imu_per_bundle.push(stats.imu_count as f64);
        self.features_per_bundle.push(stats.feature_count as f64);

        if let Some(last) = self.last_timestamp {
            self.bundle_interval_ms
                .push((stats.timestamp - last) * 1000.0);
        }
        self.last_timestamp = Some(stats.timestamp);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_bundles: self.total_bundles,
            bundles_with_satellites: self.bundles_with_satellites,
            solver_ready_bundles: self.solver_ready_bundles,
            satellite_rate: if self.total_bundles > 0 {
                self.bundles_with_satellites as f64 / self.total_bundles as f64 * 100.0
            } else {
                0.0
            },
            backend_ms: StatsSummary::from(&self.backend_ms),
            imu_per_bundle: StatsSummary::from(&self.imu_per_bundle),
            features_per_bundle: StatsSummary::from(&self.features_per_bundle),
            bundle_interval_ms: StatsSummary::from(&self.bundle_interval_ms),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_bundles: u64,
    pub bundles_with_satellites: u64,
    pub solver_ready_bundles: u64,
    pub satellite_rate: f64,
    pub backend_ms: StatsSummary,
    pub imu_per_bundle: StatsSummary,
    pub features_per_bundle: StatsSummary,
    pub bundle_interval_ms: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Fusion Metrics Summary ===")?;
        writeln!(f, "Total bundles: {}", self.total_bundles)?;
        writeln!(
            f,
            "Bundles with satellites: {} ({:.2}%)",
            self.bundles_with_satellites, self.satellite_rate
        )?;
        writeln!(f, "Solver-ready bundles: {}", self.solver_ready_bundles)?;
        writeln!(f, "Backend latency (ms): {}", self.backend_ms)?;
        writeln!(f, "IMU samples per bundle: {}", self.imu_per_bundle)?;
        writeln!(f, "Features per bundle: {}", self.features_per_bundle)?;
        writeln!(f, "Bundle interval (ms): {}", self.bundle_interval_ms)?;
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// 最小值
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }
}
