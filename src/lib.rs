pub mod clock;
pub mod heartbeat;
pub mod metrics;

pub use clock::{ManualClock, MetricsClock, SystemClock};
pub use heartbeat::{HeartbeatScheduler, IntervalHeartbeat, ManualHeartbeat};
pub use metrics::{
    Aggregator, InstanceKind, Metric, MetricKind, MetricValue, MetricsError, MetricsMaster,
    MetricsMasterConfig, ReportedMetric, TagSet,
};
