//! Cluster Metrics Aggregation Module
//!
//! The metrics core of the storage master:
//!
//! - **Per-source store** keeping the latest value of every metric identity
//! - **Aggregators** deriving cluster gauges (sum, per-tag breakdown)
//! - **Gauge registry** answering monitoring reads on demand
//! - **Sweep** exposing gauges whose names are only known from the data
//!
//! `MetricsMaster` wires these together behind the heartbeat ingestion API.

mod aggregator;
mod config;
mod error;
mod exposition;
mod key_encoder;
mod master;
mod registry;
mod store;
mod store_dst;
mod sweep;
mod types;

pub use aggregator::{AggregationStrategy, Aggregator, GaugeFn};
pub use config::{AggregatorConfig, MetricsMasterConfig};
pub use error::{MetricsError, Result};
pub use exposition::GaugeRegistry;
pub use key_encoder::MetricKeyEncoder;
pub use master::{HeartbeatReport, MetricsMaster, ReportedMetric};
pub use registry::AggregatorRegistry;
pub use store::MetricsStore;
pub use store_dst::{
    run_store_batch, summarize_store_batch, StoreDSTConfig, StoreDSTHarness, StoreDSTResult,
    StoreOp,
};
pub use sweep::{ClusterMetricsUpdater, SweepReport};
pub use types::{InstanceKind, Metric, MetricKind, MetricValue, TagSet};
