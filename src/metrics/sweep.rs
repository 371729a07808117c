//! Cluster metrics sweep
//!
//! Discovers the gauges of dynamic aggregators (one per tag value currently in
//! the store) and registers those not yet exposed. Fixed-output aggregators are
//! skipped: their gauges are registered with the aggregator itself.

use super::exposition::GaugeRegistry;
use super::registry::AggregatorRegistry;
use super::store::MetricsStore;
use std::sync::Arc;
use tracing::debug;

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Dynamic aggregators examined
    pub aggregators_scanned: usize,
    /// Gauges exposed for the first time by this sweep
    pub gauges_registered: usize,
}

pub struct ClusterMetricsUpdater {
    store: Arc<MetricsStore>,
    aggregators: Arc<AggregatorRegistry>,
    gauges: Arc<GaugeRegistry>,
}

impl ClusterMetricsUpdater {
    pub fn new(
        store: Arc<MetricsStore>,
        aggregators: Arc<AggregatorRegistry>,
        gauges: Arc<GaugeRegistry>,
    ) -> Self {
        ClusterMetricsUpdater {
            store,
            aggregators,
            gauges,
        }
    }

    /// Run one sweep
    pub fn heartbeat(&self) -> SweepReport {
        let mut report = SweepReport::default();
        for aggregator in self.aggregators.dynamic() {
            report.aggregators_scanned += 1;
            for (name, gauge) in aggregator.outputs(&self.store) {
                if self.gauges.contains(&name) {
                    continue;
                }
                if self.gauges.register(name.clone(), gauge) {
                    debug!(aggregator = aggregator.output_name(), gauge = %name, "Exposed new cluster gauge");
                    report.gauges_registered += 1;
                }
            }
        }
        debug!(
            scanned = report.aggregators_scanned,
            registered = report.gauges_registered,
            "Cluster metrics sweep finished"
        );
        report
    }
}
