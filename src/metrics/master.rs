//! Metrics master service
//!
//! Entry point for the transport layer. Heartbeats from workers and clients
//! are upserted into the per-source store; aggregators turn the store into
//! cluster gauges; a scheduled sweep exposes gauges whose names depend on the
//! data (one per tag value).
//!
//! # Example
//!
//! ```ignore
//! let heartbeat = ManualHeartbeat::new();
//! let master = MetricsMaster::new(
//!     MetricsMasterConfig::test(),
//!     Arc::new(heartbeat.clone()),
//!     Arc::new(ManualClock::new(0)),
//! )?;
//! master.add_aggregator(Aggregator::sum("metricA", InstanceKind::Worker, "metricA")?)?;
//! master.start()?;
//!
//! master.worker_heartbeat("worker-1", vec![metric.into()]);
//! heartbeat.execute();
//! let total = master.gauge_value("metricA")?;
//! ```

use super::aggregator::Aggregator;
use super::config::MetricsMasterConfig;
use super::error::{MetricsError, Result};
use super::exposition::GaugeRegistry;
use super::key_encoder::MetricKeyEncoder;
use super::registry::AggregatorRegistry;
use super::store::MetricsStore;
use super::sweep::{ClusterMetricsUpdater, SweepReport};
use super::types::{InstanceKind, Metric, MetricKind, MetricValue};
use crate::clock::MetricsClock;
use crate::heartbeat::{HeartbeatCallback, HeartbeatScheduler};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A metric as delivered by the transport layer
#[derive(Debug, Clone, PartialEq)]
pub enum ReportedMetric {
    /// Already structured
    Decoded(Metric),
    /// Canonical identity string still to be decoded
    Encoded {
        full_name: String,
        kind: MetricKind,
        value: MetricValue,
    },
}

impl ReportedMetric {
    pub fn encoded(
        full_name: impl Into<String>,
        kind: MetricKind,
        value: impl Into<MetricValue>,
    ) -> Self {
        ReportedMetric::Encoded {
            full_name: full_name.into(),
            kind,
            value: value.into(),
        }
    }

    fn into_metric(self) -> Result<Metric> {
        match self {
            ReportedMetric::Decoded(metric) => Ok(metric),
            ReportedMetric::Encoded {
                full_name,
                kind,
                value,
            } => Metric::from_full_name(&full_name, value, kind),
        }
    }
}

impl From<Metric> for ReportedMetric {
    fn from(metric: Metric) -> Self {
        ReportedMetric::Decoded(metric)
    }
}

/// Outcome of one heartbeat
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeartbeatReport {
    /// Source the metrics were attributed to (empty if the source was invalid)
    pub source: String,
    /// Metrics upserted into the store
    pub accepted: usize,
    /// One error per metric that was dropped
    pub rejected: Vec<MetricsError>,
}

impl HeartbeatReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Cluster metrics aggregation service
pub struct MetricsMaster {
    config: MetricsMasterConfig,
    store: Arc<MetricsStore>,
    aggregators: Arc<AggregatorRegistry>,
    gauges: Arc<GaugeRegistry>,
    updater: Arc<ClusterMetricsUpdater>,
    scheduler: Arc<dyn HeartbeatScheduler>,
    clock: Arc<dyn MetricsClock>,
    last_heartbeats: RwLock<BTreeMap<String, u64>>,
    last_clear_ms: Mutex<Option<u64>>,
    running: Mutex<bool>,
}

impl MetricsMaster {
    /// Build the master and register every aggregator the config declares.
    ///
    /// Sweeps do not run until `start()`.
    pub fn new(
        config: MetricsMasterConfig,
        scheduler: Arc<dyn HeartbeatScheduler>,
        clock: Arc<dyn MetricsClock>,
    ) -> Result<Self> {
        let store = Arc::new(MetricsStore::new());
        let aggregators = Arc::new(AggregatorRegistry::new());
        let gauges = Arc::new(GaugeRegistry::new());
        let updater = Arc::new(ClusterMetricsUpdater::new(
            Arc::clone(&store),
            Arc::clone(&aggregators),
            Arc::clone(&gauges),
        ));

        let master = MetricsMaster {
            config,
            store,
            aggregators,
            gauges,
            updater,
            scheduler,
            clock,
            last_heartbeats: RwLock::new(BTreeMap::new()),
            last_clear_ms: Mutex::new(None),
            running: Mutex::new(false),
        };

        for aggregator in master.config.build_aggregators()? {
            master.add_aggregator(aggregator)?;
        }
        Ok(master)
    }

    pub fn config(&self) -> &MetricsMasterConfig {
        &self.config
    }

    /// Underlying per-source store
    pub fn store(&self) -> &Arc<MetricsStore> {
        &self.store
    }

    // ---- Ingestion ----

    /// Ingest one heartbeat from worker `source_id`. Only worker metrics are
    /// accepted; each is re-attributed to the worker id as given. An id that is
    /// not a valid source segment (empty, or containing '.') rejects the batch.
    pub fn worker_heartbeat(
        &self,
        source_id: &str,
        metrics: impl IntoIterator<Item = ReportedMetric>,
    ) -> HeartbeatReport {
        let source = MetricKeyEncoder::worker_source(source_id);
        self.ingest(InstanceKind::Worker, source, metrics)
    }

    /// Ingest one heartbeat from client `client_id` on `hostname`. Clients on
    /// the same host stay distinct because the source is `<host>:<client id>`.
    pub fn client_heartbeat(
        &self,
        client_id: &str,
        hostname: &str,
        metrics: impl IntoIterator<Item = ReportedMetric>,
    ) -> HeartbeatReport {
        let source = MetricKeyEncoder::client_source(hostname, client_id);
        self.ingest(InstanceKind::Client, source, metrics)
    }

    fn ingest(
        &self,
        expected: InstanceKind,
        source: Result<String>,
        metrics: impl IntoIterator<Item = ReportedMetric>,
    ) -> HeartbeatReport {
        let source = match source {
            Ok(source) => source,
            Err(err) => {
                let rejected: Vec<MetricsError> =
                    metrics.into_iter().map(|_| err.clone()).collect();
                warn!(kind = %expected, error = %err, dropped = rejected.len(), "Rejected heartbeat");
                return HeartbeatReport {
                    rejected,
                    ..HeartbeatReport::default()
                };
            }
        };

        let mut report = HeartbeatReport {
            source: source.clone(),
            ..HeartbeatReport::default()
        };
        for reported in metrics {
            match Self::attribute(expected, &source, reported) {
                Ok(metric) => {
                    self.store.upsert(metric);
                    report.accepted += 1;
                }
                Err(err) => {
                    warn!(source = %source, error = %err, "Rejected metric");
                    report.rejected.push(err);
                }
            }
        }

        self.last_heartbeats
            .write()
            .insert(source.clone(), self.clock.now_ms());
        debug!(
            source = %source,
            accepted = report.accepted,
            rejected = report.rejected.len(),
            "Heartbeat ingested"
        );
        report
    }

    fn attribute(expected: InstanceKind, source: &str, reported: ReportedMetric) -> Result<Metric> {
        let metric = reported.into_metric()?;
        if metric.instance_kind() != expected {
            return Err(MetricsError::format(format!(
                "{} heartbeat cannot carry {} metric '{}'",
                expected,
                metric.instance_kind(),
                metric.full_name()
            )));
        }
        metric.with_source(source)
    }

    // ---- Aggregators ----

    /// Register an aggregator. Fixed gauges are exposed immediately; per-tag
    /// gauges appear on the next sweep.
    pub fn add_aggregator(&self, aggregator: Aggregator) -> Result<()> {
        let aggregator = self.aggregators.add(aggregator)?;
        if aggregator.has_fixed_outputs() {
            for (name, gauge) in aggregator.outputs(&self.store) {
                self.gauges.register(name, gauge);
            }
        }
        info!(aggregator = %aggregator, "Registered aggregator");
        Ok(())
    }

    /// Output names of registered aggregators, sorted
    pub fn aggregator_names(&self) -> Vec<String> {
        self.aggregators.names()
    }

    pub fn aggregator(&self, output_name: &str) -> Option<Arc<Aggregator>> {
        self.aggregators.get(output_name)
    }

    // ---- Exposition ----

    /// Current value of an exposed gauge. Unknown names are an error, not zero.
    pub fn gauge_value(&self, name: &str) -> Result<MetricValue> {
        self.gauges.value(name)
    }

    pub fn gauge_names(&self) -> Vec<String> {
        self.gauges.names()
    }

    /// Current value of every exposed gauge
    pub fn gauge_values(&self) -> BTreeMap<String, MetricValue> {
        self.gauges.values()
    }

    // ---- Sweep ----

    /// Run one sweep now, independent of the scheduler
    pub fn update_cluster_metrics(&self) -> SweepReport {
        self.updater.heartbeat()
    }

    // ---- Bookkeeping ----

    /// Drop every stored metric. Exposed gauges stay and read over the empty store.
    pub fn clear_metrics(&self) {
        let dropped = self.store.len();
        self.store.clear();
        *self.last_clear_ms.lock() = Some(self.clock.now_ms());
        info!(dropped, "Cleared stored metrics");
    }

    pub fn last_clear_ms(&self) -> Option<u64> {
        *self.last_clear_ms.lock()
    }

    /// Clock time of the last heartbeat from `source`
    pub fn last_heartbeat_ms(&self, source: &str) -> Option<u64> {
        self.last_heartbeats.read().get(source).copied()
    }

    /// Every source that has sent a heartbeat, sorted
    pub fn reporting_sources(&self) -> Vec<String> {
        self.last_heartbeats.read().keys().cloned().collect()
    }

    // ---- Lifecycle ----

    /// Hand the sweep to the scheduler
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock();
        if *running {
            return Err(MetricsError::Lifecycle(
                "metrics master is already running".to_string(),
            ));
        }

        let updater = Arc::clone(&self.updater);
        let callback: HeartbeatCallback = Arc::new(move || {
            updater.heartbeat();
        });
        self.scheduler.schedule(callback)?;
        *running = true;

        match self.sweep_period() {
            Some(period) => {
                if period != self.config.cluster_metrics_interval {
                    warn!(
                        scheduler_ms = period.as_millis() as u64,
                        configured_ms = self.config.cluster_metrics_interval.as_millis() as u64,
                        "Scheduler period differs from configured sweep interval"
                    );
                }
                info!(
                    interval_ms = period.as_millis() as u64,
                    aggregators = self.aggregators.len(),
                    "Metrics master started"
                );
            }
            None => info!(
                aggregators = self.aggregators.len(),
                "Metrics master started, sweeps driven externally"
            ),
        }
        Ok(())
    }

    /// Cancel future sweeps. Exposed gauges and stored metrics are kept.
    pub fn stop(&self) -> Result<()> {
        let mut running = self.running.lock();
        if !*running {
            return Err(MetricsError::Lifecycle(
                "metrics master is not running".to_string(),
            ));
        }
        self.scheduler.cancel();
        *running = false;
        info!(gauges = self.gauges.len(), "Metrics master stopped");
        Ok(())
    }

    /// Cadence of timer-driven sweeps, taken from the scheduler rather than
    /// the configuration. `None` when sweeps are triggered externally.
    pub fn sweep_period(&self) -> Option<std::time::Duration> {
        self.scheduler.tick_period()
    }

    pub fn is_running(&self) -> bool {
        *self.running.lock()
    }
}

impl Drop for MetricsMaster {
    fn drop(&mut self) {
        if *self.running.get_mut() {
            self.scheduler.cancel();
        }
    }
}
