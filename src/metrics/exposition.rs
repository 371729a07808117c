//! Gauge exposition registry
//!
//! Maps gauge names to read-time compute functions for monitoring readers.
//! The table only grows: a gauge, once registered, is never replaced or removed.
//! Compute functions run after the table lock is released.

use super::aggregator::GaugeFn;
use super::error::{MetricsError, Result};
use super::types::MetricValue;
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Default)]
pub struct GaugeRegistry {
    gauges: RwLock<BTreeMap<String, GaugeFn>>,
}

impl GaugeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `gauge` under `name` unless the name is taken.
    ///
    /// Returns true if the gauge was newly registered.
    pub fn register(&self, name: impl Into<String>, gauge: GaugeFn) -> bool {
        let name = name.into();
        if self.gauges.read().contains_key(&name) {
            return false;
        }
        let mut gauges = self.gauges.write();
        if gauges.contains_key(&name) {
            return false;
        }
        gauges.insert(name, gauge);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.gauges.read().contains_key(name)
    }

    /// Current value of the gauge `name`
    pub fn value(&self, name: &str) -> Result<MetricValue> {
        let gauge = self
            .gauges
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| MetricsError::NotFound(name.to_string()))?;
        Ok(gauge())
    }

    /// Registered gauge names, sorted
    pub fn names(&self) -> Vec<String> {
        self.gauges.read().keys().cloned().collect()
    }

    /// Current value of every registered gauge
    pub fn values(&self) -> BTreeMap<String, MetricValue> {
        let gauges: Vec<(String, GaugeFn)> = self
            .gauges
            .read()
            .iter()
            .map(|(name, gauge)| (name.clone(), gauge.clone()))
            .collect();
        gauges
            .into_iter()
            .map(|(name, gauge)| (name, gauge()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.gauges.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.gauges.read().is_empty()
    }
}
