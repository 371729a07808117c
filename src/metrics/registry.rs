//! Aggregator registry
//!
//! Owns every registered aggregator, keyed (and ordered) by output name.

use super::aggregator::Aggregator;
use super::error::{MetricsError, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default)]
pub struct AggregatorRegistry {
    aggregators: RwLock<BTreeMap<String, Arc<Aggregator>>>,
}

impl AggregatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `aggregator`; a second aggregator with the same output name is
    /// rejected and the first one stays untouched
    pub fn add(&self, aggregator: Aggregator) -> Result<Arc<Aggregator>> {
        let mut aggregators = self.aggregators.write();
        if aggregators.contains_key(aggregator.output_name()) {
            return Err(MetricsError::configuration(format!(
                "aggregator '{}' is already registered",
                aggregator.output_name()
            )));
        }
        let aggregator = Arc::new(aggregator);
        aggregators.insert(aggregator.output_name().to_string(), Arc::clone(&aggregator));
        Ok(aggregator)
    }

    pub fn get(&self, output_name: &str) -> Option<Arc<Aggregator>> {
        self.aggregators.read().get(output_name).cloned()
    }

    pub fn contains(&self, output_name: &str) -> bool {
        self.aggregators.read().contains_key(output_name)
    }

    /// All aggregators in output-name order
    pub fn all(&self) -> Vec<Arc<Aggregator>> {
        self.aggregators.read().values().cloned().collect()
    }

    /// Aggregators whose gauges are discovered by the sweep
    pub fn dynamic(&self) -> Vec<Arc<Aggregator>> {
        self.aggregators
            .read()
            .values()
            .filter(|a| !a.has_fixed_outputs())
            .cloned()
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.aggregators.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.aggregators.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregators.read().is_empty()
    }
}
