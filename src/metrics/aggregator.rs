//! Cluster aggregators
//!
//! An aggregator derives one or more named gauges from the per-source store.
//! It holds only its configuration: every gauge read re-scans the store, so a
//! value is never older than the read itself.

use super::error::{MetricsError, Result};
use super::key_encoder::MetricKeyEncoder;
use super::store::MetricsStore;
use super::types::{InstanceKind, MetricValue};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Read-time computation behind an exposed gauge
pub type GaugeFn = Arc<dyn Fn() -> MetricValue + Send + Sync>;

/// How an aggregator folds per-source metrics into gauges
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationStrategy {
    /// One gauge: the sum over every source, tags ignored
    Sum,
    /// One gauge per distinct value of `tag_key`, each summing only the
    /// metrics carrying that value
    SingleTagValue { tag_key: String },
}

/// A configured aggregator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregator {
    output_name: String,
    input_kind: InstanceKind,
    input_name: String,
    strategy: AggregationStrategy,
}

impl Aggregator {
    /// Sum `input_name` across every `input_kind` instance into `output_name`
    pub fn sum(
        output_name: impl Into<String>,
        input_kind: InstanceKind,
        input_name: impl Into<String>,
    ) -> Result<Self> {
        Self::build(output_name.into(), input_kind, input_name.into(), AggregationStrategy::Sum)
    }

    /// Break `input_name` down by the value of `tag_key`
    pub fn single_tag_value(
        output_name: impl Into<String>,
        input_kind: InstanceKind,
        input_name: impl Into<String>,
        tag_key: impl Into<String>,
    ) -> Result<Self> {
        let tag_key = tag_key.into();
        MetricKeyEncoder::validate_tag(&tag_key, "_")
            .map_err(|e| MetricsError::configuration(e.to_string()))?;
        Self::build(
            output_name.into(),
            input_kind,
            input_name.into(),
            AggregationStrategy::SingleTagValue { tag_key },
        )
    }

    fn build(
        output_name: String,
        input_kind: InstanceKind,
        input_name: String,
        strategy: AggregationStrategy,
    ) -> Result<Self> {
        MetricKeyEncoder::validate_output_name(&output_name)?;
        MetricKeyEncoder::validate_name(&input_name)
            .map_err(|e| MetricsError::configuration(e.to_string()))?;
        Ok(Aggregator {
            output_name,
            input_kind,
            input_name,
            strategy,
        })
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    pub fn input_kind(&self) -> InstanceKind {
        self.input_kind
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn strategy(&self) -> &AggregationStrategy {
        &self.strategy
    }

    /// Whether the gauge set is known at registration time
    pub fn has_fixed_outputs(&self) -> bool {
        matches!(self.strategy, AggregationStrategy::Sum)
    }

    /// Gauges this aggregator exposes given the current store contents
    pub fn outputs(self: &Arc<Self>, store: &Arc<MetricsStore>) -> Vec<(String, GaugeFn)> {
        match &self.strategy {
            AggregationStrategy::Sum => {
                vec![(self.output_name.clone(), self.gauge_fn(store, None))]
            }
            AggregationStrategy::SingleTagValue { tag_key } => self
                .tag_values(store)
                .into_iter()
                .map(|value| {
                    let name =
                        MetricKeyEncoder::gauge_name_with_tag(&self.output_name, tag_key, &value);
                    (name, self.gauge_fn(store, Some(value)))
                })
                .collect(),
        }
    }

    /// Current value of the gauge for `tag_value` (or the single sum gauge)
    pub fn compute(&self, store: &MetricsStore, tag_value: Option<&str>) -> MetricValue {
        match (&self.strategy, tag_value) {
            (AggregationStrategy::SingleTagValue { tag_key }, Some(expected)) => store
                .snapshot(self.input_kind, &self.input_name, Some(tag_key.as_str()))
                .iter()
                .filter(|m| m.tag(tag_key) == Some(expected))
                .map(|m| m.value())
                .sum(),
            _ => store
                .snapshot(self.input_kind, &self.input_name, None)
                .iter()
                .map(|m| m.value())
                .sum(),
        }
    }

    /// Distinct values of the tag key currently present in the store
    pub fn tag_values(&self, store: &MetricsStore) -> BTreeSet<String> {
        let AggregationStrategy::SingleTagValue { tag_key } = &self.strategy else {
            return BTreeSet::new();
        };
        store
            .snapshot(self.input_kind, &self.input_name, Some(tag_key.as_str()))
            .iter()
            .filter_map(|m| m.tag(tag_key).map(str::to_string))
            .collect()
    }

    fn gauge_fn(self: &Arc<Self>, store: &Arc<MetricsStore>, tag_value: Option<String>) -> GaugeFn {
        let aggregator = Arc::clone(self);
        let store = Arc::clone(store);
        Arc::new(move || aggregator.compute(&store, tag_value.as_deref()))
    }
}

impl fmt::Display for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.strategy {
            AggregationStrategy::Sum => write!(
                f,
                "{} = sum({}.{})",
                self.output_name, self.input_kind, self.input_name
            ),
            AggregationStrategy::SingleTagValue { tag_key } => write!(
                f,
                "{} = sum({}.{}) by {}",
                self.output_name, self.input_kind, self.input_name, tag_key
            ),
        }
    }
}
