//! Deterministic Simulation Testing for the metrics store
//!
//! Shadow-state harness for `MetricsStore` and the aggregators reading it:
//! - Seeded random heartbeat generation (ChaCha8)
//! - Shadow model of the latest value per identity
//! - Invariant checking after each operation, including aggregate sums
//! - Seed-based reproducibility for debugging

use super::aggregator::Aggregator;
use super::store::MetricsStore;
use super::types::{InstanceKind, Metric, MetricKind, MetricValue, TagSet};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::Arc;

const TAG_KEY: &str = "UFS";

/// Configuration for store DST
#[derive(Debug, Clone)]
pub struct StoreDSTConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Number of distinct reporting sources
    pub num_sources: usize,
    /// Number of distinct metric names
    pub num_names: usize,
    /// Number of distinct tag values
    pub num_tag_values: usize,
    /// Probability that an upsert carries a tag
    pub tagged_prob: f64,
    /// Probability of clearing the whole store
    pub clear_prob: f64,
}

impl Default for StoreDSTConfig {
    fn default() -> Self {
        StoreDSTConfig {
            seed: 0,
            num_sources: 20,
            num_names: 5,
            num_tag_values: 4,
            tagged_prob: 0.5,
            clear_prob: 0.01,
        }
    }
}

impl StoreDSTConfig {
    pub fn new(seed: u64) -> Self {
        StoreDSTConfig {
            seed,
            ..Default::default()
        }
    }

    /// Few identities, so most upserts overwrite
    pub fn hot_identities(seed: u64) -> Self {
        StoreDSTConfig {
            seed,
            num_sources: 3,
            num_names: 2,
            num_tag_values: 2,
            tagged_prob: 0.5,
            clear_prob: 0.0,
        }
    }

    /// Many sources and tag values, rarely cleared
    pub fn wide(seed: u64) -> Self {
        StoreDSTConfig {
            seed,
            num_sources: 200,
            num_names: 10,
            num_tag_values: 16,
            tagged_prob: 0.7,
            clear_prob: 0.002,
        }
    }
}

/// Operation type for logging
#[derive(Debug, Clone)]
pub enum StoreOp {
    Upsert { identity: String, value: i64 },
    Clear,
}

/// Result of a store DST run
#[derive(Debug, Clone)]
pub struct StoreDSTResult {
    pub seed: u64,
    pub total_operations: u64,
    pub inserts: u64,
    pub overwrites: u64,
    pub clears: u64,
    pub invariant_violations: Vec<String>,
    pub last_op: Option<StoreOp>,
}

impl StoreDSTResult {
    pub fn new(seed: u64) -> Self {
        StoreDSTResult {
            seed,
            total_operations: 0,
            inserts: 0,
            overwrites: 0,
            clears: 0,
            invariant_violations: Vec::new(),
            last_op: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Seed {}: {} ops (inserts:{}, overwrites:{}, clears:{}), {} violations",
            self.seed,
            self.total_operations,
            self.inserts,
            self.overwrites,
            self.clears,
            self.invariant_violations.len()
        )
    }
}

/// DST harness for MetricsStore
pub struct StoreDSTHarness {
    config: StoreDSTConfig,
    rng: ChaCha8Rng,
    store: Arc<MetricsStore>,
    result: StoreDSTResult,
    /// Latest value per identity
    expected: BTreeMap<String, i64>,
}

impl StoreDSTHarness {
    pub fn new(config: StoreDSTConfig) -> Self {
        StoreDSTHarness {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            result: StoreDSTResult::new(config.seed),
            config,
            store: Arc::new(MetricsStore::new()),
            expected: BTreeMap::new(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(StoreDSTConfig::new(seed))
    }

    fn name(idx: usize) -> String {
        format!("metric{}", idx)
    }

    fn random_metric(&mut self) -> Option<Metric> {
        let name = Self::name(self.rng.gen_range(0..self.config.num_names));
        let source = format!("10_0_0_{}", self.rng.gen_range(0..self.config.num_sources));
        let tags = if self.rng.gen_bool(self.config.tagged_prob) {
            let value = format!("fs{}", self.rng.gen_range(0..self.config.num_tag_values));
            TagSet::empty().with_tag(TAG_KEY, value)
        } else {
            TagSet::empty()
        };
        let value = self.rng.gen_range(0..1_000_000i64);
        Metric::new(InstanceKind::Worker, name, source, tags, MetricKind::Counter, value).ok()
    }

    fn run_single_op(&mut self) {
        if self.rng.gen_bool(self.config.clear_prob) {
            self.result.last_op = Some(StoreOp::Clear);
            self.store.clear();
            self.expected.clear();
            self.result.clears += 1;
        } else {
            let Some(metric) = self.random_metric() else {
                self.result
                    .invariant_violations
                    .push("Generator produced an invalid metric".to_string());
                return;
            };
            let identity = metric.full_name();
            let value = metric.value().as_i64();
            self.result.last_op = Some(StoreOp::Upsert {
                identity: identity.clone(),
                value,
            });

            let existed = self.expected.insert(identity, value).is_some();
            let replaced = self.store.upsert(metric).is_some();

            if replaced {
                self.result.overwrites += 1;
            } else {
                self.result.inserts += 1;
            }

            if existed != replaced {
                self.result.invariant_violations.push(format!(
                    "Upsert mismatch: expected existed={}, actual replaced={}",
                    existed, replaced
                ));
            }
        }

        self.result.total_operations += 1;

        if let Err(violation) = self.check_invariants() {
            self.result.invariant_violations.push(format!(
                "Op #{}: {:?} - {}",
                self.result.total_operations, self.result.last_op, violation
            ));
        }
    }

    fn check_invariants(&self) -> Result<(), String> {
        // Invariant 1: one entry per identity
        if self.store.len() != self.expected.len() {
            return Err(format!(
                "Length mismatch: actual={}, expected={}",
                self.store.len(),
                self.expected.len()
            ));
        }

        // Invariant 2: identities match the shadow exactly
        let identities = self.store.identities();
        if !identities.iter().eq(self.expected.keys()) {
            return Err(format!(
                "Identity mismatch: actual={:?}, expected={:?}",
                identities,
                self.expected.keys().collect::<Vec<_>>()
            ));
        }

        // Invariant 3: last write wins
        for (identity, value) in &self.expected {
            let stored = self
                .store
                .get(identity)
                .map_err(|e| format!("Stored identity '{}' failed to decode: {}", identity, e))?;
            match stored {
                Some(metric) if metric.value() == MetricValue::Integer(*value) => {}
                other => {
                    return Err(format!(
                        "Value mismatch for '{}': actual={:?}, expected={}",
                        identity,
                        other.map(|m| m.value()),
                        value
                    ))
                }
            }
        }

        // Invariant 4: aggregates equal shadow sums
        for idx in 0..self.config.num_names {
            let name = Self::name(idx);
            let prefix = format!("worker.{}.", name);
            let expected_sum: i64 = self
                .expected
                .iter()
                .filter(|(identity, _)| identity.starts_with(&prefix))
                .map(|(_, v)| *v)
                .sum();
            let sum = Aggregator::sum(name.as_str(), InstanceKind::Worker, name.as_str())
                .map_err(|e| e.to_string())?;
            let actual = sum.compute(&self.store, None);
            if actual != MetricValue::Integer(expected_sum) {
                return Err(format!(
                    "Sum mismatch for '{}': actual={}, expected={}",
                    name, actual, expected_sum
                ));
            }

            let by_tag = Aggregator::single_tag_value(
                name.as_str(),
                InstanceKind::Worker,
                name.as_str(),
                TAG_KEY,
            )
            .map_err(|e| e.to_string())?;
            for tag_value in by_tag.tag_values(&self.store) {
                let suffix = format!(".{}:{}", TAG_KEY, tag_value);
                let expected_tag_sum: i64 = self
                    .expected
                    .iter()
                    .filter(|(identity, _)| identity.starts_with(&prefix) && identity.ends_with(&suffix))
                    .map(|(_, v)| *v)
                    .sum();
                let actual = by_tag.compute(&self.store, Some(&tag_value));
                if actual != MetricValue::Integer(expected_tag_sum) {
                    return Err(format!(
                        "Tag sum mismatch for '{}' {}={}: actual={}, expected={}",
                        name, TAG_KEY, tag_value, actual, expected_tag_sum
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn run(&mut self, operations: usize) {
        for _ in 0..operations {
            self.run_single_op();
            if !self.result.invariant_violations.is_empty() {
                break;
            }
        }
    }

    pub fn result(&self) -> &StoreDSTResult {
        &self.result
    }

    pub fn store(&self) -> &Arc<MetricsStore> {
        &self.store
    }
}

/// Run a batch of DST tests
pub fn run_store_batch(
    start_seed: u64,
    num_seeds: usize,
    ops_per_seed: usize,
    config_fn: fn(u64) -> StoreDSTConfig,
) -> Vec<StoreDSTResult> {
    (0..num_seeds)
        .map(|i| {
            let seed = start_seed + i as u64;
            let mut harness = StoreDSTHarness::new(config_fn(seed));
            harness.run(ops_per_seed);
            harness.result().clone()
        })
        .collect()
}

/// Summarize batch results
pub fn summarize_store_batch(results: &[StoreDSTResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.is_success()).count();
    let failed = total - passed;
    let total_ops: u64 = results.iter().map(|r| r.total_operations).sum();

    let mut summary = format!(
        "Store DST Summary\n\
         =================\n\
         Seeds: {} total, {} passed, {} failed\n\
         Total operations: {}\n",
        total, passed, failed, total_ops
    );

    if failed > 0 {
        summary.push_str("\nFailed seeds:\n");
        for result in results.iter().filter(|r| !r.is_success()) {
            summary.push_str(&format!("  Seed {}: {}\n", result.seed, result.summary()));
            for violation in &result.invariant_violations {
                summary.push_str(&format!("    - {}\n", violation));
            }
        }
    }

    summary
}
