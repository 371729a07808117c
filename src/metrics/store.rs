//! Per-source metric store
//!
//! Holds the latest value of every full metric identity. Entries are grouped
//! into partitions by (instance kind, metric name), which is exactly the unit
//! an aggregator reads, so a snapshot touches one partition and writers to
//! unrelated metrics never contend on the same partition lock.
//!
//! Metrics are stored behind `Arc` and swapped whole under the partition write
//! lock: a reader sees either the previous or the new metric, never a mix.

use super::error::Result;
use super::key_encoder::MetricKeyEncoder;
use super::types::{InstanceKind, Metric};
use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::Arc;

type Partition = RwLock<AHashMap<String, Arc<Metric>>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PartitionKey {
    kind: InstanceKind,
    name: String,
}

impl PartitionKey {
    fn new(kind: InstanceKind, name: &str) -> Self {
        PartitionKey {
            kind,
            name: name.to_string(),
        }
    }
}

/// Concurrent store of the latest metric per full identity
#[derive(Default)]
pub struct MetricsStore {
    partitions: RwLock<AHashMap<PartitionKey, Arc<Partition>>>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `metric`, replacing any entry with the same full identity.
    ///
    /// Returns the replaced metric, if any.
    pub fn upsert(&self, metric: Metric) -> Option<Arc<Metric>> {
        let partition = self.partition_or_create(metric.instance_kind(), metric.name());
        let identity = metric.full_name();
        let previous = partition.write().insert(identity, Arc::new(metric));
        previous
    }

    /// Point-in-time view of all metrics with `kind` and `name`, optionally only
    /// those carrying `tag_key`
    pub fn snapshot(
        &self,
        kind: InstanceKind,
        name: &str,
        tag_key: Option<&str>,
    ) -> Vec<Arc<Metric>> {
        let Some(partition) = self.partition(kind, name) else {
            return Vec::new();
        };
        let entries = partition.read();
        entries
            .values()
            .filter(|m| tag_key.is_none_or(|key| m.tags().contains_key(key)))
            .cloned()
            .collect()
    }

    /// Look up one metric by its canonical identity string
    pub fn get(&self, full_name: &str) -> Result<Option<Arc<Metric>>> {
        let (kind, name, _, _) = MetricKeyEncoder::decode(full_name)?;
        Ok(self
            .partition(kind, &name)
            .and_then(|partition| partition.read().get(full_name).cloned()))
    }

    /// Canonical identities of every stored metric, sorted
    pub fn identities(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .partitions()
            .iter()
            .flat_map(|p| p.read().keys().cloned().collect::<Vec<_>>())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.partitions().iter().map(|p| p.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every stored metric
    pub fn clear(&self) {
        self.partitions.write().clear();
    }

    fn partition(&self, kind: InstanceKind, name: &str) -> Option<Arc<Partition>> {
        self.partitions
            .read()
            .get(&PartitionKey::new(kind, name))
            .cloned()
    }

    fn partition_or_create(&self, kind: InstanceKind, name: &str) -> Arc<Partition> {
        if let Some(partition) = self.partition(kind, name) {
            return partition;
        }
        self.partitions
            .write()
            .entry(PartitionKey::new(kind, name))
            .or_default()
            .clone()
    }

    fn partitions(&self) -> Vec<Arc<Partition>> {
        self.partitions.read().values().cloned().collect()
    }
}
