//! Core metric types for the metrics master

use super::error::{MetricsError, Result};
use super::key_encoder::MetricKeyEncoder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Category of the entity that reported a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceKind {
    /// Cluster-wide aggregate
    Cluster,
    /// The master process itself
    Master,
    /// A storage worker
    Worker,
    /// A client process
    Client,
}

impl InstanceKind {
    pub const ALL: [InstanceKind; 4] = [
        InstanceKind::Cluster,
        InstanceKind::Master,
        InstanceKind::Worker,
        InstanceKind::Client,
    ];

    /// Prefix used in the canonical identity string
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceKind::Cluster => "cluster",
            InstanceKind::Master => "master",
            InstanceKind::Worker => "worker",
            InstanceKind::Client => "client",
        }
    }
}

impl FromStr for InstanceKind {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self> {
        InstanceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| MetricsError::format(format!("unknown instance kind '{}'", s)))
    }
}

impl fmt::Display for InstanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of measurement carried by a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Point-in-time value
    Gauge,
    /// Monotonically increasing count
    Counter,
    /// Duration measurement
    Timer,
    /// Rate measurement
    Meter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
            MetricKind::Timer => "timer",
            MetricKind::Meter => "meter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of tags (key-value pairs) associated with a metric.
/// Tags are kept sorted by key so equal sets encode identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TagSet {
    tags: BTreeMap<String, String>,
}

impl TagSet {
    pub fn new(tags: BTreeMap<String, String>) -> Self {
        TagSet { tags }
    }

    pub fn empty() -> Self {
        TagSet::default()
    }

    /// Create TagSet from slice of (key, value) tuples
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let tags = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self::new(tags)
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.tags.contains_key(key)
    }

    /// Iterate tags in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Numeric value of a metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
}

impl MetricValue {
    pub const ZERO: MetricValue = MetricValue::Integer(0);

    pub fn as_i64(&self) -> i64 {
        match self {
            MetricValue::Integer(i) => *i,
            MetricValue::Float(f) => *f as i64,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Integer(i) => *i as f64,
            MetricValue::Float(f) => *f,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, MetricValue::Integer(_))
    }
}

impl Default for MetricValue {
    fn default() -> Self {
        MetricValue::ZERO
    }
}

/// Integers add saturating; any float operand makes the result a float.
impl std::ops::Add for MetricValue {
    type Output = MetricValue;

    fn add(self, rhs: MetricValue) -> MetricValue {
        match (self, rhs) {
            (MetricValue::Integer(a), MetricValue::Integer(b)) => {
                MetricValue::Integer(a.saturating_add(b))
            }
            (a, b) => MetricValue::Float(a.as_f64() + b.as_f64()),
        }
    }
}

impl std::iter::Sum for MetricValue {
    fn sum<I: Iterator<Item = MetricValue>>(iter: I) -> MetricValue {
        iter.fold(MetricValue::ZERO, |acc, v| acc + v)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Integer(i) => write!(f, "{}", i),
            MetricValue::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Integer(v)
    }
}

impl From<i32> for MetricValue {
    fn from(v: i32) -> Self {
        MetricValue::Integer(v as i64)
    }
}

impl From<u32> for MetricValue {
    fn from(v: u32) -> Self {
        MetricValue::Integer(v as i64)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

/// One measurement reported by one source.
///
/// Immutable once built: every constructor validates the identity grammar, and
/// the store only ever replaces whole metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    instance_kind: InstanceKind,
    name: String,
    source: String,
    tags: TagSet,
    kind: MetricKind,
    value: MetricValue,
}

impl Metric {
    /// Build a metric from structured parts, validating each identity component
    pub fn new(
        instance_kind: InstanceKind,
        name: impl Into<String>,
        source: impl Into<String>,
        tags: TagSet,
        kind: MetricKind,
        value: impl Into<MetricValue>,
    ) -> Result<Self> {
        let name = name.into();
        let source = source.into();
        MetricKeyEncoder::validate_name(&name)?;
        MetricKeyEncoder::validate_source(&source)?;
        MetricKeyEncoder::validate_tags(&tags)?;
        Ok(Metric {
            instance_kind,
            name,
            source,
            tags,
            kind,
            value: value.into(),
        })
    }

    /// Build a metric from its canonical identity string, e.g.
    /// `worker.BytesReadUFS.192_1_1_1.UFS:hdfs`
    pub fn from_full_name(
        full_name: &str,
        value: impl Into<MetricValue>,
        kind: MetricKind,
    ) -> Result<Self> {
        let (instance_kind, name, source, tags) = MetricKeyEncoder::decode(full_name)?;
        Ok(Metric {
            instance_kind,
            name,
            source,
            tags,
            kind,
            value: value.into(),
        })
    }

    /// Canonical identity string; equal identities always encode equally
    pub fn full_name(&self) -> String {
        MetricKeyEncoder::encode(self.instance_kind, &self.name, &self.source, &self.tags)
    }

    /// Same measurement attributed to a different source
    pub fn with_source(self, source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        MetricKeyEncoder::validate_source(&source)?;
        Ok(Metric { source, ..self })
    }

    pub fn instance_kind(&self) -> InstanceKind {
        self.instance_kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key)
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn value(&self) -> MetricValue {
        self.value
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} ({})", self.full_name(), self.value, self.kind)
    }
}
