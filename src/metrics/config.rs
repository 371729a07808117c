//! Configuration for the metrics master
//!
//! Loaded from a TOML file, from a TOML string, or from environment variables:
//!
//! - `METRICS_CLUSTER_UPDATE_INTERVAL_MS`: sweep interval in milliseconds
//! - `METRICS_DEFAULT_AGGREGATORS`: register the built-in cluster aggregators
//!   (`true`/`1` or `false`/`0`, default true). Other values are an error.
//!
//! Example file:
//!
//! ```toml
//! cluster_metrics_interval_ms = 30000
//! register_default_aggregators = false
//!
//! [[aggregators]]
//! strategy = "sum"
//! output = "cluster.BytesReadAlluxio"
//! instance_kind = "worker"
//! input = "BytesReadAlluxio"
//!
//! [[aggregators]]
//! strategy = "single_tag_value"
//! output = "cluster.BytesReadUfs"
//! instance_kind = "worker"
//! input = "BytesReadUFS"
//! tag_key = "UFS"
//! ```

use super::aggregator::Aggregator;
use super::error::{MetricsError, Result};
use super::types::InstanceKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for the metrics master
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsMasterConfig {
    /// Cluster metrics sweep interval (default: 60s)
    #[serde(rename = "cluster_metrics_interval_ms", with = "duration_millis")]
    pub cluster_metrics_interval: Duration,
    /// Register the built-in cluster aggregators on construction
    pub register_default_aggregators: bool,
    /// Additional aggregators to register on construction
    pub aggregators: Vec<AggregatorConfig>,
}

impl Default for MetricsMasterConfig {
    fn default() -> Self {
        MetricsMasterConfig {
            cluster_metrics_interval: Duration::from_secs(60),
            register_default_aggregators: true,
            aggregators: Vec::new(),
        }
    }
}

impl MetricsMasterConfig {
    /// Config for testing: no built-in aggregators, fast sweep
    pub fn test() -> Self {
        MetricsMasterConfig {
            cluster_metrics_interval: Duration::from_millis(10),
            register_default_aggregators: false,
            aggregators: Vec::new(),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| MetricsError::configuration(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            MetricsError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(ms) = lookup("METRICS_CLUSTER_UPDATE_INTERVAL_MS") {
            let ms: u64 = ms.trim().parse().map_err(|_| {
                MetricsError::configuration(format!(
                    "METRICS_CLUSTER_UPDATE_INTERVAL_MS must be milliseconds, got '{}'",
                    ms
                ))
            })?;
            config.cluster_metrics_interval = Duration::from_millis(ms);
        }
        if let Some(flag) = lookup("METRICS_DEFAULT_AGGREGATORS") {
            config.register_default_aggregators =
                parse_flag("METRICS_DEFAULT_AGGREGATORS", &flag)?;
        }
        Ok(config)
    }

    /// Every aggregator this config asks for, built-ins first
    pub fn build_aggregators(&self) -> Result<Vec<Aggregator>> {
        let defaults = if self.register_default_aggregators {
            AggregatorConfig::defaults()
        } else {
            Vec::new()
        };
        defaults
            .iter()
            .chain(self.aggregators.iter())
            .map(AggregatorConfig::build)
            .collect()
    }
}

/// `true`/`1` or `false`/`0`, case-insensitive. Anything else is rejected.
fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(MetricsError::configuration(format!(
            "{} must be true/false or 1/0, got '{}'",
            name, value
        ))),
    }
}

/// Declarative aggregator definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum AggregatorConfig {
    Sum {
        output: String,
        instance_kind: InstanceKind,
        input: String,
    },
    SingleTagValue {
        output: String,
        instance_kind: InstanceKind,
        input: String,
        tag_key: String,
    },
}

impl AggregatorConfig {
    pub fn build(&self) -> Result<Aggregator> {
        match self {
            AggregatorConfig::Sum {
                output,
                instance_kind,
                input,
            } => Aggregator::sum(output.as_str(), *instance_kind, input.as_str()),
            AggregatorConfig::SingleTagValue {
                output,
                instance_kind,
                input,
                tag_key,
            } => Aggregator::single_tag_value(
                output.as_str(),
                *instance_kind,
                input.as_str(),
                tag_key.as_str(),
            ),
        }
    }

    /// Built-in cluster aggregators
    pub fn defaults() -> Vec<AggregatorConfig> {
        let sum = |output: &str, kind: InstanceKind, input: &str| AggregatorConfig::Sum {
            output: output.to_string(),
            instance_kind: kind,
            input: input.to_string(),
        };
        let by_ufs = |output: &str, input: &str| AggregatorConfig::SingleTagValue {
            output: output.to_string(),
            instance_kind: InstanceKind::Worker,
            input: input.to_string(),
            tag_key: "UFS".to_string(),
        };
        vec![
            sum("cluster.BytesReadAlluxio", InstanceKind::Worker, "BytesReadAlluxio"),
            sum("cluster.BytesWrittenAlluxio", InstanceKind::Worker, "BytesWrittenAlluxio"),
            sum("cluster.BytesReadLocal", InstanceKind::Client, "BytesReadLocal"),
            by_ufs("cluster.BytesReadUfs", "BytesReadUFS"),
            by_ufs("cluster.BytesWrittenUfs", "BytesWrittenUFS"),
        ]
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::aggregator::AggregationStrategy;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = MetricsMasterConfig::default();
        assert_eq!(config.cluster_metrics_interval, Duration::from_secs(60));
        assert!(config.register_default_aggregators);
        assert_eq!(config.build_aggregators().unwrap().len(), 5);
    }

    #[test]
    fn test_test_config_has_no_aggregators() {
        let config = MetricsMasterConfig::test();
        assert!(config.build_aggregators().unwrap().is_empty());
    }

    #[test]
    fn test_parse_toml() {
        let config = MetricsMasterConfig::from_toml_str(
            r#"
            cluster_metrics_interval_ms = 30000
            register_default_aggregators = false

            [[aggregators]]
            strategy = "sum"
            output = "metricA"
            instance_kind = "worker"
            input = "metricA"

            [[aggregators]]
            strategy = "single_tag_value"
            output = "metric"
            instance_kind = "client"
            input = "metric"
            tag_key = "tag"
            "#,
        )
        .unwrap();

        assert_eq!(config.cluster_metrics_interval, Duration::from_secs(30));
        let aggregators = config.build_aggregators().unwrap();
        assert_eq!(aggregators.len(), 2);
        assert_eq!(aggregators[0].strategy(), &AggregationStrategy::Sum);
        assert_eq!(aggregators[1].input_kind(), InstanceKind::Client);
        assert_eq!(
            aggregators[1].strategy(),
            &AggregationStrategy::SingleTagValue {
                tag_key: "tag".to_string()
            }
        );
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
    }

    #[test]
    fn test_from_vars() {
        let config = MetricsMasterConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(config, MetricsMasterConfig::default());

        let config = MetricsMasterConfig::from_vars(vars(&[
            ("METRICS_CLUSTER_UPDATE_INTERVAL_MS", "250"),
            ("METRICS_DEFAULT_AGGREGATORS", "FALSE"),
        ]))
        .unwrap();
        assert_eq!(config.cluster_metrics_interval, Duration::from_millis(250));
        assert!(!config.register_default_aggregators);

        let config =
            MetricsMasterConfig::from_vars(vars(&[("METRICS_DEFAULT_AGGREGATORS", "1")])).unwrap();
        assert!(config.register_default_aggregators);
    }

    #[test]
    fn test_unknown_flag_value_rejected() {
        for value in ["yes", "off", "", "2"] {
            let result =
                MetricsMasterConfig::from_vars(vars(&[("METRICS_DEFAULT_AGGREGATORS", value)]));
            assert!(
                matches!(result, Err(MetricsError::Configuration(_))),
                "'{}' should be rejected",
                value
            );
        }

        let result = MetricsMasterConfig::from_vars(vars(&[(
            "METRICS_CLUSTER_UPDATE_INTERVAL_MS",
            "soon",
        )]));
        assert!(matches!(result, Err(MetricsError::Configuration(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = MetricsMasterConfig::from_toml_str("register_default_aggregators = false")
            .unwrap();
        assert_eq!(config.cluster_metrics_interval, Duration::from_secs(60));
        assert!(config.aggregators.is_empty());
    }

    #[test]
    fn test_invalid_toml() {
        let result = MetricsMasterConfig::from_toml_str("cluster_metrics_interval_ms = \"soon\"");
        assert!(matches!(result, Err(MetricsError::Configuration(_))));

        let unknown_kind = MetricsMasterConfig::from_toml_str(
            r#"
            [[aggregators]]
            strategy = "sum"
            output = "x"
            instance_kind = "storage"
            input = "x"
            "#,
        );
        assert!(unknown_kind.is_err());
    }

    #[test]
    fn test_invalid_aggregator_definition() {
        let config = MetricsMasterConfig {
            aggregators: vec![AggregatorConfig::Sum {
                output: "bad:name".to_string(),
                instance_kind: InstanceKind::Worker,
                input: "m".to_string(),
            }],
            ..MetricsMasterConfig::test()
        };
        assert!(matches!(
            config.build_aggregators(),
            Err(MetricsError::Configuration(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cluster_metrics_interval_ms = 1500").unwrap();
        let config = MetricsMasterConfig::from_file(file.path()).unwrap();
        assert_eq!(config.cluster_metrics_interval, Duration::from_millis(1500));

        assert!(MetricsMasterConfig::from_file("/nonexistent/metrics.toml").is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = MetricsMasterConfig {
            aggregators: AggregatorConfig::defaults(),
            ..MetricsMasterConfig::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert_eq!(MetricsMasterConfig::from_toml_str(&text).unwrap(), config);
    }
}
