//! Canonical identity encoding for metrics
//!
//! Identity format: `<instance_kind>.<name>.<source>[.<tag_key>:<tag_value>]*`
//!
//! Examples:
//! - `worker.BytesReadAlluxio.192_1_1_1`
//! - `worker.BytesReadUFS.192_1_1_1.UFS:hdfs`
//! - `client.BytesReadLocal.192_1_1_1:A` (client source is `<host>:<client id>`)
//!
//! Tags are always emitted in key order, so `decode(encode(x)) == x` and two
//! spellings of the same tag set collide on one identity.

use super::error::{MetricsError, Result};
use super::types::{InstanceKind, TagSet};
use std::collections::BTreeMap;

const SEGMENT_SEPARATOR: char = '.';
const TAG_SEPARATOR: char = ':';

/// Encodes and decodes metric identities and gauge names
pub struct MetricKeyEncoder;

impl MetricKeyEncoder {
    /// Encode a full metric identity
    pub fn encode(kind: InstanceKind, name: &str, source: &str, tags: &TagSet) -> String {
        let mut key = format!("{}.{}.{}", kind.as_str(), name, source);
        for (k, v) in tags.iter() {
            key.push(SEGMENT_SEPARATOR);
            key.push_str(k);
            key.push(TAG_SEPARATOR);
            key.push_str(v);
        }
        key
    }

    /// Decode a full metric identity back to components
    ///
    /// Returns: (instance_kind, name, source, tags)
    pub fn decode(key: &str) -> Result<(InstanceKind, String, String, TagSet)> {
        let mut segments = key.split(SEGMENT_SEPARATOR);

        let kind = segments
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| MetricsError::format(format!("empty metric identity '{}'", key)))?
            .parse::<InstanceKind>()?;
        let name = segments
            .next()
            .ok_or_else(|| MetricsError::format(format!("missing name in '{}'", key)))?;
        let source = segments
            .next()
            .ok_or_else(|| MetricsError::format(format!("missing source in '{}'", key)))?;
        Self::validate_name(name)?;
        Self::validate_source(source)?;

        let mut tags = BTreeMap::new();
        for segment in segments {
            let (tag_key, tag_value) = segment.split_once(TAG_SEPARATOR).ok_or_else(|| {
                MetricsError::format(format!("tag '{}' in '{}' is not key:value", segment, key))
            })?;
            Self::validate_tag(tag_key, tag_value)?;
            if tags
                .insert(tag_key.to_string(), tag_value.to_string())
                .is_some()
            {
                return Err(MetricsError::format(format!(
                    "duplicate tag '{}' in '{}'",
                    tag_key, key
                )));
            }
        }

        Ok((kind, name.to_string(), source.to_string(), TagSet::new(tags)))
    }

    /// Gauge name for one tag value of a single-tag aggregator
    ///
    /// Format: `<base_name>.<tag_key>:<tag_value>`
    pub fn gauge_name_with_tag(base_name: &str, tag_key: &str, tag_value: &str) -> String {
        format!("{}.{}:{}", base_name, tag_key, tag_value)
    }

    /// Make a hostname usable as an identity segment (`192.1.1.1` -> `192_1_1_1`)
    pub fn escape_hostname(hostname: &str) -> String {
        hostname.replace(SEGMENT_SEPARATOR, "_")
    }

    /// Source of a worker heartbeat: the worker id itself, never rewritten.
    /// Callers reporting by hostname escape it first with `escape_hostname`.
    pub fn worker_source(worker_id: &str) -> Result<String> {
        Self::validate_source(worker_id)?;
        Ok(worker_id.to_string())
    }

    /// Source of a client heartbeat: `<escaped host>:<client id>`.
    ///
    /// Only the hostname is escaped. The client id is kept verbatim and must
    /// contain neither '.' nor ':', so the source splits back into exactly one
    /// (host, client id) pair at its last ':'.
    pub fn client_source(hostname: &str, client_id: &str) -> Result<String> {
        if hostname.is_empty() {
            return Err(MetricsError::format(format!(
                "client '{}' reported an empty hostname",
                client_id
            )));
        }
        if client_id.is_empty()
            || client_id.contains(SEGMENT_SEPARATOR)
            || client_id.contains(TAG_SEPARATOR)
        {
            return Err(MetricsError::format(format!(
                "client id '{}' must be non-empty and contain no '.' or ':'",
                client_id
            )));
        }
        let source = format!(
            "{}{}{}",
            Self::escape_hostname(hostname),
            TAG_SEPARATOR,
            client_id
        );
        Self::validate_source(&source)?;
        Ok(source)
    }

    pub fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() || name.contains(SEGMENT_SEPARATOR) {
            return Err(MetricsError::format(format!(
                "metric name '{}' must be non-empty and contain no '.'",
                name
            )));
        }
        Ok(())
    }

    pub fn validate_source(source: &str) -> Result<()> {
        if source.is_empty() || source.contains(SEGMENT_SEPARATOR) {
            return Err(MetricsError::format(format!(
                "metric source '{}' must be non-empty and contain no '.'",
                source
            )));
        }
        Ok(())
    }

    pub fn validate_tags(tags: &TagSet) -> Result<()> {
        tags.iter().try_for_each(|(k, v)| Self::validate_tag(k, v))
    }

    pub fn validate_tag(key: &str, value: &str) -> Result<()> {
        if key.is_empty() || key.contains(SEGMENT_SEPARATOR) || key.contains(TAG_SEPARATOR) {
            return Err(MetricsError::format(format!(
                "tag key '{}' must be non-empty and contain no '.' or ':'",
                key
            )));
        }
        if value.is_empty() || value.contains(SEGMENT_SEPARATOR) {
            return Err(MetricsError::format(format!(
                "tag value '{}' for '{}' must be non-empty and contain no '.'",
                value, key
            )));
        }
        Ok(())
    }

    /// Output base names may contain '.', but never ':' so that per-tag gauge
    /// names cannot shadow a fixed gauge
    pub fn validate_output_name(name: &str) -> Result<()> {
        if name.is_empty()
            || name.contains(TAG_SEPARATOR)
            || name.split(SEGMENT_SEPARATOR).any(str::is_empty)
        {
            return Err(MetricsError::configuration(format!(
                "aggregator output name '{}' must be non-empty, contain no ':' and no empty segment",
                name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_without_tags() {
        let key = MetricKeyEncoder::encode(
            InstanceKind::Worker,
            "metricA",
            "192_1_1_1",
            &TagSet::empty(),
        );
        assert_eq!(key, "worker.metricA.192_1_1_1");
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let tags = TagSet::from_pairs(&[("UFS", "hdfs:__nn_9000"), ("tier", "MEM")]);
        let key = MetricKeyEncoder::encode(InstanceKind::Client, "BytesRead", "h1:A", &tags);
        assert_eq!(key, "client.BytesRead.h1:A.UFS:hdfs:__nn_9000.tier:MEM");

        let (kind, name, source, decoded) = MetricKeyEncoder::decode(&key).unwrap();
        assert_eq!(kind, InstanceKind::Client);
        assert_eq!(name, "BytesRead");
        assert_eq!(source, "h1:A");
        assert_eq!(decoded, tags);
    }

    #[test]
    fn test_same_tags_same_key() {
        let tags1 = TagSet::from_pairs(&[("a", "1"), ("b", "2")]);
        let tags2 = TagSet::from_pairs(&[("b", "2"), ("a", "1")]);

        let key1 = MetricKeyEncoder::encode(InstanceKind::Worker, "m", "w", &tags1);
        let key2 = MetricKeyEncoder::encode(InstanceKind::Worker, "m", "w", &tags2);
        assert_eq!(key1, key2);

        // Unsorted input decodes to the same canonical form
        let (_, _, _, decoded) = MetricKeyEncoder::decode("worker.m.w.b:2.a:1").unwrap();
        assert_eq!(
            MetricKeyEncoder::encode(InstanceKind::Worker, "m", "w", &decoded),
            key1
        );
    }

    #[test]
    fn test_different_tags_different_key() {
        let key1 = MetricKeyEncoder::encode(
            InstanceKind::Worker,
            "m",
            "w",
            &TagSet::from_pairs(&[("tag", "v1")]),
        );
        let key2 = MetricKeyEncoder::encode(
            InstanceKind::Worker,
            "m",
            "w",
            &TagSet::from_pairs(&[("tag", "v2")]),
        );
        let key3 = MetricKeyEncoder::encode(InstanceKind::Worker, "m", "w", &TagSet::empty());
        assert_ne!(key1, key2);
        assert_ne!(key1, key3);
    }

    #[test]
    fn test_decode_invalid_identity() {
        let bad = [
            "",
            "worker",
            "worker.metric",
            "worker..source",
            "worker.metric.",
            "storage.metric.source",
            "worker.metric.source.notatag",
            "worker.metric.source.:v",
            "worker.metric.source.k:",
            "worker.metric.source.k:1.k:2",
        ];
        for key in bad {
            assert!(
                matches!(MetricKeyEncoder::decode(key), Err(MetricsError::Format(_))),
                "expected format error for '{}'",
                key
            );
        }
    }

    #[test]
    fn test_gauge_name_with_tag() {
        assert_eq!(
            MetricKeyEncoder::gauge_name_with_tag("metric", "tag", "v1"),
            "metric.tag:v1"
        );
    }

    #[test]
    fn test_sources() {
        assert_eq!(MetricKeyEncoder::worker_source("worker-7").unwrap(), "worker-7");
        assert_eq!(
            MetricKeyEncoder::worker_source(&MetricKeyEncoder::escape_hostname("192.1.1.1")).unwrap(),
            "192_1_1_1"
        );
        assert_eq!(
            MetricKeyEncoder::client_source("192.1.1.1", "A").unwrap(),
            "192_1_1_1:A"
        );
        assert!(MetricKeyEncoder::worker_source("").is_err());
        assert!(MetricKeyEncoder::client_source("host", "").is_err());
        assert!(MetricKeyEncoder::client_source("", "A").is_err());
    }

    #[test]
    fn test_ids_are_never_rewritten() {
        // Rewriting would map distinct ids onto one source
        assert!(matches!(
            MetricKeyEncoder::worker_source("192.1.1.1"),
            Err(MetricsError::Format(_))
        ));
        assert!(matches!(
            MetricKeyEncoder::client_source("host", "app.1"),
            Err(MetricsError::Format(_))
        ));
        assert!(matches!(
            MetricKeyEncoder::client_source("host", "app:1"),
            Err(MetricsError::Format(_))
        ));
        assert_eq!(
            MetricKeyEncoder::client_source("host", "app_1").unwrap(),
            "host:app_1"
        );
    }

    #[test]
    fn test_validate_output_name() {
        assert!(MetricKeyEncoder::validate_output_name("cluster.BytesReadUfs").is_ok());
        assert!(MetricKeyEncoder::validate_output_name("metric").is_ok());
        assert!(matches!(
            MetricKeyEncoder::validate_output_name("metric.tag:v1"),
            Err(MetricsError::Configuration(_))
        ));
        assert!(MetricKeyEncoder::validate_output_name("").is_err());
        assert!(MetricKeyEncoder::validate_output_name("a..b").is_err());
    }
}
