//! Error kinds for the metrics master
//!
//! None of these are fatal to the service: ingestion reports them per metric,
//! the sweep never produces them, and registration rejects only the offending
//! aggregator.

/// Errors surfaced by the metrics core
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricsError {
    /// A metric identity violates `<kind>.<name>.<source>[.<key>:<value>]*`
    #[error("Malformed metric: {0}")]
    Format(String),

    /// Duplicate aggregator output name or an invalid aggregator definition
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Gauge queried before it was registered
    #[error("Gauge not found: {0}")]
    NotFound(String),

    /// start/stop called out of order, or the scheduler could not start
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),
}

impl MetricsError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        MetricsError::Format(msg.into())
    }

    pub(crate) fn configuration(msg: impl Into<String>) -> Self {
        MetricsError::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, MetricsError>;
