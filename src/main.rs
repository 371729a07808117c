//! Cluster Metrics Master
//!
//! Runs the metrics aggregation core with a timer-driven cluster sweep until
//! Ctrl+C, then logs the final gauge snapshot.
//!
//! ## Usage
//!
//! ```text
//! cluster-metrics-master [CONFIG.toml]
//! ```
//!
//! Without a config path, configuration comes from the environment.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | METRICS_CLUSTER_UPDATE_INTERVAL_MS | 60000 | Cluster sweep interval |
//! | METRICS_DEFAULT_AGGREGATORS | true | Register built-in cluster aggregators |
//! | METRICS_LOG_JSON | unset | `1` for JSON log lines |
//! | RUST_LOG | info | Log filter |

use cluster_metrics::{IntervalHeartbeat, MetricsMaster, MetricsMasterConfig, SystemClock};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("METRICS_LOG_JSON").is_ok_and(|v| v == "1" || v == "true");
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = match std::env::args().nth(1) {
        Some(path) => MetricsMasterConfig::from_file(&path)?,
        None => MetricsMasterConfig::from_env()?,
    };

    let heartbeat = IntervalHeartbeat::new("cluster-metrics-sweep", config.cluster_metrics_interval);
    let master = MetricsMaster::new(config, Arc::new(heartbeat), Arc::new(SystemClock::new()))?;
    master.start()?;

    info!(aggregators = ?master.aggregator_names(), "Waiting for heartbeats, Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    master.update_cluster_metrics();
    for (name, value) in master.gauge_values() {
        info!(gauge = %name, %value, "Final gauge value");
    }
    master.stop()?;

    Ok(())
}
