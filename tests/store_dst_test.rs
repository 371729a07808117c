//! Metrics Store Deterministic Simulation Tests
//!
//! VOPR-style tests for MetricsStore with multiple seeds, plus threaded stress
//! tests for concurrent heartbeats against the master.

use cluster_metrics::metrics::{
    run_store_batch, summarize_store_batch, Aggregator, InstanceKind, Metric, MetricKind,
    MetricValue, MetricsMaster, MetricsMasterConfig, MetricsStore, ReportedMetric,
    StoreDSTConfig, StoreDSTHarness, TagSet,
};
use cluster_metrics::{ManualClock, ManualHeartbeat};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

// =============================================================================
// Standard Configuration Tests - 100 Seeds
// =============================================================================

#[test]
fn test_store_dst_100_seeds_standard() {
    let results = run_store_batch(0, 100, 300, StoreDSTConfig::new);
    let summary = summarize_store_batch(&results);
    println!("{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, 100, "All 100 seeds should pass with standard config");
}

#[test]
fn test_store_dst_100_seeds_hot_identities() {
    let results = run_store_batch(1000, 100, 300, StoreDSTConfig::hot_identities);
    let summary = summarize_store_batch(&results);
    println!("{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, 100, "All 100 seeds should pass with hot identities");
}

#[test]
fn test_store_dst_50_seeds_wide() {
    let results = run_store_batch(2000, 50, 300, StoreDSTConfig::wide);
    let summary = summarize_store_batch(&results);
    println!("{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, 50, "All 50 seeds should pass with wide config");
}

#[test]
fn test_store_dst_stress_2000_ops() {
    let mut harness = StoreDSTHarness::with_seed(42);
    harness.run(2000);
    let result = harness.result();
    println!("{}", result.summary());
    assert!(result.is_success());
}

// =============================================================================
// Concurrency Stress Tests
// =============================================================================

fn worker_metric(name: &str, value: i64) -> ReportedMetric {
    Metric::new(
        InstanceKind::Worker,
        name,
        "unset",
        TagSet::empty(),
        MetricKind::Counter,
        value,
    )
    .unwrap()
    .into()
}

#[test]
fn test_concurrent_distinct_sources_no_lost_updates() {
    const THREADS: usize = 8;
    const SOURCES_PER_THREAD: usize = 50;

    let master = Arc::new(
        MetricsMaster::new(
            MetricsMasterConfig::test(),
            Arc::new(ManualHeartbeat::new()),
            Arc::new(ManualClock::new(0)),
        )
        .unwrap(),
    );
    master
        .add_aggregator(Aggregator::sum("metricA", InstanceKind::Worker, "metricA").unwrap())
        .unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let master = Arc::clone(&master);
            thread::spawn(move || {
                for s in 0..SOURCES_PER_THREAD {
                    let source = format!("worker-{}-{}", t, s);
                    let report = master.worker_heartbeat(&source, vec![worker_metric("metricA", 1)]);
                    assert_eq!(report.accepted, 1);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let total = (THREADS * SOURCES_PER_THREAD) as i64;
    assert_eq!(master.store().len(), THREADS * SOURCES_PER_THREAD);
    assert_eq!(master.gauge_value("metricA"), Ok(MetricValue::Integer(total)));
    assert_eq!(master.reporting_sources().len(), THREADS * SOURCES_PER_THREAD);
}

#[test]
fn test_concurrent_same_identity_settles_to_one_write() {
    const THREADS: i64 = 8;
    const WRITES: i64 = 500;

    let store = Arc::new(MetricsStore::new());
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..WRITES {
                    // Every value written by thread t is congruent to t mod THREADS
                    let value = i * THREADS + t;
                    let metric =
                        Metric::from_full_name("worker.metricA.w1", value, MetricKind::Gauge)
                            .unwrap();
                    store.upsert(metric);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.len(), 1);
    let last = store.get("worker.metricA.w1").unwrap().unwrap();
    let value = last.value().as_i64();
    // The survivor is one thread's final write, never a mix
    assert!((WRITES - 1) * THREADS <= value && value < WRITES * THREADS);
}

#[test]
fn test_reads_during_writes_see_valid_states() {
    let store = Arc::new(MetricsStore::new());
    let done = Arc::new(AtomicBool::new(false));
    let sum = Arc::new(Aggregator::sum("metricA", InstanceKind::Worker, "metricA").unwrap());

    // Each source only ever holds 0 or 100, so any valid sum is 0, 100 or 200
    let writer = {
        let store = Arc::clone(&store);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for i in 0..5_000 {
                let value = if i % 2 == 0 { 100 } else { 0 };
                for source in ["w1", "w2"] {
                    let name = format!("worker.metricA.{}", source);
                    store.upsert(Metric::from_full_name(&name, value, MetricKind::Gauge).unwrap());
                }
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let reader = {
        let store = Arc::clone(&store);
        let done = Arc::clone(&done);
        let sum = Arc::clone(&sum);
        thread::spawn(move || {
            let mut reads = 0u64;
            while !done.load(Ordering::SeqCst) {
                let value = sum.compute(&store, None).as_i64();
                assert!(
                    value == 0 || value == 100 || value == 200,
                    "torn aggregate: {}",
                    value
                );
                reads += 1;
            }
            reads
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
    assert_eq!(sum.compute(&store, None), MetricValue::Integer(0));
}

#[test]
fn test_sweeps_concurrent_with_heartbeats() {
    const THREADS: usize = 4;
    const ROUNDS: i64 = 200;
    const TAGS: usize = 6;

    let master = Arc::new(
        MetricsMaster::new(
            MetricsMasterConfig::test(),
            Arc::new(ManualHeartbeat::new()),
            Arc::new(ManualClock::new(0)),
        )
        .unwrap(),
    );
    master
        .add_aggregator(
            Aggregator::single_tag_value("metric", InstanceKind::Worker, "metric", "tag").unwrap(),
        )
        .unwrap();
    let done = Arc::new(AtomicBool::new(false));

    // Each source reports round + 1 for every tag, so a tag gauge never exceeds THREADS * ROUNDS
    let writers: Vec<_> = (0..THREADS)
        .map(|t| {
            let master = Arc::clone(&master);
            thread::spawn(move || {
                let source = format!("worker-{}", t);
                for round in 0..ROUNDS {
                    let batch: Vec<ReportedMetric> = (0..TAGS)
                        .map(|tag| {
                            Metric::new(
                                InstanceKind::Worker,
                                "metric",
                                "unset",
                                TagSet::empty().with_tag("tag", format!("v{}", tag)),
                                MetricKind::Counter,
                                round + 1,
                            )
                            .unwrap()
                            .into()
                        })
                        .collect();
                    let report = master.worker_heartbeat(&source, batch);
                    assert_eq!(report.accepted, TAGS);
                }
            })
        })
        .collect();

    let sweeper = {
        let master = Arc::clone(&master);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut registered = 0;
            while !done.load(Ordering::SeqCst) {
                registered += master.update_cluster_metrics().gauges_registered;
                for (name, value) in master.gauge_values() {
                    let value = value.as_i64();
                    assert!(
                        (0..=THREADS as i64 * ROUNDS).contains(&value),
                        "{} out of range: {}",
                        name,
                        value
                    );
                }
            }
            registered
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    done.store(true, Ordering::SeqCst);
    let mut registered = sweeper.join().unwrap();
    registered += master.update_cluster_metrics().gauges_registered;

    // Every tag gauge was exposed exactly once, whichever sweep found it
    assert_eq!(registered, TAGS);
    assert_eq!(master.gauge_names().len(), TAGS);
    for tag in 0..TAGS {
        assert_eq!(
            master.gauge_value(&format!("metric.tag:v{}", tag)),
            Ok(MetricValue::Integer(THREADS as i64 * ROUNDS))
        );
    }
}
