//! Lifecycle tests: create, start, record, stop, abort, status
//!
//! Toyota Way: Jidoka (a harmful regression stops the line)

use std::sync::Arc;

use optimization_lab::analysis::Significance;
use optimization_lab::engine::{reasons, ExperimentEngine, StatusView};
use optimization_lab::experiment::{
    Condition, ExperimentDesign, ExperimentDesignBuilder, ExperimentKind, ExperimentStatus,
    Metric, Outcome,
};
use optimization_lab::Error;

fn ab_design(sample_size: usize) -> ExperimentDesignBuilder {
    ExperimentDesign::builder("connection pool size", ExperimentKind::AbTest)
        .condition(Condition::new("control", "pool 16"))
        .condition(Condition::new("treatment", "pool 64"))
        .metric(Metric::new("throughput", "req/s"))
        .metric(Metric::new("p99_latency", "ms"))
        .primary_metric("throughput")
        .sample_size_per_condition(sample_size)
}

fn started(engine: &ExperimentEngine, builder: ExperimentDesignBuilder) -> String {
    let design = engine.create_design(builder).unwrap();
    engine.start(design.experiment_id()).unwrap();
    design.experiment_id().to_string()
}

// ============================================================================
// Start and status
// ============================================================================

#[test]
fn test_start_then_status_shows_zero_samples() {
    let engine = ExperimentEngine::in_memory();
    let id = started(&engine, ab_design(100));

    let StatusView::Running(status) = engine.get_status(&id).unwrap() else {
        panic!("expected a running status");
    };
    assert_eq!(status.status, ExperimentStatus::Running);
    assert_eq!(status.total_samples, 0);
    assert_eq!(status.sample_counts.len(), 2);
    assert!(status.sample_counts.values().all(|c| *c == 0));
    assert_eq!(status.target_samples, 200);
}

#[test]
fn test_start_unknown_design_is_not_found() {
    let engine = ExperimentEngine::in_memory();
    assert!(engine.start("exp_missing").unwrap_err().is_not_found());
}

#[test]
fn test_start_twice_is_already_running() {
    let engine = ExperimentEngine::in_memory();
    let id = started(&engine, ab_design(100));
    assert!(matches!(engine.start(&id), Err(Error::AlreadyRunning(_))));
}

#[test]
fn test_completed_experiment_cannot_restart() {
    let engine = ExperimentEngine::in_memory();
    let id = started(&engine, ab_design(100).early_stopping(false));
    engine.record_measurement(&id, "control", "throughput", 100.0);
    engine.record_measurement(&id, "treatment", "throughput", 110.0);
    engine.stop(&id, reasons::MANUAL_STOP).unwrap();

    assert!(engine.start(&id).unwrap_err().is_validation());
}

#[test]
fn test_status_of_designed_experiment_is_not_found() {
    let engine = ExperimentEngine::in_memory();
    let design = engine.create_design(ab_design(100)).unwrap();
    assert!(engine
        .get_status(design.experiment_id())
        .unwrap_err()
        .is_not_found());
}

// ============================================================================
// Recording
// ============================================================================

#[test]
fn test_counts_track_every_measurement() {
    let engine = ExperimentEngine::in_memory();
    let id = started(&engine, ab_design(100).early_stopping(false));

    for i in 0..7 {
        assert!(engine.record_measurement(&id, "control", "throughput", 100.0 + f64::from(i)));
    }
    for i in 0..5 {
        assert!(engine.record_measurement(&id, "treatment", "p99_latency", 12.0 + f64::from(i)));
    }

    let status = engine.get_status(&id).unwrap();
    assert_eq!(status.total_samples(), 12);
    let StatusView::Running(running) = status else {
        panic!("expected a running status");
    };
    assert_eq!(running.sample_counts["control"], 7);
    assert_eq!(running.sample_counts["treatment"], 5);
    assert_eq!(running.sample_counts.values().sum::<usize>(), 12);
}

#[test]
fn test_record_on_non_running_returns_false() {
    let engine = ExperimentEngine::in_memory();
    assert!(!engine.record_measurement("exp_missing", "control", "throughput", 1.0));

    let design = engine.create_design(ab_design(100)).unwrap();
    assert!(!engine.record_measurement(design.experiment_id(), "control", "throughput", 1.0));
}

#[test]
fn test_record_rejects_unknown_condition_and_non_finite() {
    let engine = ExperimentEngine::in_memory();
    let id = started(&engine, ab_design(100));

    assert!(!engine.record_measurement(&id, "ghost", "throughput", 1.0));
    assert!(!engine.record_measurement(&id, "control", "throughput", f64::NAN));
    assert!(!engine.record_measurement(&id, "control", "throughput", f64::INFINITY));
    assert_eq!(engine.get_status(&id).unwrap().total_samples(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_recording_loses_nothing() {
    let engine = ExperimentEngine::in_memory();
    let id = started(&engine, ab_design(1_000).early_stopping(false));

    let mut tasks = Vec::new();
    for worker in 0..8_u32 {
        let engine = engine.clone();
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            let condition = if worker % 2 == 0 { "control" } else { "treatment" };
            for i in 0..50_u32 {
                assert!(engine.record_measurement(
                    &id,
                    condition,
                    "throughput",
                    f64::from(worker * 100 + i)
                ));
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let StatusView::Running(status) = engine.get_status(&id).unwrap() else {
        panic!("expected a running status");
    };
    assert_eq!(status.total_samples, 400);
    assert_eq!(status.sample_counts["control"], 200);
    assert_eq!(status.sample_counts["treatment"], 200);

    let results = engine.stop(&id, reasons::MANUAL_STOP).unwrap();
    assert_eq!(results.total_samples, 400);
    engine.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_racing_recorders_freezes_data() {
    let engine = ExperimentEngine::in_memory();
    let id = started(&engine, ab_design(1_000).early_stopping(false));
    engine.record_measurement(&id, "control", "throughput", 100.0);
    engine.record_measurement(&id, "treatment", "throughput", 101.0);

    let accepted = Arc::new(std::sync::atomic::AtomicUsize::new(2));
    let mut tasks = Vec::new();
    for worker in 0..4 {
        let engine = engine.clone();
        let id = id.clone();
        let accepted = Arc::clone(&accepted);
        tasks.push(tokio::task::spawn_blocking(move || {
            let condition = if worker % 2 == 0 { "control" } else { "treatment" };
            for i in 0..200_u32 {
                if engine.record_measurement(&id, condition, "throughput", f64::from(i)) {
                    accepted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                }
            }
        }));
    }
    let results = engine.stop(&id, reasons::MANUAL_STOP).unwrap();
    for task in tasks {
        task.await.unwrap();
    }

    // Everything accepted before the freeze is in the results; nothing after it.
    assert_eq!(
        results.total_samples,
        accepted.load(std::sync::atomic::Ordering::SeqCst)
    );
    engine.shutdown();
}

// ============================================================================
// Stop and abort
// ============================================================================

#[test]
fn test_stop_twice_is_not_found() {
    let engine = ExperimentEngine::in_memory();
    let id = started(&engine, ab_design(100).early_stopping(false));
    engine.record_measurement(&id, "control", "throughput", 100.0);
    engine.record_measurement(&id, "treatment", "throughput", 90.0);

    engine.stop(&id, reasons::MANUAL_STOP).unwrap();
    assert!(engine
        .stop(&id, reasons::MANUAL_STOP)
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_start_during_stop_never_restarts() {
    let engine = ExperimentEngine::in_memory();
    let mut restarted = 0;

    for _ in 0..300 {
        let id = started(&engine, ab_design(100).early_stopping(false));
        engine.record_measurement(&id, "control", "throughput", 100.0);
        engine.record_measurement(&id, "treatment", "throughput", 110.0);

        std::thread::scope(|s| {
            let stopper = s.spawn(|| engine.stop(&id, reasons::MANUAL_STOP));
            loop {
                match engine.start(&id) {
                    Ok(_) => {
                        restarted += 1;
                        break;
                    }
                    Err(Error::AlreadyRunning(_)) => {}
                    Err(e) => {
                        assert!(e.is_validation(), "{e:?}");
                        if engine.get_result(&id).is_some() {
                            break;
                        }
                    }
                }
            }
            stopper.join().unwrap().unwrap();
        });

        assert!(engine.get_result(&id).is_some());
        assert!(!engine.record_measurement(&id, "control", "throughput", 100.0));
        assert!(engine.start(&id).unwrap_err().is_validation());
    }
    assert_eq!(restarted, 0);
}

#[test]
fn test_stop_without_primary_data_keeps_running() {
    let engine = ExperimentEngine::in_memory();
    let id = started(&engine, ab_design(100));
    engine.record_measurement(&id, "control", "throughput", 100.0);
    engine.record_measurement(&id, "treatment", "p99_latency", 20.0);

    assert!(engine
        .stop(&id, reasons::MANUAL_STOP)
        .unwrap_err()
        .is_validation());
    assert_eq!(engine.get_status(&id).unwrap().status(), ExperimentStatus::Running);
}

#[test]
fn test_stop_classifies_regression_as_harmful() {
    let engine = ExperimentEngine::in_memory();
    let id = started(&engine, ab_design(100).early_stopping(false));
    for _ in 0..4 {
        engine.record_measurement(&id, "control", "throughput", 10.0);
        engine.record_measurement(&id, "treatment", "throughput", 5.0);
    }

    let results = engine.stop(&id, reasons::MANUAL_STOP).unwrap();
    assert!((results.improvement_percentage + 50.0).abs() < 1e-9);
    assert_eq!(results.significance, Significance::HighlySignificant);
    assert_eq!(results.outcome, Outcome::Harmful);
    assert_eq!(results.best_condition.as_deref(), Some("control"));
    assert!(results.recommendation.contains("rolling back"));
    assert!(!results.rollback_triggered);
}

#[test]
fn test_stop_near_identical_is_inconclusive() {
    let engine = ExperimentEngine::in_memory();
    let id = started(&engine, ab_design(100).early_stopping(false));
    for (c, t) in [(100.0, 100.0), (102.0, 101.0), (98.0, 99.0), (101.0, 100.0)] {
        engine.record_measurement(&id, "control", "throughput", c);
        engine.record_measurement(&id, "treatment", "throughput", t);
    }

    let results = engine.stop(&id, reasons::MANUAL_STOP).unwrap();
    assert_eq!(results.significance, Significance::NotSignificant);
    assert_eq!(results.outcome, Outcome::Inconclusive);
    assert!(results.next_experiments[0].contains("larger sample"));
}

#[test]
fn test_multivariate_design_picks_best_condition() {
    let engine = ExperimentEngine::in_memory();
    let id = started(
        &engine,
        ExperimentDesign::builder("compression codec", ExperimentKind::Multivariate)
            .condition(Condition::new("none", "no compression"))
            .condition(Condition::new("lz4", "lz4"))
            .condition(Condition::new("zstd", "zstd level 3"))
            .metric(Metric::new("throughput", "MB/s"))
            .primary_metric("throughput")
            .early_stopping(false),
    );
    for (none, lz4, zstd) in [(100.0, 140.0, 120.0), (102.0, 141.0, 119.0), (98.0, 139.0, 121.0)] {
        engine.record_measurement(&id, "none", "throughput", none);
        engine.record_measurement(&id, "lz4", "throughput", lz4);
        engine.record_measurement(&id, "zstd", "throughput", zstd);
    }

    let results = engine.stop(&id, reasons::MANUAL_STOP).unwrap();
    assert_eq!(results.best_condition.as_deref(), Some("lz4"));
    assert!(results.improvement_percentage > 35.0);
    assert_eq!(results.outcome, Outcome::Success);
    assert_eq!(results.condition_summaries.len(), 3);
}

#[test]
fn test_abort_records_failure() {
    let engine = ExperimentEngine::in_memory();
    let id = started(&engine, ab_design(100));
    engine.record_measurement(&id, "control", "throughput", 100.0);

    let results = engine.abort(&id, "operator_abort").unwrap();
    assert_eq!(results.outcome, Outcome::Failure);
    assert_eq!(results.stop_reason, "operator_abort");
    assert_eq!(results.total_samples, 1);
    assert_eq!(engine.get_status(&id).unwrap().status(), ExperimentStatus::Aborted);
    assert!(engine.abort(&id, "again").unwrap_err().is_not_found());
}

#[test]
fn test_peek_does_not_stop() {
    let engine = ExperimentEngine::in_memory();
    let id = started(&engine, ab_design(100).early_stopping(false));
    engine.record_measurement(&id, "control", "throughput", 100.0);
    engine.record_measurement(&id, "treatment", "throughput", 120.0);

    let interim = engine.peek(&id).unwrap();
    assert!((interim.improvement - 20.0).abs() < 1e-9);
    assert_eq!(engine.get_status(&id).unwrap().status(), ExperimentStatus::Running);
}

// ============================================================================
// Early stopping
// ============================================================================

#[test]
fn test_harmful_regression_stops_early() {
    let engine = ExperimentEngine::in_memory();
    let id = started(&engine, ab_design(40).rollback_threshold(0.05));

    // Activation floor is max(30, 40 / 4) = 30 total samples.
    for i in 0..14_u32 {
        let jitter = f64::from(i % 3);
        assert!(engine.record_measurement(&id, "control", "throughput", 100.0 + jitter));
        assert!(engine.record_measurement(&id, "treatment", "throughput", 90.0 + jitter));
    }
    assert!(engine.record_measurement(&id, "control", "throughput", 100.0));
    assert_eq!(engine.get_status(&id).unwrap().status(), ExperimentStatus::Running);

    // The 30th sample crosses the floor and triggers the stop.
    assert!(engine.record_measurement(&id, "treatment", "throughput", 90.0));
    assert!(!engine.record_measurement(&id, "treatment", "throughput", 90.0));

    let results = engine.get_result(&id).unwrap();
    assert_eq!(results.stop_reason, reasons::HARMFUL_REGRESSION_DETECTED);
    assert!(results.rollback_triggered);
    assert!(results.early_stop_triggered);
    assert_eq!(results.outcome, Outcome::Harmful);
    assert_eq!(results.total_samples, 30);
}

#[test]
fn test_early_stopping_disabled_keeps_running() {
    let engine = ExperimentEngine::in_memory();
    let id = started(&engine, ab_design(40).early_stopping(false));
    for _ in 0..20 {
        engine.record_measurement(&id, "control", "throughput", 100.0);
        engine.record_measurement(&id, "treatment", "throughput", 50.0);
    }
    assert_eq!(engine.get_status(&id).unwrap().status(), ExperimentStatus::Running);
}

#[test]
fn test_secondary_metric_never_triggers_early_stop() {
    let engine = ExperimentEngine::in_memory();
    let id = started(&engine, ab_design(40));
    for _ in 0..20 {
        engine.record_measurement(&id, "control", "p99_latency", 100.0);
        engine.record_measurement(&id, "treatment", "p99_latency", 50.0);
    }
    assert_eq!(engine.get_status(&id).unwrap().total_samples(), 40);
}

// ============================================================================
// Listing
// ============================================================================

#[test]
fn test_list_all_partitions_experiments() {
    let engine = ExperimentEngine::in_memory();
    let designed = engine.create_design(ab_design(100)).unwrap();
    let running = started(&engine, ab_design(100));
    let done = started(&engine, ab_design(100).early_stopping(false));
    engine.record_measurement(&done, "control", "throughput", 100.0);
    engine.record_measurement(&done, "treatment", "throughput", 105.0);
    engine.stop(&done, reasons::MANUAL_STOP).unwrap();

    let listing = engine.list_all();
    assert_eq!(listing.running.len(), 1);
    assert_eq!(listing.running[0].experiment_id, running);
    assert_eq!(listing.completed.len(), 1);
    assert_eq!(listing.completed[0].experiment_id, done);
    assert_eq!(listing.designs.len(), 3);

    let status_of = |id: &str| {
        listing
            .designs
            .iter()
            .find(|d| d.experiment_id == id)
            .map(|d| d.status)
    };
    assert_eq!(status_of(designed.experiment_id()), Some(ExperimentStatus::Designed));
    assert_eq!(status_of(&running), Some(ExperimentStatus::Running));
    assert_eq!(status_of(&done), Some(ExperimentStatus::Completed));
}
