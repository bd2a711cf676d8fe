//! Persistence tests: designs and results survive a restart unchanged

use std::time::Duration;

use optimization_lab::config::EngineConfig;
use optimization_lab::engine::{reasons, ExperimentEngine};
use optimization_lab::experiment::{
    Condition, ExperimentDesign, ExperimentKind, ExperimentStatus, ExperimentStore, Metric,
};
use optimization_lab::Error;
use tempfile::tempdir;

fn engine_at(dir: &std::path::Path) -> ExperimentEngine {
    ExperimentEngine::open(EngineConfig::builder().data_dir(dir).build()).unwrap()
}

fn rich_design() -> optimization_lab::experiment::ExperimentDesignBuilder {
    ExperimentDesign::builder("wal segment size", ExperimentKind::ChampionChallenger)
        .description("Larger WAL segments to cut fsync overhead")
        .condition(
            Condition::builder("champion", "16 MiB segments")
                .config("wal_segment_mb", serde_json::json!(16))
                .risk_level(1)
                .build(),
        )
        .condition(
            Condition::builder("challenger", "64 MiB segments")
                .description("Fewer rotations, longer recovery")
                .config("wal_segment_mb", serde_json::json!(64))
                .config("sync", serde_json::json!({"mode": "group", "window_ms": 2.5}))
                .risk_level(3)
                .expected_impact(7.5)
                .build(),
        )
        .metric(
            Metric::builder("commit_latency", "ms")
                .description("p50 commit latency")
                .higher_is_better(false)
                .baseline_value(4.2)
                .target_improvement(0.1)
                .build(),
        )
        .metric(Metric::new("fsyncs", "count"))
        .primary_metric("commit_latency")
        .sample_size_per_condition(25)
        .minimum_runtime(Duration::from_secs(600))
        .maximum_runtime(Duration::from_millis(7_200_500))
        .confidence_level(0.99)
        .rollback_threshold(0.08)
        .early_stopping(false)
}

#[test]
fn test_design_round_trips_through_disk() {
    let dir = tempdir().unwrap();
    let original = engine_at(dir.path()).create_design(rich_design()).unwrap();

    let store = ExperimentStore::open(dir.path()).unwrap();
    let reloaded = store.get_design(original.experiment_id()).unwrap();
    assert_eq!(reloaded, &original);
    assert_eq!(reloaded.kind(), ExperimentKind::ChampionChallenger);

    let raw = std::fs::read_to_string(dir.path().join("designs.json")).unwrap();
    assert!(raw.contains("\"CHAMPION_CHALLENGER\""));
}

#[test]
fn test_result_round_trips_through_disk() {
    let dir = tempdir().unwrap();
    let engine = engine_at(dir.path());
    let design = engine.create_design(rich_design()).unwrap();
    let id = design.experiment_id();

    engine.start(id).unwrap();
    for (champion, challenger) in [(4.21, 3.9), (4.19, 3.85), (4.3, 3.95), (4.05, 3.7)] {
        engine.record_measurement(id, "champion", "commit_latency", champion);
        engine.record_measurement(id, "challenger", "commit_latency", challenger);
        engine.record_measurement(id, "challenger", "fsyncs", 12.0);
    }
    let original = engine.stop(id, reasons::MANUAL_STOP).unwrap();
    drop(engine);

    let reopened = engine_at(dir.path());
    let reloaded = reopened.get_result(id).unwrap();
    assert_eq!(reloaded, original);

    let raw = std::fs::read_to_string(dir.path().join("results.json")).unwrap();
    assert!(raw.contains(&format!("\"{}\"", original.outcome)));
    assert!(raw.contains(&format!("\"{}\"", original.significance)));

    // Results are immutable: a reloaded experiment cannot be re-run.
    assert!(reopened.start(id).unwrap_err().is_validation());
}

#[test]
fn test_writes_leave_no_temp_files() {
    let dir = tempdir().unwrap();
    let engine = engine_at(dir.path());
    engine.create_design(rich_design()).unwrap();
    engine.create_design(rich_design()).unwrap();
    engine.flush().unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().all(|name| !name.ends_with(".tmp")), "{names:?}");
    assert_eq!(ExperimentStore::open(dir.path()).unwrap().design_count(), 2);
}

#[test]
fn test_running_state_is_not_persisted() {
    let dir = tempdir().unwrap();
    let engine = engine_at(dir.path());
    let design = engine.create_design(rich_design()).unwrap();
    engine.start(design.experiment_id()).unwrap();
    engine.record_measurement(design.experiment_id(), "champion", "commit_latency", 4.0);
    drop(engine);

    let reopened = engine_at(dir.path());
    assert!(reopened.get_design(design.experiment_id()).is_some());
    assert!(reopened
        .get_status(design.experiment_id())
        .unwrap_err()
        .is_not_found());
    // The design can be started again from scratch.
    reopened.start(design.experiment_id()).unwrap();
}

#[test]
fn test_corrupt_collection_fails_open() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("designs.json"), b"{ not json").unwrap();
    let err = ExperimentEngine::open(EngineConfig::builder().data_dir(dir.path()).build())
        .unwrap_err();
    assert!(matches!(err, Error::Serialization(_)));
}

// ============================================================================
// Write failures
// ============================================================================

#[test]
fn test_failed_design_write_keeps_design_and_flush_recovers() {
    let dir = tempdir().unwrap();
    let engine = engine_at(dir.path());
    let blocker = dir.path().join("designs.json");
    std::fs::create_dir(&blocker).unwrap();

    let id = match engine.create_design(rich_design()) {
        Err(Error::Persistence { experiment_id, .. }) => experiment_id,
        other => panic!("expected a persistence error, got {other:?}"),
    };
    let kept = engine.get_design(&id).expect("design kept in memory");
    assert_eq!(kept.name(), "wal segment size");

    std::fs::remove_dir(&blocker).unwrap();
    engine.flush().unwrap();

    let store = ExperimentStore::open(dir.path()).unwrap();
    assert_eq!(store.get_design(&id), Some(&kept));
}

#[test]
fn test_failed_result_write_keeps_result_and_flush_recovers() {
    let dir = tempdir().unwrap();
    let engine = engine_at(dir.path());
    let design = engine.create_design(rich_design()).unwrap();
    let id = design.experiment_id();

    engine.start(id).unwrap();
    for (champion, challenger) in [(4.2, 3.9), (4.1, 3.8), (4.3, 4.0)] {
        engine.record_measurement(id, "champion", "commit_latency", champion);
        engine.record_measurement(id, "challenger", "commit_latency", challenger);
    }
    let blocker = dir.path().join("results.json");
    std::fs::create_dir(&blocker).unwrap();

    let err = engine.stop(id, reasons::MANUAL_STOP).unwrap_err();
    assert!(
        matches!(&err, Error::Persistence { experiment_id, .. } if experiment_id == id),
        "{err:?}"
    );

    let kept = engine.get_result(id).expect("results kept in memory");
    assert_eq!(engine.get_status(id).unwrap().status(), ExperimentStatus::Completed);
    assert!(engine.start(id).unwrap_err().is_validation());
    assert!(!engine.record_measurement(id, "champion", "commit_latency", 4.0));

    std::fs::remove_dir(&blocker).unwrap();
    engine.flush().unwrap();
    drop(engine);

    let reopened = engine_at(dir.path());
    assert_eq!(reopened.get_result(id), Some(kept));
}
