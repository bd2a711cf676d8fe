//! Optimization Experiment Example
//!
//! Runs two experiments end to end: an A/B test that wins, and one that is
//! stopped early by a harmful regression.
//!
//! Run with: cargo run --example optimization_experiment
//! Set `RUST_LOG=optimization_lab=debug` for engine events.

use std::time::Duration;

use anyhow::Context;
use optimization_lab::config::EngineConfig;
use optimization_lab::engine::{reasons, ExperimentEngine};
use optimization_lab::experiment::{Condition, ExperimentDesign, ExperimentKind, Metric};
use rand::Rng;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Optimization Lab ===\n");

    let data_dir = std::env::temp_dir().join("optimization-lab-demo");
    let config = EngineConfig::builder()
        .data_dir(&data_dir)
        .monitor_interval(Duration::from_secs(1))
        .build();
    let engine = ExperimentEngine::open(config).context("opening the experiment store")?;
    println!("Data directory: {}\n", data_dir.display());

    // -------------------------------------------------------------------------
    // 1. A/B test: larger read-ahead
    // -------------------------------------------------------------------------
    println!("1. A/B test: read-ahead size");

    let design = engine.create_design(
        ExperimentDesign::builder("read-ahead size", ExperimentKind::AbTest)
            .description("Does 1 MiB read-ahead beat 128 KiB for sequential scans?")
            .condition(
                Condition::builder("control", "128 KiB read-ahead")
                    .config("read_ahead_kb", serde_json::json!(128))
                    .build(),
            )
            .condition(
                Condition::builder("treatment", "1 MiB read-ahead")
                    .config("read_ahead_kb", serde_json::json!(1024))
                    .risk_level(2)
                    .expected_impact(10.0)
                    .build(),
            )
            .metric(
                Metric::builder("scan_throughput", "MB/s")
                    .description("Sequential scan throughput")
                    .baseline_value(480.0)
                    .build(),
            )
            .primary_metric("scan_throughput")
            .sample_size_per_condition(50)
            .minimum_runtime(Duration::ZERO)
            .maximum_runtime(Duration::from_secs(30)),
    )?;
    let id = design.experiment_id().to_string();
    println!("   Experiment ID: {id}");

    engine.start(&id)?;
    let mut rng = rand::thread_rng();
    for _ in 0..50 {
        engine.record_measurement(&id, "control", "scan_throughput", rng.gen_range(460.0..500.0));
        engine.record_measurement(&id, "treatment", "scan_throughput", rng.gen_range(520.0..570.0));
    }

    // The monitor stops the experiment once the sample target is met.
    let results = loop {
        if let Some(results) = engine.get_result(&id) {
            break results;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    };
    print_results(&results);

    // -------------------------------------------------------------------------
    // 2. A regression caught by early stopping
    // -------------------------------------------------------------------------
    println!("\n2. Early stopping: aggressive compaction");

    let design = engine.create_design(
        ExperimentDesign::builder("aggressive compaction", ExperimentKind::AbTest)
            .condition(Condition::new("control", "default compaction"))
            .condition(Condition::new("treatment", "compaction every flush"))
            .metric(Metric::new("write_throughput", "ops/s"))
            .primary_metric("write_throughput")
            .sample_size_per_condition(40)
            .rollback_threshold(0.05),
    )?;
    let id = design.experiment_id().to_string();
    engine.start(&id)?;

    let mut recorded = 0;
    while engine.record_measurement(&id, "control", "write_throughput", rng.gen_range(9_800.0..10_200.0))
        && engine.record_measurement(&id, "treatment", "write_throughput", rng.gen_range(8_000.0..8_600.0))
    {
        recorded += 2;
    }
    println!("   Stopped after {recorded} paired samples");

    let results = engine
        .get_result(&id)
        .context("early-stopped experiment has no results")?;
    assert_eq!(results.stop_reason, reasons::HARMFUL_REGRESSION_DETECTED);
    print_results(&results);

    // -------------------------------------------------------------------------
    // 3. Everything the engine knows
    // -------------------------------------------------------------------------
    println!("\n3. Listing");
    let listing = engine.list_all();
    println!("   Running:   {}", listing.running.len());
    println!("   Completed: {}", listing.completed.len());
    println!("   Designs:   {}", listing.designs.len());

    engine.shutdown();
    println!("\n=== Done ===");
    Ok(())
}

fn print_results(results: &optimization_lab::ExperimentResults) {
    println!("   Stop reason:  {}", results.stop_reason);
    println!("   Outcome:      {}", results.outcome);
    println!("   Significance: {} (p = {})", results.significance, results.p_value);
    println!(
        "   Improvement:  {:+.2}% [{:+.2}%, {:+.2}%]",
        results.improvement_percentage, results.confidence_interval.0, results.confidence_interval.1
    );
    if let Some(best) = &results.best_condition {
        println!("   Best:         {best}");
    }
    println!("   Recommendation: {}", results.recommendation);
    for lesson in &results.lessons_learned {
        println!("   - {lesson}");
    }
}
