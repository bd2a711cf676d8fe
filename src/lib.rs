//! # Optimization Lab: Controlled Optimization Experiments
//!
//! **Version**: 0.1.0
//!
//! Optimization Lab runs controlled experiments on system optimizations:
//! design an experiment with conditions and metrics, collect measurements
//! concurrently while it runs, and stop it (manually, on budget, or early on
//! a harmful regression) with a statistical verdict and a recommendation.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Jidoka**: Early stopping halts an experiment the moment interim data
//!   show a regression beyond the rollback threshold
//! - **Poka-Yoke safety**: Designs are validated before they are stored;
//!   results are written exactly once and never change
//! - **Genchi Genbutsu**: Every verdict carries its p-value, confidence
//!   interval and per-condition statistics
//! - **Kaizen**: Results suggest lessons learned and follow-up experiments
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use optimization_lab::config::EngineConfig;
//! use optimization_lab::engine::ExperimentEngine;
//! use optimization_lab::experiment::{Condition, ExperimentDesign, ExperimentKind, Metric};
//!
//! # #[tokio::main]
//! # async fn main() -> optimization_lab::Result<()> {
//! let engine = ExperimentEngine::open(EngineConfig::builder().data_dir("data/lab").build())?;
//!
//! let design = engine.create_design(
//!     ExperimentDesign::builder("buffer pool size", ExperimentKind::AbTest)
//!         .condition(Condition::new("control", "128 MiB"))
//!         .condition(Condition::new("treatment", "512 MiB"))
//!         .metric(Metric::new("throughput", "ops/s"))
//!         .primary_metric("throughput"),
//! )?;
//!
//! engine.start(design.experiment_id())?;
//! engine.record_measurement(design.experiment_id(), "treatment", "throughput", 1520.0);
//! // ... the background monitor stops the experiment once its budget is spent
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod experiment;

pub use config::EngineConfig;
pub use engine::{ExperimentEngine, StatusView};
pub use error::{Error, Result};
pub use experiment::{
    Condition, ExperimentDesign, ExperimentKind, ExperimentResults, Metric, Outcome,
};
