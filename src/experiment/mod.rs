//! Experiment data model and durable store
//!
//! ## Schema Overview
//!
//! ```text
//! ExperimentDesign (1) ──< Condition (>=2)
//!        │          └───< Metric (primary_metric names one)
//!        │
//!        ├── RunningExperiment (0..1, in memory) ──< Measurement (append-only)
//!        └── ExperimentResults (0..1, durable, immutable)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use optimization_lab::experiment::{
//!     Condition, ExperimentDesign, ExperimentKind, ExperimentStore, Metric,
//! };
//!
//! let mut store = ExperimentStore::new();
//!
//! let design = store.create_design(
//!     ExperimentDesign::builder("connection pool sizing", ExperimentKind::AbTest)
//!         .condition(Condition::new("control", "pool = 16"))
//!         .condition(Condition::new("treatment", "pool = 64"))
//!         .metric(Metric::new("throughput", "req/s"))
//!         .primary_metric("throughput"),
//! )?;
//!
//! assert!(store.get_design(design.experiment_id()).is_some());
//! # Ok::<(), optimization_lab::Error>(())
//! ```

mod condition;
mod design;
mod measurement;
mod metric;
mod results;
mod running;
mod store;

pub use condition::{Condition, ConditionBuilder, MAX_RISK_LEVEL, MIN_RISK_LEVEL};
pub use design::{
    generate_experiment_id, ExperimentDesign, ExperimentDesignBuilder, ExperimentKind,
    DEFAULT_MAXIMUM_RUNTIME, DEFAULT_MINIMUM_RUNTIME, DEFAULT_SAMPLE_SIZE_PER_CONDITION,
};
pub use measurement::Measurement;
pub use metric::{Metric, MetricBuilder};
pub use results::{ExperimentResults, Outcome, ResultSummary, HARMFUL_IMPROVEMENT_PERCENT};
pub use running::{ExperimentStatus, GroupedSamples, RunningExperiment};
pub use store::ExperimentStore;
