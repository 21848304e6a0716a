//! Parallel parameter-sweep engine
//!
//! Explores a multi-dimensional parameter space by rebuilding and solving a
//! numerical model under many parameter combinations, spread across workers,
//! and gathers the results into one consistent dataset.
//! It supports:
//! - Eight sampling strategies (linear, geometric, reverse geometric, uniform,
//!   normal, Latin hypercube, predetermined fixed and random)
//! - Fixed (full mesh), random and Latin-hypercube combination matrices
//! - SPMD workers with blocking collectives (single worker or thread group)
//! - A per-sample probe / solve / rebuild-and-retry protocol
//! - Rank-ordered aggregation of every worker's records on the root
//! - Recursive resampling until a target number of solves succeed
//!
//! # Example
//!
//! ```ignore
//! use paramsweep_core::{SampleSpec, SweepDefinition, SweepParams, ParameterSweep, SingleWorker};
//!
//! let definition = SweepDefinition::new(
//!     MyModel::new,
//!     |_| SweepParams::new()
//!         .with("flow", SampleSpec::linear("fs.feed.flow", 1.0, 2.0, 5))
//!         .with("conc", SampleSpec::linear("fs.feed.conc", 0.1, 0.5, 3)),
//!     optimize,
//! );
//! let result = ParameterSweep::new(&definition, &SingleWorker)?.run(None)?;
//! ```

#![warn(clippy::all)]

// ============================================================================
// Core modules
// ============================================================================

pub mod aggregate;
pub mod combination;
pub mod error;
pub mod kernel;
pub mod parallel;
pub mod recursive;
pub mod sampling;
pub mod sweep;

// ============================================================================
// Boundary and type definition modules
// ============================================================================

pub mod config;
pub mod model;
pub mod output;
pub mod progress;
pub mod writer;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{SolverOptions, SweepOptions};
pub use error::{ModelError, Result, SweepError};
pub use model::{
    Component, ComponentKind, DerivedFn, InitializeFn, Locator, ModelFactory, ModelManager,
    ModelState, OptimizeFn, OutputSource, OutputSpecs, ProbeFn, SweepModel, TerminationCondition,
};
pub use output::{GlobalResultSet, OutputRecord, RecordTable, ResultSet, WorkerResultSet};
pub use parallel::{SingleWorker, ThreadGroup, ThreadWorker, WorkDistributor, run_workers};
pub use progress::{ChannelProgressSink, ProgressEvent, ProgressSink};
pub use recursive::{RecursiveParameterSweep, RoundSummary, next_round_request};
pub use sampling::{SampleSpec, Sampling, SamplingType, SetMode, SweepParams};
pub use sweep::{CustomSweepFn, ParameterSweep, SweepDefinition, SweepResult};
pub use writer::{NullWriter, ResultWriter, SaveRequest};
