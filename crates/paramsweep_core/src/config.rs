//! Options shared by every sweep driver.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SweepError};

/// Free-form options handed to the optimize function on every solve
pub type SolverOptions = BTreeMap<String, String>;

/// Sweep-wide switches. Every field has a default so partial YAML/JSON
/// documents deserialize cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepOptions {
    /// Passed through to the optimize function
    pub solver_options: SolverOptions,
    /// Ask the optimizer to echo its log
    pub tee: bool,
    /// Rebuild and initialize before every sample whose values changed
    pub initialize_before_sweep: bool,
    /// Apply the first parameter vector before running the initializer
    pub update_sweep_params_before_init: bool,
    /// Emit one progress event per sample
    pub publish_progress: bool,
    /// Destination handed to the progress transport
    pub publish_address: String,
    /// Number of in-process workers
    pub number_of_workers: usize,
    /// Trace the model state after every sample
    pub log_model_states: bool,
    /// Prepend the global row index to every combination row
    pub index_global_combo_array: bool,
    /// Seed for the sampling generator (OS entropy when absent)
    pub seed: Option<u64>,
}

fn default_number_of_workers() -> usize {
    1
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            solver_options: SolverOptions::new(),
            tee: false,
            initialize_before_sweep: false,
            update_sweep_params_before_init: false,
            publish_progress: false,
            publish_address: "http://localhost:8888".to_string(),
            number_of_workers: default_number_of_workers(),
            log_model_states: false,
            index_global_combo_array: false,
            seed: None,
        }
    }
}

impl SweepOptions {
    /// Fresh generator for one sweep invocation.
    #[must_use]
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.number_of_workers == 0 {
            return Err(SweepError::Config(
                "number_of_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
