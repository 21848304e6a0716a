//! Hand-off of finished sweep data to a persistence layer.

use ndarray::Array2;

use crate::error::{Result, SweepError};
use crate::output::{GlobalResultSet, WorkerResultSet};
use crate::sampling::SweepParams;

/// Everything a writer receives, once per worker, after a sweep
#[derive(Debug, Clone, Copy)]
pub struct SaveRequest<'a> {
    pub sweep_params: &'a SweepParams,
    /// This worker's input rows; `None` when not collected
    pub local_values: Option<&'a Array2<f64>>,
    /// Global input rows `[rows x params]`, identical on every worker
    pub global_values: &'a Array2<f64>,
    pub local_results: &'a WorkerResultSet,
    /// Authoritative on rank 0 only
    pub global_results: &'a GlobalResultSet,
    /// Global output rows `[rows x outputs]`, identical on every worker
    pub global_results_arr: &'a Array2<f64>,
    pub rank: usize,
}

impl SaveRequest<'_> {
    /// Check that row and column counts line up across the ingredients.
    pub fn validate(&self) -> Result<()> {
        let params = self.sweep_params.len();
        let rows = self.global_values.nrows();

        if self.global_values.ncols() != params {
            return Err(shape(format!(
                "global values have {} columns for {params} sweep parameters",
                self.global_values.ncols()
            )));
        }
        if self.global_results_arr.nrows() != rows {
            return Err(shape(format!(
                "global results have {} rows but global values have {rows}",
                self.global_results_arr.nrows()
            )));
        }
        if self.local_results.sweep_params.len() != params {
            return Err(shape(format!(
                "local results record {} inputs for {params} sweep parameters",
                self.local_results.sweep_params.len()
            )));
        }
        if let Some(local) = self.local_values {
            if local.ncols() != params || local.nrows() != self.local_results.num_rows() {
                return Err(shape(format!(
                    "local values are {}x{} but {} local rows of {params} parameters were run",
                    local.nrows(),
                    local.ncols(),
                    self.local_results.num_rows()
                )));
            }
        }
        if self.rank == 0 {
            if self.global_results_arr.ncols() != self.global_results.outputs.len() {
                return Err(shape(format!(
                    "global results have {} columns for {} outputs",
                    self.global_results_arr.ncols(),
                    self.global_results.outputs.len()
                )));
            }
            if self.global_results.num_rows() != rows {
                return Err(shape(format!(
                    "global result set has {} rows but global values have {rows}",
                    self.global_results.num_rows()
                )));
            }
        }
        Ok(())
    }

    /// Global inputs followed by global outputs, one row per sample
    #[must_use]
    pub fn global_save_data(&self) -> Array2<f64> {
        let rows = self.global_values.nrows();
        let inputs = self.global_values.ncols();
        let outputs = self.global_results_arr.ncols();
        Array2::from_shape_fn((rows, inputs + outputs), |(r, c)| {
            if c < inputs {
                self.global_values[[r, c]]
            } else {
                self.global_results_arr[[r, c - inputs]]
            }
        })
    }
}

fn shape(msg: String) -> SweepError {
    SweepError::Shape(msg)
}

/// Persists sweep data. Called on every worker; writers decide which ranks
/// actually write.
pub trait ResultWriter: Send + Sync {
    fn save_results(&self, request: &SaveRequest<'_>) -> Result<()>;
}

/// Writer that keeps nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullWriter;

impl ResultWriter for NullWriter {
    fn save_results(&self, _request: &SaveRequest<'_>) -> Result<()> {
        Ok(())
    }
}
