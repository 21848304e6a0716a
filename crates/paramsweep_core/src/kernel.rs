//! Per-sample drive loop for one worker.
//!
//! For each local row the kernel stages the values, runs the probe, then
//! solves with at most one rebuild-and-retry, and finally harvests outputs.

use std::time::Instant;

use ndarray::Array2;
use tracing::{debug, trace};

use crate::config::SweepOptions;
use crate::error::Result;
use crate::model::{ModelManager, OutputSpecs, ProbeFn, SweepModel};
use crate::output::{OutputPlan, WorkerResultSet, create_local_skeleton};
use crate::progress::ProgressPublisher;
use crate::sampling::SweepParams;

/// Drives one worker's model manager across its rows
pub struct SweepKernel<'a, M> {
    manager: &'a mut ModelManager<M>,
    probe: Option<ProbeFn<M>>,
    progress: ProgressPublisher,
    rank: usize,
    initialize_before_sweep: bool,
    log_model_states: bool,
}

impl<'a, M: SweepModel> SweepKernel<'a, M> {
    pub fn new(
        manager: &'a mut ModelManager<M>,
        probe: Option<ProbeFn<M>>,
        progress: ProgressPublisher,
        options: &SweepOptions,
        rank: usize,
    ) -> Self {
        Self {
            manager,
            probe,
            progress,
            rank,
            initialize_before_sweep: options.initialize_before_sweep,
            log_model_states: options.log_model_states,
        }
    }

    /// Run every row of `local_values` and return the filled result set.
    pub fn do_param_sweep(
        &mut self,
        params: &SweepParams,
        outputs: Option<&OutputSpecs<M>>,
        local_values: &Array2<f64>,
    ) -> Result<WorkerResultSet> {
        let rows = local_values.nrows();

        // Workers without rows still build a model for the skeleton
        if (self.initialize_before_sweep || !self.manager.is_initialized())
            && self.manager.rebuild_enabled()
        {
            let first = (rows > 0).then(|| local_values.row(0).to_vec());
            self.manager.build_and_init(params, first.as_deref())?;
        }

        let (mut results, plan) =
            create_local_skeleton(self.manager.require_model()?, params, outputs, rows)?;

        for (k, row) in local_values.rows().into_iter().enumerate() {
            let started = Instant::now();
            let row = row.to_vec();
            let success = self.run_sample(params, &plan, &row, k, &mut results)?;
            let elapsed = started.elapsed().as_secs_f64();

            results.solve_successful.push(success);
            self.progress.publish(self.rank, k, success, elapsed);
        }

        debug!(
            rank = self.rank,
            rows,
            successes = results.num_successful(),
            "Worker finished local rows"
        );
        Ok(results)
    }

    fn run_sample(
        &mut self,
        params: &SweepParams,
        plan: &OutputPlan<M>,
        row: &[f64],
        k: usize,
        results: &mut WorkerResultSet,
    ) -> Result<bool> {
        let attempts_before = self.manager.solve_attempts();

        // Staged first so rejected rows still report their inputs
        self.manager.stage_values(params, row)?;

        let accepted = match &self.probe {
            Some(probe) => probe(self.manager.require_model()?),
            None => true,
        };
        let success = if accepted {
            self.solve_with_retry(params, row)?
        } else {
            false
        };

        plan.record_sample(self.manager.require_model()?, results, k, success);

        debug!(
            rank = self.rank,
            sample = k,
            success,
            probed_out = !accepted,
            attempts = self.manager.solve_attempts() - attempts_before,
            "Sample complete"
        );
        if self.log_model_states {
            trace!(rank = self.rank, sample = k, state = ?self.manager.state(), "Model state");
        }
        Ok(success)
    }

    /// Solve `row`, rebuilding first when required and retrying once after
    /// a rebuild when the previous row solved but this one did not.
    ///
    /// Without a factory there is no rebuild, so a failure is final.
    fn solve_with_retry(&mut self, params: &SweepParams, row: &[f64]) -> Result<bool> {
        let rebuild = self.manager.rebuild_enabled();
        let changed = self.manager.current_values() != Some(row);

        if rebuild && ((self.initialize_before_sweep && changed) || !self.manager.is_initialized())
        {
            self.manager.build_and_init(params, Some(row))?;
        }

        self.manager.update_model_params(params, row)?;
        self.manager.solve_model();

        if !self.manager.is_solved() && self.manager.is_prior_parameter_solved() && rebuild {
            self.manager.build_and_init(params, Some(row))?;
            self.manager.update_model_params(params, row)?;
            self.manager.solve_model();
        }

        Ok(self.manager.is_solved())
    }
}
