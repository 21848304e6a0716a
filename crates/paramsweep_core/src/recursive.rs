//! Adaptive multi-round sweep that keeps resampling until a target number
//! of samples have solved.
//!
//! Each round samples afresh, runs every row and counts global successes.
//! The next round over-provisions by twice the inverse success rate. After at
//! most [`MAX_ROUNDS`] rounds the successful rows of every round are kept in
//! round-then-row order, trimmed to the target and aggregated.

use tracing::{debug, info, warn};

use crate::aggregate::{
    aggregate_input_array, aggregate_results_array, create_global_output, local_input_array,
};
use crate::combination::divide_combinations;
use crate::error::Result;
use crate::kernel::SweepKernel;
use crate::model::{ModelManager, SweepModel};
use crate::output::{WorkerResultSet, create_local_skeleton};
use crate::parallel::{WorkDistributor, agree_on_outcome};
use crate::progress::ProgressPublisher;
use crate::sweep::{Prepared, SweepDefinition, SweepResult, build_and_distribute};
use crate::writer::SaveRequest;

/// Hard cap on resampling rounds
pub const MAX_ROUNDS: usize = 10;

/// Success probability below which a round is flagged, and the floor used
/// when sizing the next round
pub const MIN_SUCCESS_PROBABILITY: f64 = 0.10;

/// Rows to request next: `ceil(2 / max(p, 0.1) * remaining)`, zero once the
/// target is met.
#[must_use]
pub fn next_round_request(success_probability: f64, remaining: i64) -> usize {
    if remaining <= 0 {
        return 0;
    }
    let scale = 2.0 / success_probability.max(MIN_SUCCESS_PROBABILITY);
    (scale * remaining as f64).ceil() as usize
}

/// Per-round outcome, summed across workers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundSummary {
    pub round: usize,
    pub requested: usize,
    pub successes: i64,
    pub failures: i64,
    pub success_probability: f64,
}

/// Multi-round sweep guaranteeing (up to the round cap) a target number of
/// successful solves
pub struct RecursiveParameterSweep<'d, M, D: ?Sized> {
    definition: &'d SweepDefinition<M>,
    distributor: &'d D,
    manager: ModelManager<M>,
    progress: ProgressPublisher,
    rounds: Vec<RoundSummary>,
}

impl<'d, M, D> RecursiveParameterSweep<'d, M, D>
where
    M: SweepModel,
    D: WorkDistributor + ?Sized,
{
    /// Fails on invalid options, or when progress publication is enabled
    /// without a sink.
    pub fn new(definition: &'d SweepDefinition<M>, distributor: &'d D) -> Result<Self> {
        definition.options.validate()?;
        Ok(Self {
            progress: definition.progress_publisher()?,
            manager: definition.model_manager(),
            definition,
            distributor,
            rounds: Vec::new(),
        })
    }

    /// Summaries of the rounds run by the last call to [`run`](Self::run)
    #[must_use]
    pub fn rounds(&self) -> &[RoundSummary] {
        &self.rounds
    }

    #[must_use]
    pub fn manager(&self) -> &ModelManager<M> {
        &self.manager
    }

    /// Run rounds until `num_samples` rows have solved or the round cap is
    /// hit. Falling short of the target is not an error.
    pub fn run(&mut self, num_samples: usize) -> Result<SweepResult> {
        let options = &self.definition.options;
        let distributor = self.distributor;
        let rank = distributor.get_rank();
        self.rounds.clear();

        let Prepared {
            model,
            mut params,
            outputs,
            ..
        } = self.definition.prepare()?;

        let mut rng = options.rng();
        let mut remaining = num_samples as i64;
        let mut requested = num_samples;
        let mut collected: Vec<WorkerResultSet> = Vec::new();

        for round in 0..MAX_ROUNDS {
            if remaining <= 0 {
                break;
            }

            // Samples are single-use: every round re-primes with its own count
            params.reprime(requested);
            let sampling_type = params.process()?;

            let global_values = build_and_distribute(
                distributor,
                &params,
                sampling_type,
                &mut rng,
                options.index_global_combo_array,
            )?;
            let local_values =
                divide_combinations(&global_values, rank, distributor.worker_count());

            let outcome = match &self.definition.custom_sweep {
                Some(custom) => custom(&params, outputs.as_ref(), &local_values),
                None => SweepKernel::new(
                    &mut self.manager,
                    self.definition.probe.clone(),
                    self.progress.clone(),
                    options,
                    rank,
                )
                .do_param_sweep(&params, outputs.as_ref(), &local_values),
            };
            let local_results = agree_on_outcome(distributor, outcome)?;

            let local_successes = local_results.num_successful() as i64;
            let local_failures = local_values.nrows() as i64 - local_successes;
            let mut totals = [0i64; 2];
            distributor.sum_values_and_sync(&[local_successes, local_failures], &mut totals)?;
            let [successes, failures] = totals;

            let attempted = successes + failures;
            let success_probability = if attempted > 0 {
                successes as f64 / attempted as f64
            } else {
                0.0
            };
            if success_probability < MIN_SUCCESS_PROBABILITY && distributor.is_root() {
                warn!(
                    round,
                    success_rate = 100.0 * success_probability,
                    "Low solve success rate, consider adjusting sweep limits"
                );
            }

            remaining -= successes;
            self.rounds.push(RoundSummary {
                round,
                requested,
                successes,
                failures,
                success_probability,
            });
            if distributor.is_root() {
                info!(
                    round,
                    requested, successes, failures, remaining, "Recursive sweep round complete"
                );
            }

            requested = next_round_request(success_probability, remaining);
            collected.push(local_results);
        }

        // Successful rows only, round-then-row order, trimmed to the target
        let (mut filtered, _) = create_local_skeleton(&model, &params, outputs.as_ref(), 0)?;
        for round in &collected {
            filtered.append(&round.successful_rows());
        }
        filtered.truncate(num_samples);
        debug!(
            rank,
            local_successes = filtered.num_rows(),
            "Filtered recursive results"
        );

        let (global_results, rows) =
            create_global_output(distributor, &filtered, Some(num_samples))?;
        let global_results_arr = aggregate_results_array(distributor, &global_results, rows)?;
        let global_values = aggregate_input_array(distributor, &global_results, rows)?;
        let local_inputs = local_input_array(&filtered);

        distributor.sync_with_peers()?;

        let request = SaveRequest {
            sweep_params: &params,
            local_values: Some(&local_inputs),
            global_values: &global_values,
            local_results: &filtered,
            global_results: &global_results,
            global_results_arr: &global_results_arr,
            rank,
        };
        request.validate()?;
        self.definition.writer.save_results(&request)?;

        Ok(SweepResult::from_request(&request, global_values.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_over_provisioning_formula() {
        assert_eq!(next_round_request(0.5, 10), 40);
        assert_eq!(next_round_request(0.05, 10), 200);
        assert_eq!(next_round_request(1.0, 3), 6);
        assert_eq!(next_round_request(0.0, 1), 20);
    }

    #[test]
    fn test_no_request_once_target_met() {
        assert_eq!(next_round_request(0.7, 0), 0);
        assert_eq!(next_round_request(0.7, -4), 0);
    }
}
