//! Runs a sweep file on one or more in-process workers.

use std::sync::Arc;

use color_eyre::eyre::{bail, eyre};
use paramsweep_core::{
    ParameterSweep, RecursiveParameterSweep, ResultWriter, SingleWorker, SweepDefinition,
    SweepResult, WorkDistributor, run_workers,
};
use tracing::info;

use crate::definition::SweepFile;
use crate::demo_model::TankModel;

/// Which driver to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepMode {
    /// One pass over the combination matrix
    Single,
    /// Resample until this many rows have solved
    Recursive(usize),
}

fn run_rank<D: WorkDistributor + ?Sized>(
    definition: &SweepDefinition<TankModel>,
    distributor: &D,
    mode: SweepMode,
    num_samples: Option<usize>,
) -> paramsweep_core::Result<SweepResult> {
    match mode {
        SweepMode::Single => ParameterSweep::new(definition, distributor)?.run(num_samples),
        SweepMode::Recursive(target) => {
            let mut sweep = RecursiveParameterSweep::new(definition, distributor)?;
            let result = sweep.run(target)?;
            if distributor.is_root() {
                for round in sweep.rounds() {
                    info!(
                        round = round.round,
                        requested = round.requested,
                        successes = round.successes,
                        "Round summary"
                    );
                }
            }
            Ok(result)
        }
    }
}

/// Run `file` on `options.number_of_workers` workers and return rank 0's
/// result.
pub fn run(
    file: &SweepFile,
    mode: SweepMode,
    writer: Arc<dyn ResultWriter>,
) -> color_eyre::Result<SweepResult> {
    let workers = file.options.number_of_workers;
    if workers == 0 {
        bail!("number_of_workers must be at least 1");
    }
    let definition = file.definition().writer(writer);

    info!(workers, ?mode, parameters = file.parameters.len(), "Running sweep");
    let outcomes = if workers == 1 {
        vec![run_rank(&definition, &SingleWorker, mode, file.num_samples)]
    } else {
        run_workers(workers, |worker| {
            run_rank(&definition, &worker, mode, file.num_samples)
        })?
    };

    let mut root = None;
    for (rank, outcome) in outcomes.into_iter().enumerate() {
        let result = outcome.map_err(|e| eyre!("worker {rank} failed: {e}"))?;
        if rank == 0 {
            root = Some(result);
        }
    }
    root.ok_or_else(|| eyre!("no worker returned a result"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_writer::CsvWriter;
    use paramsweep_core::NullWriter;

    const LINEAR: &str = r#"
options:
  seed: 3
  number_of_workers: 2
parameters:
  - name: flow
    locator: tank.inlet_flow
    kind: linear
    lower: 0.5
    upper: 4.0
    num_samples: 8
outputs:
  - name: volume
    locator: tank.volume
  - name: load
    derived: mass_load
"#;

    #[test]
    fn test_two_workers_write_one_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let file = SweepFile::from_yaml(LINEAR).unwrap();

        let result = run(
            &file,
            SweepMode::Single,
            Arc::new(CsvWriter::new(Some(path.clone()), None)),
        )
        .unwrap();

        assert_eq!(result.global.dim(), (8, 3));
        assert_eq!(result.global_results.num_successful(), 8);
        // 180 m^3 per unit of flow meets the 0.1 outlet target
        let volume = result.global_results_arr.column(0);
        assert!((volume[0] - 90.0).abs() < 1e-6);
        assert!((volume[7] - 720.0).abs() < 1e-6);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().next(), Some("# flow,volume,load"));
        assert_eq!(content.lines().count(), 9);
    }

    #[test]
    fn test_recursive_mode_hits_target() {
        let file = SweepFile::from_yaml(
            r#"
options:
  seed: 11
  number_of_workers: 3
parameters:
  - name: flow
    locator: tank.inlet_flow
    kind: uniform
    lower: 0.5
    upper: 10.0
    num_samples: 5
"#,
        )
        .unwrap();

        let result = run(&file, SweepMode::Recursive(12), Arc::new(NullWriter)).unwrap();
        assert_eq!(result.global_values.nrows(), 12);
        // Flows above the pump capacity never solve
        assert!(result.global_values.iter().all(|q| *q <= 5.0));
    }
}
