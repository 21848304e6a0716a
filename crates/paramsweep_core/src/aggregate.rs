//! Cross-worker aggregation of result sets.
//!
//! Every worker calls each function here with the same structure; only the
//! root's returned data is authoritative unless stated otherwise.

use ndarray::Array2;
use tracing::debug;

use crate::error::Result;
use crate::output::{GlobalResultSet, OutputRecord, WorkerResultSet};
use crate::parallel::{WorkDistributor, agree_on_outcome};

/// Concatenate every worker's rows in rank order on the root and keep the
/// first `requested` rows (all rows when `None`).
///
/// Non-root workers get their local result set back unchanged. The second
/// value is the global row count after truncation, known on every worker.
pub fn create_global_output<D: WorkDistributor + ?Sized>(
    distributor: &D,
    local: &WorkerResultSet,
    requested: Option<usize>,
) -> Result<(GlobalResultSet, usize)> {
    let counts = distributor.combine_data_with_peers(local.num_rows())?;
    let total: usize = counts.iter().sum();
    let keep = requested.map_or(total, |r| r.min(total));
    let is_root = distributor.is_root();

    let mut global = if is_root {
        local.resized(total)
    } else {
        local.clone()
    };

    // Every gather runs on every worker, even after a failure
    let mut outcome = Ok(());
    let local_records = local.sweep_params.records().chain(local.outputs.records());
    let global_records = global
        .sweep_params
        .records_mut()
        .chain(global.outputs.records_mut());
    for (src, dst) in local_records.zip(global_records) {
        let gathered = gather_record(distributor, src, dst, &counts, is_root);
        if outcome.is_ok() {
            outcome = gathered;
        }
    }

    let flags: Vec<f64> = local
        .solve_successful
        .iter()
        .map(|&s| if s { 1.0 } else { 0.0 })
        .collect();
    let gathered = if is_root {
        let mut buffer = vec![0.0; total];
        let gathered = distributor
            .gather_arrays_to_root(&flags, Some((buffer.as_mut_slice(), counts.as_slice())));
        global.solve_successful = buffer.iter().map(|&f| f != 0.0).collect();
        gathered
    } else {
        distributor.gather_arrays_to_root(&flags, None)
    };
    if outcome.is_ok() {
        outcome = gathered;
    }

    agree_on_outcome(distributor, outcome)?;
    if is_root {
        global.truncate(keep);
        debug!(total, kept = keep, "Aggregated worker results");
    }

    Ok((global, keep))
}

fn gather_record<D: WorkDistributor + ?Sized>(
    distributor: &D,
    src: &OutputRecord,
    dst: &mut OutputRecord,
    counts: &[usize],
    is_root: bool,
) -> Result<()> {
    if is_root {
        distributor.gather_arrays_to_root(&src.value, Some((dst.value.as_mut_slice(), counts)))
    } else {
        distributor.gather_arrays_to_root(&src.value, None)
    }
}

/// `[rows x outputs]` matrix of the root's global output values, synced to
/// every worker.
pub fn aggregate_results_array<D: WorkDistributor + ?Sized>(
    distributor: &D,
    global: &GlobalResultSet,
    rows: usize,
) -> Result<Array2<f64>> {
    columns_to_array(distributor, global.outputs.records(), global.outputs.len(), rows)
}

/// `[rows x params]` matrix of the root's global sweep-input values, synced
/// to every worker.
pub fn aggregate_input_array<D: WorkDistributor + ?Sized>(
    distributor: &D,
    global: &GlobalResultSet,
    rows: usize,
) -> Result<Array2<f64>> {
    columns_to_array(
        distributor,
        global.sweep_params.records(),
        global.sweep_params.len(),
        rows,
    )
}

fn columns_to_array<'r, D: WorkDistributor + ?Sized>(
    distributor: &D,
    records: impl Iterator<Item = &'r OutputRecord>,
    cols: usize,
    rows: usize,
) -> Result<Array2<f64>> {
    let mut array = Array2::zeros((rows, cols));
    if distributor.is_root() {
        for (mut column, record) in array.columns_mut().into_iter().zip(records) {
            for (cell, value) in column.iter_mut().zip(&record.value) {
                *cell = *value;
            }
        }
    }
    if let Some(data) = array.as_slice_mut() {
        distributor.sync_array_with_peers(data)?;
    }
    Ok(array)
}

/// Local rows as `[rows x params]`, for per-worker debug output
#[must_use]
pub fn local_input_array(local: &WorkerResultSet) -> Array2<f64> {
    let rows = local.num_rows();
    let cols = local.sweep_params.len();
    let mut array = Array2::zeros((rows, cols));
    for (mut column, record) in array.columns_mut().into_iter().zip(local.sweep_params.records()) {
        for (cell, value) in column.iter_mut().zip(&record.value) {
            *cell = *value;
        }
    }
    array
}
