//! Collective operations across sweep workers.
//!
//! Workers run the same program on different rows (SPMD). Every collective
//! is blocking: each worker must reach the matching call before any of them
//! proceeds. With a single worker every collective is a local identity.

mod group;
mod single;

pub use group::{ThreadGroup, ThreadWorker, run_workers};
pub use single::SingleWorker;

use crate::error::{Result, SweepError};

/// Collective-communication capability required by the sweep drivers
pub trait WorkDistributor {
    fn get_rank(&self) -> usize;

    fn worker_count(&self) -> usize;

    fn is_root(&self) -> bool {
        self.get_rank() == 0
    }

    /// Overwrite `data` on every worker with the root's contents.
    fn sync_array_with_peers(&self, data: &mut [f64]) -> Result<()>;

    /// Every worker's `value`, in rank order, returned to all workers.
    fn combine_data_with_peers(&self, value: usize) -> Result<Vec<usize>>;

    /// Concatenate each worker's `send` in rank order into the root's
    /// pre-sized buffer. `recv` holds the buffer and per-rank counts and is
    /// only read on the root.
    fn gather_arrays_to_root(
        &self,
        send: &[f64],
        recv: Option<(&mut [f64], &[usize])>,
    ) -> Result<()>;

    /// Element-wise sum of `send` across workers, written to `recv` on all.
    fn sum_values_and_sync(&self, send: &[i64], recv: &mut [i64]) -> Result<()>;

    /// Barrier.
    fn sync_with_peers(&self) -> Result<()>;
}

/// Make a local outcome collective: if any worker failed, every worker
/// returns an error, so no worker is left waiting in a later collective.
pub fn agree_on_outcome<D: WorkDistributor + ?Sized, T>(
    distributor: &D,
    outcome: Result<T>,
) -> Result<T> {
    let mut failed = [0i64];
    distributor.sum_values_and_sync(&[i64::from(outcome.is_err())], &mut failed)?;
    match outcome {
        Ok(_) if failed[0] > 0 => Err(SweepError::Collective(format!(
            "{} worker(s) failed",
            failed[0]
        ))),
        outcome => outcome,
    }
}

pub(crate) fn check_gather_counts(recv_len: usize, counts: &[usize], workers: usize) -> Result<()> {
    if counts.len() != workers {
        return Err(SweepError::Collective(format!(
            "{} receive counts for {workers} workers",
            counts.len()
        )));
    }
    let total: usize = counts.iter().sum();
    if total > recv_len {
        return Err(SweepError::Collective(format!(
            "receive buffer holds {recv_len} values but {total} were announced"
        )));
    }
    Ok(())
}
