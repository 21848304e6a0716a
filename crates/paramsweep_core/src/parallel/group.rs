//! In-process worker group.
//!
//! `n` workers share one exchange: a slot per rank plus a barrier. A
//! collective writes the caller's payload into its own slot, waits for every
//! peer, reads whatever it needs, then waits again so no slot is overwritten
//! while a peer is still reading it.

use std::sync::{Arc, Barrier, Mutex, MutexGuard};

use tracing::debug;

use crate::error::{Result, SweepError};

use super::{WorkDistributor, check_gather_counts};

struct Exchange {
    barrier: Barrier,
    slots: Vec<Mutex<Vec<f64>>>,
}

impl Exchange {
    fn new(size: usize) -> Self {
        Self {
            barrier: Barrier::new(size),
            slots: (0..size).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    fn slot(&self, rank: usize) -> Result<MutexGuard<'_, Vec<f64>>> {
        self.slots[rank]
            .lock()
            .map_err(|_| SweepError::Collective(format!("exchange slot {rank} poisoned")))
    }
}

/// Shared state for a group of in-process workers
#[derive(Clone)]
pub struct ThreadGroup {
    exchange: Arc<Exchange>,
    size: usize,
}

impl ThreadGroup {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(SweepError::Config(
                "a worker group needs at least one worker".to_string(),
            ));
        }
        Ok(Self {
            exchange: Arc::new(Exchange::new(size)),
            size,
        })
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Handle for one rank. Each rank must be driven by exactly one thread.
    pub fn worker(&self, rank: usize) -> Result<ThreadWorker> {
        if rank >= self.size {
            return Err(SweepError::Config(format!(
                "rank {rank} out of range for {} workers",
                self.size
            )));
        }
        Ok(ThreadWorker {
            rank,
            group: self.clone(),
        })
    }
}

/// One rank of a [`ThreadGroup`]
#[derive(Clone)]
pub struct ThreadWorker {
    rank: usize,
    group: ThreadGroup,
}

impl ThreadWorker {
    /// Publish `payload`, wait for every peer, read, then wait again.
    fn exchange<T>(
        &self,
        payload: Vec<f64>,
        read: impl FnOnce(&Exchange) -> Result<T>,
    ) -> Result<T> {
        let exchange = &self.group.exchange;
        let published = exchange.slot(self.rank).map(|mut slot| *slot = payload);
        exchange.barrier.wait();
        let result = published.and_then(|()| read(exchange));
        exchange.barrier.wait();
        result
    }
}

impl WorkDistributor for ThreadWorker {
    fn get_rank(&self) -> usize {
        self.rank
    }

    fn worker_count(&self) -> usize {
        self.group.size
    }

    fn sync_array_with_peers(&self, data: &mut [f64]) -> Result<()> {
        let payload = if self.is_root() { data.to_vec() } else { Vec::new() };
        let is_root = self.is_root();
        self.exchange(payload, |exchange| {
            if is_root {
                return Ok(());
            }
            let root = exchange.slot(0)?;
            if root.len() != data.len() {
                return Err(SweepError::Collective(format!(
                    "root broadcast {} values into a buffer of {}",
                    root.len(),
                    data.len()
                )));
            }
            data.copy_from_slice(&root);
            Ok(())
        })
    }

    fn combine_data_with_peers(&self, value: usize) -> Result<Vec<usize>> {
        self.exchange(vec![value as f64], |exchange| {
            (0..self.group.size)
                .map(|rank| {
                    let slot = exchange.slot(rank)?;
                    slot.first().map(|v| *v as usize).ok_or_else(|| {
                        SweepError::Collective(format!("rank {rank} sent no value"))
                    })
                })
                .collect()
        })
    }

    fn gather_arrays_to_root(
        &self,
        send: &[f64],
        recv: Option<(&mut [f64], &[usize])>,
    ) -> Result<()> {
        let is_root = self.is_root();
        let size = self.group.size;
        self.exchange(send.to_vec(), move |exchange| {
            if !is_root {
                return Ok(());
            }
            let Some((buffer, counts)) = recv else {
                return Err(SweepError::Collective(
                    "root gather without a receive buffer".to_string(),
                ));
            };
            check_gather_counts(buffer.len(), counts, size)?;

            let mut offset = 0;
            for (rank, &count) in counts.iter().enumerate() {
                let slot = exchange.slot(rank)?;
                if slot.len() != count {
                    return Err(SweepError::Collective(format!(
                        "rank {rank} announced {count} values but sent {}",
                        slot.len()
                    )));
                }
                buffer[offset..offset + count].copy_from_slice(&slot);
                offset += count;
            }
            Ok(())
        })
    }

    fn sum_values_and_sync(&self, send: &[i64], recv: &mut [i64]) -> Result<()> {
        if send.len() != recv.len() {
            return Err(SweepError::Collective(format!(
                "reduce of {} values into {}",
                send.len(),
                recv.len()
            )));
        }
        let payload = send.iter().map(|&v| v as f64).collect();
        self.exchange(payload, |exchange| {
            recv.fill(0);
            for rank in 0..self.group.size {
                let slot = exchange.slot(rank)?;
                if slot.len() != recv.len() {
                    return Err(SweepError::Collective(format!(
                        "rank {rank} reduced {} values, expected {}",
                        slot.len(),
                        recv.len()
                    )));
                }
                for (total, v) in recv.iter_mut().zip(slot.iter()) {
                    *total += *v as i64;
                }
            }
            Ok(())
        })
    }

    fn sync_with_peers(&self) -> Result<()> {
        self.group.exchange.barrier.wait();
        Ok(())
    }
}

/// Run `f` once per rank of a fresh `workers`-sized group and return each
/// rank's result in rank order.
///
/// All ranks run concurrently; a collective called by one rank blocks until
/// every rank reaches it.
#[cfg(feature = "parallel")]
pub fn run_workers<T, F>(workers: usize, f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(ThreadWorker) -> T + Sync,
{
    let group = ThreadGroup::new(workers)?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("sweep-worker-{i}"))
        .build()
        .map_err(|e| SweepError::Config(format!("failed to start worker pool: {e}")))?;

    debug!(workers, "Launching worker pool");
    let results = pool.broadcast(|ctx| {
        group
            .worker(ctx.index())
            .map(&f)
    });
    results.into_iter().collect()
}

/// Run `f` once per rank of a fresh `workers`-sized group and return each
/// rank's result in rank order.
///
/// All ranks run concurrently; a collective called by one rank blocks until
/// every rank reaches it.
#[cfg(not(feature = "parallel"))]
pub fn run_workers<T, F>(workers: usize, f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(ThreadWorker) -> T + Sync,
{
    let group = ThreadGroup::new(workers)?;

    debug!(workers, "Launching worker threads");
    std::thread::scope(|scope| {
        let handles = (0..workers)
            .map(|rank| {
                let worker = group.worker(rank);
                let f = &f;
                scope.spawn(move || worker.map(f))
            })
            .collect::<Vec<_>>();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| SweepError::Collective("worker thread panicked".to_string()))?
            })
            .collect()
    })
}
