use crate::error::{Result, SweepError};

use super::{WorkDistributor, check_gather_counts};

/// The only worker of a sweep; every collective is an identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleWorker;

impl WorkDistributor for SingleWorker {
    fn get_rank(&self) -> usize {
        0
    }

    fn worker_count(&self) -> usize {
        1
    }

    fn sync_array_with_peers(&self, _data: &mut [f64]) -> Result<()> {
        Ok(())
    }

    fn combine_data_with_peers(&self, value: usize) -> Result<Vec<usize>> {
        Ok(vec![value])
    }

    fn gather_arrays_to_root(
        &self,
        send: &[f64],
        recv: Option<(&mut [f64], &[usize])>,
    ) -> Result<()> {
        let Some((buffer, counts)) = recv else {
            return Err(SweepError::Collective(
                "root gather without a receive buffer".to_string(),
            ));
        };
        check_gather_counts(buffer.len(), counts, 1)?;
        if counts[0] != send.len() {
            return Err(SweepError::Collective(format!(
                "rank 0 announced {} values but sent {}",
                counts[0],
                send.len()
            )));
        }
        buffer[..send.len()].copy_from_slice(send);
        Ok(())
    }

    fn sum_values_and_sync(&self, send: &[i64], recv: &mut [i64]) -> Result<()> {
        if send.len() != recv.len() {
            return Err(SweepError::Collective(format!(
                "reduce of {} values into {}",
                send.len(),
                recv.len()
            )));
        }
        recv.copy_from_slice(send);
        Ok(())
    }

    fn sync_with_peers(&self) -> Result<()> {
        Ok(())
    }
}
