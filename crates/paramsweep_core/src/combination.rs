//! Combination matrix construction and partitioning.
//!
//! The matrix is built on the root worker only and then synchronised to the
//! others. Rows are combination rows; columns follow the declaration order of
//! the sweep parameters, optionally preceded by the global row index.

use ndarray::{Array2, s};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::error::{Result, SweepError};
use crate::sampling::{Sampling, SamplingType, SweepParams};

/// Build the global combination matrix for one round.
pub fn build_combinations<R: Rng + ?Sized>(
    params: &SweepParams,
    sampling_type: SamplingType,
    rng: &mut R,
    index_column: bool,
) -> Result<Array2<f64>> {
    let columns = params
        .iter()
        .map(|(name, spec)| spec.sampling.sample(name, rng))
        .collect::<Result<Vec<_>>>()?;

    let mut matrix = match sampling_type {
        SamplingType::Fixed => fixed_mesh(&columns)?,
        SamplingType::Random => sorted_by_first(stack_columns(&columns)?, params.len())?,
        SamplingType::RandomLhs => {
            let num_samples = params
                .specs()
                .next()
                .map_or(0, |spec| spec.sampling.num_samples());
            sorted_by_first(latin_hypercube(params, num_samples, rng)?, params.len())?
        }
    };

    if index_column {
        matrix = prepend_index(&matrix);
    }
    if !matrix.is_standard_layout() {
        matrix = matrix.as_standard_layout().into_owned();
    }

    debug!(
        rows = matrix.nrows(),
        cols = matrix.ncols(),
        %sampling_type,
        "Built combination matrix"
    );
    Ok(matrix)
}

/// Full mesh over the multi-valued columns, first column varying slowest.
/// Single-valued columns are broadcast.
fn fixed_mesh(columns: &[Vec<f64>]) -> Result<Array2<f64>> {
    let multi: Vec<usize> = (0..columns.len())
        .filter(|&c| columns[c].len() > 1)
        .collect();
    let rows = if columns.iter().any(Vec::is_empty) {
        0
    } else {
        multi.iter().map(|&c| columns[c].len()).product()
    };

    let mut data = Vec::with_capacity(rows * columns.len());
    let mut digits = vec![0usize; multi.len()];
    for _ in 0..rows {
        let mut row: Vec<f64> = columns.iter().map(|col| col[0]).collect();
        for (slot, &c) in multi.iter().enumerate() {
            row[c] = columns[c][digits[slot]];
        }
        data.extend(row);

        // Odometer increment, last multi-valued column fastest
        for slot in (0..multi.len()).rev() {
            digits[slot] += 1;
            if digits[slot] < columns[multi[slot]].len() {
                break;
            }
            digits[slot] = 0;
        }
    }

    Ok(Array2::from_shape_vec((rows, columns.len()), data)?)
}

fn stack_columns(columns: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    let rows = columns.first().map_or(0, Vec::len);
    if let Some(bad) = columns.iter().find(|c| c.len() != rows) {
        return Err(SweepError::Shape(format!(
            "random columns of length {} and {}",
            rows,
            bad.len()
        )));
    }
    Ok((0..rows)
        .map(|r| columns.iter().map(|col| col[r]).collect())
        .collect())
}

/// One stratified design over the joint `[lower, upper]` box
fn latin_hypercube<R: Rng + ?Sized>(
    params: &SweepParams,
    num_samples: usize,
    rng: &mut R,
) -> Result<Vec<Vec<f64>>> {
    let mut rows = vec![Vec::with_capacity(params.len()); num_samples];
    for (name, spec) in params.iter() {
        let Sampling::LatinHypercube { lower, upper, .. } = spec.sampling else {
            return Err(SweepError::MixedSamplingTypes);
        };
        if !lower.is_finite() || !upper.is_finite() || upper < lower {
            return Err(SweepError::InvalidDistribution {
                parameter: name.to_string(),
                reason: "latin hypercube bounds must be finite with lower <= upper",
            });
        }

        let mut strata: Vec<usize> = (0..num_samples).collect();
        strata.shuffle(rng);
        let width = (upper - lower) / num_samples as f64;
        for (row, stratum) in rows.iter_mut().zip(strata) {
            let offset: f64 = rng.random();
            row.push(lower + (stratum as f64 + offset) * width);
        }
    }
    Ok(rows)
}

fn sorted_by_first(mut rows: Vec<Vec<f64>>, ncols: usize) -> Result<Array2<f64>> {
    rows.sort_by(|a, b| a[0].total_cmp(&b[0]));
    let nrows = rows.len();
    let data: Vec<f64> = rows.into_iter().flatten().collect();
    Ok(Array2::from_shape_vec((nrows, ncols), data)?)
}

fn prepend_index(matrix: &Array2<f64>) -> Array2<f64> {
    let (rows, cols) = matrix.dim();
    let mut indexed = Array2::zeros((rows, cols + 1));
    for (i, mut row) in indexed.rows_mut().into_iter().enumerate() {
        row[0] = i as f64;
        row.slice_mut(s![1..]).assign(&matrix.row(i));
    }
    indexed
}

/// Rows per worker when `rows` are split across `workers`: the first
/// `rows % workers` workers take one extra row.
#[must_use]
pub fn split_counts(rows: usize, workers: usize) -> Vec<usize> {
    let workers = workers.max(1);
    let base = rows / workers;
    let extra = rows % workers;
    (0..workers)
        .map(|rank| base + usize::from(rank < extra))
        .collect()
}

/// The contiguous block of rows owned by `rank`.
#[must_use]
pub fn divide_combinations(matrix: &Array2<f64>, rank: usize, workers: usize) -> Array2<f64> {
    let counts = split_counts(matrix.nrows(), workers);
    let start: usize = counts.iter().take(rank).sum();
    let len = counts.get(rank).copied().unwrap_or(0);
    matrix.slice(s![start..start + len, ..]).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_counts_front_loads_remainder() {
        assert_eq!(split_counts(7, 3), vec![3, 2, 2]);
        assert_eq!(split_counts(2, 4), vec![1, 1, 0, 0]);
        assert_eq!(split_counts(0, 2), vec![0, 0]);
    }

    #[test]
    fn test_divide_covers_every_row_once() {
        let matrix = Array2::from_shape_fn((7, 2), |(r, c)| (r * 10 + c) as f64);
        let parts: Vec<_> = (0..3).map(|rank| divide_combinations(&matrix, rank, 3)).collect();
        assert_eq!(parts[0].nrows(), 3);
        assert_eq!(parts[1][[0, 0]], 30.0);
        assert_eq!(parts[2][[1, 1]], 61.0);
        assert_eq!(parts.iter().map(Array2::nrows).sum::<usize>(), 7);
    }

    #[test]
    fn test_prepend_index() {
        let matrix = Array2::from_shape_vec((2, 1), vec![5.0, 6.0]).unwrap();
        let indexed = prepend_index(&matrix);
        assert_eq!(indexed.row(1).to_vec(), vec![1.0, 6.0]);
    }
}
