//! CSV persistence for finished sweeps.
//!
//! Rank 0 writes the global inputs and outputs side by side. When a debug
//! directory is set, every worker also writes its own rows to
//! `local_results_<rank>.csv`.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView2};
use paramsweep_core::{ResultWriter, SaveRequest, SweepError};
use tracing::{debug, info};

/// Writes `.csv` files with a `# name,name,...` header and `%.6e` values
#[derive(Debug, Clone)]
pub struct CsvWriter {
    results_file: Option<PathBuf>,
    debug_dir: Option<PathBuf>,
}

impl CsvWriter {
    pub fn new(results_file: Option<PathBuf>, debug_dir: Option<PathBuf>) -> Self {
        Self {
            results_file,
            debug_dir,
        }
    }

    fn write_local(&self, dir: &Path, request: &SaveRequest<'_>) -> std::io::Result<()> {
        let Some(local_values) = request.local_values else {
            return Ok(());
        };
        fs::create_dir_all(dir)?;

        let outputs = &request.local_results.outputs;
        let rows = local_values.nrows();
        let data = Array2::from_shape_fn((rows, local_values.ncols() + outputs.len()), |(r, c)| {
            if c < local_values.ncols() {
                local_values[[r, c]]
            } else {
                outputs
                    .records()
                    .nth(c - local_values.ncols())
                    .and_then(|record| record.value.get(r).copied())
                    .unwrap_or(f64::NAN)
            }
        });

        let header = header(request, outputs.names());
        let path = dir.join(format!("local_results_{:03}.csv", request.rank));
        write_csv(&path, &header, data.view(), ", ")?;
        debug!(rank = request.rank, path = %path.display(), "Wrote local results");
        Ok(())
    }
}

fn header<'a>(request: &'a SaveRequest<'_>, outputs: impl Iterator<Item = &'a str>) -> String {
    request
        .sweep_params
        .names()
        .chain(outputs)
        .collect::<Vec<_>>()
        .join(",")
}

fn write_csv(
    path: &Path,
    header: &str,
    data: ArrayView2<'_, f64>,
    delimiter: &str,
) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "# {header}")?;
    for row in data.rows() {
        let line = row
            .iter()
            .map(|v| format!("{v:.6e}"))
            .collect::<Vec<_>>()
            .join(delimiter);
        writeln!(out, "{line}")?;
    }
    out.flush()
}

fn writer_error(path: &Path, e: std::io::Error) -> SweepError {
    SweepError::Writer(format!("{}: {e}", path.display()))
}

impl ResultWriter for CsvWriter {
    fn save_results(&self, request: &SaveRequest<'_>) -> paramsweep_core::Result<()> {
        if let Some(dir) = &self.debug_dir {
            self.write_local(dir, request)
                .map_err(|e| writer_error(dir, e))?;
        }

        if request.rank != 0 {
            return Ok(());
        }
        let Some(path) = &self.results_file else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| writer_error(parent, e))?;
        }

        let header = header(request, request.global_results.outputs.names());
        let data = request.global_save_data();
        write_csv(path, &header, data.view(), ",").map_err(|e| writer_error(path, e))?;
        info!(path = %path.display(), rows = data.nrows(), "Wrote sweep results");
        Ok(())
    }
}
