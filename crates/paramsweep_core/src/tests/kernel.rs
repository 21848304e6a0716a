//! Tests for the per-sample kernel
//!
//! These tests verify:
//! - A rejecting probe marks the row failed without solving
//! - One rebuild-and-retry after a failure that follows a success
//! - No retry when the model cannot be rebuilt
//! - Reinitialization only when the row changes
//! - Output harvest on success and failure
//! - Progress events per sample

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::channel;

use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::combination::build_combinations;
use crate::config::SweepOptions;
use crate::error::{ModelError, SweepError};
use crate::kernel::SweepKernel;
use crate::model::{ModelManager, OptimizeFn, OutputSource, OutputSpecs, ProbeFn, SweepModel};
use crate::output::DERIVED_OUTPUT_PREFIX;
use crate::progress::{ChannelProgressSink, ProgressPublisher, ProgressSink};
use crate::sampling::{SampleSpec, SweepParams};

use super::test_model::{TestModel, drifting_optimize_fn, limited_optimize_fn, optimize_fn};

fn x_params(lower: f64, upper: f64, n: usize) -> SweepParams {
    SweepParams::new().with("x", SampleSpec::linear("fs.x", lower, upper, n))
}

fn matrix(params: &SweepParams) -> Array2<f64> {
    let sampling_type = params.process().unwrap();
    build_combinations(params, sampling_type, &mut StdRng::seed_from_u64(0), false).unwrap()
}

/// Manager whose factory counts the models it builds
fn counting_manager(
    optimize: OptimizeFn<TestModel>,
    options: &SweepOptions,
) -> (ModelManager<TestModel>, Arc<AtomicUsize>) {
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&builds);
    let manager = ModelManager::new(
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            TestModel::new()
        }),
        None,
        optimize,
        options,
    );
    (manager, builds)
}

#[test]
fn test_probe_rejection_skips_solve_and_keeps_inputs() {
    let options = SweepOptions::default();
    let (mut manager, _) = counting_manager(optimize_fn(), &options);
    let params = x_params(0.0, 10.0, 3);
    let probe: ProbeFn<TestModel> =
        Arc::new(|m: &TestModel| m.value("fs.x").is_ok_and(|x| x <= 5.0));

    let results = SweepKernel::new(
        &mut manager,
        Some(probe),
        ProgressPublisher::disabled(),
        &options,
        0,
    )
    .do_param_sweep(&params, None, &matrix(&params))
    .unwrap();

    assert_eq!(results.solve_successful, vec![true, true, false]);
    // Rejected row never reached the optimizer
    assert_eq!(manager.solve_attempts(), 2);
    assert_eq!(
        results.sweep_params.get("x").unwrap().value,
        vec![0.0, 5.0, 10.0]
    );
    // Output that is also a sweep input still records its value
    assert_eq!(results.outputs.get("x").unwrap().value[2], 10.0);
    assert!(results.outputs.get("fs.y").unwrap().value[2].is_nan());
}

#[test]
fn test_retry_after_rebuild_recovers_drift() {
    let options = SweepOptions::default();
    let (mut manager, builds) = counting_manager(drifting_optimize_fn(1), &options);
    let params = x_params(1.0, 4.0, 4);

    let results = SweepKernel::new(&mut manager, None, ProgressPublisher::disabled(), &options, 0)
        .do_param_sweep(&params, None, &matrix(&params))
        .unwrap();

    assert_eq!(results.solve_successful, vec![true; 4]);
    // One solve for the first row, then fail + retry on each later row
    assert_eq!(manager.solve_attempts(), 7);
    assert_eq!(builds.load(Ordering::SeqCst), 4);
}

#[test]
fn test_no_retry_without_factory() {
    let options = SweepOptions::default();
    let mut manager =
        ModelManager::from_model(TestModel::new(), true, drifting_optimize_fn(1), &options);
    let params = x_params(1.0, 4.0, 4);

    let results = SweepKernel::new(&mut manager, None, ProgressPublisher::disabled(), &options, 0)
        .do_param_sweep(&params, None, &matrix(&params))
        .unwrap();

    assert_eq!(results.solve_successful, vec![true, false, false, false]);
    assert_eq!(manager.solve_attempts(), 4);
}

#[test]
fn test_no_retry_when_prior_row_failed() {
    let options = SweepOptions::default();
    let (mut manager, builds) = counting_manager(limited_optimize_fn(2.0), &options);
    let params = x_params(1.0, 4.0, 4);

    let results = SweepKernel::new(&mut manager, None, ProgressPublisher::disabled(), &options, 0)
        .do_param_sweep(&params, None, &matrix(&params))
        .unwrap();

    assert_eq!(results.solve_successful, vec![true, true, false, false]);
    // Row 3 fails after a success and is retried once; row 4 follows a failure
    assert_eq!(manager.solve_attempts(), 5);
    assert_eq!(builds.load(Ordering::SeqCst), 2);
}

#[test]
fn test_initialize_before_sweep_rebuilds_on_changed_rows() {
    let options = SweepOptions {
        initialize_before_sweep: true,
        ..Default::default()
    };
    let (mut manager, builds) = counting_manager(optimize_fn(), &options);
    let params = SweepParams::new().with(
        "x",
        SampleSpec::predetermined_fixed("fs.x", vec![1.0, 2.0, 2.0, 3.0]),
    );

    let results = SweepKernel::new(&mut manager, None, ProgressPublisher::disabled(), &options, 0)
        .do_param_sweep(&params, None, &matrix(&params))
        .unwrap();

    assert_eq!(results.num_successful(), 4);
    // Initial build covers row 1; rows 2 and 4 change the values
    assert_eq!(builds.load(Ordering::SeqCst), 3);
}

#[test]
fn test_failed_rows_record_nan_outputs() {
    let options = SweepOptions::default();
    let (mut manager, _) = counting_manager(limited_optimize_fn(5.0), &options);
    let params = x_params(0.0, 10.0, 3);

    let results = SweepKernel::new(&mut manager, None, ProgressPublisher::disabled(), &options, 0)
        .do_param_sweep(&params, None, &matrix(&params))
        .unwrap();

    assert_eq!(results.solve_successful, vec![true, true, false]);
    let y = &results.outputs.get("fs.y").unwrap().value;
    assert_eq!(y[..2], [1.0, 11.0]);
    assert!(y[2].is_nan());
    assert!(results.outputs.get("fs.sum").unwrap().value[2].is_nan());
    assert_eq!(results.outputs.get("x").unwrap().value, vec![0.0, 5.0, 10.0]);

    // Every active component is captured, the swept one under its short name
    let names: Vec<&str> = results.outputs.names().collect();
    assert_eq!(
        names,
        vec!["x", "fs.y", "fs.a", "fs.b[None]", "fs.sum", "fs.ratio", "fs.obj"]
    );
    assert_eq!(results.outputs.get("x").unwrap().units, "m");
    assert_eq!(results.outputs.get("fs.y").unwrap().units, "None");
}

#[test]
fn test_requested_outputs_and_derived_values() {
    let options = SweepOptions::default();
    let (mut manager, _) = counting_manager(optimize_fn(), &options);
    let params = SweepParams::new()
        .with("x", SampleSpec::predetermined_fixed("fs.x", vec![2.0]))
        .with("a", SampleSpec::predetermined_fixed("fs.a", vec![1.0, 0.0]));
    let outputs: OutputSpecs<TestModel> = vec![
        (
            "ratio".to_string(),
            OutputSource::Component("fs.ratio".into()),
        ),
        (
            "double_y".to_string(),
            OutputSource::Derived(Arc::new(|m: &TestModel| -> Result<f64, ModelError> {
                Ok(2.0 * m.value("fs.y")?)
            })),
        ),
    ];

    let results = SweepKernel::new(&mut manager, None, ProgressPublisher::disabled(), &options, 0)
        .do_param_sweep(&params, Some(&outputs), &matrix(&params))
        .unwrap();

    assert_eq!(results.solve_successful, vec![true, true]);
    let ratio = &results.outputs.get("ratio").unwrap().value;
    assert_eq!(ratio[0], 5.0);
    // Not evaluable with a == 0: value left at its default
    assert_eq!(ratio[1], 0.0);

    let double_y = results.outputs.get("double_y").unwrap();
    assert_eq!(double_y.value, vec![10.0, 8.0]);
    assert_eq!(
        double_y.full_name,
        format!("{DERIVED_OUTPUT_PREFIX}[double_y]")
    );
}

#[test]
fn test_unrecognized_target_fails_fast() {
    let options = SweepOptions::default();
    let (mut manager, _) = counting_manager(optimize_fn(), &options);
    let params = SweepParams::new().with("sum", SampleSpec::linear("fs.sum", 0.0, 1.0, 2));

    let err = SweepKernel::new(&mut manager, None, ProgressPublisher::disabled(), &options, 0)
        .do_param_sweep(&params, None, &matrix(&params))
        .unwrap_err();
    assert!(matches!(err, SweepError::UnrecognizedComponent(_)));
}

#[test]
fn test_progress_event_per_sample() {
    let options = SweepOptions::default();
    let (mut manager, _) = counting_manager(limited_optimize_fn(5.0), &options);
    let params = x_params(0.0, 10.0, 3);
    let (tx, rx) = channel();
    let sink: Arc<dyn ProgressSink> = Arc::new(ChannelProgressSink::new(tx));
    let progress = ProgressPublisher::new(true, "http://localhost:8888", Some(sink)).unwrap();

    SweepKernel::new(&mut manager, None, progress, &options, 3)
        .do_param_sweep(&params, None, &matrix(&params))
        .unwrap();

    let events: Vec<_> = rx.try_iter().map(|(_, event)| event).collect();
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.worker_number == 3));
    assert_eq!(
        events.iter().map(|e| e.iteration).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(
        events.iter().map(|e| e.solve_status).collect::<Vec<_>>(),
        vec![true, true, false]
    );
}

#[test]
fn test_zero_rows_still_builds_skeleton() {
    let options = SweepOptions::default();
    let (mut manager, builds) = counting_manager(optimize_fn(), &options);
    let params = x_params(0.0, 1.0, 2);
    let empty = Array2::<f64>::zeros((0, 1));

    let results = SweepKernel::new(&mut manager, None, ProgressPublisher::disabled(), &options, 1)
        .do_param_sweep(&params, None, &empty)
        .unwrap();

    assert_eq!(results.num_rows(), 0);
    assert_eq!(results.sweep_params.len(), 1);
    assert_eq!(builds.load(Ordering::SeqCst), 1);
}
