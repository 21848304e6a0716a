//! Sweep definition and the single-round sweep driver.

use std::sync::Arc;

use ndarray::{Array2, s};
use rand::Rng;
use tracing::info;

use crate::aggregate::{
    aggregate_input_array, aggregate_results_array, create_global_output, local_input_array,
};
use crate::combination::{build_combinations, divide_combinations};
use crate::config::SweepOptions;
use crate::error::{Result, SweepError};
use crate::kernel::SweepKernel;
use crate::model::{
    InitializeFn, ModelFactory, ModelManager, OptimizeFn, OutputSpecs, OutputsFn, ProbeFn,
    SweepModel, SweepParamsFn,
};
use crate::output::{GlobalResultSet, WorkerResultSet};
use crate::parallel::{WorkDistributor, agree_on_outcome};
use crate::progress::{ProgressPublisher, ProgressSink};
use crate::sampling::{SamplingType, SweepParams};
use crate::writer::{NullWriter, ResultWriter, SaveRequest};

/// Replaces the built-in per-round kernel drive:
/// `(sweep params, outputs, local rows) -> local result set`
pub type CustomSweepFn<M> = Arc<
    dyn Fn(&SweepParams, Option<&OutputSpecs<M>>, &Array2<f64>) -> Result<WorkerResultSet>
        + Send
        + Sync,
>;

/// Everything needed to run a sweep on any worker. Cheap to clone.
pub struct SweepDefinition<M> {
    pub build_model: ModelFactory<M>,
    pub build_sweep_params: SweepParamsFn<M>,
    pub build_outputs: Option<OutputsFn<M>>,
    pub initialize: Option<InitializeFn<M>>,
    pub optimize: OptimizeFn<M>,
    pub probe: Option<ProbeFn<M>>,
    /// Used by the recursive driver instead of the kernel
    pub custom_sweep: Option<CustomSweepFn<M>>,
    pub options: SweepOptions,
    pub progress_sink: Option<Arc<dyn ProgressSink>>,
    pub writer: Arc<dyn ResultWriter>,
}

impl<M> Clone for SweepDefinition<M> {
    fn clone(&self) -> Self {
        Self {
            build_model: Arc::clone(&self.build_model),
            build_sweep_params: Arc::clone(&self.build_sweep_params),
            build_outputs: self.build_outputs.clone(),
            initialize: self.initialize.clone(),
            optimize: Arc::clone(&self.optimize),
            probe: self.probe.clone(),
            custom_sweep: self.custom_sweep.clone(),
            options: self.options.clone(),
            progress_sink: self.progress_sink.clone(),
            writer: Arc::clone(&self.writer),
        }
    }
}

impl<M: SweepModel + 'static> SweepDefinition<M> {
    pub fn new(
        build_model: impl Fn() -> M + Send + Sync + 'static,
        build_sweep_params: impl Fn(&M) -> SweepParams + Send + Sync + 'static,
        optimize: OptimizeFn<M>,
    ) -> Self {
        Self {
            build_model: Arc::new(build_model),
            build_sweep_params: Arc::new(build_sweep_params),
            build_outputs: None,
            initialize: None,
            optimize,
            probe: None,
            custom_sweep: None,
            options: SweepOptions::default(),
            progress_sink: None,
            writer: Arc::new(NullWriter),
        }
    }

    #[must_use]
    pub fn outputs(mut self, f: impl Fn(&M) -> Option<OutputSpecs<M>> + Send + Sync + 'static) -> Self {
        self.build_outputs = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn initialize(
        mut self,
        f: impl Fn(&mut M) -> std::result::Result<(), crate::error::ModelError> + Send + Sync + 'static,
    ) -> Self {
        self.initialize = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn probe(mut self, f: impl Fn(&M) -> bool + Send + Sync + 'static) -> Self {
        self.probe = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn custom_sweep(mut self, f: CustomSweepFn<M>) -> Self {
        self.custom_sweep = Some(f);
        self
    }

    #[must_use]
    pub fn options(mut self, options: SweepOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress_sink = Some(sink);
        self
    }

    #[must_use]
    pub fn writer(mut self, writer: Arc<dyn ResultWriter>) -> Self {
        self.writer = writer;
        self
    }
}

/// Sweep parameters and outputs declared against a freshly built model
pub(crate) struct Prepared<M> {
    pub model: M,
    pub params: SweepParams,
    pub sampling_type: SamplingType,
    pub outputs: Option<OutputSpecs<M>>,
}

impl<M: SweepModel> SweepDefinition<M> {
    pub(crate) fn prepare(&self) -> Result<Prepared<M>> {
        let model = (self.build_model)();
        let params = (self.build_sweep_params)(&model);
        let sampling_type = params.process()?;
        let outputs = self.build_outputs.as_ref().and_then(|f| f(&model));
        Ok(Prepared {
            model,
            params,
            sampling_type,
            outputs,
        })
    }

    pub(crate) fn model_manager(&self) -> ModelManager<M> {
        ModelManager::new(
            Arc::clone(&self.build_model),
            self.initialize.clone(),
            Arc::clone(&self.optimize),
            &self.options,
        )
    }

    pub(crate) fn progress_publisher(&self) -> Result<ProgressPublisher> {
        ProgressPublisher::new(
            self.options.publish_progress,
            self.options.publish_address.clone(),
            self.progress_sink.clone(),
        )
    }
}

/// Data returned to the caller of a sweep, on every worker
#[derive(Debug, Clone)]
pub struct SweepResult {
    /// Input rows `[rows x params]`
    pub global_values: Array2<f64>,
    /// Output rows `[rows x outputs]`
    pub global_results_arr: Array2<f64>,
    /// Authoritative on rank 0 only
    pub global_results: GlobalResultSet,
    /// Inputs and outputs side by side
    pub global: Array2<f64>,
}

impl SweepResult {
    pub(crate) fn from_request(request: &SaveRequest<'_>, global_values: Array2<f64>) -> Self {
        let global_results_arr = request.global_results_arr.clone();
        let global = SaveRequest {
            global_values: &global_values,
            ..*request
        }
        .global_save_data();
        Self {
            global_values,
            global_results_arr,
            global_results: request.global_results.clone(),
            global,
        }
    }
}

/// Build the combination matrix on the root and synchronise it to every
/// worker. A root-side sampling failure is reported on every worker.
pub fn build_and_distribute<D, R>(
    distributor: &D,
    params: &SweepParams,
    sampling_type: SamplingType,
    rng: &mut R,
    index_column: bool,
) -> Result<Array2<f64>>
where
    D: WorkDistributor + ?Sized,
    R: Rng + ?Sized,
{
    let built = distributor
        .is_root()
        .then(|| build_combinations(params, sampling_type, rng, index_column));

    let mut shape = match &built {
        Some(Ok(matrix)) => [matrix.nrows() as f64, matrix.ncols() as f64],
        Some(Err(_)) => [f64::NAN; 2],
        None => [0.0; 2],
    };
    distributor.sync_array_with_peers(&mut shape)?;

    let mut matrix = match built {
        Some(Err(e)) => return Err(e),
        Some(Ok(matrix)) => matrix,
        None if shape[0].is_nan() => {
            return Err(SweepError::Collective(
                "root failed to build the combination matrix".to_string(),
            ));
        }
        None => Array2::zeros((shape[0] as usize, shape[1] as usize)),
    };
    let Some(data) = matrix.as_slice_mut() else {
        return Err(SweepError::Shape(
            "combination matrix is not row-major".to_string(),
        ));
    };
    distributor.sync_array_with_peers(data)?;
    Ok(matrix)
}

/// Single-round sweep over the full combination matrix
pub struct ParameterSweep<'d, M, D: ?Sized> {
    definition: &'d SweepDefinition<M>,
    distributor: &'d D,
    manager: ModelManager<M>,
    progress: ProgressPublisher,
}

impl<'d, M, D> ParameterSweep<'d, M, D>
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
        })
    }

    #[must_use]
    pub fn manager(&self) -> &ModelManager<M> {
        &self.manager
    }

    /// Run one sweep. `num_samples` re-primes every parameter before
    /// sampling; `None` keeps the declared counts.
    pub fn run(&mut self, num_samples: Option<usize>) -> Result<SweepResult> {
        let options = &self.definition.options;
        let distributor = self.distributor;
        let rank = distributor.get_rank();

        let Prepared {
            mut params,
            mut sampling_type,
            outputs,
            ..
        } = self.definition.prepare()?;
        if let Some(n) = num_samples {
            params.reprime(n);
            sampling_type = params.process()?;
        }

        let mut rng = options.rng();
        let global_combinations = build_and_distribute(
            distributor,
            &params,
            sampling_type,
            &mut rng,
            options.index_global_combo_array,
        )?;
        let local_values =
            divide_combinations(&global_combinations, rank, distributor.worker_count());

        if distributor.is_root() {
            info!(
                rows = global_combinations.nrows(),
                workers = distributor.worker_count(),
                %sampling_type,
                "Starting parameter sweep"
            );
        }

        let outcome = SweepKernel::new(
            &mut self.manager,
            self.definition.probe.clone(),
            self.progress.clone(),
            options,
            rank,
        )
        .do_param_sweep(&params, outputs.as_ref(), &local_values);
        let local_results = agree_on_outcome(distributor, outcome)?;

        let (global_results, rows) = create_global_output(distributor, &local_results, None)?;
        let global_results_arr = aggregate_results_array(distributor, &global_results, rows)?;
        let global_values = aggregate_input_array(distributor, &global_results, rows)?;
        let local_inputs = local_input_array(&local_results);

        let request = SaveRequest {
            sweep_params: &params,
            local_values: Some(&local_inputs),
            global_values: &global_values,
            local_results: &local_results,
            global_results: &global_results,
            global_results_arr: &global_results_arr,
            rank,
        };
        request.validate()?;
        self.definition.writer.save_results(&request)?;

        if distributor.is_root() {
            info!(
                rows,
                successes = global_results.num_successful(),
                "Parameter sweep complete"
            );
        }

        let combinations = if options.index_global_combo_array {
            global_combinations.slice(s![.., 1..]).to_owned()
        } else {
            global_combinations
        };
        Ok(SweepResult::from_request(&request, combinations))
    }
}
