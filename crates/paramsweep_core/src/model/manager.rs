//! Owner of the single live model instance on a worker.
//!
//! The manager holds the model by value. A rebuild constructs a new instance
//! and replaces the old one wholesale; nothing else keeps a handle into it.
//! Recovery policy (when to rebuild, when to retry) belongs to the kernel.

use serde::Serialize;
use tracing::{trace, warn};

use crate::config::{SolverOptions, SweepOptions};
use crate::error::{Result, SweepError};
use crate::sampling::{SetMode, SweepParams};

use super::{ComponentKind, InitializeFn, ModelFactory, OptimizeFn, SweepModel};

/// Per-worker bookkeeping for the live model
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelState {
    /// Last combination row pushed into the model (index column included)
    pub current_values: Option<Vec<f64>>,
    pub is_initialized: bool,
    pub is_solved: bool,
    /// Solve status of the attempt before the most recent one
    pub is_prior_parameter_solved: bool,
    /// Total optimize calls since the manager was created
    pub solve_attempts: usize,
}

/// Push one combination row into a model.
///
/// `values` must not contain the index column. Each value is applied to the
/// parameter at the same position, according to its set mode.
pub fn apply_values<M: SweepModel + ?Sized>(
    model: &mut M,
    params: &SweepParams,
    values: &[f64],
) -> Result<()> {
    if values.len() != params.len() {
        return Err(SweepError::Shape(format!(
            "{} values for {} sweep parameters",
            values.len(),
            params.len()
        )));
    }

    for (spec, &value) in params.specs().zip(values) {
        let component = spec.locator.resolve(model)?;
        let name = component.name.as_str();
        match component.kind {
            ComponentKind::Variable => match spec.set_mode {
                SetMode::FixValue => model.fix(name, Some(value))?,
                SetMode::SetLowerBound => model.set_lower_bound(name, value)?,
                SetMode::SetUpperBound => model.set_upper_bound(name, value)?,
                SetMode::SetFixedState => {
                    if let Some(default) = spec.default_fixed_value {
                        model.fix(name, Some(default))?;
                    }
                    if value != 0.0 {
                        model.fix(name, None)?;
                    } else {
                        model.unfix(name)?;
                    }
                }
            },
            ComponentKind::Parameter => model.set_value(name, value)?,
            ComponentKind::Expression | ComponentKind::Objective => {
                return Err(SweepError::UnrecognizedComponent(component.name));
            }
        }
    }
    Ok(())
}

/// Build/initialize/update/solve state machine around one model instance
pub struct ModelManager<M> {
    factory: Option<ModelFactory<M>>,
    initialize: Option<InitializeFn<M>>,
    optimize: OptimizeFn<M>,
    solver_options: SolverOptions,
    tee: bool,
    update_before_init: bool,
    index_column: bool,
    model: Option<M>,
    state: ModelState,
}

impl<M: SweepModel> ModelManager<M> {
    /// Manager that builds its own model. Nothing is built until the first
    /// [`build_and_init`](Self::build_and_init).
    pub fn new(
        factory: ModelFactory<M>,
        initialize: Option<InitializeFn<M>>,
        optimize: OptimizeFn<M>,
        options: &SweepOptions,
    ) -> Self {
        Self {
            factory: Some(factory),
            initialize,
            optimize,
            solver_options: options.solver_options.clone(),
            tee: options.tee,
            update_before_init: options.update_sweep_params_before_init,
            index_column: options.index_global_combo_array,
            model: None,
            state: ModelState::default(),
        }
    }

    /// Manager around a caller-supplied model. Without a factory it can never
    /// rebuild, so every failure is final.
    pub fn from_model(
        model: M,
        initialized: bool,
        optimize: OptimizeFn<M>,
        options: &SweepOptions,
    ) -> Self {
        Self {
            factory: None,
            initialize: None,
            optimize,
            solver_options: options.solver_options.clone(),
            tee: options.tee,
            update_before_init: options.update_sweep_params_before_init,
            index_column: options.index_global_combo_array,
            model: Some(model),
            state: ModelState {
                is_initialized: initialized,
                ..ModelState::default()
            },
        }
    }

    #[must_use]
    pub fn rebuild_enabled(&self) -> bool {
        self.factory.is_some()
    }

    #[must_use]
    pub fn model(&self) -> Option<&M> {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> Option<&mut M> {
        self.model.as_mut()
    }

    /// Live model, or a configuration error when none has been built yet
    pub fn require_model(&self) -> Result<&M> {
        self.model
            .as_ref()
            .ok_or_else(|| SweepError::Config("no model has been built".to_string()))
    }

    fn require_model_mut(&mut self) -> Result<&mut M> {
        self.model
            .as_mut()
            .ok_or_else(|| SweepError::Config("no model has been built".to_string()))
    }

    #[must_use]
    pub fn state(&self) -> &ModelState {
        &self.state
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.is_initialized
    }

    #[must_use]
    pub fn is_solved(&self) -> bool {
        self.state.is_solved
    }

    #[must_use]
    pub fn is_prior_parameter_solved(&self) -> bool {
        self.state.is_prior_parameter_solved
    }

    #[must_use]
    pub fn solve_attempts(&self) -> usize {
        self.state.solve_attempts
    }

    #[must_use]
    pub fn current_values(&self) -> Option<&[f64]> {
        self.state.current_values.as_deref()
    }

    fn strip_index<'a>(&self, row: &'a [f64]) -> &'a [f64] {
        if self.index_column && !row.is_empty() {
            &row[1..]
        } else {
            row
        }
    }

    /// Discard the current model, build a fresh one and initialize it.
    ///
    /// With `update_sweep_params_before_init` the row is applied before the
    /// initializer runs. An initializer failure is logged and leaves the
    /// manager uninitialized so the kernel rebuilds on the next sample.
    pub fn build_and_init(&mut self, params: &SweepParams, row: Option<&[f64]>) -> Result<()> {
        let Some(factory) = self.factory.as_ref() else {
            return Err(SweepError::Config(
                "model rebuild requested without a model factory".to_string(),
            ));
        };
        let mut model = factory();

        if self.update_before_init
            && let Some(row) = row
        {
            apply_values(&mut model, params, self.strip_index(row))?;
        }

        let initialized = match self.initialize.as_ref() {
            Some(initialize) => match initialize(&mut model) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Model initialization failed");
                    false
                }
            },
            None => true,
        };

        self.model = Some(model);
        self.state.is_initialized = initialized;
        self.state.is_solved = false;
        self.state.current_values = row.map(<[f64]>::to_vec);
        Ok(())
    }

    /// Apply one combination row (index column included when enabled).
    pub fn update_model_params(&mut self, params: &SweepParams, row: &[f64]) -> Result<()> {
        let values = self.strip_index(row).to_vec();
        apply_values(self.require_model_mut()?, params, &values)?;
        self.state.current_values = Some(row.to_vec());
        Ok(())
    }

    /// Apply a row without recording it as the current parameter vector, so
    /// rejected samples still report the values they were meant to run.
    pub fn stage_values(&mut self, params: &SweepParams, row: &[f64]) -> Result<()> {
        let values = self.strip_index(row).to_vec();
        apply_values(self.require_model_mut()?, params, &values)
    }

    /// Run the optimize function once and record the outcome.
    ///
    /// A raised error counts as a failed solve. Returns the new solved flag.
    pub fn solve_model(&mut self) -> bool {
        self.state.is_prior_parameter_solved = self.state.is_solved;
        self.state.solve_attempts += 1;

        let solved = match self.model.as_mut() {
            Some(model) => match (self.optimize)(model, &self.solver_options, self.tee) {
                Ok(termination) => termination.is_optimal(),
                Err(e) => {
                    trace!(error = %e, "Optimize raised");
                    false
                }
            },
            None => false,
        };
        self.state.is_solved = solved;
        solved
    }
}
