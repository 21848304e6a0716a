//! Boundary between the sweep engine and the numerical model it drives.
//!
//! The engine never owns model semantics. It only needs to resolve dotted
//! component names, push sweep values into variables and parameters, read
//! values back, and hand the model to user-supplied build, initialize,
//! optimize and probe behaviors. Those behaviors are stored function values
//! so they can be shared across worker threads.

mod manager;

pub use manager::{ModelManager, ModelState, apply_values};

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::SolverOptions;
use crate::error::ModelError;
use crate::sampling::SweepParams;

/// Kind of a model component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentKind {
    Variable,
    Parameter,
    Expression,
    Objective,
}

/// Resolved description of a model component
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Fully qualified name, stable across rebuilds
    pub name: String,
    pub kind: ComponentKind,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    pub units: Option<String>,
}

impl Component {
    pub fn new(name: impl Into<String>, kind: ComponentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            lower_bound: None,
            upper_bound: None,
            units: None,
        }
    }
}

/// A numerical model that can be swept.
///
/// All mutators address components by their full name, so the engine never
/// holds a handle into a model instance that a rebuild could invalidate.
pub trait SweepModel {
    /// Look up a component by its dotted name.
    fn find_component(&self, name: &str) -> Option<Component>;

    /// Look up one element of an indexed component. `None` selects the
    /// element stored under the `None` index.
    fn find_indexed(&self, _name: &str, _index: Option<&str>) -> Option<Component> {
        None
    }

    /// Current value of a variable, parameter, expression or objective.
    fn value(&self, name: &str) -> Result<f64, ModelError>;

    /// Set the value of a mutable parameter.
    fn set_value(&mut self, name: &str, value: f64) -> Result<(), ModelError>;

    /// Fix a variable, optionally at a new value.
    fn fix(&mut self, name: &str, value: Option<f64>) -> Result<(), ModelError>;

    fn unfix(&mut self, name: &str) -> Result<(), ModelError>;

    fn set_lower_bound(&mut self, name: &str, value: f64) -> Result<(), ModelError>;

    fn set_upper_bound(&mut self, name: &str, value: f64) -> Result<(), ModelError>;

    /// Every active variable, expression, objective and parameter.
    fn active_components(&self) -> Vec<Component>;
}

/// Dotted path to a model variable or parameter.
///
/// A literal `[None]` segment is stripped and resolved through
/// [`SweepModel::find_indexed`] with the `None` index, since indexed
/// components holding only a `None` index do not resolve by plain name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

const NONE_INDEX: &str = "[None]";

impl Locator {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.0
    }

    pub fn resolve<M: SweepModel + ?Sized>(&self, model: &M) -> Result<Component, ModelError> {
        let found = if self.0.contains(NONE_INDEX) {
            let stripped = self.0.replace(NONE_INDEX, "");
            model.find_indexed(&stripped, None)
        } else {
            model.find_component(&self.0)
        };
        found.ok_or_else(|| ModelError::ComponentNotFound(self.0.clone()))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Locator {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Termination condition reported by an optimize function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationCondition {
    Optimal,
    Infeasible,
    IterationLimit,
    Other(String),
}

impl TerminationCondition {
    #[must_use]
    pub fn is_optimal(&self) -> bool {
        matches!(self, TerminationCondition::Optimal)
    }
}

/// Builds a fresh model instance
pub type ModelFactory<M> = Arc<dyn Fn() -> M + Send + Sync>;

/// `(model, solver options, tee) -> termination condition`; a raised error
/// counts as a failed solve
pub type OptimizeFn<M> = Arc<
    dyn Fn(&mut M, &SolverOptions, bool) -> Result<TerminationCondition, ModelError> + Send + Sync,
>;

/// Initializes a freshly built model
pub type InitializeFn<M> = Arc<dyn Fn(&mut M) -> Result<(), ModelError> + Send + Sync>;

/// Cheap feasibility check run before a solve
pub type ProbeFn<M> = Arc<dyn Fn(&M) -> bool + Send + Sync>;

/// Declares the sweep parameters against a model
pub type SweepParamsFn<M> = Arc<dyn Fn(&M) -> SweepParams + Send + Sync>;

/// Declares the outputs to record; `None` captures every active component
pub type OutputsFn<M> = Arc<dyn Fn(&M) -> Option<OutputSpecs<M>> + Send + Sync>;

/// Computes an output that is not a named component
pub type DerivedFn<M> = Arc<dyn Fn(&M) -> Result<f64, ModelError> + Send + Sync>;

/// Where an output value comes from
pub enum OutputSource<M> {
    Component(Locator),
    /// Registered under `_parameter_sweep_expressions[<short name>]`
    Derived(DerivedFn<M>),
}

impl<M> Clone for OutputSource<M> {
    fn clone(&self) -> Self {
        match self {
            OutputSource::Component(locator) => OutputSource::Component(locator.clone()),
            OutputSource::Derived(f) => OutputSource::Derived(Arc::clone(f)),
        }
    }
}

impl<M> fmt::Debug for OutputSource<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputSource::Component(locator) => write!(f, "Component({locator})"),
            OutputSource::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

/// Ordered `(short name, source)` pairs
pub type OutputSpecs<M> = Vec<(String, OutputSource<M>)>;
