use std::fmt;

/// Errors reported by a model at the sweep boundary
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// No component with this name exists on the model
    ComponentNotFound(String),
    /// The component exists but its value cannot be computed
    NotEvaluable(String),
    /// The optimizer raised instead of reporting a termination condition
    Solve(String),
    /// The user initialization routine failed
    Initialization(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::ComponentNotFound(name) => write!(f, "component {name} not found"),
            ModelError::NotEvaluable(name) => write!(f, "component {name} cannot be evaluated"),
            ModelError::Solve(msg) => write!(f, "solve failed: {msg}"),
            ModelError::Initialization(msg) => write!(f, "initialization failed: {msg}"),
        }
    }
}

impl std::error::Error for ModelError {}

/// Errors raised by the sweep engine
#[derive(Debug, Clone)]
pub enum SweepError {
    /// Configuration error
    Config(String),
    /// Sweep parameters declare more than one sampling type
    MixedSamplingTypes,
    /// Sampling type tag could not be parsed
    UnknownSamplingType(String),
    /// Parameters that must share one sample count do not
    SampleCountMismatch {
        parameter: String,
        expected: usize,
        found: usize,
    },
    /// Distribution parameters rejected by the sampler
    InvalidDistribution {
        parameter: String,
        reason: &'static str,
    },
    Model(ModelError),
    /// Target is neither a variable nor a parameter
    UnrecognizedComponent(String),
    /// Progress publication requested without a transport
    ProgressTransportUnavailable,
    /// Collective operation failed (size mismatch, missing buffer, worker panic)
    Collective(String),
    /// Array shapes do not line up
    Shape(String),
    /// Result writer failed or rejected its input
    Writer(String),
}

impl fmt::Display for SweepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepError::Config(msg) => write!(f, "configuration error: {msg}"),
            SweepError::MixedSamplingTypes => write!(f, "cannot mix sampling types"),
            SweepError::UnknownSamplingType(tag) => write!(f, "unknown sampling type: {tag}"),
            SweepError::SampleCountMismatch {
                parameter,
                expected,
                found,
            } => write!(
                f,
                "sweep parameter {parameter} has {found} samples but {expected} were expected"
            ),
            SweepError::InvalidDistribution { parameter, reason } => {
                write!(f, "invalid sampling for {parameter}: {reason}")
            }
            SweepError::Model(e) => write!(f, "{e}"),
            SweepError::UnrecognizedComponent(name) => {
                write!(f, "unrecognized model object {name}")
            }
            SweepError::ProgressTransportUnavailable => write!(
                f,
                "progress publication is enabled but no progress transport is installed"
            ),
            SweepError::Collective(msg) => write!(f, "collective operation failed: {msg}"),
            SweepError::Shape(msg) => write!(f, "shape mismatch: {msg}"),
            SweepError::Writer(msg) => write!(f, "result writer error: {msg}"),
        }
    }
}

impl std::error::Error for SweepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SweepError::Model(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ModelError> for SweepError {
    fn from(e: ModelError) -> Self {
        SweepError::Model(e)
    }
}

impl From<ndarray::ShapeError> for SweepError {
    fn from(e: ndarray::ShapeError) -> Self {
        SweepError::Shape(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SweepError>;
