use thiserror::Error;

/// A parameter set or criteria that cannot be swept.
///
/// Always raised before the page is touched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("parameter set is empty")]
    EmptyParameterSet,

    #[error("parameter name must not be empty")]
    EmptyName,

    #[error("duplicate parameter name: {0}")]
    DuplicateName(String),

    #[error("parameter {name}: min, max and step must be finite")]
    NonFinite { name: String },

    #[error("parameter {name}: min {min} exceeds max {max}")]
    InvertedRange { name: String, min: f64, max: f64 },

    #[error("parameter {name}: step must be positive, got {step}")]
    NonPositiveStep { name: String, step: f64 },

    #[error("parameter {name}: more than {limit} candidates")]
    TooManyCandidates { name: String, limit: usize },

    #[error("criteria field {0} must be finite and non-negative where applicable")]
    InvalidCriteria(&'static str),
}

/// Fatal outcome of an `optimize` call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizeError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    #[error("another run is already driving the page")]
    RunInProgress,
}

/// Failure of a single collaborator step. Absorbed during a sweep.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    #[error("input control {name} not found")]
    ControlNotFound { name: String },

    #[error("apply control not found")]
    ApplyNotFound,

    #[error("results region not rendered")]
    ResultsUnavailable,

    #[error("{what} timed out after {after_ms} ms")]
    Timeout { what: String, after_ms: u64 },

    #[error("bridge: {0}")]
    Bridge(String),
}

/// Replaying the winning inputs stopped part way.
///
/// Parameters applied before the failing one stay applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApplyBestError {
    #[error("applying {parameter} failed: {source}")]
    Step {
        parameter: String,
        #[source]
        source: StepError,
    },

    #[error("value for {parameter} is not a finite number")]
    InvalidValue { parameter: String },

    #[error("another run is already driving the page")]
    RunInProgress,
}

impl ApplyBestError {
    /// Name of the parameter that failed, when the failure is tied to one.
    pub fn parameter(&self) -> Option<&str> {
        match self {
            Self::Step { parameter, .. } | Self::InvalidValue { parameter } => Some(parameter),
            Self::RunInProgress => None,
        }
    }
}
