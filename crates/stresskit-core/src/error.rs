use thiserror::Error;

/// Errors raised by a load target while load is being applied.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TargetError {
    /// The system under test stopped responding entirely.
    #[error("target crashed: {message}")]
    Crashed {
        /// Description of the observed crash.
        message: String,
    },

    /// A single operation against the target failed.
    #[error("operation failed: {0}")]
    Operation(String),

    /// The target did not answer in time.
    #[error("operation timed out after {0} ms")]
    Timeout(u64),
}

impl TargetError {
    /// Creates a `Crashed` variant.
    #[must_use]
    pub fn crashed(message: impl Into<String>) -> Self {
        Self::Crashed {
            message: message.into(),
        }
    }

    /// Returns true if this error means the target is gone.
    #[must_use]
    pub fn is_crash(&self) -> bool {
        matches!(self, Self::Crashed { .. })
    }
}

/// A metrics source could not produce a snapshot.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("metrics source unavailable: {0}")]
pub struct SourceError(pub String);

/// Canonical error type for harness operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// `run_all` was invoked while another suite run was in flight.
    #[error("stress suite is already running")]
    AlreadyRunning,

    /// The run was cancelled through its cancellation token.
    #[error("stress run cancelled")]
    Cancelled,

    /// No scenario with this identifier is registered.
    #[error("scenario `{0}` is not registered")]
    UnknownScenario(String),

    /// A scenario definition is inconsistent.
    #[error("scenario `{id}` is invalid: {message}")]
    InvalidScenario {
        /// Identifier of the offending scenario.
        id: String,
        /// Human-readable explanation.
        message: String,
    },

    /// Harness configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The system under test failed outside of breaking-point detection.
    #[error("target error: {0}")]
    Target(#[from] TargetError),

    /// Memory or cpu pressure could not be applied.
    #[error("resource pressure failed: {0}")]
    ResourcePressure(String),

    /// I/O error while writing reports.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Report serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl HarnessError {
    /// Creates an `InvalidScenario` variant.
    #[must_use]
    pub fn invalid_scenario(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidScenario {
            id: id.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::fmt::Error> for HarnessError {
    fn from(err: std::fmt::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for HarnessError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Convenient result alias for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;
