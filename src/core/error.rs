//! Error types for AgisFL.

use thiserror::Error;

/// Result type alias for AgisFL operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while coordinating federated rounds.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Invalid privacy budget: epsilon must be positive, got {0}")]
    InvalidPrivacyBudget(f64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    // Registry errors
    #[error("Node already registered: {0}")]
    DuplicateNode(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    // Training errors
    #[error("No training data bound to node {0}")]
    NoTrainingData(String),

    #[error("Local training failed on node {node_id}: {reason}")]
    TrainerFailed { node_id: String, reason: String },

    #[error("Invalid update from node {node_id}: {reason}")]
    InvalidUpdate { node_id: String, reason: String },

    // Round errors
    #[error("Insufficient nodes: need {needed}, got {actual}")]
    InsufficientNodes { needed: usize, actual: usize },

    #[error("No updates available for aggregation")]
    EmptyAggregation,

    // Channel errors
    #[error("Malformed ciphertext: {len} bytes is not a multiple of {width}")]
    MalformedCiphertext { len: usize, width: usize },

    #[error("No channel key for node {0}")]
    MissingChannelKey(String),

    // Scheduler errors
    #[error("Scheduler is already running")]
    SchedulerRunning,

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error stems from invalid configuration or input shape.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidPrivacyBudget(_)
                | Error::InvalidConfig(_)
                | Error::DimensionMismatch { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
