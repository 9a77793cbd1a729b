use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MirrorError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Malformed transaction record: {0}")]
    MalformedRecord(String),

    #[error("Batch of {requested} items exceeds the limit of {limit}")]
    BatchLimitExceeded { limit: usize, requested: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("{0}")]
    Unknown(String),
}

impl MirrorError {
    /// Coarse failure class reported across the gateway boundary.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::NotFound(_) => FailureKind::NotFound,
            Self::ConstraintViolation(_) | Self::TypeMismatch(_) | Self::BatchLimitExceeded { .. } => {
                FailureKind::ConstraintViolation
            }
            Self::TransportFailure(_) => FailureKind::TransportFailure,
            Self::MalformedRecord(_) | Self::Config(_) | Self::LockError(_) | Self::Unknown(_) => {
                FailureKind::Unknown
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    ConstraintViolation,
    TransportFailure,
    Unknown,
}

pub type Result<T> = std::result::Result<T, MirrorError>;

impl<T> From<std::sync::PoisonError<T>> for MirrorError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for MirrorError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedRecord(err.to_string())
    }
}
