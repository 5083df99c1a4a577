use thiserror::Error;

pub type LeadPulseResult<T> = Result<T, LeadPulseError>;

#[derive(Error, Debug)]
pub enum LeadPulseError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Upstream ledger error: {0}")]
    Upstream(String),

    #[error("Event storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
