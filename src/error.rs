use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum DbError {
    #[error("network error: {0}")]
    Network(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("lock timeout")]
    LockTimeout,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("cluster error: {0}")]
    Cluster(String),

    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, DbError>;

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}
