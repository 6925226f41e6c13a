use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[cfg(any(feature = "database-mysql", feature = "database-sqlite"))]
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Cannot decode column '{column}': {message}")]
    Decode { column: String, message: String },

    #[error("Statement matched no rows")]
    NoRowsAffected,

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
