/// Boxed error carried by storage backends.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cannot update analyzer statuses of more than {max} projects")]
    TooManyProjectIds { max: usize },

    #[error("Storage error: {0}")]
    Storage(#[source] BoxError),

    /// Stored data the engine cannot interpret, such as an unknown analyzer
    /// type in a status row.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Wrap any backend error as a storage failure.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage(Box::new(err))
    }
}

/// Convenience alias used by the store traits and services.
pub type CoreResult<T> = Result<T, CoreError>;
