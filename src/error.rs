// Error taxonomy of the history store. Startup and workers use anyhow; store
// operations return these so callers can tell configuration problems from
// transient database failures.

use thiserror::Error;

/// The collection name for an identity cannot be generated with the current settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingError {
    #[error(
        "namespace '{namespace}' needs {size} bytes, more than the {budget} bytes available; \
         shorten the database prefix, service, collection prefix or entity identity"
    )]
    NamespaceTooLong {
        namespace: String,
        size: usize,
        budget: usize,
    },
    #[error(
        "only {available} bytes left for the collection name hash in database '{database}', \
         at least {required} are needed"
    )]
    HashBudgetTooSmall {
        database: String,
        available: i64,
        required: i64,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("collection name could not be generated: {0}")]
    Naming(#[from] NamingError),
    #[error("collection name hash collision for '{hash}'")]
    HashCollision { hash: String },
    #[error("collection '{namespace}' does not exist")]
    CollectionNotFound { namespace: String },
    #[error("invalid attribute value: {0}")]
    Validation(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("document (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Errors that mean "there is no history to read" rather than a failure.
    pub fn is_absent_history(&self) -> bool {
        matches!(
            self,
            StoreError::Naming(_) | StoreError::CollectionNotFound { .. }
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
