use thiserror::Error;

/// Errors raised by a document store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("BSON: {0}")]
    Bson(#[from] bson::error::Error),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Update error: {0}")]
    UpdateError(String),

    #[error("Unsupported pipeline stage: {0}")]
    UnsupportedStage(String),

    #[error("Duplicate key on {collection}.{field}: {key}")]
    DuplicateKey { collection: String, field: String, key: String },

    #[error("Snapshot error: {0}")]
    SnapshotError(String),

    #[error("deadline exceeded")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Errors surfaced by the generic repository.
///
/// `Persistence` wraps backend failures exactly once; the repository never retries.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("document not found in collection {collection}")]
    NotFound { collection: String },

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}

impl RepositoryError {
    pub(crate) fn not_found(collection: &str) -> Self {
        Self::NotFound { collection: collection.to_string() }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub const fn is_invalid_identifier(&self) -> bool {
        matches!(self, Self::InvalidIdentifier(_))
    }

    #[must_use]
    pub const fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

impl From<bson::error::Error> for RepositoryError {
    fn from(e: bson::error::Error) -> Self {
        Self::Persistence(StoreError::Bson(e))
    }
}
