//! Error types for the tenant store.

use std::path::PathBuf;

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The tenant directory could not be created.
    #[error("failed to create tenant directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Opening the database failed.
    #[error("database connection failed: {0}")]
    Connection(#[source] sqlx::Error),

    /// Applying the schema failed.
    #[error("schema setup failed: {0}")]
    Schema(#[source] sqlx::Error),

    /// A query failed to execute.
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// A stored row could not be decoded.
    #[error("corrupt row: {reason}")]
    Corrupt { reason: String },
}
