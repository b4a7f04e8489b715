//! Error types for the migration applicator

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for migration operations
pub type Result<T> = std::result::Result<T, MigrateError>;

/// Errors that can occur while discovering or applying migrations
#[derive(Debug, Error)]
pub enum MigrateError {
    /// The migrations directory does not exist
    #[error("migrations directory not found: {0}")]
    DirNotFound(PathBuf),

    /// The directory holds no migration files
    #[error("no migration files found in {0}")]
    Empty(PathBuf),

    /// Reading a migration file or directory failed
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Two files claim the same version number
    #[error("duplicate migration version {version}: `{first}` and `{second}`")]
    DuplicateVersion {
        version: i64,
        first: String,
        second: String,
    },

    /// The connection descriptor did not resolve
    #[error("invalid connection descriptor: {0}")]
    ConnInfo(#[from] ingot_core::conninfo::ConnInfoError),

    /// Database error outside a specific migration script
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A migration script failed to apply
    #[error("migration `{name}` failed: {source}")]
    Apply {
        name: String,
        #[source]
        source: sqlx::Error,
    },
}
