//! Error types for ephemeral instance management

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for instance operations
pub type Result<T> = std::result::Result<T, PgError>;

/// Errors that can occur while managing an ephemeral PostgreSQL instance
#[derive(Debug, Error)]
pub enum PgError {
    /// The probe bind for a free local port failed
    #[error("failed to allocate a local port: {0}")]
    PortAlloc(std::io::Error),

    /// A PostgreSQL binary could not be launched
    #[error("failed to run `{binary}`: {source}. Is PostgreSQL installed?")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The data directory could not be prepared
    #[error("failed to prepare data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `initdb` exited with a failure
    #[error("initdb failed (exit {code}):\n{output}")]
    InitFailed { code: i32, output: String },

    /// The server exited or timed out before reporting ready
    #[error("postgres failed to start (exit {code}):\n{output}")]
    StartFailed { code: i32, output: String },

    /// The server survived both the graceful and the forced shutdown path
    #[error("postgres did not stop (exit {code}):\n{output}")]
    StopFailed { code: i32, output: String },
}
