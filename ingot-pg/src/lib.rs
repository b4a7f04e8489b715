//! Ingot PG
//!
//! Ephemeral PostgreSQL instance management for the ingot pipeline:
//! - Allocating a free local port for the server to bind
//! - Initialising a private data directory with `initdb`
//! - Supervised start/stop through `pg_ctl` with bounded timeouts
//! - Surfacing captured server output when startup fails
//!
//! One [`PostgresServer`] owns one server process. Dropping it stops the
//! server if it is still running.

mod error;
mod port;
mod server;

pub use error::PgError;
pub use port::alloc_port;
pub use server::PostgresServer;
