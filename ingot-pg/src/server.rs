//! Ephemeral PostgreSQL server supervision
//!
//! Drives `initdb` and `pg_ctl` as child processes:
//! - `start` initialises the cluster on first use, picks a free port, and
//!   waits (bounded) for the server to report ready
//! - `stop` requests a fast shutdown and escalates to an immediate one when
//!   the graceful path does not complete in time
//! - failures carry the captured process output plus the server log tail

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::Duration;

use ingot_core::ConnInfo;
use tracing::{debug, info, warn};

use crate::error::{PgError, Result};
use crate::port::alloc_port;

const LOG_FILE: &str = "server.log";
const LOG_TAIL_LINES: usize = 20;

const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(15);

/// One local PostgreSQL server process bound to a private data directory
///
/// Created in a configured state; `start` transitions it to running and
/// `stop` back to stopped. At most one server process is live per handle.
pub struct PostgresServer {
    data_dir: PathBuf,
    bindir: Option<PathBuf>,
    dbname: String,
    superuser: String,
    start_timeout: Duration,
    stop_timeout: Duration,
    port: Option<u16>,
    running: bool,
}

impl PostgresServer {
    /// Creates a handle for a server rooted at `data_dir`.
    ///
    /// Nothing is provisioned until `start` is called.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            bindir: None,
            dbname: "postgres".to_string(),
            superuser: "postgres".to_string(),
            start_timeout: DEFAULT_START_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            port: None,
            running: false,
        }
    }

    /// Uses an explicit PostgreSQL binary directory instead of PATH lookup
    pub fn with_bindir(mut self, bindir: Option<PathBuf>) -> Self {
        self.bindir = bindir;
        self
    }

    /// Overrides the start/stop supervision timeouts
    pub fn with_timeouts(mut self, start: Duration, stop: Duration) -> Self {
        self.start_timeout = start;
        self.stop_timeout = stop;
        self
    }

    /// Starts the server and returns its connection descriptor.
    ///
    /// Initialises the data directory with `initdb` when it holds no
    /// cluster yet, then launches `pg_ctl start -w` bound to a freshly
    /// allocated port. `-w` blocks until the server reports ready or the
    /// start timeout elapses; either failure mode returns [`PgError`]
    /// with the captured output. Calling `start` on an already running
    /// server just returns the current descriptor.
    pub fn start(&mut self) -> Result<String> {
        if self.running {
            return Ok(self.descriptor());
        }

        fs::create_dir_all(&self.data_dir).map_err(|source| PgError::DataDir {
            path: self.data_dir.clone(),
            source,
        })?;

        if !self.data_dir.join("PG_VERSION").exists() {
            self.init_cluster()?;
        }

        let port = alloc_port().map_err(PgError::PortAlloc)?;
        let log_file = self.data_dir.join(LOG_FILE);

        // The socket lives in the data directory so concurrent instances
        // never collide in a shared socket dir.
        let server_options = format!(
            "-p {} -c listen_addresses=127.0.0.1 -k \"{}\"",
            port,
            self.data_dir.display()
        );

        debug!(
            "starting postgres on port {} (data dir: {})",
            port,
            self.data_dir.display()
        );

        let output = self.output_of(
            "pg_ctl",
            self.command("pg_ctl")
                .arg("start")
                .arg("-D")
                .arg(&self.data_dir)
                .arg("-w")
                .arg("-t")
                .arg(self.start_timeout.as_secs().to_string())
                .arg("-l")
                .arg(&log_file)
                .arg("-o")
                .arg(&server_options),
        )?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let mut combined = merge_output(&output);
            if let Ok(log) = fs::read_to_string(&log_file) {
                combined.push_str("\nserver log:\n");
                combined.push_str(&tail(&log, LOG_TAIL_LINES));
            }
            return Err(PgError::StartFailed {
                code,
                output: combined,
            });
        }

        self.port = Some(port);
        self.running = true;
        info!("postgres ready on 127.0.0.1:{}", port);

        Ok(self.descriptor())
    }

    /// Non-blocking liveness check; safe before `start` and after `stop`
    pub fn is_running(&self) -> bool {
        if !self.running {
            return false;
        }
        self.status_running()
    }

    /// Returns the connection descriptor while running, `None` otherwise
    pub fn conninfo(&self) -> Option<String> {
        if self.running {
            Some(self.descriptor())
        } else {
            None
        }
    }

    /// Stops the server.
    ///
    /// Requests a fast shutdown and waits up to the stop timeout, then
    /// escalates to an immediate shutdown. Idempotent: stopping a server
    /// that is not running is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }

        let output = self.shutdown("fast")?;
        if output.status.success() {
            self.mark_stopped();
            return Ok(());
        }

        // The process may have died underneath us; that counts as stopped.
        if !self.status_running() {
            debug!("postgres already stopped");
            self.mark_stopped();
            return Ok(());
        }

        warn!(
            "graceful shutdown did not complete in {:?}, forcing immediate shutdown",
            self.stop_timeout
        );

        let output = self.shutdown("immediate")?;
        if output.status.success() || !self.status_running() {
            self.mark_stopped();
            return Ok(());
        }

        Err(PgError::StopFailed {
            code: output.status.code().unwrap_or(-1),
            output: merge_output(&output),
        })
    }

    fn shutdown(&self, mode: &str) -> Result<Output> {
        self.output_of(
            "pg_ctl",
            self.command("pg_ctl")
                .arg("stop")
                .arg("-D")
                .arg(&self.data_dir)
                .arg("-m")
                .arg(mode)
                .arg("-w")
                .arg("-t")
                .arg(self.stop_timeout.as_secs().to_string()),
        )
    }

    fn init_cluster(&self) -> Result<()> {
        debug!("initialising cluster in {}", self.data_dir.display());

        let output = self.output_of(
            "initdb",
            self.command("initdb")
                .arg("-D")
                .arg(&self.data_dir)
                .arg("-U")
                .arg(&self.superuser)
                .arg("-A")
                .arg("trust")
                .arg("-E")
                .arg("UTF8"),
        )?;

        if !output.status.success() {
            return Err(PgError::InitFailed {
                code: output.status.code().unwrap_or(-1),
                output: merge_output(&output),
            });
        }

        Ok(())
    }

    /// Asks `pg_ctl status` whether a server owns the data directory.
    ///
    /// Any failure to ask is reported as "not running".
    fn status_running(&self) -> bool {
        self.command("pg_ctl")
            .arg("status")
            .arg("-D")
            .arg(&self.data_dir)
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    fn mark_stopped(&mut self) {
        self.running = false;
        self.port = None;
    }

    fn descriptor(&self) -> String {
        let mut extra = BTreeMap::new();
        extra.insert("sslmode".to_string(), "disable".to_string());
        ConnInfo {
            host: "127.0.0.1".to_string(),
            port: self.port.unwrap_or(0),
            dbname: Some(self.dbname.clone()),
            user: Some(self.superuser.clone()),
            password: None,
            extra,
        }
        .to_string()
    }

    fn command(&self, binary: &str) -> Command {
        match &self.bindir {
            Some(dir) => Command::new(dir.join(binary)),
            None => Command::new(binary),
        }
    }

    fn output_of(&self, binary: &str, command: &mut Command) -> Result<Output> {
        let output = command.output().map_err(|source| PgError::Spawn {
            binary: binary.to_string(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            debug!("{} stdout: {}", binary, stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("{} stderr: {}", binary, stderr.trim());
        }

        Ok(output)
    }
}

impl Drop for PostgresServer {
    fn drop(&mut self) {
        if self.running {
            if let Err(e) = self.stop() {
                warn!("failed to stop postgres on drop: {}", e);
            }
        }
    }
}

fn merge_output(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut combined = String::new();
    if !stdout.trim().is_empty() {
        combined.push_str(stdout.trim());
    }
    if !stderr.trim().is_empty() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(stderr.trim());
    }
    combined
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_server_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let server = PostgresServer::new(dir.path().join("db"));

        assert!(!server.is_running());
        assert!(server.conninfo().is_none());
    }

    #[test]
    fn test_stop_before_start_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = PostgresServer::new(dir.path().join("db"));

        assert!(server.stop().is_ok());
        assert!(server.stop().is_ok());
    }

    #[test]
    fn test_start_with_missing_binaries_fails_to_spawn() {
        let dir = tempfile::tempdir().unwrap();
        // Point at a bindir that has no PostgreSQL binaries at all.
        let mut server = PostgresServer::new(dir.path().join("db"))
            .with_bindir(Some(dir.path().join("no-such-bindir")));

        let err = server.start().unwrap_err();
        match err {
            PgError::Spawn { binary, .. } => assert_eq!(binary, "initdb"),
            other => panic!("expected Spawn error, got {other:?}"),
        }
        assert!(!server.is_running());
        assert!(server.conninfo().is_none());
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        let text = "a\nb\nc\nd";
        assert_eq!(tail(text, 2), "c\nd");
        assert_eq!(tail(text, 10), text);
    }

    #[test]
    fn test_merge_output_joins_streams() {
        let output = Command::new("sh")
            .arg("-c")
            .arg("echo out; echo err >&2")
            .output()
            .unwrap();
        let merged = merge_output(&output);
        assert!(merged.contains("out"));
        assert!(merged.contains("err"));
    }
}
