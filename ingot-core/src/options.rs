//! Generation options
//!
//! The caller-supplied configuration for one pipeline run. Built once from
//! the CLI surface, validated before anything is provisioned, and threaded
//! through the pipeline as a value. Nothing in the pipeline reads ambient
//! process-wide state.

use std::path::PathBuf;
use std::time::Duration;

/// Options for one generation run
///
/// The feature toggles and tags are passed through to the generator
/// verbatim; the pipeline does not interpret them.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Directory containing the ordered migration files
    pub migrations_dir: PathBuf,

    /// Directory the generator writes into
    pub output_dir: PathBuf,

    /// Package name for the generated code
    pub pkgname: String,

    /// Generator executable (name resolved from PATH, or an explicit path)
    pub generator: PathBuf,

    /// Directory containing the PostgreSQL binaries; resolved from PATH
    /// when absent
    pub pg_bindir: Option<PathBuf>,

    /// Extra struct tags for the generated code
    pub tags: Vec<String>,

    /// Disable generated test files
    pub no_tests: bool,

    /// Disable model hooks in the generated code
    pub no_hooks: bool,

    /// Enable soft deletes in the generated code
    pub add_soft_deletes: bool,

    /// Delete the output directory before generation
    pub wipe: bool,

    /// Maximum time to wait for the instance to report ready
    pub start_timeout: Duration,

    /// Maximum time to wait for a graceful instance shutdown
    pub stop_timeout: Duration,
}

impl GenerateOptions {
    /// Validates the options
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pkgname.is_empty() {
            anyhow::bail!("pkgname cannot be empty");
        }

        if !self
            .pkgname
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            anyhow::bail!(
                "pkgname `{}` must contain only alphanumerics and underscores",
                self.pkgname
            );
        }

        if self.output_dir.as_os_str().is_empty() {
            anyhow::bail!("output directory cannot be empty");
        }

        if self.generator.as_os_str().is_empty() {
            anyhow::bail!("generator executable cannot be empty");
        }

        if self.start_timeout.is_zero() {
            anyhow::bail!("start timeout must be greater than 0");
        }

        if self.stop_timeout.is_zero() {
            anyhow::bail!("stop timeout must be greater than 0");
        }

        Ok(())
    }
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("./migrations"),
            output_dir: PathBuf::from("models"),
            pkgname: "models".to_string(),
            generator: PathBuf::from("ingot-gen"),
            pg_bindir: None,
            tags: Vec::new(),
            no_tests: false,
            no_hooks: false,
            add_soft_deletes: false,
            wipe: false,
            start_timeout: Duration::from_secs(30),
            stop_timeout: Duration::from_secs(15),
        }
    }
}
