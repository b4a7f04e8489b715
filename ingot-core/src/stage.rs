//! Pipeline stages and stage-tagged errors
//!
//! Every fatal pipeline error is attributed to exactly one stage so the
//! user-facing summary names the phase that failed. The first error
//! encountered is the one reported; teardown failures are logged by the
//! orchestrator and never replace it.

use std::fmt;
use std::path::PathBuf;

/// The phases of one pipeline run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Creating the uniquely named working directory
    CreateWorkdir,
    /// Starting the ephemeral database instance
    StartInstance,
    /// Applying the migration set
    ApplyMigrations,
    /// Resolving the descriptor and assembling the generation config
    BuildConfig,
    /// Running the external code generator
    Generate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::CreateWorkdir => "create working directory",
            Stage::StartInstance => "start database instance",
            Stage::ApplyMigrations => "apply migrations",
            Stage::BuildConfig => "assemble generation config",
            Stage::Generate => "run code generator",
        };
        f.write_str(name)
    }
}

/// A pipeline failure attributed to one stage
///
/// Implemented by hand rather than derived: the cause is an
/// [`anyhow::Error`], which carries its own chain and is exposed through
/// `source()` via its `AsRef<dyn Error>` impl.
#[derive(Debug)]
pub struct PipelineError {
    pub stage: Stage,
    pub source: anyhow::Error,
}

impl PipelineError {
    /// Tags an error with the stage it occurred in
    pub fn new(stage: Stage, source: impl Into<anyhow::Error>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.source)
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Summary of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateReport {
    /// Number of migrations newly applied to the ephemeral instance
    pub migrations_applied: u32,
    /// Where the generator wrote its output
    pub output_dir: PathBuf,
}
