//! Pipeline orchestration
//!
//! Drives one generation run through its stages:
//! working directory, instance start, migrations, config assembly,
//! generator invocation. Teardown (stop the instance, remove the working
//! directory) runs on every exit path; its own failures are logged and
//! never replace the first stage error.
//!
//! The instance, applicator, and generator sit behind collaborator traits
//! so the sequencing and teardown rules are tested without a live server.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ingot_core::{
    ConnInfo, GenConfig, GenerateOptions, GenerateReport, PipelineError, PipelineResult, Stage,
};
use ingot_migrate::{MigrationSource, Migrator};
use ingot_pg::PostgresServer;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Collaborator seam for the ephemeral database instance
pub trait Instance: Send {
    /// Provisions and starts the instance under `data_dir`, returning its
    /// connection descriptor
    fn start(&mut self, data_dir: &Path) -> Result<String>;

    /// Stops the instance; must be idempotent
    fn stop(&mut self) -> Result<()>;
}

/// Collaborator seam for the migration applicator
//
// `?Send` drops the `Send` bound async_trait would otherwise place on the
// returned future. The real applicator drives sqlx transactions, whose
// `Executor for &mut PgConnection` is only `Send` for a specific lifetime;
// demanding a `Send` future here trips a rustc higher-ranked-lifetime
// limitation (rust-lang/rust#100013). The pipeline only ever awaits this
// future inline (never across threads), so the bound is unnecessary.
#[async_trait(?Send)]
pub trait Applicator: Send + Sync {
    /// Applies all pending migrations from `dir` against the database named
    /// by `descriptor`, returning the number newly applied
    async fn apply(&self, dir: &Path, descriptor: &str) -> Result<u32>;
}

/// Collaborator seam for the code generator
pub trait Generator: Send + Sync {
    fn generate(&self, config: &GenConfig) -> Result<()>;
}

/// One single-shot generation pipeline
pub struct Pipeline<I, A, G> {
    instance: I,
    applicator: A,
    generator: G,
    work_root: PathBuf,
}

impl<I: Instance, A: Applicator, G: Generator> Pipeline<I, A, G> {
    pub fn new(instance: I, applicator: A, generator: G) -> Self {
        Self {
            instance,
            applicator,
            generator,
            work_root: PathBuf::from("."),
        }
    }

    /// Creates the working directory under `root` instead of the current
    /// directory
    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = root.into();
        self
    }

    /// Runs the pipeline to completion.
    ///
    /// The working directory is uniquely named, so two runs started at the
    /// same moment on one host never collide.
    pub async fn run(self, options: &GenerateOptions) -> PipelineResult<GenerateReport> {
        let Self {
            instance,
            applicator,
            generator,
            work_root,
        } = self;

        let workdir = tempfile::Builder::new()
            .prefix(".ingot-")
            .tempdir_in(&work_root)
            .map_err(|e| PipelineError::new(Stage::CreateWorkdir, e))?;
        info!("created working directory {}", workdir.path().display());

        let mut guard = Teardown::new(instance, workdir);
        let result = run_stages(&mut guard, &applicator, &generator, options).await;
        guard.teardown();
        result
    }
}

async fn run_stages<I: Instance, A: Applicator, G: Generator>(
    guard: &mut Teardown<I>,
    applicator: &A,
    generator: &G,
    options: &GenerateOptions,
) -> PipelineResult<GenerateReport> {
    let data_dir = guard.data_dir();
    let descriptor = guard
        .instance_mut()
        .start(&data_dir)
        .map_err(|e| PipelineError::new(Stage::StartInstance, e))?;
    debug!("instance descriptor: {}", descriptor);

    let applied = applicator
        .apply(&options.migrations_dir, &descriptor)
        .await
        .map_err(|e| PipelineError::new(Stage::ApplyMigrations, e))?;
    info!("applied {} migrations", applied);

    let conn = ConnInfo::parse(&descriptor).map_err(|e| PipelineError::new(Stage::BuildConfig, e))?;
    let mut config = GenConfig::from_conn_info(&conn);
    config.apply_options(options);

    generator
        .generate(&config)
        .map_err(|e| PipelineError::new(Stage::Generate, e))?;

    Ok(GenerateReport {
        migrations_applied: applied,
        output_dir: options.output_dir.clone(),
    })
}

/// Owns the resources one run must release.
///
/// Teardown order is fixed: stop the instance first (releases the port and
/// the process), then remove the working directory. It runs at most once;
/// the `Drop` impl covers panic unwind and cancelled futures.
struct Teardown<I: Instance> {
    instance: I,
    workdir: Option<TempDir>,
    data_dir: PathBuf,
    done: bool,
}

impl<I: Instance> Teardown<I> {
    fn new(instance: I, workdir: TempDir) -> Self {
        let data_dir = workdir.path().join("db");
        Self {
            instance,
            workdir: Some(workdir),
            data_dir,
            done: false,
        }
    }

    fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    fn instance_mut(&mut self) -> &mut I {
        &mut self.instance
    }

    fn teardown(&mut self) {
        if self.done {
            return;
        }
        self.done = true;

        if let Err(e) = self.instance.stop() {
            warn!("teardown: failed to stop database instance: {:#}", e);
        }

        if let Some(workdir) = self.workdir.take() {
            let path = workdir.path().to_path_buf();
            if let Err(e) = workdir.close() {
                warn!(
                    "teardown: failed to remove working directory {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }
}

impl<I: Instance> Drop for Teardown<I> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// The real instance collaborator, backed by a local PostgreSQL server
pub struct PgInstance {
    bindir: Option<PathBuf>,
    start_timeout: Duration,
    stop_timeout: Duration,
    server: Option<PostgresServer>,
}

impl PgInstance {
    pub fn from_options(options: &GenerateOptions) -> Self {
        Self {
            bindir: options.pg_bindir.clone(),
            start_timeout: options.start_timeout,
            stop_timeout: options.stop_timeout,
            server: None,
        }
    }
}

impl Instance for PgInstance {
    fn start(&mut self, data_dir: &Path) -> Result<String> {
        let mut server = PostgresServer::new(data_dir)
            .with_bindir(self.bindir.clone())
            .with_timeouts(self.start_timeout, self.stop_timeout);
        let descriptor = server.start()?;
        self.server = Some(server);
        Ok(descriptor)
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(server) = self.server.as_mut() {
            server.stop()?;
        }
        Ok(())
    }
}

/// The real applicator, backed by ingot-migrate
pub struct SqlApplicator;

#[async_trait(?Send)]
impl Applicator for SqlApplicator {
    async fn apply(&self, dir: &Path, descriptor: &str) -> Result<u32> {
        let source = MigrationSource::load(dir)?;
        info!("found {} migrations in {}", source.len(), dir.display());

        let migrator = Migrator::connect(descriptor)
            .await
            .context("failed to connect to the ephemeral instance")?;
        let report = migrator.apply_all(&source).await?;
        if report.skipped > 0 {
            debug!("skipped {} already applied migrations", report.skipped);
        }
        Ok(report.applied)
    }
}
