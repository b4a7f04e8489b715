//! Ingot
//!
//! Generates database model code from a directory of SQL migrations:
//! creates a throwaway local PostgreSQL instance, applies the migrations,
//! runs a code generator against the resulting live schema, and removes
//! the instance and its working directory on every exit path.

mod generator;
mod pipeline;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::anyhow;
use clap::Parser;
use colored::*;
use ingot_core::{GenerateOptions, GenerateReport};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::generator::CommandGenerator;
use crate::pipeline::{PgInstance, Pipeline, SqlApplicator};

#[derive(Parser)]
#[command(name = "ingot", version)]
#[command(about = "Generate model code from your migrations", long_about = "Creates a throwaway local PostgreSQL instance, applies the migrations, and runs a code generator against the live schema. The instance and its working directory are always removed, whichever way the run ends.")]
struct Cli {
    /// Folder to read migrations from
    #[arg(short, long, default_value = "./migrations")]
    migrations: PathBuf,

    /// Folder the generator writes into
    #[arg(short, long, default_value = "models")]
    output: PathBuf,

    /// Package name for the generated code
    #[arg(short, long, default_value = "models")]
    pkgname: String,

    /// Code generator executable
    #[arg(short, long, env = "INGOT_GENERATOR", default_value = "ingot-gen")]
    generator: PathBuf,

    /// Directory containing the PostgreSQL binaries (initdb, pg_ctl)
    #[arg(long, env = "INGOT_PG_BINDIR")]
    pg_bindir: Option<PathBuf>,

    /// Extra struct tags for the generated code
    #[arg(short, long)]
    tag: Vec<String>,

    /// Disable generated test files
    #[arg(long)]
    no_tests: bool,

    /// Disable model hooks
    #[arg(long)]
    no_hooks: bool,

    /// Enable soft deletes in the generated code
    #[arg(long)]
    add_soft_deletes: bool,

    /// Delete the output folder before generation
    #[arg(long)]
    wipe: bool,

    /// Seconds to wait for the instance to become ready
    #[arg(long, default_value = "30")]
    start_timeout: u64,

    /// Seconds to wait for a graceful instance shutdown
    #[arg(long, default_value = "15")]
    stop_timeout: u64,

    /// Print the full error chain on failure
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_options(self) -> GenerateOptions {
        GenerateOptions {
            migrations_dir: self.migrations,
            output_dir: self.output,
            pkgname: self.pkgname,
            generator: self.generator,
            pg_bindir: self.pg_bindir,
            tags: self.tag,
            no_tests: self.no_tests,
            no_hooks: self.no_hooks,
            add_soft_deletes: self.add_soft_deletes,
            wipe: self.wipe,
            start_timeout: Duration::from_secs(self.start_timeout),
            stop_timeout: Duration::from_secs(self.stop_timeout),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                if verbose {
                    "ingot_cli=debug,ingot_pg=debug,ingot_migrate=debug".into()
                } else {
                    "ingot_cli=info,ingot_pg=info,ingot_migrate=info".into()
                }
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let options = cli.into_options();
    if let Err(e) = options.validate() {
        eprintln!("{} {}", "error:".red().bold(), e);
        return ExitCode::from(2);
    }

    let pipeline = Pipeline::new(
        PgInstance::from_options(&options),
        SqlApplicator,
        CommandGenerator::from_options(&options),
    );

    // On Ctrl-C the pipeline future is dropped, which runs its teardown
    // guard before we report the interruption.
    let result: anyhow::Result<GenerateReport> = tokio::select! {
        result = pipeline.run(&options) => result.map_err(Into::into),
        _ = tokio::signal::ctrl_c() => Err(anyhow!("interrupted")),
    };

    match result {
        Ok(report) => {
            println!(
                "{} generated {} ({} migrations applied)",
                "✓".green().bold(),
                report.output_dir.display(),
                report.migrations_applied
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            if verbose {
                eprintln!("{} {:?}", "error:".red().bold(), e);
            } else {
                eprintln!("{} {}", "error:".red().bold(), e);
            }
            ExitCode::FAILURE
        }
    }
}
