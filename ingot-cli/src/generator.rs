//! External generator invocation
//!
//! The code generator runs as a child process. It receives the full
//! generation config as one JSON object on stdin and the output directory
//! as an argument; a non-zero exit is a generation failure carrying the
//! captured output.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use ingot_core::{GenConfig, GenerateOptions};
use tracing::{debug, info};

use crate::pipeline::Generator;

/// Runs the configured generator executable
pub struct CommandGenerator {
    program: PathBuf,
    output_dir: PathBuf,
    wipe: bool,
}

impl CommandGenerator {
    pub fn from_options(options: &GenerateOptions) -> Self {
        Self {
            program: options.generator.clone(),
            output_dir: options.output_dir.clone(),
            wipe: options.wipe,
        }
    }
}

impl Generator for CommandGenerator {
    fn generate(&self, config: &GenConfig) -> Result<()> {
        if self.wipe && self.output_dir.exists() {
            info!("wiping output directory {}", self.output_dir.display());
            fs::remove_dir_all(&self.output_dir).with_context(|| {
                format!(
                    "failed to wipe output directory {}",
                    self.output_dir.display()
                )
            })?;
        }

        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!(
                "failed to create output directory {}",
                self.output_dir.display()
            )
        })?;

        let payload =
            serde_json::to_vec(config).context("failed to serialize generation config")?;

        debug!("running generator {}", self.program.display());
        let mut child = Command::new(&self.program)
            .arg("--output")
            .arg(&self.output_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| {
                format!(
                    "failed to run generator `{}`. Is it on PATH?",
                    self.program.display()
                )
            })?;

        // Dropping stdin at the end of the block closes the pipe so the
        // generator sees EOF after the config object.
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .context("failed to write config to generator stdin")?;
        }

        let output = child
            .wait_with_output()
            .context("failed to wait for generator")?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            debug!("generator stdout: {}", stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("generator stderr: {}", stderr.trim());
        }

        if !output.status.success() {
            anyhow::bail!(
                "generator `{}` failed (exit {}): {}",
                self.program.display(),
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }

        info!("generator completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingot_core::ConnInfo;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-gen.sh");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn sample_config() -> GenConfig {
        let info =
            ConnInfo::parse("host=127.0.0.1 port=5433 dbname=postgres user=postgres").unwrap();
        let mut config = GenConfig::from_conn_info(&info);
        config.apply_options(&GenerateOptions::default());
        config
    }

    #[test]
    fn test_generator_receives_config_on_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().join("models");
        let script = write_script(dir.path(), r#"shift; cat > "$1/received.json""#);

        let generator = CommandGenerator {
            program: script,
            output_dir: output_dir.clone(),
            wipe: false,
        };
        generator.generate(&sample_config()).unwrap();

        let received = fs::read_to_string(output_dir.join("received.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&received).unwrap();
        assert_eq!(json["port"], 5433);
        assert_eq!(json["blacklist"][0], ingot_core::MIGRATIONS_TABLE);
    }

    #[test]
    fn test_generator_failure_reports_exit_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "echo boom >&2; exit 3");

        let generator = CommandGenerator {
            program: script,
            output_dir: dir.path().join("models"),
            wipe: false,
        };
        let err = generator.generate(&sample_config()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("exit 3"));
        assert!(message.contains("boom"));
    }

    #[test]
    fn test_missing_generator_is_an_environment_error() {
        let dir = tempfile::tempdir().unwrap();
        let generator = CommandGenerator {
            program: dir.path().join("no-such-generator"),
            output_dir: dir.path().join("models"),
            wipe: false,
        };
        let err = generator.generate(&sample_config()).unwrap_err();
        assert!(err.to_string().contains("failed to run generator"));
    }

    #[test]
    fn test_wipe_removes_stale_output() {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().join("models");
        fs::create_dir_all(&output_dir).unwrap();
        fs::write(output_dir.join("stale.rs"), "// old").unwrap();
        let script = write_script(dir.path(), "cat > /dev/null");

        let generator = CommandGenerator {
            program: script,
            output_dir: output_dir.clone(),
            wipe: true,
        };
        generator.generate(&sample_config()).unwrap();

        assert!(!output_dir.join("stale.rs").exists());
        assert!(output_dir.exists());
    }
}
