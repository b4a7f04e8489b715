//! Migration application
//!
//! Applies pending migrations over a live connection. Each migration runs
//! inside one transaction together with its history record, so a failed
//! script leaves no half-applied file behind.

use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use ingot_core::ConnInfo;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::{debug, info};

use crate::error::{MigrateError, Result};
use crate::source::MigrationSource;

/// SQL to create the migration history table
const CREATE_HISTORY_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS ingot_migrations (
    version BIGINT PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// Outcome of one `apply_all` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    /// Migrations newly applied in this run
    pub applied: u32,
    /// Migrations already recorded and skipped
    pub skipped: u32,
}

/// Applies migrations against one database
pub struct Migrator {
    pool: PgPool,
}

impl Migrator {
    /// Connects to the database named by a connection descriptor
    pub async fn connect(descriptor: &str) -> Result<Self> {
        let info = ConnInfo::parse(descriptor)?;
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&info.url())
            .await?;
        Ok(Self { pool })
    }

    /// Applies every pending migration in `source`, in order.
    ///
    /// Already recorded versions are skipped, so re-running against a
    /// migrated schema is a no-op. On failure the failed file's transaction
    /// rolls back and the error is returned; earlier files stay applied.
    pub async fn apply_all(&self, source: &MigrationSource) -> Result<MigrationReport> {
        self.ensure_history_table().await?;
        let recorded = self.applied_versions().await?;

        let mut report = MigrationReport {
            applied: 0,
            skipped: 0,
        };

        for migration in source.iter() {
            if recorded.contains(&migration.version) {
                debug!("skipping already applied migration {}", migration.name);
                report.skipped += 1;
                continue;
            }

            let sql = fs::read_to_string(&migration.path).map_err(|e| MigrateError::Io {
                path: migration.path.clone(),
                source: e,
            })?;

            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(&sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| MigrateError::Apply {
                    name: migration.name.clone(),
                    source: e,
                })?;
            sqlx::query("INSERT INTO ingot_migrations (version, name) VALUES ($1, $2)")
                .bind(migration.version)
                .bind(&migration.name)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            info!("applied migration {}", migration.name);
            report.applied += 1;
        }

        Ok(report)
    }

    async fn ensure_history_table(&self) -> Result<()> {
        sqlx::query(CREATE_HISTORY_TABLE_SQL)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn applied_versions(&self) -> Result<HashSet<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT version FROM ingot_migrations")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(version,)| version).collect())
    }
}
