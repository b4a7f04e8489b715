//! Migration discovery and ordering
//!
//! Migration files are named `<version>_<title>.sql` or
//! `<version>_<title>.up.sql`, where `<version>` is a run of digits.
//! Matching `.down.sql` files are ignored; files without a version prefix
//! are skipped with a warning. Ordering is by version, then filename, so a
//! given directory always applies in the same sequence.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{MigrateError, Result};

/// One migration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Version parsed from the leading digits of the filename
    pub version: i64,
    /// File stem without the `.sql`/`.up.sql` suffix, recorded in history
    pub name: String,
    pub path: PathBuf,
}

/// An ordered set of migrations loaded from one directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSource {
    migrations: Vec<Migration>,
}

impl MigrationSource {
    /// Loads and orders the migrations under `dir`.
    ///
    /// Fails if the directory is missing, holds no migration files, or two
    /// files claim the same version.
    pub fn load(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(MigrateError::DirNotFound(dir.to_path_buf()));
        }

        let entries = fs::read_dir(dir).map_err(|source| MigrateError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut migrations = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| MigrateError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if file_name.ends_with(".down.sql") {
                debug!("ignoring down migration {}", file_name);
                continue;
            }

            let Some(stem) = file_name
                .strip_suffix(".up.sql")
                .or_else(|| file_name.strip_suffix(".sql"))
            else {
                continue;
            };

            let Some(version) = leading_version(stem) else {
                warn!("skipping `{}`: no numeric version prefix", file_name);
                continue;
            };

            migrations.push(Migration {
                version,
                name: stem.to_string(),
                path,
            });
        }

        migrations.sort_by(|a, b| (a.version, &a.name).cmp(&(b.version, &b.name)));

        for pair in migrations.windows(2) {
            if pair[0].version == pair[1].version {
                return Err(MigrateError::DuplicateVersion {
                    version: pair[0].version,
                    first: pair[0].name.clone(),
                    second: pair[1].name.clone(),
                });
            }
        }

        if migrations.is_empty() {
            return Err(MigrateError::Empty(dir.to_path_buf()));
        }

        Ok(Self { migrations })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.iter()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

fn leading_version(stem: &str) -> Option<i64> {
    let digits: String = stem.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn write_migration(dir: &Path, name: &str) {
        let mut file = File::create(dir.join(name)).unwrap();
        writeln!(file, "CREATE TABLE t{} (id INT);", name.len()).unwrap();
    }

    #[test]
    fn test_load_orders_by_version() {
        let dir = tempfile::tempdir().unwrap();
        write_migration(dir.path(), "0002_posts.up.sql");
        write_migration(dir.path(), "0010_comments.sql");
        write_migration(dir.path(), "0001_users.up.sql");

        let source = MigrationSource::load(dir.path()).unwrap();
        let names: Vec<&str> = source.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["0001_users", "0002_posts", "0010_comments"]);
        assert_eq!(source.len(), 3);
    }

    #[test]
    fn test_down_migrations_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_migration(dir.path(), "0001_users.up.sql");
        write_migration(dir.path(), "0001_users.down.sql");

        let source = MigrationSource::load(dir.path()).unwrap();
        assert_eq!(source.len(), 1);
        assert_eq!(source.iter().next().unwrap().name, "0001_users");
    }

    #[test]
    fn test_unversioned_files_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_migration(dir.path(), "0001_users.sql");
        write_migration(dir.path(), "seed.sql");
        write_migration(dir.path(), "README.txt");

        let source = MigrationSource::load(dir.path()).unwrap();
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn test_duplicate_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_migration(dir.path(), "0001_users.up.sql");
        write_migration(dir.path(), "0001_accounts.up.sql");

        let err = MigrationSource::load(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::DuplicateVersion { version: 1, .. }
        ));
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = MigrationSource::load(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, MigrateError::DirNotFound(_)));
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = MigrationSource::load(dir.path()).unwrap_err();
        assert!(matches!(err, MigrateError::Empty(_)));
    }

    #[test]
    fn test_version_parsing() {
        assert_eq!(leading_version("0001_users"), Some(1));
        assert_eq!(leading_version("20240101120000_init"), Some(20240101120000));
        assert_eq!(leading_version("users"), None);
        assert_eq!(leading_version(""), None);
    }
}
