//! Migration Source - discovers and creates migration files
//!
//! A migration is one `<version>.sql` file. The version is the file name
//! with the extension stripped and sorts byte-wise, so names must use a
//! sortable scheme such as zero-padded numbers or timestamps.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use loyalty_core::config::MigrationConfig;
use tracing::debug;

use super::definitions::Migration;
use super::error::MigrationError;

/// Recognized script extension; other files are ignored
pub const MIGRATION_EXTENSION: &str = ".sql";

/// Directory of migration scripts
#[derive(Debug, Clone)]
pub struct MigrationSource {
    dir: PathBuf,
}

impl MigrationSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(config: &MigrationConfig) -> Self {
        Self::new(config.migrations_dir.clone())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load every script in the directory, sorted ascending by version.
    ///
    /// Fails as a whole if the directory or any single script cannot be read.
    pub fn discover(&self) -> Result<Vec<Migration>, MigrationError> {
        let discovery_error = |source| MigrationError::Discovery {
            path: self.dir.clone(),
            source,
        };

        let mut migrations = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(discovery_error)? {
            let entry = entry.map_err(discovery_error)?;
            let path = entry.path();
            if path.is_dir() {
                continue;
            }

            let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
                debug!("Skipping non UTF-8 file name {}", path.display());
                continue;
            };
            let Some(version) = version_from_file_name(&file_name) else {
                continue;
            };

            let body = fs::read_to_string(&path).map_err(|source| MigrationError::Read {
                path: path.clone(),
                source,
            })?;

            migrations.push(Migration {
                version: version.to_string(),
                body,
                path,
            });
        }

        migrations.sort_by(|a, b| a.version.cmp(&b.version));
        debug!(
            "Discovered {} migration(s) in {}",
            migrations.len(),
            self.dir.display()
        );
        Ok(migrations)
    }

    /// Write an empty, timestamp-versioned script for `name` and return its path.
    ///
    /// Never overwrites an existing file.
    pub fn create(&self, name: &str, now: DateTime<Utc>) -> Result<PathBuf, MigrationError> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(MigrationError::InvalidName(name.to_string()));
        }

        let version = format!("{}_{}", now.format("%Y%m%d%H%M%S"), slug);
        let path = self.dir.join(format!("{}{}", version, MIGRATION_EXTENSION));
        let create_error = |source| MigrationError::Create {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(create_error)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(create_error)?;
        file.write_all(migration_template(name, &version, now).as_bytes())
            .map_err(create_error)?;

        Ok(path)
    }
}

/// Version for a script file name, or `None` if the file is not a script
pub fn version_from_file_name(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(MIGRATION_EXTENSION)
        .filter(|version| !version.is_empty())
}

/// Lowercase `name`, collapsing every run of other characters into `_`
fn slugify(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn migration_template(name: &str, version: &str, now: DateTime<Utc>) -> String {
    format!(
        "-- Migration: {}\n\
         -- Version: {}\n\
         -- Created: {}\n\
         --\n\
         -- The whole file runs in one transaction together with its tracking record.\n\n",
        name,
        version,
        now.format("%Y-%m-%d %H:%M:%S UTC")
    )
}
