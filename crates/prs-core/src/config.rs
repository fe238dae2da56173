//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Environment variables are read by the binaries only; request
//! handling never consults the process environment.

use crate::constants::{DEFAULT_DATABASE_URL, DEFAULT_PHOTO_DIR, DEFAULT_PHOTO_URL};
use crate::{PatientError, PatientResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoreConfig {
    database_url: String,
    photo_dir: PathBuf,
    photo_base_url: String,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `PatientError::InvalidConfig` if the database URL or the photo base URL is blank.
    pub fn new(
        database_url: String,
        photo_dir: PathBuf,
        photo_base_url: String,
    ) -> PatientResult<Self> {
        if database_url.trim().is_empty() {
            return Err(PatientError::InvalidConfig(
                "database_url cannot be empty".into(),
            ));
        }

        let photo_base_url = photo_base_url.trim().trim_end_matches('/').to_string();
        if photo_base_url.is_empty() {
            return Err(PatientError::InvalidConfig(
                "photo_base_url cannot be empty".into(),
            ));
        }

        Ok(Self {
            database_url: database_url.trim().to_string(),
            photo_dir,
            photo_base_url,
        })
    }

    /// Build a config from optional raw values (typically environment variables),
    /// falling back to the defaults in [`crate::constants`] for absent or blank values.
    pub fn from_env_values(
        database_url: Option<String>,
        photo_dir: Option<String>,
        photo_base_url: Option<String>,
    ) -> PatientResult<Self> {
        fn or_default(value: Option<String>, default: &str) -> String {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        }

        Self::new(
            or_default(database_url, DEFAULT_DATABASE_URL),
            PathBuf::from(or_default(photo_dir, DEFAULT_PHOTO_DIR)),
            or_default(photo_base_url, DEFAULT_PHOTO_URL),
        )
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn photo_dir(&self) -> &Path {
        &self.photo_dir
    }

    pub fn photo_base_url(&self) -> &str {
        &self.photo_base_url
    }

    /// Route under which this process should serve stored photos itself.
    ///
    /// Only a local path prefix (starting with `/`) is served; an absolute URL means the
    /// photos are published elsewhere.
    pub fn photo_mount_path(&self) -> Option<&str> {
        let base = self.photo_base_url.as_str();
        (base.starts_with('/') && base.len() > 1).then_some(base)
    }
}
