//! Filesystem-backed photo storage
//!
//! This module provides [`FilesystemPhotoStore`], the production implementation of
//! [`PhotoStore`]. Every upload gets its own file, named after the SHA-256 digest of
//! its bytes plus a random suffix and sharded on the digest. A file belongs to the
//! single `store` call that created it, so discarding it can never pull content out
//! from under another patient.
//!
//! # Security Model
//!
//! - The root directory is canonicalised at construction time
//! - Stored paths are derived from the digest only, never from client filenames
//! - Files are created exclusively, so an existing file is never reused or overwritten
//! - Reads by relative path reject anything that could escape the root
//!
use crate::constants::{ALLOWED_IMAGE_MEDIA_TYPES, HASH_DIR_NAME};
use crate::{FilesError, PhotoStore};
use chrono::{DateTime, Utc};
use prs_types::NonEmptyText;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// A photo received from a client, not yet validated or stored.
#[derive(Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    /// Filename as sent by the client, if any. Informational only.
    pub original_filename: Option<String>,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for PhotoUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotoUpload")
            .field("original_filename", &self.original_filename)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

impl PhotoUpload {
    pub fn new(original_filename: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            original_filename,
            bytes,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Media type sniffed from the content (best-effort, client headers are ignored).
    pub fn media_type(&self) -> Option<&'static str> {
        infer::get(&self.bytes).map(|kind| kind.mime_type())
    }

    /// Whether the content is one of the accepted image formats.
    pub fn is_image(&self) -> bool {
        self.media_type()
            .is_some_and(|mime| ALLOWED_IMAGE_MEDIA_TYPES.contains(&mime))
    }

    fn extension(&self) -> Option<&'static str> {
        infer::get(&self.bytes).map(|kind| kind.extension())
    }
}

/// Result of storing a photo.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct StoredPhoto {
    /// Hexadecimal SHA-256 digest of the content
    pub hash: String,

    /// Path relative to the store root
    pub relative_path: String,

    /// Publicly resolvable URL for the photo
    pub url: String,

    pub size_bytes: u64,

    /// Detected media type, if available
    pub media_type: Option<NonEmptyText>,

    pub original_filename: Option<NonEmptyText>,

    /// UTC timestamp when the photo was stored
    pub stored_at: DateTime<Utc>,
}

/// Photo store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FilesystemPhotoStore {
    /// Canonicalised root directory
    root_directory: PathBuf,

    /// URL prefix prepended to relative paths, without a trailing slash
    public_base_url: String,
}

impl FilesystemPhotoStore {
    /// Creates a store rooted at `root_directory`, creating the directory if needed.
    ///
    /// # Arguments
    ///
    /// * `root_directory` - Directory under which photos are written
    /// * `public_base_url` - Prefix for returned URLs, e.g. `/storage/photos` or
    ///   `https://cdn.example.org/photos`
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - The root path exists but is not a directory
    /// - The root directory cannot be created or canonicalised
    /// - The base URL is empty
    pub fn new(
        root_directory: &Path,
        public_base_url: impl Into<String>,
    ) -> Result<Self, FilesError> {
        let public_base_url = public_base_url.into().trim().trim_end_matches('/').to_string();
        if public_base_url.is_empty() {
            return Err(FilesError::InvalidBaseUrl(
                "public base URL cannot be empty".into(),
            ));
        }

        if root_directory.exists() && !root_directory.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Path is not a directory: {}",
                root_directory.display()
            )));
        }

        fs::create_dir_all(root_directory).map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot create directory {}: {}",
                root_directory.display(),
                e
            ))
        })?;

        let root_directory = root_directory.canonicalize().map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot canonicalize path {}: {}",
                root_directory.display(),
                e
            ))
        })?;

        Ok(Self {
            root_directory,
            public_base_url,
        })
    }

    #[must_use]
    pub fn root_directory(&self) -> &Path {
        &self.root_directory
    }

    #[must_use]
    pub fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    /// Reads a stored photo back by its relative path.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::InvalidPath` for absolute paths or paths containing `..`,
    /// and `FilesError::Io` if the file cannot be read.
    pub fn read(&self, relative_path: &str) -> Result<Vec<u8>, FilesError> {
        let relative = Path::new(relative_path);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if relative_path.is_empty() || !safe {
            return Err(FilesError::InvalidPath(relative_path.to_string()));
        }

        let path = self.root_directory.join(relative);
        fs::read(&path).map_err(|e| {
            FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read photo from {}: {}", path.display(), e),
            ))
        })
    }

    /// Shard directory for a digest: `sha256/<shard1>/<shard2>`
    fn compute_shard_path(hash_hex: &str) -> String {
        let shard1 = &hash_hex[0..2];
        let shard2 = &hash_hex[2..4];
        format!("{HASH_DIR_NAME}/{shard1}/{shard2}")
    }

    fn compute_storage_path(&self, relative_path: &str) -> PathBuf {
        self.root_directory.join(relative_path)
    }

    fn public_url(&self, relative_path: &str) -> String {
        format!("{}/{}", self.public_base_url, relative_path)
    }
}

impl PhotoStore for FilesystemPhotoStore {
    /// Writes the upload to `sha256/<shard1>/<shard2>/<hash>-<random>[.<ext>]`.
    ///
    /// The file is created exclusively and removed again if writing fails, so a
    /// truncated photo is never left behind under a name that gets handed out.
    fn store(&self, upload: &PhotoUpload) -> Result<StoredPhoto, FilesError> {
        let hash = hex::encode(Sha256::digest(&upload.bytes));
        let shard_path = Self::compute_shard_path(&hash);
        let shard_directory = self.compute_storage_path(&shard_path);

        fs::create_dir_all(&shard_directory).map_err(|e| {
            FilesError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create storage directory {}: {}",
                    shard_directory.display(),
                    e
                ),
            ))
        })?;

        let prefix = format!("{hash}-");
        let suffix = upload
            .extension()
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        let write_error = |e: std::io::Error| {
            FilesError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to write photo to {}: {}",
                    shard_directory.display(),
                    e
                ),
            ))
        };

        let mut file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .tempfile_in(&shard_directory)
            .map_err(write_error)?;
        file.write_all(&upload.bytes)
            .and_then(|()| file.as_file().sync_all())
            .map_err(write_error)?;
        let (_, storage_path) = file.keep().map_err(|e| write_error(e.error))?;

        let file_name = storage_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| FilesError::InvalidPath(storage_path.display().to_string()))?;
        let relative_path = format!("{shard_path}/{file_name}");

        Ok(StoredPhoto {
            url: self.public_url(&relative_path),
            hash,
            relative_path,
            size_bytes: upload.size_bytes(),
            media_type: upload.media_type().and_then(|m| NonEmptyText::new(m).ok()),
            original_filename: NonEmptyText::from_optional(upload.original_filename.as_deref()),
            stored_at: Utc::now(),
        })
    }

    fn discard(&self, photo: &StoredPhoto) -> Result<(), FilesError> {
        let storage_path = self.compute_storage_path(&photo.relative_path);
        match fs::remove_file(&storage_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FilesError::Io(e)),
        }
    }
}
