//! Patient photo storage
//!
//! This crate stores uploaded patient photos and hands back a URL that clients can
//! resolve later. The patient service only sees the [`PhotoStore`] trait, so the
//! backend can be swapped (or faked in tests) without touching business logic.
//!
//! ## Layout
//!
//! [`FilesystemPhotoStore`] names every photo after the SHA-256 of its bytes plus a
//! random suffix, and shards the directory tree on the first four hex characters:
//!
//! ```text
//! <photo_root>/
//! └── sha256/
//!     └── ab/
//!         └── cd/
//!             └── abcd3f9e…-Xk29Qa.png
//! ```
//!
//! The public URL mirrors the relative path under a configurable base, e.g.
//! `/storage/photos/sha256/ab/cd/abcd3f9e…-Xk29Qa.png`.
//!
//! ## Example Usage
//!
//! ```no_run
//! use prs_files::{FilesystemPhotoStore, PhotoStore, PhotoUpload};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = FilesystemPhotoStore::new(Path::new("patient_data/photos"), "/storage/photos")?;
//! let upload = PhotoUpload::new(Some("face.png".into()), std::fs::read("face.png")?);
//! let stored = store.store(&upload)?;
//! println!("{}", stored.url);
//! # Ok(())
//! # }
//! ```

mod constants;
mod photos;

pub use constants::{ALLOWED_IMAGE_MEDIA_TYPES, HASH_DIR_NAME};
pub use photos::{FilesystemPhotoStore, PhotoUpload, StoredPhoto};

/// Errors that can occur during photo storage operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Root directory could not be created or is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// Public base URL is empty
    #[error("Invalid public base URL: {0}")]
    InvalidBaseUrl(String),

    /// Path validation failed (potential directory traversal or unsafe path)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage client used by the patient service.
///
/// Implementations must be safe to share between concurrent requests.
pub trait PhotoStore: Send + Sync + std::fmt::Debug {
    /// Persists the upload and returns where it can be retrieved from.
    fn store(&self, upload: &PhotoUpload) -> Result<StoredPhoto, FilesError>;

    /// Undoes a [`store`](PhotoStore::store) whose owning write was abandoned.
    ///
    /// Removes only the file created by that call; other uploads of the same
    /// content have their own files and stay in place.
    fn discard(&self, photo: &StoredPhoto) -> Result<(), FilesError>;
}
