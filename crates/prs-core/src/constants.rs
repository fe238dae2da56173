//! Constants used throughout the patient registry core crate.
//!
//! Defaults for startup configuration and the limits applied by request
//! validation live here so that the API layer, the CLI and the tests agree.

/// Default database location when `DATABASE_URL` is not set.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://patient_data/patients.db";

/// Default directory for stored patient photos.
pub const DEFAULT_PHOTO_DIR: &str = "patient_data/photos";

/// Default URL prefix under which stored photos are served.
pub const DEFAULT_PHOTO_URL: &str = "/storage/photos";

/// Number of patients per search page.
pub const PAGE_SIZE: u32 = 10;

/// Maximum length of free-text fields such as names and street.
pub const MAX_TEXT_CHARS: usize = 255;

/// Create: maximum CPF length.
pub const MAX_CPF_CHARS: usize = 11;

/// Create: maximum CNS length.
pub const MAX_CNS_CHARS: usize = 15;

/// Update: exact CPF length.
pub const CPF_CHARS: usize = 11;

/// Update: exact CNS length.
pub const CNS_CHARS: usize = 15;

/// Maximum postal code (CEP) length.
pub const MAX_POSTAL_CODE_CHARS: usize = 8;

/// Maximum street number length.
pub const MAX_NUMBER_CHARS: usize = 20;

/// Exact state (UF) code length.
pub const STATE_CHARS: usize = 2;

/// Photo size limit on create, in KiB (10 MB).
pub const CREATE_PHOTO_MAX_KIB: u64 = 10_240;

/// Photo size limit on update, in KiB (2 MB).
pub const UPDATE_PHOTO_MAX_KIB: u64 = 2_048;
