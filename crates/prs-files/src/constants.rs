/// Top-level directory (and URL segment) for hash-named photos.
pub const HASH_DIR_NAME: &str = "sha256";

/// Media types accepted as images for patient photos.
pub const ALLOWED_IMAGE_MEDIA_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/bmp",
    "image/webp",
];
