use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by catalog mutations.
///
/// Everything except [`CatalogError::CorruptCursor`] and
/// [`CatalogError::CreateFolder`] is recoverable: the catalog is left exactly
/// as it was before the call.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The name is empty, `.`/`..`, or carries a directory component.
    #[error("invalid image name {0:?}: names must be plain filenames")]
    InvalidName(String),

    /// The extension is not on the image allow-list.
    #[error("unsupported image type {ext:?} for {name:?}")]
    UnsupportedExtension { name: String, ext: String },

    /// No catalog entry carries this filename.
    #[error("no image named {0:?} in the catalog")]
    NotFound(String),

    /// The upload source vanished or is not a regular file.
    #[error("source file {} is missing or not a file", .0.display())]
    MissingSource(PathBuf),

    /// The persisted cursor exists but is not a non-negative integer.
    #[error("persisted cursor is corrupt: {0}")]
    CorruptCursor(String),

    /// The catalog folder does not exist and cannot be created.
    #[error("cannot create image folder {}: {source}", .path.display())]
    CreateFolder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Rejection of a user-supplied setting.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("orientation cannot be empty")]
    EmptyOrientation,

    #[error("invalid orientation {0:?}; must be one of: landscape, portrait")]
    Orientation(String),

    #[error("refresh interval too small (minimum: {min} seconds)")]
    IntervalTooSmall { min: u64 },

    #[error("refresh interval too large (maximum: {max} seconds)")]
    IntervalTooLarge { max: u64 },

    #[error("{setting} must be between 0.0 and 2.0, got {value}")]
    Enhancement { setting: &'static str, value: f32 },
}

/// Failure to get a bitmap onto the display.
#[derive(Debug, Error)]
pub enum DisplayError {
    /// The transformation pipeline rejected the image.
    #[error("render error: {0:#}")]
    Render(anyhow::Error),

    /// The display hardware (or its stand-in) failed.
    #[error("display sink error: {0:#}")]
    Sink(anyhow::Error),

    /// The blocking refresh job panicked or was cancelled.
    #[error("refresh job failed: {0}")]
    Job(String),
}
