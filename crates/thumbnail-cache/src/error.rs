//! Error types for thumbnail production
//!
//! Per-file failures (`Open`, `NotAFile`, `Decode`, `Empty`) are recovered by the loader:
//! the file is skipped and its group keeps loading. `Config` values are
//! recovered by keeping the previous setting.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ThumbnailError {
    /// The file could not be opened or read
    #[error("failed to read {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The contents are corrupt or in an unrecognized format
    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("{} is not a regular file", path.display())]
    NotAFile { path: PathBuf },

    #[error("image {} has no pixels", path.display())]
    Empty { path: PathBuf },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl ThumbnailError {
    /// True for failures that concern a single image file rather than the
    /// pipeline itself
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            ThumbnailError::Open { .. }
                | ThumbnailError::NotAFile { .. }
                | ThumbnailError::Decode { .. }
                | ThumbnailError::Empty { .. }
        )
    }
}

/// Rejected configuration value; the previous value stays in effect
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be at least 1, got {value}")]
    NotPositive { field: &'static str, value: i64 },

    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: i64 },

    #[error("invalid thumbnail size '{0}', expected WIDTHxHEIGHT")]
    InvalidSize(String),

    #[error("unknown scale filter '{0}', expected bilinear, catmull-rom or lanczos3")]
    UnknownFilter(String),
}

/// Validate a count that must be at least one
pub(crate) fn positive(field: &'static str, value: i64) -> Result<usize, ConfigError> {
    if value < 1 {
        return Err(ConfigError::NotPositive { field, value });
    }
    usize::try_from(value).map_err(|_| ConfigError::NotPositive { field, value })
}
