//! Thumbnail production and caching for parax
//!
//! This crate turns directory groups of image files into ordered lists of
//! scaled thumbnails. Decodes run in parallel under admission control, and
//! results are kept in a fixed-capacity LRU keyed by file path so revisiting a
//! directory is cheap.
//!
//! # Features
//!
//! - **O(1) LRU**: arena-backed doubly linked list behind a single mutex
//! - **Bounded concurrency**: separate caps for groups and decodes in flight
//! - **Aspect-preserving scaling**: bilinear or better, fitted to a box
//! - **Failure isolation**: a bad file is logged and skipped, never fatal to its group
//! - **Cooperative cancellation**: abandon a batch when the user moves on

pub mod cache;
pub mod error;
pub mod generate;
pub mod loader;
pub mod lru;
pub mod runner;

pub use cache::{CacheStats, ThumbnailCache};
pub use error::{ConfigError, ThumbnailError};
pub use generate::{generate_thumbnail, CodecOptions, ScaleFilter, Thumbnail, ThumbnailSize};
pub use loader::{CancelToken, LoadSummary, LoadedGroup, ThumbnailLoader};
pub use lru::LruCache;
pub use runner::BoundedTaskRunner;

use error::positive;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Standard configuration for thumbnail production
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub thumbnail_size: ThumbnailSize,
    pub filter: ScaleFilter,
    pub cache_capacity: usize,
    /// Directory groups loading at once
    pub max_groups_in_flight: usize,
    /// Decodes in flight within one group
    pub max_decodes_in_flight: usize,
    pub max_depth: usize,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            thumbnail_size: ThumbnailSize::square(200),
            filter: ScaleFilter::Bilinear,
            cache_capacity: 5000,
            max_groups_in_flight: 10,
            max_decodes_in_flight: 50,
            max_depth: 2,
        }
    }
}

impl ThumbnailConfig {
    pub fn codec_options(&self) -> CodecOptions {
        CodecOptions {
            size: self.thumbnail_size,
            filter: self.filter,
        }
    }

    /// Apply externally supplied values. Each invalid value is reported and
    /// skipped, leaving the current setting in place.
    pub fn apply(&mut self, overrides: &ConfigOverrides) -> Vec<ConfigError> {
        let mut rejected = Vec::new();

        if let Some(size) = &overrides.thumbnail_size {
            match size.parse() {
                Ok(size) => self.thumbnail_size = size,
                Err(err) => rejected.push(err),
            }
        }
        if let Some(filter) = &overrides.filter {
            match filter.parse() {
                Ok(filter) => self.filter = filter,
                Err(err) => rejected.push(err),
            }
        }
        if let Some(value) = overrides.cache_capacity {
            match positive("cache_capacity", value) {
                Ok(value) => self.cache_capacity = value,
                Err(err) => rejected.push(err),
            }
        }
        if let Some(value) = overrides.max_groups_in_flight {
            match positive("max_groups_in_flight", value) {
                Ok(value) => self.max_groups_in_flight = value,
                Err(err) => rejected.push(err),
            }
        }
        if let Some(value) = overrides.max_decodes_in_flight {
            match positive("max_decodes_in_flight", value) {
                Ok(value) => self.max_decodes_in_flight = value,
                Err(err) => rejected.push(err),
            }
        }
        if let Some(value) = overrides.max_depth {
            match usize::try_from(value) {
                Ok(value) => self.max_depth = value,
                Err(_) => rejected.push(ConfigError::Negative {
                    field: "max_depth",
                    value,
                }),
            }
        }

        for err in &rejected {
            warn!(error = %err, "Ignoring configuration value");
        }
        rejected
    }
}

/// Unvalidated settings from a config file or command line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    pub thumbnail_size: Option<String>,
    pub filter: Option<String>,
    #[serde(alias = "cache_limit")]
    pub cache_capacity: Option<i64>,
    #[serde(alias = "wg_max")]
    pub max_groups_in_flight: Option<i64>,
    #[serde(alias = "inner_wg_max")]
    pub max_decodes_in_flight: Option<i64>,
    pub max_depth: Option<i64>,
}

impl ConfigOverrides {
    /// Combine with a higher-priority source; its values win where present
    pub fn merged_with(self, higher: ConfigOverrides) -> ConfigOverrides {
        ConfigOverrides {
            thumbnail_size: higher.thumbnail_size.or(self.thumbnail_size),
            filter: higher.filter.or(self.filter),
            cache_capacity: higher.cache_capacity.or(self.cache_capacity),
            max_groups_in_flight: higher.max_groups_in_flight.or(self.max_groups_in_flight),
            max_decodes_in_flight: higher.max_decodes_in_flight.or(self.max_decodes_in_flight),
            max_depth: higher.max_depth.or(self.max_depth),
        }
    }
}
