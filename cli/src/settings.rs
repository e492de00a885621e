//! Settings file discovery and parsing
//!
//! Settings are TOML. Candidates are tried in order: an explicit `--config`
//! path, then `./parax_config.toml`, then `~/.parax_config.toml`. The first
//! file that exists and parses wins. Within that file every key stands on its
//! own: a value of the wrong type is reported and dropped while the others
//! still apply.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thumbnail_cache::ConfigOverrides;
use toml::{Table, Value};
use tracing::warn;

pub const CONFIG_FILE_NAME: &str = "parax_config.toml";

/// Default settings locations in priority order
pub fn default_locations() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(".").join(CONFIG_FILE_NAME)];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(format!(".{}", CONFIG_FILE_NAME)));
    }
    paths
}

/// Parse settings text. Only a syntax error fails; badly typed values are
/// skipped one by one.
pub fn parse_overrides(text: &str) -> Result<ConfigOverrides> {
    let table: Table = toml::from_str(text).context("Failed to parse settings")?;

    Ok(ConfigOverrides {
        thumbnail_size: string(&table, &["thumbnail_size"]),
        filter: string(&table, &["filter"]),
        cache_capacity: integer(&table, &["cache_capacity", "cache_limit"]),
        max_groups_in_flight: integer(&table, &["max_groups_in_flight", "wg_max"]),
        max_decodes_in_flight: integer(&table, &["max_decodes_in_flight", "inner_wg_max"]),
        max_depth: integer(&table, &["max_depth"]),
    })
}

fn integer(table: &Table, keys: &[&str]) -> Option<i64> {
    lookup(table, keys, "an integer", Value::as_integer)
}

fn string(table: &Table, keys: &[&str]) -> Option<String> {
    lookup(table, keys, "a string", |value| value.as_str().map(str::to_string))
}

/// First key present with the expected type; earlier names take priority
fn lookup<T>(table: &Table, keys: &[&str], expected: &str, read: impl Fn(&Value) -> Option<T>) -> Option<T> {
    for key in keys {
        let Some(value) = table.get(*key) else {
            continue;
        };
        match read(value) {
            Some(value) => return Some(value),
            None => warn!(key = *key, value = %value, expected, "Ignoring setting with wrong type"),
        }
    }
    None
}

/// Load settings from the first usable candidate. An explicit path that is
/// missing or broken is reported and the default locations are tried next.
pub fn load_overrides(explicit: Option<&Path>) -> Option<(PathBuf, ConfigOverrides)> {
    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    candidates.extend(default_locations());
    first_usable(&candidates, explicit)
}

fn first_usable(paths: &[PathBuf], explicit: Option<&Path>) -> Option<(PathBuf, ConfigOverrides)> {
    for path in paths {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                if explicit == Some(path.as_path()) || err.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %err, "Cannot read settings file");
                }
                continue;
            }
        };
        match parse_overrides(&text) {
            Ok(overrides) => return Some((path.clone(), overrides)),
            Err(err) => {
                warn!(path = %path.display(), error = %format!("{:#}", err), "Skipping settings file");
            }
        }
    }
    None
}
