mod settings;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use image_scan::{compare_paths, DirectoryGroup, ScanOptions, Scanner};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thumbnail_cache::{
    CancelToken, ConfigOverrides, LoadedGroup, ThumbnailCache, ThumbnailConfig, ThumbnailLoader,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "parax")]
#[command(about = "Browse a directory tree as thumbnails grouped by folder")]
struct Cli {
    /// Settings file (defaults: ./parax_config.toml, ~/.parax_config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List directories holding supported images
    Scan {
        #[command(flatten)]
        target: TargetArgs,

        /// Print groups as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate thumbnails for every directory group
    Thumbs {
        #[command(flatten)]
        target: TargetArgs,

        /// Bounding box, e.g. 200x200
        #[arg(long)]
        size: Option<String>,

        /// Scaling filter: bilinear, catmull-rom or lanczos3
        #[arg(long)]
        filter: Option<String>,

        /// Maximum number of cached thumbnails
        #[arg(long, allow_negative_numbers = true)]
        cache_capacity: Option<i64>,

        /// Directory groups loading at once
        #[arg(long, allow_negative_numbers = true)]
        max_groups: Option<i64>,

        /// Decodes in flight per group
        #[arg(long, allow_negative_numbers = true)]
        max_decodes: Option<i64>,

        /// Write thumbnails as PNG files under this directory
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// Root directory to browse
    #[arg(default_value = ".")]
    root: PathBuf,

    /// Directory levels below the root to include
    #[arg(long, allow_negative_numbers = true)]
    max_depth: Option<i64>,

    /// Ignore dot-files and dot-directories
    #[arg(long)]
    skip_hidden: bool,
}

#[derive(Debug, Serialize)]
struct ScanPayload {
    directory: String,
    images: Vec<String>,
}

#[derive(Debug, Serialize)]
struct GroupPayload {
    directory: String,
    failed: usize,
    thumbnails: Vec<ThumbnailPayload>,
}

#[derive(Debug, Serialize)]
struct ThumbnailPayload {
    path: String,
    width: u32,
    height: u32,
    source_width: u32,
    source_height: u32,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Scan { target, json } => {
            let config = resolve_config(cli.config.as_deref(), target.overrides());
            run_scan(&target, &config, json)
        }
        Commands::Thumbs {
            target,
            size,
            filter,
            cache_capacity,
            max_groups,
            max_decodes,
            out,
            json,
        } => {
            let flags = ConfigOverrides {
                thumbnail_size: size,
                filter,
                cache_capacity,
                max_groups_in_flight: max_groups,
                max_decodes_in_flight: max_decodes,
                ..target.overrides()
            };
            let config = resolve_config(cli.config.as_deref(), flags);
            run_thumbs(&target, &config, out.as_deref(), json)
        }
    }
}

impl TargetArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            max_depth: self.max_depth,
            ..ConfigOverrides::default()
        }
    }

    fn scan(&self, config: &ThumbnailConfig) -> Result<Vec<DirectoryGroup>> {
        let scanner = Scanner::new(ScanOptions {
            max_depth: config.max_depth,
            skip_hidden: self.skip_hidden,
        });
        let mut groups = scanner
            .scan(&self.root)
            .with_context(|| format!("Failed to scan {}", self.root.display()))?;

        groups.sort_by(|a, b| compare_paths(&a.directory, &b.directory));
        for group in &mut groups {
            group.images.sort_by(|a, b| compare_paths(a, b));
        }
        Ok(groups)
    }
}

/// Defaults, then the settings file, then command-line flags
fn resolve_config(config_path: Option<&Path>, flags: ConfigOverrides) -> ThumbnailConfig {
    let file = match settings::load_overrides(config_path) {
        Some((path, overrides)) => {
            info!(path = %path.display(), "Loaded settings");
            overrides
        }
        None => ConfigOverrides::default(),
    };

    let mut config = ThumbnailConfig::default();
    config.apply(&file.merged_with(flags));
    debug!(?config, "Resolved configuration");
    config
}

fn run_scan(target: &TargetArgs, config: &ThumbnailConfig, json: bool) -> Result<()> {
    let groups = target.scan(config)?;

    if json {
        let payload: Vec<ScanPayload> = groups.iter().map(scan_to_payload).collect();
        let json = serde_json::to_string_pretty(&payload).context("Failed to serialize groups to JSON")?;
        println!("{}", json);
        return Ok(());
    }

    let root = target.root.canonicalize()?;
    let total: usize = groups.iter().map(DirectoryGroup::len).sum();
    println!("🔍 {} images in {} directories under {}", total, groups.len(), root.display());
    for group in &groups {
        println!("\n📁 {}", relative_dir(&root, &group.directory).display());
        for image in &group.images {
            let name = image.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            println!("   {}", name);
        }
    }
    Ok(())
}

fn run_thumbs(target: &TargetArgs, config: &ThumbnailConfig, out: Option<&Path>, json: bool) -> Result<()> {
    let groups = target.scan(config)?;
    let root = target.root.canonicalize()?;

    if let Some(out) = out {
        fs::create_dir_all(out)
            .with_context(|| format!("Failed to create output directory: {}", out.display()))?;
    }

    let cache = Arc::new(ThumbnailCache::new(config)?);
    let loader = ThumbnailLoader::new(Arc::clone(&cache), config)?;

    let collected = Arc::new(Mutex::new(Vec::with_capacity(groups.len())));
    let sink = Arc::clone(&collected);
    let summary = loader.load_all(groups, &CancelToken::new(), move |group| {
        sink.lock().push(group);
    })?;

    let mut loaded = std::mem::take(&mut *collected.lock());
    loaded.sort_by(|a, b| compare_paths(&a.directory, &b.directory));

    if let Some(out) = out {
        for group in &loaded {
            write_group(out, &root, group)?;
        }
    }

    if json {
        let payload: Vec<GroupPayload> = loaded.iter().map(group_to_payload).collect();
        let json = serde_json::to_string_pretty(&payload).context("Failed to serialize thumbnails to JSON")?;
        println!("{}", json);
        return Ok(());
    }

    for group in &loaded {
        let failed = if group.failed > 0 {
            format!(", {} failed", group.failed)
        } else {
            String::new()
        };
        println!(
            "📁 {} ({} thumbnails{})",
            relative_dir(&root, &group.directory).display(),
            group.thumbnails.len(),
            failed
        );
    }

    let stats = cache.cache_stats();
    println!(
        "\n📸 {} thumbnails in {} groups, {} failed",
        summary.thumbnails, summary.groups, summary.failed
    );
    println!(
        "🗃️  Cache: {}/{} entries, {} evictions",
        stats.items, stats.capacity, stats.evictions
    );
    if let Some(out) = out {
        println!("💾 Thumbnails saved to: {}", out.display());
    }
    Ok(())
}

fn scan_to_payload(group: &DirectoryGroup) -> ScanPayload {
    ScanPayload {
        directory: group.directory.display().to_string(),
        images: group.images.iter().map(|p| p.display().to_string()).collect(),
    }
}

fn group_to_payload(group: &LoadedGroup) -> GroupPayload {
    GroupPayload {
        directory: group.directory.display().to_string(),
        failed: group.failed,
        thumbnails: group
            .thumbnails
            .iter()
            .map(|t| ThumbnailPayload {
                path: t.path.display().to_string(),
                width: t.width(),
                height: t.height(),
                source_width: t.source_width,
                source_height: t.source_height,
            })
            .collect(),
    }
}

fn relative_dir<'a>(root: &Path, directory: &'a Path) -> &'a Path {
    match directory.strip_prefix(root) {
        Ok(relative) if relative.as_os_str().is_empty() => Path::new("."),
        Ok(relative) => relative,
        Err(_) => directory,
    }
}

/// Where a thumbnail is written: the source's directory relative to the
/// scan root, mirrored under `out`, with a `.png` extension
fn output_path(out: &Path, root: &Path, source: &Path) -> PathBuf {
    let relative = source.strip_prefix(root).unwrap_or(source);
    let relative = relative.strip_prefix("/").unwrap_or(relative);
    out.join(relative).with_extension("png")
}

fn write_group(out: &Path, root: &Path, group: &LoadedGroup) -> Result<()> {
    for thumbnail in &group.thumbnails {
        let target = output_path(out, root, &thumbnail.path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        thumbnail
            .pixels
            .save(&target)
            .with_context(|| format!("Failed to write thumbnail: {}", target.display()))?;
    }
    Ok(())
}

fn setup_logging(verbose: bool) {
    let default = if verbose {
        "parax=debug,thumbnail_cache=debug,image_scan=debug,warn"
    } else {
        "parax=info,thumbnail_cache=info,image_scan=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_dir() {
        let root = Path::new("/photos");
        assert_eq!(relative_dir(root, Path::new("/photos")), Path::new("."));
        assert_eq!(relative_dir(root, Path::new("/photos/2024/trip")), Path::new("2024/trip"));
        assert_eq!(relative_dir(root, Path::new("/elsewhere")), Path::new("/elsewhere"));
    }

    #[test]
    fn test_output_path_mirrors_layout() {
        let out = Path::new("/tmp/thumbs");
        let root = Path::new("/photos");
        assert_eq!(
            output_path(out, root, Path::new("/photos/sub/c.webp")),
            PathBuf::from("/tmp/thumbs/sub/c.png")
        );
        assert_eq!(
            output_path(out, root, Path::new("/photos/a.jpg")),
            PathBuf::from("/tmp/thumbs/a.png")
        );
        // Outside the root: never escapes `out`
        assert_eq!(
            output_path(out, root, Path::new("/other/x.jpg")),
            PathBuf::from("/tmp/thumbs/other/x.png")
        );
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "parax", "thumbs", "/photos", "--max-depth", "1", "--size", "64x64", "--out", "/tmp/t",
        ])
        .unwrap();
        match cli.command {
            Commands::Thumbs { target, size, out, .. } => {
                assert_eq!(target.root, PathBuf::from("/photos"));
                assert_eq!(target.max_depth, Some(1));
                assert_eq!(size.as_deref(), Some("64x64"));
                assert_eq!(out, Some(PathBuf::from("/tmp/t")));
            }
            Commands::Scan { .. } => panic!("expected thumbs"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_payload_survives_non_utf8_names() -> Result<()> {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let group = DirectoryGroup {
            directory: PathBuf::from("/photos"),
            images: vec![Path::new("/photos").join(OsStr::from_bytes(b"caf\xe9.jpg"))],
        };
        let json = serde_json::to_string(&[scan_to_payload(&group)])?;
        assert!(json.contains("/photos/caf\u{FFFD}.jpg"));
        Ok(())
    }
}
