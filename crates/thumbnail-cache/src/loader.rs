//! Group loading: fan out decodes per directory, then order the results
//!
//! Each directory group gets its own bounded runner over a shared decode pool,
//! and `load_all` drives groups through an outer bounded runner. Results
//! within a group are sorted in natural order, so completion order never
//! shows. Work can be cancelled cooperatively when the user moves on.

use crate::cache::ThumbnailCache;
use crate::error::ThumbnailError;
use crate::generate::Thumbnail;
use crate::runner::{worker_pool, BoundedTaskRunner};
use crate::ThumbnailConfig;
use image_scan::{compare_paths, DirectoryGroup};
use parking_lot::Mutex;
use rayon::ThreadPool;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, warn};

/// Thumbnails of one directory, in natural order. Files that failed to load
/// are absent and only counted.
#[derive(Debug, Clone)]
pub struct LoadedGroup {
    pub directory: PathBuf,
    pub thumbnails: Vec<Arc<Thumbnail>>,
    pub failed: usize,
}

/// Totals for a `load_all` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub groups: usize,
    pub thumbnails: usize,
    pub failed: usize,
}

/// Shared flag for abandoning a batch. Tasks already decoding finish; tasks
/// not yet started are skipped.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct ThumbnailLoader {
    cache: Arc<ThumbnailCache>,
    group_pool: Arc<ThreadPool>,
    decode_pool: Arc<ThreadPool>,
    max_groups: usize,
    max_decodes: usize,
}

impl ThumbnailLoader {
    /// Create a loader with the concurrency caps from `config`.
    ///
    /// The decode pool never has more threads than the machine has cores, so
    /// the per-group cap bounds queued work while the pool bounds CPU use.
    pub fn new(cache: Arc<ThumbnailCache>, config: &ThumbnailConfig) -> Result<Self, ThumbnailError> {
        let max_groups = config.max_groups_in_flight.max(1);
        let max_decodes = config.max_decodes_in_flight.max(1);
        let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(4);

        Ok(Self {
            group_pool: worker_pool(max_groups, "parax-group")?,
            decode_pool: worker_pool(max_decodes.min(cores), "parax-decode")?,
            cache,
            max_groups,
            max_decodes,
        })
    }

    pub fn cache(&self) -> &Arc<ThumbnailCache> {
        &self.cache
    }

    /// Load every image of a group, returning once all of them are processed
    pub fn load_group(&self, group: &DirectoryGroup) -> Result<LoadedGroup, ThumbnailError> {
        self.load_group_with(group, &CancelToken::new())
    }

    pub fn load_group_with(
        &self,
        group: &DirectoryGroup,
        cancel: &CancelToken,
    ) -> Result<LoadedGroup, ThumbnailError> {
        let runner = BoundedTaskRunner::with_pool(self.max_decodes, Arc::clone(&self.decode_pool))?;
        let loaded = Arc::new(Mutex::new(Vec::with_capacity(group.len())));
        let failed = Arc::new(AtomicUsize::new(0));

        for path in &group.images {
            if cancel.is_cancelled() {
                break;
            }

            let cache = Arc::clone(&self.cache);
            let loaded = Arc::clone(&loaded);
            let failed = Arc::clone(&failed);
            let cancel = cancel.clone();
            let path = path.clone();

            runner.submit(move || {
                if cancel.is_cancelled() {
                    return;
                }
                match cache.get_or_generate(&path) {
                    Ok(thumbnail) => loaded.lock().push(thumbnail),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "Skipping thumbnail");
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
        runner.wait_all();

        let mut thumbnails = std::mem::take(&mut *loaded.lock());
        thumbnails.sort_by(|a, b| compare_paths(&a.path, &b.path));
        let failed = failed.load(Ordering::Relaxed);

        debug!(
            directory = %group.directory.display(),
            loaded = thumbnails.len(),
            failed,
            "Group loaded"
        );

        Ok(LoadedGroup {
            directory: group.directory.clone(),
            thumbnails,
            failed,
        })
    }

    /// Load many groups concurrently, handing each to `on_group` as it
    /// completes. Groups arrive in completion order. Returns after every
    /// started group has finished.
    pub fn load_all<F>(
        &self,
        groups: Vec<DirectoryGroup>,
        cancel: &CancelToken,
        on_group: F,
    ) -> Result<LoadSummary, ThumbnailError>
    where
        F: Fn(LoadedGroup) + Send + Sync + 'static,
    {
        let runner = BoundedTaskRunner::with_pool(self.max_groups, Arc::clone(&self.group_pool))?;
        let on_group = Arc::new(on_group);
        let summary = Arc::new(Mutex::new(LoadSummary::default()));

        for group in groups {
            if cancel.is_cancelled() {
                break;
            }

            let loader = self.clone();
            let on_group = Arc::clone(&on_group);
            let summary = Arc::clone(&summary);
            let cancel = cancel.clone();

            runner.submit(move || {
                if cancel.is_cancelled() {
                    return;
                }
                match loader.load_group_with(&group, &cancel) {
                    // A cancelled batch is discarded, even if partially loaded
                    Ok(_) if cancel.is_cancelled() => {}
                    Ok(loaded) => {
                        {
                            let mut summary = summary.lock();
                            summary.groups += 1;
                            summary.thumbnails += loaded.thumbnails.len();
                            summary.failed += loaded.failed;
                        }
                        on_group(loaded);
                    }
                    Err(err) => {
                        error!(directory = %group.directory.display(), error = %err, "Failed to load group");
                    }
                }
            });
        }
        runner.wait_all();

        let summary = *summary.lock();
        Ok(summary)
    }
}
