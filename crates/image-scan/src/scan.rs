//! Depth-limited directory scanning
//!
//! Walks a directory tree and groups supported image files by the directory
//! that directly contains them. Only the root itself must be readable; any
//! other entry that cannot be read is skipped and the walk goes on.

use crate::classify::is_supported;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Supported images found directly inside one directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryGroup {
    pub directory: PathBuf,
    pub images: Vec<PathBuf>,
}

impl DirectoryGroup {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("cannot read root directory {}: {source}", path.display())]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// How many directory levels below the root to descend. 0 keeps the
    /// scan to the root's direct children.
    pub max_depth: usize,
    /// Prune dot-directories and ignore dot-files
    pub skip_hidden: bool,
}

impl ScanOptions {
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scanner {
    options: ScanOptions,
}

impl Scanner {
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> ScanOptions {
        self.options
    }

    /// Scan `root`, returning one group per directory holding at least one
    /// supported file. Groups appear in walk order; paths are absolute.
    pub fn scan(&self, root: &Path) -> Result<Vec<DirectoryGroup>, ScanError> {
        let unreadable = |source| ScanError::RootUnreadable {
            path: root.to_path_buf(),
            source,
        };
        let root = root.canonicalize().map_err(unreadable)?;
        fs::read_dir(&root).map_err(unreadable)?;

        let skip_hidden = self.options.skip_hidden;
        let walker = WalkDir::new(&root)
            .min_depth(1)
            // walkdir counts the root's children as depth 1
            .max_depth(self.options.max_depth.saturating_add(1))
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !(skip_hidden && is_hidden(entry)));

        let mut groups: Vec<DirectoryGroup> = Vec::new();
        let mut by_directory: HashMap<PathBuf, usize> = HashMap::new();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(error = %err, "Skipping unreadable entry");
                    continue;
                }
            };

            if !is_supported(entry.file_name()) || !is_regular_file(&entry) {
                continue;
            }

            let path = entry.into_path();
            let Some(directory) = path.parent().map(Path::to_path_buf) else {
                continue;
            };

            let slot = *by_directory.entry(directory).or_insert_with_key(|directory| {
                groups.push(DirectoryGroup {
                    directory: directory.clone(),
                    images: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].images.push(path);
        }

        debug!(
            root = %root.display(),
            groups = groups.len(),
            max_depth = self.options.max_depth,
            "Scan finished"
        );
        Ok(groups)
    }
}

/// Scan `root` down to `max_depth` levels with default options
pub fn scan<P: AsRef<Path>>(root: P, max_depth: usize) -> Result<Vec<DirectoryGroup>, ScanError> {
    Scanner::new(ScanOptions::with_max_depth(max_depth)).scan(root.as_ref())
}

/// Regular files, or symlinks that resolve to one. Pipes, sockets, devices
/// and dangling links are left out: reading a pipe never finishes.
fn is_regular_file(entry: &DirEntry) -> bool {
    let file_type = entry.file_type();
    if file_type.is_symlink() {
        return fs::metadata(entry.path()).map(|m| m.is_file()).unwrap_or(false);
    }
    file_type.is_file()
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    fn touch(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, b"")?;
        Ok(())
    }

    fn names(group: &DirectoryGroup) -> Vec<String> {
        group
            .images
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect()
    }

    fn find<'a>(groups: &'a [DirectoryGroup], dir: &Path) -> Option<&'a DirectoryGroup> {
        groups.iter().find(|g| g.directory == dir)
    }

    #[test]
    fn test_photos_scenario() -> Result<()> {
        let temp_dir = tempdir()?;
        let photos = temp_dir.path().join("photos");
        touch(&photos.join("a.jpg"))?;
        touch(&photos.join("b.png"))?;
        touch(&photos.join("notes.txt"))?;
        touch(&photos.join("sub").join("c.webp"))?;

        let groups = scan(&photos, 1)?;
        let photos = photos.canonicalize()?;

        assert_eq!(groups.len(), 2);
        let top = find(&groups, &photos).expect("top-level group");
        assert_eq!(names(top), vec!["a.jpg", "b.png"]);
        let sub = find(&groups, &photos.join("sub")).expect("sub group");
        assert_eq!(names(sub), vec!["c.webp"]);
        assert!(groups.iter().all(|g| g.images.iter().all(|p| p.is_absolute())));
        Ok(())
    }

    #[test]
    fn test_depth_zero_stays_in_root() -> Result<()> {
        let temp_dir = tempdir()?;
        let root = temp_dir.path();
        touch(&root.join("top.jpg"))?;
        touch(&root.join("sub").join("nested.jpg"))?;

        let groups = scan(root, 0)?;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].directory, root.canonicalize()?);
        assert_eq!(names(&groups[0]), vec!["top.jpg"]);
        Ok(())
    }

    #[test]
    fn test_depth_limit_is_respected() -> Result<()> {
        let temp_dir = tempdir()?;
        let root = temp_dir.path().canonicalize()?;
        let mut dir = root.clone();
        for level in 0..5 {
            touch(&dir.join(format!("level{}.png", level)))?;
            dir = dir.join(format!("d{}", level));
        }

        for max_depth in 0..5 {
            let groups = scan(&root, max_depth)?;
            assert_eq!(groups.len(), max_depth + 1);
            for group in &groups {
                let below = group.directory.strip_prefix(&root)?.components().count();
                assert!(below <= max_depth);
            }
        }
        Ok(())
    }

    #[test]
    fn test_directories_without_images_are_omitted() -> Result<()> {
        let temp_dir = tempdir()?;
        let root = temp_dir.path().canonicalize()?;
        touch(&root.join("only_dirs").join("inner").join("x.png"))?;
        touch(&root.join("text_only").join("readme.md"))?;

        let groups = scan(&root, 2)?;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].directory, root.join("only_dirs").join("inner"));
        Ok(())
    }

    #[test]
    fn test_files_are_in_name_order() -> Result<()> {
        let temp_dir = tempdir()?;
        let root = temp_dir.path();
        for name in ["c.jpg", "a.jpg", "B.JPG", "b.jpeg"] {
            touch(&root.join(name))?;
        }

        let groups = scan(root, 0)?;
        assert_eq!(names(&groups[0]), vec!["B.JPG", "a.jpg", "b.jpeg", "c.jpg"]);
        Ok(())
    }

    #[test]
    fn test_unreadable_root_is_an_error() {
        let temp_dir = tempdir().unwrap();
        let missing = temp_dir.path().join("does-not-exist");

        let err = scan(&missing, 2).unwrap_err();
        let ScanError::RootUnreadable { path, .. } = err;
        assert_eq!(path, missing);
    }

    #[test]
    fn test_root_must_be_a_directory() -> Result<()> {
        let temp_dir = tempdir()?;
        let file = temp_dir.path().join("a.jpg");
        touch(&file)?;

        assert!(scan(&file, 0).is_err());
        Ok(())
    }

    #[test]
    fn test_skip_hidden() -> Result<()> {
        let temp_dir = tempdir()?;
        let root = temp_dir.path().canonicalize()?;
        touch(&root.join("visible.jpg"))?;
        touch(&root.join(".hidden.jpg"))?;
        touch(&root.join(".thumbs").join("cached.jpg"))?;

        let all = scan(&root, 1)?;
        assert_eq!(all.len(), 2);

        let scanner = Scanner::new(ScanOptions {
            max_depth: 1,
            skip_hidden: true,
        });
        let visible = scanner.scan(&root)?;
        assert_eq!(visible.len(), 1);
        assert_eq!(names(&visible[0]), vec!["visible.jpg"]);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_symlink_does_not_abort() -> Result<()> {
        let temp_dir = tempdir()?;
        let root = temp_dir.path();
        touch(&root.join("real.jpg"))?;
        std::os::unix::fs::symlink(root.join("missing-dir"), root.join("dangling"))?;

        let groups = scan(root, 3)?;
        assert_eq!(groups.len(), 1);
        assert_eq!(names(&groups[0]), vec!["real.jpg"]);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_only_regular_files_are_grouped() -> Result<()> {
        let temp_dir = tempdir()?;
        let root = temp_dir.path().canonicalize()?;
        touch(&root.join("real.jpg"))?;
        fs::create_dir(root.join("folder.png"))?;
        std::os::unix::fs::symlink(root.join("real.jpg"), root.join("alias.jpg"))?;
        std::os::unix::fs::symlink(root.join("gone.jpg"), root.join("dangling.jpg"))?;
        let status = std::process::Command::new("mkfifo")
            .arg(root.join("pipe.jpg"))
            .status()?;
        assert!(status.success());

        let groups = scan(&root, 1)?;
        assert_eq!(groups.len(), 1);
        assert_eq!(names(&groups[0]), vec!["alias.jpg", "real.jpg"]);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subdirectory_is_skipped() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempdir()?;
        let root = temp_dir.path().canonicalize()?;
        touch(&root.join("top.jpg"))?;
        touch(&root.join("locked").join("inside.jpg"))?;
        touch(&root.join("open").join("visible.png"))?;

        let locked = root.join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000))?;
        // Privileged users can read it anyway; nothing to check then
        let bypassed = fs::read_dir(&locked).is_ok();

        let result = scan(&root, 2);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755))?;
        if bypassed {
            return Ok(());
        }

        let groups = result?;
        assert_eq!(groups.len(), 2);
        assert!(find(&groups, &root).is_some());
        assert!(find(&groups, &root.join("open")).is_some());
        assert!(find(&groups, &locked).is_none());
        Ok(())
    }
}
