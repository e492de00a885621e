//! File type classification by extension

use std::path::Path;

/// Extensions the thumbnail pipeline can decode, lowercase and without the dot
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Check whether a file name or path has a supported image extension.
///
/// Matching is case-insensitive and looks only at the final extension, so
/// `photo.JPG` is supported while `archive.jpg.gz` and `.png` are not.
pub fn is_supported<P: AsRef<Path>>(filename: P) -> bool {
    match filename.as_ref().extension().and_then(|ext| ext.to_str()) {
        Some(ext) => SUPPORTED_EXTENSIONS
            .iter()
            .any(|supported| supported.eq_ignore_ascii_case(ext)),
        None => false,
    }
}
