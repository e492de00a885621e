//! Image discovery for parax
//!
//! This crate finds the image files a thumbnail browser should show and decides
//! the order they are shown in. It knows nothing about decoding.
//!
//! # Features
//!
//! - **Extension classification**: case-insensitive allow-list of decodable formats
//! - **Depth-limited scanning**: files grouped by their containing directory
//! - **Natural ordering**: `img2.png` sorts before `img10.png`

pub mod classify;
pub mod natural;
pub mod scan;

pub use classify::{is_supported, SUPPORTED_EXTENSIONS};
pub use natural::{compare_paths, natural_cmp};
pub use scan::{scan, DirectoryGroup, ScanError, ScanOptions, Scanner};
