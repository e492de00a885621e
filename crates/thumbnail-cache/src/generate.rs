//! Thumbnail generation: read, decode, and scale into a bounding box
//!
//! The source file is read into a buffer that lives only for the decode step;
//! the returned thumbnail owns its pixels outright.

use crate::error::{ConfigError, ThumbnailError};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Resampling filter used when scaling. All variants interpolate smoothly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScaleFilter {
    /// Bilinear, the cheapest smooth filter
    #[default]
    Bilinear,
    CatmullRom,
    Lanczos3,
}

impl ScaleFilter {
    pub fn filter_type(&self) -> FilterType {
        match self {
            ScaleFilter::Bilinear => FilterType::Triangle,
            ScaleFilter::CatmullRom => FilterType::CatmullRom,
            ScaleFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

impl std::fmt::Display for ScaleFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleFilter::Bilinear => write!(f, "bilinear"),
            ScaleFilter::CatmullRom => write!(f, "catmull-rom"),
            ScaleFilter::Lanczos3 => write!(f, "lanczos3"),
        }
    }
}

impl std::str::FromStr for ScaleFilter {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "bilinear" | "triangle" => Ok(ScaleFilter::Bilinear),
            "catmull-rom" | "catmullrom" => Ok(ScaleFilter::CatmullRom),
            "lanczos3" | "lanczos" => Ok(ScaleFilter::Lanczos3),
            _ => Err(ConfigError::UnknownFilter(s.to_string())),
        }
    }
}

/// Bounding box for thumbnails, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailSize {
    pub width: u32,
    pub height: u32,
}

impl Default for ThumbnailSize {
    fn default() -> Self {
        Self::square(200)
    }
}

impl ThumbnailSize {
    pub fn new(width: u32, height: u32) -> Result<Self, ConfigError> {
        if width == 0 || height == 0 {
            return Err(ConfigError::InvalidSize(format!("{}x{}", width, height)));
        }
        Ok(Self { width, height })
    }

    /// Square box; a zero edge is clamped to one pixel
    pub fn square(edge: u32) -> Self {
        let edge = edge.max(1);
        Self {
            width: edge,
            height: edge,
        }
    }

    /// Dimensions of a `src_width` x `src_height` image scaled so it touches
    /// the box on its relatively longer side. Aspect ratio is kept (up to
    /// integer truncation) and neither result exceeds the box. Smaller images
    /// are scaled up.
    pub fn fit(&self, src_width: u32, src_height: u32) -> (u32, u32) {
        let (bw, bh) = (u64::from(self.width), u64::from(self.height));
        let (w, h) = (u64::from(src_width.max(1)), u64::from(src_height.max(1)));

        // Both results are bounded by the box, so the narrowing casts are lossless
        if w * bh >= h * bw {
            (self.width, (h * bw / w).max(1) as u32)
        } else {
            ((w * bh / h).max(1) as u32, self.height)
        }
    }
}

impl std::fmt::Display for ThumbnailSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl std::str::FromStr for ThumbnailSize {
    type Err = ConfigError;

    /// Parse `WIDTHxHEIGHT`, e.g. `200x200`
    fn from_str(s: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidSize(s.to_string());
        let (width, height) = s
            .trim()
            .split_once(|c: char| c == 'x' || c == 'X')
            .ok_or_else(invalid)?;
        let width = width.trim().parse::<u32>().map_err(|_| invalid())?;
        let height = height.trim().parse::<u32>().map_err(|_| invalid())?;
        Self::new(width, height).map_err(|_| invalid())
    }
}

/// How thumbnails are produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecOptions {
    pub size: ThumbnailSize,
    pub filter: ScaleFilter,
}

/// A scaled image ready for display. Never mutated once built.
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub path: PathBuf,
    pub pixels: RgbaImage,
    pub source_width: u32,
    pub source_height: u32,
}

impl Thumbnail {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Size of the pixel buffer in bytes
    pub fn byte_size(&self) -> usize {
        self.pixels.as_raw().len()
    }
}

/// Generate a thumbnail for a single image file
pub fn generate_thumbnail(path: &Path, options: &CodecOptions) -> Result<Thumbnail, ThumbnailError> {
    let metadata = fs::metadata(path).map_err(|source| ThumbnailError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    // Opening a pipe or device would block or never end
    if !metadata.is_file() {
        return Err(ThumbnailError::NotAFile {
            path: path.to_path_buf(),
        });
    }

    let img = {
        let data = fs::read(path).map_err(|source| ThumbnailError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        decode(path, &data)?
    };

    let (source_width, source_height) = img.dimensions();
    if source_width == 0 || source_height == 0 {
        return Err(ThumbnailError::Empty {
            path: path.to_path_buf(),
        });
    }

    Ok(Thumbnail {
        path: path.to_path_buf(),
        pixels: scale_image(&img, options),
        source_width,
        source_height,
    })
}

/// Decode from memory, sniffing the format and falling back to the extension
fn decode(path: &Path, data: &[u8]) -> Result<DynamicImage, ThumbnailError> {
    let mut reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|source| ThumbnailError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    if reader.format().is_none() {
        if let Ok(format) = ImageFormat::from_path(path) {
            reader.set_format(format);
        }
    }

    reader.decode().map_err(|source| ThumbnailError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

fn scale_image(img: &DynamicImage, options: &CodecOptions) -> RgbaImage {
    let (width, height) = img.dimensions();
    let (new_width, new_height) = options.size.fit(width, height);

    if (new_width, new_height) == (width, height) {
        return img.to_rgba8();
    }
    img.resize_exact(new_width, new_height, options.filter.filter_type())
        .into_rgba8()
}
