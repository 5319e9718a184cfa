//! Image format detection and normalization.
//!
//! The true format is sniffed from magic bytes and always wins over the
//! claimed extension. Animated container formats the decoder understands
//! (GIF, WebP) are re-encoded as a PNG of their first frame so storage and
//! vision models see a single static image.

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use std::fmt;
use std::io::Cursor;

use crate::error::{EmomoError, Result};

/// Image formats recognised by signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
    Tiff,
    Ico,
    Avif,
}

impl MediaFormat {
    /// Canonical lowercase name, also used as the file extension.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFormat::Jpeg => "jpeg",
            MediaFormat::Png => "png",
            MediaFormat::Gif => "gif",
            MediaFormat::Webp => "webp",
            MediaFormat::Bmp => "bmp",
            MediaFormat::Tiff => "tiff",
            MediaFormat::Ico => "ico",
            MediaFormat::Avif => "avif",
        }
    }

    /// Parse a format name or extension (`jpg`, `.PNG`, `tif`).
    pub fn from_name(name: &str) -> Option<MediaFormat> {
        match normalize_claimed(name).as_str() {
            "jpeg" => Some(MediaFormat::Jpeg),
            "png" => Some(MediaFormat::Png),
            "gif" => Some(MediaFormat::Gif),
            "webp" => Some(MediaFormat::Webp),
            "bmp" => Some(MediaFormat::Bmp),
            "tiff" => Some(MediaFormat::Tiff),
            "ico" => Some(MediaFormat::Ico),
            "avif" => Some(MediaFormat::Avif),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            MediaFormat::Jpeg => "image/jpeg",
            MediaFormat::Png => "image/png",
            MediaFormat::Gif => "image/gif",
            MediaFormat::Webp => "image/webp",
            MediaFormat::Bmp => "image/bmp",
            MediaFormat::Tiff => "image/tiff",
            MediaFormat::Ico => "image/x-icon",
            MediaFormat::Avif => "image/avif",
        }
    }

    /// Whether the format may hold several frames and gets flattened.
    pub fn needs_flattening(&self) -> bool {
        matches!(self, MediaFormat::Gif | MediaFormat::Webp)
    }

    fn decoder_format(&self) -> Option<image::ImageFormat> {
        match self {
            MediaFormat::Jpeg => Some(image::ImageFormat::Jpeg),
            MediaFormat::Png => Some(image::ImageFormat::Png),
            MediaFormat::Gif => Some(image::ImageFormat::Gif),
            MediaFormat::Webp => Some(image::ImageFormat::WebP),
            MediaFormat::Bmp => Some(image::ImageFormat::Bmp),
            MediaFormat::Tiff => Some(image::ImageFormat::Tiff),
            MediaFormat::Ico => Some(image::ImageFormat::Ico),
            MediaFormat::Avif => None,
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content type for a format name, `application/octet-stream` if unknown.
pub fn content_type_for(name: &str) -> &'static str {
    MediaFormat::from_name(name)
        .map(|f| f.content_type())
        .unwrap_or("application/octet-stream")
}

/// Normalize a claimed format: lowercase, no leading dot, `jpg`→`jpeg`,
/// `tif`→`tiff`.
pub fn normalize_claimed(claimed: &str) -> String {
    let lower = claimed.trim().trim_start_matches('.').to_ascii_lowercase();
    match lower.as_str() {
        "jpg" | "jpe" => "jpeg".to_string(),
        "tif" => "tiff".to_string(),
        _ => lower,
    }
}

/// Sniff the format from magic bytes.
pub fn detect_format(data: &[u8]) -> Option<MediaFormat> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(MediaFormat::Jpeg);
    }
    if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(MediaFormat::Png);
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some(MediaFormat::Gif);
    }
    if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return Some(MediaFormat::Webp);
    }
    if data.starts_with(b"BM") {
        return Some(MediaFormat::Bmp);
    }
    if data.starts_with(b"II*\0") || data.starts_with(b"MM\0*") {
        return Some(MediaFormat::Tiff);
    }
    if data.starts_with(&[0x00, 0x00, 0x01, 0x00]) {
        return Some(MediaFormat::Ico);
    }
    if data.len() >= 12 && &data[4..8] == b"ftyp" && matches!(&data[8..12], b"avif" | b"avis") {
        return Some(MediaFormat::Avif);
    }
    None
}

/// Result of normalizing one image.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// Bytes to store and analyse
    pub data: Vec<u8>,

    /// Final format name (detected, converted, or the claimed one)
    pub format: String,

    /// Format found by signature, if any
    pub detected: Option<MediaFormat>,

    /// Claimed format after normalization
    pub claimed: String,

    pub width: Option<u32>,
    pub height: Option<u32>,

    /// Whether the bytes were re-encoded
    pub converted: bool,
}

impl NormalizedImage {
    /// Whether the signature disagrees with the claimed format.
    pub fn is_mismatch(&self) -> bool {
        self.detected
            .is_some_and(|detected| detected.as_str() != self.claimed)
    }

    pub fn content_type(&self) -> &'static str {
        content_type_for(&self.format)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width.unwrap_or(0), self.height.unwrap_or(0))
    }
}

/// Detect the format of `data` and flatten animated containers.
///
/// The input is never modified. Unknown signatures fall back to the claimed
/// format and pass through unchanged.
pub fn normalize(data: &[u8], claimed: &str) -> Result<NormalizedImage> {
    let claimed = normalize_claimed(claimed);
    let detected = detect_format(data);

    if let Some(format) = detected.filter(MediaFormat::needs_flattening) {
        let (png, width, height) = first_frame_png(data, format)?;
        return Ok(NormalizedImage {
            data: png,
            format: MediaFormat::Png.as_str().to_string(),
            detected,
            claimed,
            width: Some(width),
            height: Some(height),
            converted: true,
        });
    }

    let (width, height) = match dimensions(data) {
        Some((w, h)) => (Some(w), Some(h)),
        None => (None, None),
    };

    let format = detected
        .map(|f| f.as_str().to_string())
        .unwrap_or_else(|| claimed.clone());

    Ok(NormalizedImage {
        data: data.to_vec(),
        format,
        detected,
        claimed,
        width,
        height,
        converted: false,
    })
}

/// Width and height read from the image header, if decodable.
pub fn dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let reader = image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?;
    reader.into_dimensions().ok()
}

fn first_frame_png(data: &[u8], format: MediaFormat) -> Result<(Vec<u8>, u32, u32)> {
    let decoder_format = format
        .decoder_format()
        .ok_or_else(|| EmomoError::Format(format!("no decoder for {format}").into()))?;

    // Decoding a multi-frame image yields its first frame.
    let frame = image::load_from_memory_with_format(data, decoder_format)
        .map_err(|e| EmomoError::Format(Box::new(e)))?;
    let rgba = frame.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut encoded = Vec::new();
    PngEncoder::new(&mut encoded)
        .write_image(&rgba, width, height, ColorType::Rgba8.into())
        .map_err(|e| EmomoError::Format(Box::new(e)))?;

    Ok((encoded, width, height))
}
