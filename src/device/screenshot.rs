//! Screen captures handed from a backend to the agent loop.

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, RgbImage};
use std::io::Cursor;

use super::backend::DeviceError;

const PNG_MAGIC: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// Frame size used when the device refuses to capture.
pub const FALLBACK_WIDTH: u32 = 1080;
pub const FALLBACK_HEIGHT: u32 = 2400;

/// Represents a captured screenshot. Valid for a single step.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub base64_data: String,
    pub width: u32,
    pub height: u32,
    /// Capture was blocked by the OS, e.g. on a payment page.
    pub is_sensitive: bool,
}

impl Screenshot {
    /// Create a new screenshot.
    pub fn new(base64_data: String, width: u32, height: u32, is_sensitive: bool) -> Self {
        Self {
            base64_data,
            width,
            height,
            is_sensitive,
        }
    }

    /// Decode PNG bytes for their dimensions and wrap them.
    pub fn from_png(png_data: &[u8]) -> Result<Self, DeviceError> {
        if png_data.len() < PNG_MAGIC.len() || &png_data[..PNG_MAGIC.len()] != PNG_MAGIC {
            return Err(DeviceError::InvalidResponse(format!(
                "not a PNG image ({} bytes)",
                png_data.len()
            )));
        }

        let img = image::load_from_memory(png_data)
            .map_err(|e| DeviceError::InvalidResponse(format!("failed to decode PNG: {}", e)))?;

        Ok(Self::new(
            STANDARD.encode(png_data),
            img.width(),
            img.height(),
            false,
        ))
    }

    /// Decode a base64 PNG, as returned by HTTP backends.
    pub fn from_base64_png(data: &str) -> Result<Self, DeviceError> {
        let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|e| DeviceError::InvalidResponse(format!("invalid base64 image: {}", e)))?;
        Self::from_png(&bytes)
    }

    /// Create a black fallback image when a capture fails.
    pub fn fallback(is_sensitive: bool) -> Self {
        let black_img = RgbImage::new(FALLBACK_WIDTH, FALLBACK_HEIGHT);
        let dynamic_img = DynamicImage::ImageRgb8(black_img);

        let mut buffer = Cursor::new(Vec::new());
        if let Err(e) = dynamic_img.write_to(&mut buffer, image::ImageFormat::Png) {
            tracing::error!("Failed to encode fallback screenshot: {}", e);
        }
        let base64_data = STANDARD.encode(buffer.into_inner());

        Self::new(base64_data, FALLBACK_WIDTH, FALLBACK_HEIGHT, is_sensitive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_fallback_screenshot() {
        let screenshot = Screenshot::fallback(true);
        assert_eq!(screenshot.width, 1080);
        assert_eq!(screenshot.height, 2400);
        assert!(screenshot.is_sensitive);
        assert!(!screenshot.base64_data.is_empty());
    }

    #[test]
    fn test_from_png_reads_dimensions() {
        let screenshot = Screenshot::from_png(&tiny_png(12, 34)).unwrap();
        assert_eq!((screenshot.width, screenshot.height), (12, 34));
        assert!(!screenshot.is_sensitive);

        let again = Screenshot::from_base64_png(&screenshot.base64_data).unwrap();
        assert_eq!((again.width, again.height), (12, 34));
    }

    #[test]
    fn test_from_png_rejects_garbage() {
        assert!(Screenshot::from_png(b"error: device offline").is_err());
        assert!(Screenshot::from_png(&[]).is_err());
    }
}
