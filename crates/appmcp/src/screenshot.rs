//! Raster capture results and JPEG/base64 encoding.

use base64::{engine::general_purpose, Engine};
use image::imageops::FilterType;
use image::{codecs::jpeg::JpegEncoder, ImageBuffer, Rgba};
use std::io::Cursor;

use crate::errors::AutomationError;

/// Longest-side ceiling for snapshot images returned to controllers.
pub const SNAPSHOT_MAX_DIMENSION: u32 = 600;
/// Longest-side ceiling for the coarse raster used by change fingerprints.
pub const FINGERPRINT_MAX_DIMENSION: u32 = 240;
/// JPEG quality factor for wire images.
pub const JPEG_QUALITY: u8 = 40;

/// Holds captured window pixels in RGBA order.
#[derive(Debug, Clone)]
pub struct ScreenshotResult {
    pub image_data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ScreenshotResult {
    /// Dimensions after applying a longest-side ceiling.
    pub fn resized_dimensions(&self, max_dimension: u32) -> (u32, u32) {
        if self.width <= max_dimension && self.height <= max_dimension {
            return (self.width, self.height);
        }
        let scale = (max_dimension as f32 / self.width.max(self.height) as f32).min(1.0);
        let w = ((self.width as f32 * scale).round() as u32).max(1);
        let h = ((self.height as f32 * scale).round() as u32).max(1);
        (w, h)
    }

    /// Downscale so the longest side does not exceed `max_dimension`.
    /// Returns self unchanged when already within the ceiling.
    pub fn downscaled(&self, max_dimension: u32) -> Result<ScreenshotResult, AutomationError> {
        let (w, h) = self.resized_dimensions(max_dimension);
        if w == self.width && h == self.height {
            return Ok(self.clone());
        }
        let img =
            ImageBuffer::<Rgba<u8>, _>::from_raw(self.width, self.height, self.image_data.clone())
                .ok_or_else(|| {
                    AutomationError::SystemError("screenshot buffer has inconsistent size".into())
                })?;
        let resized = image::imageops::resize(&img, w, h, FilterType::Lanczos3);
        Ok(ScreenshotResult {
            image_data: resized.into_raw(),
            width: w,
            height: h,
        })
    }

    /// Encode as JPEG at the wire quality factor.
    pub fn to_jpeg(&self) -> Result<Vec<u8>, AutomationError> {
        let img =
            ImageBuffer::<Rgba<u8>, _>::from_raw(self.width, self.height, self.image_data.clone())
                .ok_or_else(|| {
                    AutomationError::SystemError("screenshot buffer has inconsistent size".into())
                })?;
        // JPEG has no alpha channel.
        let rgb = image::DynamicImage::ImageRgba8(img).into_rgb8();
        let mut out = Vec::new();
        let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut out), JPEG_QUALITY);
        rgb.write_with_encoder(encoder)
            .map_err(|e| AutomationError::SystemError(format!("JPEG encoding failed: {e}")))?;
        Ok(out)
    }

    /// Encode as a `data:image/jpeg;base64,...` URI.
    pub fn to_jpeg_data_uri(&self) -> Result<String, AutomationError> {
        let jpeg = self.to_jpeg()?;
        Ok(format!(
            "data:image/jpeg;base64,{}",
            general_purpose::STANDARD.encode(&jpeg)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> ScreenshotResult {
        ScreenshotResult {
            image_data: rgba
                .iter()
                .copied()
                .cycle()
                .take((width * height * 4) as usize)
                .collect(),
            width,
            height,
        }
    }

    #[test]
    fn downscale_preserves_aspect_ratio() {
        let shot = solid(1200, 600, [10, 20, 30, 255]);
        let small = shot.downscaled(600).unwrap();
        assert_eq!((small.width, small.height), (600, 300));
        // Already within the ceiling: untouched.
        let same = small.downscaled(600).unwrap();
        assert_eq!((same.width, same.height), (600, 300));
    }

    #[test]
    fn jpeg_data_uri_has_expected_prefix() {
        let shot = solid(32, 16, [200, 100, 50, 255]);
        let uri = shot.to_jpeg_data_uri().unwrap();
        assert!(uri.starts_with("data:image/jpeg;base64,"));
        assert!(uri.len() > "data:image/jpeg;base64,".len());
    }

    #[test]
    fn inconsistent_buffer_is_rejected() {
        let bad = ScreenshotResult {
            image_data: vec![0; 7],
            width: 4,
            height: 4,
        };
        assert!(bad.to_jpeg().is_err());
    }
}
