//! Image encode/decode service
//!
//! Keeps byte-level image handling out of the pipeline stages.

use crate::error::{ForgeError, Result};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// Service for turning stored bytes into images and back
pub struct ImageCodec;

impl ImageCodec {
    /// Decode downloaded bytes, sniffing the format from content.
    ///
    /// The result is normalized to RGB8, which is what the generation
    /// service expects.
    ///
    /// # Errors
    /// - Unknown or corrupt image data
    pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(ForgeError::Image(image::ImageError::IoError(
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "empty image body"),
            )));
        }
        let image = image::load_from_memory(bytes)?;
        Ok(DynamicImage::ImageRgb8(image.to_rgb8()))
    }

    /// Encode an image as PNG for upload
    ///
    /// # Errors
    /// - Encoder failures
    pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png)?;
        Ok(buffer.into_inner())
    }
}
