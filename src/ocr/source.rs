//! Decoding of caller-supplied image bytes

use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;

use super::error::{OcrError, OcrResult};

/// A validated source image
///
/// Keeps the encoded bytes for backends that decode on their own side, and
/// the decoded pixels for backends that take a bitmap.
#[derive(Debug, Clone)]
pub struct SourceImage {
    encoded: Vec<u8>,
    format: ImageFormat,
    decoded: DynamicImage,
}

impl SourceImage {
    /// Decode an encoded image (PNG, JPEG, ...). The container format is
    /// sniffed from the content.
    pub fn decode(bytes: &[u8]) -> OcrResult<Self> {
        if bytes.is_empty() {
            return Err(OcrError::InvalidImage("image buffer is empty".to_string()));
        }

        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| OcrError::InvalidImage(e.to_string()))?;

        let format = reader
            .format()
            .ok_or_else(|| OcrError::InvalidImage("unrecognized image format".to_string()))?;

        let decoded = reader
            .decode()
            .map_err(|e| OcrError::InvalidImage(e.to_string()))?;

        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(OcrError::InvalidImage("image has no pixels".to_string()));
        }

        Ok(Self {
            encoded: bytes.to_vec(),
            format,
            decoded,
        })
    }

    pub fn width(&self) -> u32 {
        self.decoded.width()
    }

    pub fn height(&self) -> u32 {
        self.decoded.height()
    }

    /// Get image dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// Container format detected while decoding
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// The bytes exactly as the caller supplied them
    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    /// Decoded pixels
    pub fn pixels(&self) -> &DynamicImage {
        &self.decoded
    }
}

#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([255, 255, 255, 255]));
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}
