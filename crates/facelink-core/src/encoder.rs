//! Face encoding extraction.
//!
//! The encoder is a replaceable capability: the daemon composes either the
//! ONNX-backed encoder (see [`crate::onnx`]) or the deterministic mock
//! below. Nothing downstream branches on which one is in use.

use crate::types::FaceVector;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncoderError {
    /// The bytes could not be decoded as an image at all.
    #[error("invalid image data: {0}")]
    InvalidImage(String),
    /// The image decoded fine but contains no detectable face.
    #[error("no face detected in image")]
    NoFaceDetected,
    /// Model file missing at load time.
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    /// Inference-side failure (wrong output shape, runtime error).
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Extracts a fixed-length face encoding from a still image.
///
/// Implementations must be deterministic for identical input bytes and
/// side-effect free. When an image contains several faces, only the first
/// face in detector order is encoded — there is deliberately no
/// best-face-selection heuristic here.
pub trait FaceEncoder: Send + Sync {
    fn encode(&self, image_bytes: &[u8]) -> Result<FaceVector, EncoderError>;

    /// Length of every encoding this encoder produces.
    fn dimension(&self) -> usize;

    /// Short name for status reporting.
    fn name(&self) -> &'static str;
}

/// Development encoder that needs no model files.
///
/// Derives a pseudo-encoding from the image's pixel dimensions, so the
/// same photo always yields the same vector and differently sized photos
/// yield different ones. Treats every decodable image as containing one
/// face. Good enough to exercise the whole pipeline end to end; useless
/// for actual identification.
pub struct MockEncoder {
    dimension: usize,
}

impl MockEncoder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl FaceEncoder for MockEncoder {
    fn encode(&self, image_bytes: &[u8]) -> Result<FaceVector, EncoderError> {
        let img = image::load_from_memory(image_bytes)
            .map_err(|e| EncoderError::InvalidImage(e.to_string()))?;

        // Seed from the pixel dimensions, mirroring the original dev mock.
        let mut state = u64::from(img.width())
            .wrapping_mul(u64::from(img.height()))
            .wrapping_add(0x9e37_79b9_7f4a_7c15);

        let values = (0..self.dimension)
            .map(|_| {
                state = splitmix64(state);
                // Top 24 bits → uniform f32 in [0, 1).
                (state >> 40) as f32 / (1u32 << 24) as f32
            })
            .collect();

        Ok(FaceVector::new(values))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([90, 120, 150]));
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_mock_encoder_is_deterministic() {
        let encoder = MockEncoder::new(128);
        let bytes = png_bytes(64, 48);
        let a = encoder.encode(&bytes).unwrap();
        let b = encoder.encode(&bytes).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_mock_encoder_dimension() {
        let encoder = MockEncoder::new(128);
        let vector = encoder.encode(&png_bytes(32, 32)).unwrap();
        assert_eq!(vector.len(), 128);
        assert_eq!(encoder.dimension(), 128);
    }

    #[test]
    fn test_mock_encoder_values_in_unit_range() {
        let encoder = MockEncoder::new(128);
        let vector = encoder.encode(&png_bytes(17, 23)).unwrap();
        assert!(vector.values().iter().all(|&v| (0.0..1.0).contains(&v)));
    }

    #[test]
    fn test_different_dimensions_differ() {
        let encoder = MockEncoder::new(128);
        let a = encoder.encode(&png_bytes(64, 48)).unwrap();
        let b = encoder.encode(&png_bytes(65, 48)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_undecodable_bytes_rejected() {
        let encoder = MockEncoder::new(128);
        let err = encoder.encode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, EncoderError::InvalidImage(_)));
    }

    #[test]
    fn test_empty_input_rejected() {
        let encoder = MockEncoder::new(128);
        assert!(matches!(
            encoder.encode(&[]).unwrap_err(),
            EncoderError::InvalidImage(_)
        ));
    }
}
