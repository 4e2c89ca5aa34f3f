//! ONNX-backed face encoder.
//!
//! Runs a pretrained detect-and-embed face model via ONNX Runtime. The
//! model graph is expected to expose either a single output (the embedding
//! for the primary face) or two outputs (a face-presence score followed by
//! the embedding). With the two-output form, a presence score at or below
//! the threshold reports [`EncoderError::NoFaceDetected`]; the single-output
//! form cannot distinguish an empty frame and always yields an encoding.
//!
//! When a photo contains several faces the model reports its primary
//! (first) face only; no selection heuristic is applied on this side.

use crate::encoder::{EncoderError, FaceEncoder};
use crate::types::FaceVector;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;

const ENCODER_INPUT_SIZE: usize = 112;
const ENCODER_MEAN: f32 = 127.5;
const ENCODER_STD: f32 = 127.5;
const FACE_PRESENCE_THRESHOLD: f32 = 0.5;

#[derive(Debug)]
pub struct OnnxEncoder {
    // Session::run needs exclusive access; encode() takes &self.
    session: Mutex<Session>,
    dimension: usize,
    has_presence_output: bool,
}

impl OnnxEncoder {
    /// Load the face encoder model from the given path.
    ///
    /// `dimension` is the embedding length the model is expected to emit;
    /// any other length at inference time is a data-integrity failure.
    pub fn load(model_path: &str, dimension: usize) -> Result<Self, EncoderError> {
        if !Path::new(model_path).exists() {
            return Err(EncoderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()
            .and_then(|b| Ok(b.with_intra_threads(2)?))
            .and_then(|mut b| b.commit_from_file(model_path))
            .map_err(|e| EncoderError::Inference(e.to_string()))?;

        let num_outputs = session.outputs().len();
        let has_presence_output = num_outputs >= 2;

        tracing::info!(
            path = model_path,
            dimension,
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            has_presence_output,
            "loaded face encoder model"
        );

        Ok(Self {
            session: Mutex::new(session),
            dimension,
            has_presence_output,
        })
    }
}

impl FaceEncoder for OnnxEncoder {
    fn encode(&self, image_bytes: &[u8]) -> Result<FaceVector, EncoderError> {
        let img = image::load_from_memory(image_bytes)
            .map_err(|e| EncoderError::InvalidImage(e.to_string()))?;

        let gray = img
            .resize_exact(
                ENCODER_INPUT_SIZE as u32,
                ENCODER_INPUT_SIZE as u32,
                image::imageops::FilterType::Triangle,
            )
            .to_luma8();
        let input = preprocess(gray.as_raw());

        let mut session = self
            .session
            .lock()
            .map_err(|_| EncoderError::Inference("encoder session poisoned".into()))?;

        let input_tensor = TensorRef::from_array_view(input.view())
            .map_err(|e| EncoderError::Inference(e.to_string()))?;
        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e| EncoderError::Inference(e.to_string()))?;

        if self.has_presence_output {
            let (_, scores) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| EncoderError::Inference(format!("presence score: {e}")))?;
            let presence = scores.first().copied().unwrap_or(0.0);
            if presence <= FACE_PRESENCE_THRESHOLD {
                return Err(EncoderError::NoFaceDetected);
            }
        }

        let embedding_idx = usize::from(self.has_presence_output);
        let (_, raw_data) = outputs[embedding_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| EncoderError::Inference(format!("embedding extraction: {e}")))?;
        let raw: Vec<f32> = raw_data.to_vec();

        if raw.len() != self.dimension {
            return Err(EncoderError::Inference(format!(
                "expected {}-dim embedding, got {}",
                self.dimension,
                raw.len()
            )));
        }

        // L2-normalize so Euclidean distances are comparable across photos.
        let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        let values = if norm > 0.0 {
            raw.iter().map(|x| x / norm).collect()
        } else {
            raw
        };

        Ok(FaceVector::new(values))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}

/// Preprocess a 112×112 grayscale crop into a NCHW float tensor.
fn preprocess(gray: &[u8]) -> Array4<f32> {
    let size = ENCODER_INPUT_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for y in 0..size {
        for x in 0..size {
            let pixel = gray.get(y * size + x).copied().unwrap_or(0) as f32;
            let normalized = (pixel - ENCODER_MEAN) / ENCODER_STD;
            // Grayscale replicated across the three channels.
            tensor[[0, 0, y, x]] = normalized;
            tensor[[0, 1, y, x]] = normalized;
            tensor[[0, 2, y, x]] = normalized;
        }
    }

    tensor
}
