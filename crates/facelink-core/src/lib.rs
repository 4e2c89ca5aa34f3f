//! facelink-core — Face identification pipeline.
//!
//! Turns visitor photos into fixed-length face encodings, matches them
//! against the known-people gallery by Euclidean distance, and decides
//! whether a recognized visit should be announced or silently logged
//! via the per-person cooldown tracker.

pub mod cooldown;
pub mod encoder;
pub mod ingress;
pub mod matcher;
pub mod onnx;
pub mod types;

pub use cooldown::CooldownTracker;
pub use encoder::{EncoderError, FaceEncoder, MockEncoder};
pub use matcher::{EuclideanMatcher, GalleryEntry, MatchError, Matcher};
pub use onnx::OnnxEncoder;
pub use types::{EventKind, FaceVector, MatchResult, Person, RecognitionOutcome, TimelineEvent};

/// Encoding length produced by the default encoder configuration.
pub const DEFAULT_EMBEDDING_DIM: usize = 128;
