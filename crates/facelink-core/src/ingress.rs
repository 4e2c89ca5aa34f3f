//! Base64 image ingress.
//!
//! Clients send photos as base64 text, usually straight from a canvas
//! capture with a `data:image/...;base64,` prefix. The prefix is stripped
//! before decoding; malformed base64 is an invalid-image error, never a
//! panic.

use crate::encoder::EncoderError;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;

/// Decode a base64 image payload, tolerating an optional data-URL header.
pub fn decode_base64_image(input: &str) -> Result<Vec<u8>, EncoderError> {
    // "data:image/jpeg;base64,AAAA..." → keep everything after the comma.
    let payload = match input.split_once(',') {
        Some((_header, rest)) => rest,
        None => input,
    };

    BASE64_STANDARD
        .decode(payload.trim())
        .map_err(|e| EncoderError::InvalidImage(format!("base64 decode: {e}")))
}
