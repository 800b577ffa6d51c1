//! Compressed JSON framing for the streaming wire.
//!
//! Frames are serialized to JSON and deflated with a zlib header, which is
//! what the service's `deflate`/`inflate` produce and expect.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::ClientError;
use crate::models::Frame;

/// Upper bound on the inflated size of a single inbound frame.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Serialize and compress a frame.
pub fn encode(frame: &Frame) -> Result<Vec<u8>, ClientError> {
    let json = serde_json::to_vec(frame)?;
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(json.len() / 2), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| ClientError::Framing(format!("compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| ClientError::Framing(format!("compression finish failed: {}", e)))
}

/// Decompress and parse a frame.
pub fn decode(bytes: &[u8]) -> Result<Frame, ClientError> {
    let mut decoder = ZlibDecoder::new(bytes).take(MAX_FRAME_SIZE as u64 + 1);
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(|e| ClientError::Framing(format!("decompression failed: {}", e)))?;

    if json.len() > MAX_FRAME_SIZE {
        return Err(ClientError::Framing(format!(
            "inflated frame exceeds limit of {} bytes",
            MAX_FRAME_SIZE
        )));
    }

    serde_json::from_slice(&json)
        .map_err(|e| ClientError::Framing(format!("invalid frame JSON: {}", e)))
}
