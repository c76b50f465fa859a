//! Frame codec
//!
//! Splits outgoing text into bounded frames and turns incoming messages back into payloads.

use super::{TransportError, TransportResult};
use crate::protocol::Payload;
use flate2::read::DeflateDecoder;
use std::io::Read;

/// Largest frame body written in one piece
pub const DEFAULT_FRAGMENT_SIZE: usize = 4096;

/// Length of the zlib header in front of the raw DEFLATE stream
const ZLIB_HEADER_LEN: usize = 2;

/// Split text into chunks of at most `max_len` bytes, in send order
///
/// Chunks may end inside a multi-byte character; the receiver reassembles
/// the whole message before decoding it.
#[must_use]
pub fn fragment(text: &str, max_len: usize) -> Vec<&[u8]> {
    let bytes = text.as_bytes();
    if bytes.is_empty() {
        return vec![bytes];
    }
    bytes.chunks(max_len.max(1)).collect()
}

/// Inflate a compressed binary message into its JSON text
pub fn inflate(bytes: &[u8]) -> TransportResult<String> {
    let stream = bytes.get(ZLIB_HEADER_LEN..).ok_or_else(|| {
        TransportError::Inflate(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "binary frame shorter than the zlib header",
        ))
    })?;

    let mut inflated = Vec::with_capacity(stream.len() * 4);
    DeflateDecoder::new(stream)
        .read_to_end(&mut inflated)
        .map_err(TransportError::Inflate)?;

    Ok(String::from_utf8(inflated)?)
}

/// Decode a complete text message
pub fn decode_text(text: &str) -> TransportResult<Payload> {
    Ok(Payload::from_json(text)?)
}

/// Decode a complete binary message
pub fn decode_binary(bytes: &[u8]) -> TransportResult<Payload> {
    decode_text(&inflate(bytes)?)
}
