// Copyright 2025 Recollect Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Embedding codec
//!
//! The canonical stored form of an embedding is a packed little-endian
//! `f32` array. Older rows may hold a JSON array, a delimited list of
//! numbers, or the packed bytes under a text column, and the textual forms
//! may sit in a blob column. Those are only read by
//! [`decode_legacy_embedding`] and [`decode_text_embedding`], which the
//! store's one-time migration uses. The hot path calls [`decode_embedding`]
//! and nothing else.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Errors from embedding decoding
#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    /// Byte length is not a multiple of four
    #[error("Invalid embedding length: {0} bytes")]
    InvalidLength(usize),

    /// Empty payload
    #[error("Empty embedding payload")]
    Empty,

    /// Decoded vector contains NaN or infinity
    #[error("Embedding contains non-finite values")]
    NonFinite,

    /// No legacy format matched
    #[error("Unrecognized legacy embedding encoding")]
    Unrecognized,
}

/// Encode an embedding into its canonical byte form.
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = vec![0u8; vector.len() * 4];
    LittleEndian::write_f32_into(vector, &mut bytes);
    bytes
}

/// Decode the canonical byte form.
pub fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::Empty);
    }
    if bytes.len() % 4 != 0 {
        return Err(CodecError::InvalidLength(bytes.len()));
    }
    let mut vector = vec![0f32; bytes.len() / 4];
    LittleEndian::read_f32_into(bytes, &mut vector);
    ensure_finite(vector)
}

/// Decode a legacy payload: JSON array, then delimited numbers, then packed bytes.
pub fn decode_legacy_embedding(raw: &[u8]) -> Result<Vec<f32>, CodecError> {
    if raw.is_empty() {
        return Err(CodecError::Empty);
    }

    match decode_text_embedding(raw) {
        Err(CodecError::Unrecognized) => {
            decode_embedding(raw).map_err(|_| CodecError::Unrecognized)
        }
        decoded => decoded,
    }
}

/// Decode a textual payload: a JSON array or a delimited list of numbers.
///
/// Bytes that are not UTF-8 text in either form are `Unrecognized`.
pub fn decode_text_embedding(raw: &[u8]) -> Result<Vec<f32>, CodecError> {
    let text = std::str::from_utf8(raw).map_err(|_| CodecError::Unrecognized)?.trim();
    if text.is_empty() {
        return Err(CodecError::Empty);
    }
    if let Ok(values) = serde_json::from_str::<Vec<f32>>(text) {
        if !values.is_empty() {
            return ensure_finite(values);
        }
    }
    match parse_delimited(text) {
        Some(values) => ensure_finite(values),
        None => Err(CodecError::Unrecognized),
    }
}

fn parse_delimited(text: &str) -> Option<Vec<f32>> {
    let inner = text.trim_start_matches('[').trim_end_matches(']');
    let values: Result<Vec<f32>, _> = inner
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(str::parse::<f32>)
        .collect();
    match values {
        Ok(v) if !v.is_empty() => Some(v),
        _ => None,
    }
}

fn ensure_finite(vector: Vec<f32>) -> Result<Vec<f32>, CodecError> {
    if vector.iter().all(|v| v.is_finite()) {
        Ok(vector)
    } else {
        Err(CodecError::NonFinite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_roundtrip() {
        let original = vec![1.0f32, -2.5, 3.14159, 0.0];
        let bytes = encode_embedding(&original);
        assert_eq!(bytes.len(), 16);
        assert_eq!(decode_embedding(&bytes).unwrap(), original);
    }

    #[test]
    fn test_canonical_rejects_bad_lengths() {
        assert_eq!(decode_embedding(&[]), Err(CodecError::Empty));
        assert_eq!(decode_embedding(&[0, 0, 0]), Err(CodecError::InvalidLength(3)));
    }

    #[test]
    fn test_legacy_json_array() {
        let v = decode_legacy_embedding(b"[0.5, -1.0, 2]").unwrap();
        assert_eq!(v, vec![0.5, -1.0, 2.0]);
    }

    #[test]
    fn test_legacy_delimited_list() {
        assert_eq!(
            decode_legacy_embedding(b"0.25,0.5, 0.75").unwrap(),
            vec![0.25, 0.5, 0.75]
        );
        assert_eq!(
            decode_legacy_embedding(b"1 2 3").unwrap(),
            vec![1.0, 2.0, 3.0]
        );
    }

    #[test]
    fn test_text_embedding_rejects_binary() {
        assert_eq!(decode_text_embedding(b"[1, 2, 3, 4]").unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        let packed = encode_embedding(&[0.1, 0.2]);
        assert_eq!(decode_text_embedding(&packed), Err(CodecError::Unrecognized));
        assert_eq!(decode_text_embedding(b"  "), Err(CodecError::Empty));
    }

    #[test]
    fn test_legacy_packed_bytes() {
        let bytes = encode_embedding(&[0.1, 0.2]);
        assert_eq!(decode_legacy_embedding(&bytes).unwrap(), vec![0.1, 0.2]);
    }

    #[test]
    fn test_legacy_garbage() {
        assert_eq!(
            decode_legacy_embedding(b"garbage"),
            Err(CodecError::Unrecognized)
        );
        assert_eq!(decode_legacy_embedding(b""), Err(CodecError::Empty));
    }
}
