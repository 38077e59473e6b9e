//! # Key Material Codec
//!
//! Lossless, validated conversion between the base64 text that travels over
//! the network (and sits in storage) and the raw bytes the primitives use.
//!
//! Every key, nonce, salt and ciphertext that enters the crate passes through
//! here first, so malformed input is rejected in one place and in one way.
//!
//! ## Rules
//!
//! | Check | Failure |
//! |-------|---------|
//! | Text is empty | `Error::Codec` |
//! | Text is not canonical standard base64 (alphabet, padding, trailing bits) | `Error::Codec` |
//! | Decoded length differs from the expected length | `Error::Codec` |

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::{Error, Result};

/// Encode raw bytes as standard, padded base64.
pub fn encode(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode base64 text, optionally requiring an exact decoded length.
///
/// The `STANDARD` engine only accepts canonical input (correct padding, no
/// stray trailing bits), so a successful decode always re-encodes to the
/// same text.
pub fn decode(text: &str, expected_len: Option<usize>) -> Result<Vec<u8>> {
    if text.is_empty() {
        return Err(Error::Codec("value must be a non-empty base64 string".into()));
    }

    let bytes = BASE64
        .decode(text)
        .map_err(|e| Error::Codec(format!("not valid base64: {}", e)))?;

    if let Some(expected) = expected_len {
        if bytes.len() != expected {
            return Err(Error::Codec(format!(
                "expected {} bytes, got {}",
                expected,
                bytes.len()
            )));
        }
    }

    Ok(bytes)
}

/// Decode base64 text into a fixed-size array.
pub fn decode_exact<const N: usize>(text: &str) -> Result<[u8; N]> {
    let bytes = decode(text, Some(N))?;
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Whether `text` is non-empty canonical base64.
pub fn is_valid(text: &str) -> bool {
    decode(text, None).is_ok()
}

/// Length of the base64 text produced for `byte_len` raw bytes.
pub fn encoded_len(byte_len: usize) -> usize {
    byte_len.div_ceil(3) * 4
}

// ============================================================================
// TESTS
// ============================================================================
