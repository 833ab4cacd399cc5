//! Zig-zag and variable-length integer encoding
//!
//! # Format
//!
//! ```text
//! value 300 = 0b1_0010_1100
//!   byte 0: 1_0101100   (low 7 bits, continuation bit set)
//!   byte 1: 0_0000010   (next 7 bits, last byte)
//! ```
//!
//! A `u64` needs between 1 and 10 bytes. Signed deltas are zig-zag mapped first
//! so that small negative and small positive deltas both stay short.

use super::flags::CompressionFlags;
use crate::error::{CsrError, Result};

/// Longest encoding of a `u64`
pub const MAX_VLONG_BYTES: usize = 10;

const CONTINUATION: u8 = 0x80;
const PAYLOAD: u8 = 0x7F;

/// Map a signed value onto the unsigned range: 0, -1, 1, -2, 2, ...
#[must_use]
#[inline]
#[allow(clippy::cast_sign_loss)]
pub const fn zig_zag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`zig_zag`]
#[must_use]
#[inline]
#[allow(clippy::cast_possible_wrap)]
pub const fn zig_zag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Number of bytes `value` occupies once encoded
#[must_use]
#[inline]
pub const fn encoded_size(value: u64) -> usize {
    if value == 0 {
        1
    } else {
        let bits = (u64::BITS - value.leading_zeros()) as usize;
        bits.div_ceil(7)
    }
}

/// Total encoded size of a run of values
#[must_use]
pub fn encoded_size_of(values: &[u64]) -> usize {
    values.iter().map(|&v| encoded_size(v)).sum()
}

/// Append the encoding of `value` to `out`
#[inline]
#[allow(clippy::cast_possible_truncation)]
pub fn encode(mut value: u64, out: &mut Vec<u8>) {
    while value >= u64::from(CONTINUATION) {
        out.push((value as u8 & PAYLOAD) | CONTINUATION);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Append the encodings of all `values` to `out`
pub fn encode_all(values: &[u64], out: &mut Vec<u8>) {
    out.reserve(encoded_size_of(values));
    for &value in values {
        encode(value, out);
    }
}

/// Decode one value starting at `*position`, advancing the position
///
/// # Errors
///
/// Returns [`CsrError::Corrupt`] if the input ends inside a value or the value
/// does not fit into 64 bits.
#[inline]
pub fn decode(bytes: &[u8], position: &mut usize) -> Result<u64> {
    let mut value = 0_u64;
    let mut shift = 0_u32;
    loop {
        let Some(&byte) = bytes.get(*position) else {
            return Err(CsrError::Corrupt(format!(
                "var-long truncated at byte {position}"
            )));
        };
        *position += 1;
        let payload = u64::from(byte & PAYLOAD);
        if shift == 63 && payload > 1 {
            return Err(CsrError::Corrupt("var-long exceeds 64 bits".to_string()));
        }
        value |= payload << shift;
        if byte & CONTINUATION == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift > 63 {
            return Err(CsrError::Corrupt(format!(
                "var-long longer than {MAX_VLONG_BYTES} bytes"
            )));
        }
    }
}

/// Streaming decoder over a var-long encoded sequence
///
/// The cursor never materialises the sequence. Call [`VarLongCursor::reset`]
/// to point it at the next adjacency list instead of creating a new cursor.
#[derive(Debug, Clone, Default)]
pub struct VarLongCursor<'a> {
    bytes: &'a [u8],
    position: usize,
    remaining: usize,
    previous: u64,
    flags: CompressionFlags,
}

impl<'a> VarLongCursor<'a> {
    /// Cursor over `length` values encoded in `bytes`
    #[must_use]
    pub fn new(bytes: &'a [u8], length: usize, flags: CompressionFlags) -> Self {
        Self {
            bytes,
            position: 0,
            remaining: length,
            previous: 0,
            flags,
        }
    }

    /// Re-target the cursor without allocating
    pub fn reset(&mut self, bytes: &'a [u8], length: usize, flags: CompressionFlags) {
        self.bytes = bytes;
        self.position = 0;
        self.remaining = length;
        self.previous = 0;
        self.flags = flags;
    }

    /// Values left to decode
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.remaining
    }

    /// Bytes consumed so far
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Decode the next value
    ///
    /// # Errors
    ///
    /// Returns [`CsrError::Corrupt`] on malformed input.
    #[inline]
    pub fn try_next(&mut self) -> Result<Option<u64>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let stored = decode(self.bytes, &mut self.position)?;
        let value = self.flags.decode_step(self.previous, stored);
        self.previous = value;
        self.remaining -= 1;
        Ok(Some(value))
    }
}

impl Iterator for VarLongCursor<'_> {
    type Item = u64;

    /// Streams values; stops early on malformed input (use
    /// [`VarLongCursor::try_next`] to observe the error).
    fn next(&mut self) -> Option<u64> {
        self.try_next().ok().flatten()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}
