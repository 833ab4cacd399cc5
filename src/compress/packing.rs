//! Bit-packing block codec
//!
//! Based on the frame-of-reference family of integer codecs (Lemire & Boytsov,
//! "Decoding billions of integers per second through vectorization", 2015).
//!
//! # Block layout
//!
//! ```text
//! [bits][bits * 8 bytes]            full block of 64 values
//! [bits][bits * 8 bytes]            ...
//! [var-long] * r                     tail of r < 64 values, no header
//! ```
//!
//! `bits` is the smallest width that can hold every value of the block, so a
//! block of zeros costs a single header byte. The tail is var-long encoded,
//! which keeps short lists at the size of the plain var-long stream.

use super::flags::CompressionFlags;
use super::varlong;
use crate::error::{CsrError, Result};

/// Values per block
pub const BLOCK_SIZE: usize = 64;

/// Minimum bit width able to represent every value in `values`
#[must_use]
#[inline]
pub fn bits_needed(values: &[u64]) -> u32 {
    let combined = values.iter().fold(0_u64, |acc, &v| acc | v);
    u64::BITS - combined.leading_zeros()
}

/// Bytes used by `count` values packed at `bits` width
#[must_use]
#[inline]
pub const fn packed_bytes(bits: u32, count: usize) -> usize {
    (bits as usize * count).div_ceil(8)
}

/// Total stream size for values that were already delta prepared
#[must_use]
pub fn encoded_size(prepared: &[u64]) -> usize {
    let blocks = prepared.chunks_exact(BLOCK_SIZE);
    let tail = varlong::encoded_size_of(blocks.remainder());
    blocks
        .map(|block| 1 + packed_bytes(bits_needed(block), BLOCK_SIZE))
        .sum::<usize>()
        + tail
}

/// Pack `values` (at most one block) at `bits` width, appending to `out`
#[allow(clippy::cast_possible_truncation)]
pub fn pack(bits: u32, values: &[u64], out: &mut Vec<u8>) {
    debug_assert!(values.len() <= BLOCK_SIZE);
    if bits == 0 {
        return;
    }
    let mask = if bits == u64::BITS {
        u128::from(u64::MAX)
    } else {
        (1_u128 << bits) - 1
    };
    let mut buffer = 0_u128;
    let mut buffered = 0_u32;
    for &value in values {
        buffer |= (u128::from(value) & mask) << buffered;
        buffered += bits;
        while buffered >= 8 {
            out.push(buffer as u8);
            buffer >>= 8;
            buffered -= 8;
        }
    }
    if buffered > 0 {
        out.push(buffer as u8);
    }
}

/// Unpack `out.len()` values of `bits` width from the start of `bytes`
///
/// Returns the number of bytes consumed.
///
/// # Errors
///
/// Returns [`CsrError::Corrupt`] if `bytes` is shorter than the block.
#[allow(clippy::cast_possible_truncation)]
pub fn unpack(bits: u32, bytes: &[u8], out: &mut [u64]) -> Result<usize> {
    if bits == 0 {
        out.fill(0);
        return Ok(0);
    }
    if bits > u64::BITS {
        return Err(CsrError::Corrupt(format!("block header of {bits} bits")));
    }
    let needed = packed_bytes(bits, out.len());
    let Some(block) = bytes.get(..needed) else {
        return Err(CsrError::Corrupt(format!(
            "packed block needs {needed} bytes, {} available",
            bytes.len()
        )));
    };
    let mask = if bits == u64::BITS {
        u128::from(u64::MAX)
    } else {
        (1_u128 << bits) - 1
    };
    let mut input = block.iter();
    let mut buffer = 0_u128;
    let mut buffered = 0_u32;
    for slot in out.iter_mut() {
        while buffered < bits {
            // length was checked above
            let byte = input.next().copied().unwrap_or(0);
            buffer |= u128::from(byte) << buffered;
            buffered += 8;
        }
        *slot = (buffer & mask) as u64;
        buffer >>= bits;
        buffered -= bits;
    }
    Ok(needed)
}

/// Encode already prepared values as full blocks followed by a var-long tail
#[allow(clippy::cast_possible_truncation)]
pub fn encode_blocks(prepared: &[u64], out: &mut Vec<u8>) {
    out.reserve(encoded_size(prepared));
    let mut blocks = prepared.chunks_exact(BLOCK_SIZE);
    for block in blocks.by_ref() {
        let bits = bits_needed(block);
        out.push(bits as u8);
        pack(bits, block, out);
    }
    for &value in blocks.remainder() {
        varlong::encode(value, out);
    }
}

/// Streaming decoder over a packed block stream
///
/// Holds one decoded block; [`PackedCursor::reset`] re-targets the cursor
/// without allocating.
#[derive(Debug, Clone)]
pub struct PackedCursor<'a> {
    bytes: &'a [u8],
    position: usize,
    remaining: usize,
    block: [u64; BLOCK_SIZE],
    block_len: usize,
    block_index: usize,
    previous: u64,
    flags: CompressionFlags,
}

impl Default for PackedCursor<'_> {
    fn default() -> Self {
        Self::new(&[], 0, CompressionFlags::NONE)
    }
}

impl<'a> PackedCursor<'a> {
    /// Cursor over `length` values encoded in `bytes`
    #[must_use]
    pub fn new(bytes: &'a [u8], length: usize, flags: CompressionFlags) -> Self {
        Self {
            bytes,
            position: 0,
            remaining: length,
            block: [0; BLOCK_SIZE],
            block_len: 0,
            block_index: 0,
            previous: 0,
            flags,
        }
    }

    /// Re-target the cursor without allocating
    pub fn reset(&mut self, bytes: &'a [u8], length: usize, flags: CompressionFlags) {
        self.bytes = bytes;
        self.position = 0;
        self.remaining = length;
        self.block_len = 0;
        self.block_index = 0;
        self.previous = 0;
        self.flags = flags;
    }

    /// Values left to decode
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.remaining + self.block_len - self.block_index
    }

    fn load_block(&mut self) -> Result<()> {
        let count = self.remaining.min(BLOCK_SIZE);
        if count < BLOCK_SIZE {
            for slot in &mut self.block[..count] {
                *slot = varlong::decode(self.bytes, &mut self.position)?;
            }
        } else {
            self.load_packed()?;
        }
        self.remaining -= count;
        self.block_len = count;
        self.block_index = 0;
        Ok(())
    }

    fn load_packed(&mut self) -> Result<()> {
        let Some(&header) = self.bytes.get(self.position) else {
            return Err(CsrError::Corrupt(format!(
                "missing block header at byte {}",
                self.position
            )));
        };
        self.position += 1;
        let consumed = unpack(
            u32::from(header),
            &self.bytes[self.position..],
            &mut self.block,
        )?;
        self.position += consumed;
        Ok(())
    }

    /// Decode the next value
    ///
    /// # Errors
    ///
    /// Returns [`CsrError::Corrupt`] on malformed input.
    #[inline]
    pub fn try_next(&mut self) -> Result<Option<u64>> {
        if self.block_index == self.block_len {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.load_block()?;
        }
        let stored = self.block[self.block_index];
        self.block_index += 1;
        let value = self.flags.decode_step(self.previous, stored);
        self.previous = value;
        Ok(Some(value))
    }
}

impl Iterator for PackedCursor<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        self.try_next().ok().flatten()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}
