//! Interchangeable adjacency codecs
//!
//! [`Codec`] is a closed set of encodings sharing one contract: the decoded
//! multiset equals the encoded one, regardless of [`CompressionFlags`].

use super::flags::CompressionFlags;
use super::handle::{CompressedHandle, SlabArena};
use super::packing::{self, PackedCursor};
use super::varlong::{self, VarLongCursor};
use crate::error::Result;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Adjacency encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    /// Delta + zig-zag variable-length integers, 1-10 bytes per value
    #[default]
    VarLong,
    /// Fixed-width bit packing in blocks of 64 values, var-long tail
    Packed,
}

impl Codec {
    /// Both codecs
    pub const ALL: [Self; 2] = [Self::VarLong, Self::Packed];

    /// Encoded size of values already run through [`CompressionFlags::prepare`]
    #[must_use]
    pub fn encoded_size(self, prepared: &[u64]) -> usize {
        match self {
            Self::VarLong => varlong::encoded_size_of(prepared),
            Self::Packed => packing::encoded_size(prepared),
        }
    }

    /// Prepare `values` in place and append their encoding to `out`
    ///
    /// `values` is reordered and overwritten with the stored form. Returns the
    /// number of bytes appended.
    pub fn encode_into(self, values: &mut [u64], flags: CompressionFlags, out: &mut Vec<u8>) -> usize {
        flags.prepare(values);
        let start = out.len();
        match self {
            Self::VarLong => varlong::encode_all(values, out),
            Self::Packed => packing::encode_blocks(values, out),
        }
        out.len() - start
    }

    /// Compress `values[offset..offset + length]` into an arena-backed handle
    ///
    /// The range is reordered and overwritten in the process.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CsrError::CapacityOverflow`] if the arena is out of slots.
    ///
    /// # Panics
    ///
    /// Panics if the range is outside of `values`.
    pub fn compress(
        self,
        arena: &Arc<SlabArena>,
        values: &mut [u64],
        offset: usize,
        length: usize,
        flags: CompressionFlags,
    ) -> Result<CompressedHandle> {
        let range = &mut values[offset..offset + length];
        let mut bytes = Vec::with_capacity(length);
        let bytes_used = self.encode_into(range, flags, &mut bytes);
        let id = arena.allocate(bytes)?;
        Ok(CompressedHandle::new(
            Arc::clone(arena),
            id,
            self,
            flags,
            length,
            bytes_used,
        ))
    }

    /// Decode `length` values from `bytes`, appending to `out`
    ///
    /// # Errors
    ///
    /// Returns [`crate::CsrError::Corrupt`] on malformed input.
    pub fn decode_into(
        self,
        bytes: &[u8],
        length: usize,
        flags: CompressionFlags,
        out: &mut Vec<u64>,
    ) -> Result<()> {
        out.reserve(length);
        let mut cursor = self.cursor(bytes, length, flags);
        while let Some(value) = cursor.try_next()? {
            out.push(value);
        }
        Ok(())
    }

    /// Streaming cursor over `length` values encoded in `bytes`
    #[must_use]
    pub fn cursor(self, bytes: &[u8], length: usize, flags: CompressionFlags) -> AdjacencyDecoder<'_> {
        match self {
            Self::VarLong => AdjacencyDecoder::VarLong(VarLongCursor::new(bytes, length, flags)),
            Self::Packed => AdjacencyDecoder::Packed(PackedCursor::new(bytes, length, flags)),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VarLong => f.write_str("var-long"),
            Self::Packed => f.write_str("packed"),
        }
    }
}

/// Decode everything behind `handle`
///
/// # Errors
///
/// Returns [`crate::CsrError::UseAfterFree`] if the handle was freed and
/// [`crate::CsrError::Corrupt`] on malformed bytes.
pub fn decompress(handle: &CompressedHandle) -> Result<Vec<u64>> {
    let mut out = Vec::with_capacity(handle.length());
    handle.with_bytes(|bytes| {
        handle
            .codec()
            .decode_into(bytes, handle.length(), handle.flags(), &mut out)
    })??;
    Ok(out)
}

/// Cursor over one encoded sequence, for either codec
#[derive(Debug, Clone)]
pub enum AdjacencyDecoder<'a> {
    /// Var-long stream
    VarLong(VarLongCursor<'a>),
    /// Packed block stream
    Packed(PackedCursor<'a>),
}

impl<'a> AdjacencyDecoder<'a> {
    /// Re-target the cursor, switching codec only when needed
    pub fn reset(&mut self, codec: Codec, bytes: &'a [u8], length: usize, flags: CompressionFlags) {
        match (codec, &mut *self) {
            (Codec::VarLong, Self::VarLong(cursor)) => cursor.reset(bytes, length, flags),
            (Codec::Packed, Self::Packed(cursor)) => cursor.reset(bytes, length, flags),
            _ => *self = codec.cursor(bytes, length, flags),
        }
    }

    /// Values left to decode
    #[must_use]
    pub fn remaining(&self) -> usize {
        match self {
            Self::VarLong(cursor) => cursor.remaining(),
            Self::Packed(cursor) => cursor.remaining(),
        }
    }

    /// Decode the next value
    ///
    /// # Errors
    ///
    /// Returns [`crate::CsrError::Corrupt`] on malformed input.
    #[inline]
    pub fn try_next(&mut self) -> Result<Option<u64>> {
        match self {
            Self::VarLong(cursor) => cursor.try_next(),
            Self::Packed(cursor) => cursor.try_next(),
        }
    }
}

impl Iterator for AdjacencyDecoder<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        self.try_next().ok().flatten()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CsrError;

    fn sorted(mut values: Vec<u64>) -> Vec<u64> {
        values.sort_unstable();
        values
    }

    #[test]
    fn test_round_trip_every_codec_and_flag() {
        let input = vec![42_u64, 7, 7, 1 << 40, 0, 13, 99, 98, 3];
        let arena = SlabArena::new();

        for codec in Codec::ALL {
            for flags in CompressionFlags::all() {
                let mut values = input.clone();
                let mut handle = codec
                    .compress(&arena, &mut values, 0, input.len(), flags)
                    .unwrap();
                assert_eq!(handle.length(), input.len());

                let decoded = decompress(&handle).unwrap();
                assert_eq!(sorted(decoded), sorted(input.clone()), "{codec} {flags}");
                handle.free().unwrap();
            }
        }
        assert_eq!(arena.live_handles(), 0);
    }

    #[test]
    fn test_unsorted_flags_keep_arrival_order() {
        let input = vec![5_u64, 1, 9, 2];
        let arena = SlabArena::new();
        for codec in Codec::ALL {
            let mut values = input.clone();
            let mut handle = codec
                .compress(&arena, &mut values, 0, 4, CompressionFlags::DELTA)
                .unwrap();
            assert_eq!(decompress(&handle).unwrap(), input);
            handle.free().unwrap();
        }
    }

    #[test]
    fn test_compress_sub_range() {
        let arena = SlabArena::new();
        let mut values = vec![100_u64, 1, 2, 3, 200];
        let mut handle = Codec::Packed
            .compress(&arena, &mut values, 1, 3, CompressionFlags::SORT_AND_DELTA)
            .unwrap();
        assert_eq!(decompress(&handle).unwrap(), vec![1, 2, 3]);
        assert_eq!(values[0], 100);
        assert_eq!(values[4], 200);
        handle.free().unwrap();
    }

    #[test]
    fn test_free_twice_fails() {
        let arena = SlabArena::new();
        let mut values = vec![1_u64, 2, 3];
        let mut handle = Codec::VarLong
            .compress(&arena, &mut values, 0, 3, CompressionFlags::SORT_AND_DELTA)
            .unwrap();

        handle.free().unwrap();
        assert!(matches!(handle.free(), Err(CsrError::DoubleRelease { .. })));
        assert!(handle.is_released());
    }

    #[test]
    fn test_decode_after_free_fails() {
        let arena = SlabArena::new();
        for codec in Codec::ALL {
            let mut values = vec![1_u64, 2, 3];
            let mut handle = codec
                .compress(&arena, &mut values, 0, 3, CompressionFlags::SORT)
                .unwrap();
            handle.free().unwrap();

            // a new allocation takes over the released slot
            let mut other = vec![9_u64];
            let mut reused = codec
                .compress(&arena, &mut other, 0, 1, CompressionFlags::NONE)
                .unwrap();
            assert_eq!(reused.id().slot(), handle.id().slot());

            assert!(matches!(
                decompress(&handle),
                Err(CsrError::UseAfterFree { .. })
            ));
            assert_eq!(decompress(&reused).unwrap(), vec![9]);
            reused.free().unwrap();
        }
    }

    #[test]
    fn test_packed_not_larger_on_dense_sorted_input() {
        let input: Vec<u64> = (0..1000).collect();
        let arena = SlabArena::new();

        let mut a = input.clone();
        let mut packed = Codec::Packed
            .compress(&arena, &mut a, 0, 1000, CompressionFlags::SORT_AND_DELTA)
            .unwrap();
        let mut b = input.clone();
        let mut varlong = Codec::VarLong
            .compress(&arena, &mut b, 0, 1000, CompressionFlags::SORT_AND_DELTA)
            .unwrap();

        assert!(packed.bytes_used() <= varlong.bytes_used());
        packed.free().unwrap();
        varlong.free().unwrap();
    }

    #[test]
    fn test_decoder_reset_switches_codec() {
        let mut values = vec![3_u64, 4];
        let mut varlong_bytes = Vec::new();
        Codec::VarLong.encode_into(&mut values, CompressionFlags::NONE, &mut varlong_bytes);
        let mut values = vec![8_u64, 9];
        let mut packed_bytes = Vec::new();
        Codec::Packed.encode_into(&mut values, CompressionFlags::NONE, &mut packed_bytes);

        let mut decoder = Codec::VarLong.cursor(&varlong_bytes, 2, CompressionFlags::NONE);
        assert_eq!(decoder.by_ref().collect::<Vec<_>>(), vec![3, 4]);
        decoder.reset(Codec::Packed, &packed_bytes, 2, CompressionFlags::NONE);
        assert_eq!(decoder.remaining(), 2);
        assert_eq!(decoder.collect::<Vec<_>>(), vec![8, 9]);
    }
}
