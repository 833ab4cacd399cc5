//! Compression feature flags
//!
//! Sorting and delta encoding are orthogonal bits rather than codec variants,
//! so every codec supports every combination.

use serde::Deserialize;
use std::fmt;
use std::ops::BitOr;

/// Independent pre-processing steps applied before encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(from = "FlagNames")]
pub struct CompressionFlags(u8);

impl CompressionFlags {
    /// Encode values in arrival order, as absolute values
    pub const NONE: Self = Self(0);
    /// Sort values ascending before encoding
    pub const SORT: Self = Self(1);
    /// Store successive differences instead of absolute values
    pub const DELTA: Self = Self(1 << 1);
    /// Sort, then store successive differences
    pub const SORT_AND_DELTA: Self = Self(1 | (1 << 1));

    /// Whether values get sorted before encoding
    #[must_use]
    pub const fn sorted(self) -> bool {
        self.0 & Self::SORT.0 != 0
    }

    /// Whether values get delta encoded
    #[must_use]
    pub const fn delta(self) -> bool {
        self.0 & Self::DELTA.0 != 0
    }

    /// Whether deltas can be negative and therefore need zig-zag mapping
    #[must_use]
    pub const fn zig_zag(self) -> bool {
        self.delta() && !self.sorted()
    }

    /// Raw bit representation
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Rebuild flags from [`CompressionFlags::bits`]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::SORT_AND_DELTA.0)
    }

    /// Every combination, handy for exhaustive tests
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [Self::NONE, Self::SORT, Self::DELTA, Self::SORT_AND_DELTA]
    }

    /// Turn `value` into its stored form given the previously encoded value
    #[must_use]
    #[inline]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn encode_step(self, previous: u64, value: u64) -> u64 {
        if !self.delta() {
            value
        } else if self.sorted() {
            value - previous
        } else {
            super::varlong::zig_zag(value.wrapping_sub(previous) as i64)
        }
    }

    /// Inverse of [`CompressionFlags::encode_step`]
    #[must_use]
    #[inline]
    #[allow(clippy::cast_sign_loss)]
    pub const fn decode_step(self, previous: u64, stored: u64) -> u64 {
        if !self.delta() {
            stored
        } else if self.sorted() {
            previous.wrapping_add(stored)
        } else {
            previous.wrapping_add(super::varlong::zig_zag_decode(stored) as u64)
        }
    }

    /// Sort (if requested) and delta encode (if requested) `values` in place
    pub fn prepare(self, values: &mut [u64]) {
        if self.sorted() {
            values.sort_unstable();
        }
        if self.delta() {
            let mut previous = 0;
            for value in values.iter_mut() {
                let current = *value;
                *value = self.encode_step(previous, current);
                previous = current;
            }
        }
    }
}

impl BitOr for CompressionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for CompressionFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.sorted(), self.delta()) {
            (false, false) => f.write_str("none"),
            (true, false) => f.write_str("sort"),
            (false, true) => f.write_str("delta"),
            (true, true) => f.write_str("sort+delta"),
        }
    }
}

#[derive(Deserialize)]
struct FlagNames {
    #[serde(default)]
    sort: bool,
    #[serde(default)]
    delta: bool,
}

impl From<FlagNames> for CompressionFlags {
    fn from(names: FlagNames) -> Self {
        let mut flags = Self::NONE;
        if names.sort {
            flags = flags | Self::SORT;
        }
        if names.delta {
            flags = flags | Self::DELTA;
        }
        flags
    }
}
