//! Lower and upper bound of a memory estimate

use super::usage::human_readable;
use std::fmt;
use std::ops::Add;

/// Inclusive byte range `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemoryRange {
    min: u64,
    max: u64,
}

impl MemoryRange {
    /// The empty range
    pub const EMPTY: Self = Self { min: 0, max: 0 };

    /// Exactly `bytes`
    #[must_use]
    pub const fn of(bytes: u64) -> Self {
        Self {
            min: bytes,
            max: bytes,
        }
    }

    /// Between `a` and `b`, in any order
    #[must_use]
    pub const fn between(a: u64, b: u64) -> Self {
        if a <= b {
            Self { min: a, max: b }
        } else {
            Self { min: b, max: a }
        }
    }

    /// Lower bound
    #[must_use]
    pub const fn min(&self) -> u64 {
        self.min
    }

    /// Upper bound
    #[must_use]
    pub const fn max(&self) -> u64 {
        self.max
    }

    /// Whether both bounds are zero
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.max == 0
    }

    /// Both bounds scaled by `factor`, saturating
    #[must_use]
    pub const fn times(self, factor: u64) -> Self {
        Self {
            min: self.min.saturating_mul(factor),
            max: self.max.saturating_mul(factor),
        }
    }

    /// Smallest range covering `self` and `other`
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

impl Add for MemoryRange {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            min: self.min.saturating_add(rhs.min),
            max: self.max.saturating_add(rhs.max),
        }
    }
}

impl std::iter::Sum for MemoryRange {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::EMPTY, Add::add)
    }
}

impl fmt::Display for MemoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            f.write_str(&human_readable(self.min))
        } else {
            write!(f, "[{} ... {}]", human_readable(self.min), human_readable(self.max))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let range = MemoryRange::between(10, 4) + MemoryRange::of(6);
        assert_eq!((range.min(), range.max()), (10, 16));
        assert_eq!(range.times(2), MemoryRange::between(20, 32));
        assert_eq!(MemoryRange::of(u64::MAX).times(2).max(), u64::MAX);
        assert_eq!(
            MemoryRange::of(5).union(MemoryRange::between(1, 3)),
            MemoryRange::between(1, 5)
        );

        let total: MemoryRange = [MemoryRange::of(1), MemoryRange::between(2, 3)].into_iter().sum();
        assert_eq!(total, MemoryRange::between(3, 4));
    }

    #[test]
    fn test_display() {
        assert_eq!(MemoryRange::of(100).to_string(), "100 Bytes");
        assert_eq!(
            MemoryRange::between(100, 1 << 20).to_string(),
            "[100 Bytes ... 1024 KiB]"
        );
    }
}
