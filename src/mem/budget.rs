//! Memory budget checks run before an import starts

use super::estimation::MemoryTree;
use super::range::MemoryRange;
use crate::error::{CsrError, Result};

/// Bytes an import may use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBudget {
    /// Budget in bytes
    pub bytes: u64,

    /// Compare against the upper estimate instead of the lower
    pub use_max_estimation: bool,
}

impl MemoryBudget {
    /// Budget of `bytes`, checked against the lower estimate
    #[must_use]
    pub const fn new(bytes: u64) -> Self {
        Self {
            bytes,
            use_max_estimation: false,
        }
    }

    /// Check against the upper estimate
    #[must_use]
    pub const fn with_max_estimation(mut self) -> Self {
        self.use_max_estimation = true;
        self
    }

    /// Bound of `range` this budget is compared with
    #[must_use]
    pub const fn required(&self, range: MemoryRange) -> u64 {
        if self.use_max_estimation {
            range.max()
        } else {
            range.min()
        }
    }

    /// Whether `range` fits
    #[must_use]
    pub const fn fits(&self, range: MemoryRange) -> bool {
        self.required(range) <= self.bytes
    }

    /// Fail if `estimate` does not fit
    ///
    /// # Errors
    ///
    /// Returns [`CsrError::MemoryBudgetExceeded`] with the compared bound.
    pub fn validate(&self, estimate: &MemoryTree) -> Result<()> {
        let range = estimate.memory_usage();
        if self.fits(range) {
            Ok(())
        } else {
            Err(CsrError::MemoryBudgetExceeded {
                required: self.required(range),
                budget: self.bytes,
            })
        }
    }
}
