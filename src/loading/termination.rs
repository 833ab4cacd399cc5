//! Cooperative cancellation

use crate::error::{CsrError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag polled between batches and partitions
///
/// Clones observe the same flag. Tripping it never rolls anything back:
/// pages compacted before the trip stay valid.
#[derive(Debug, Clone, Default)]
pub struct TerminationFlag {
    terminated: Arc<AtomicBool>,
}

impl TerminationFlag {
    /// Flag in the running state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request termination
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
    }

    /// Whether work may continue
    #[must_use]
    pub fn running(&self) -> bool {
        !self.terminated.load(Ordering::Acquire)
    }

    /// Fail with [`CsrError::Terminated`] once termination was requested
    ///
    /// # Errors
    ///
    /// Returns [`CsrError::Terminated`] after [`TerminationFlag::terminate`].
    pub fn assert_running(&self) -> Result<()> {
        if self.running() {
            Ok(())
        } else {
            Err(CsrError::Terminated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let flag = TerminationFlag::new();
        let clone = flag.clone();
        assert!(clone.assert_running().is_ok());

        flag.terminate();
        assert!(!clone.running());
        assert!(matches!(clone.assert_running(), Err(CsrError::Terminated)));
    }
}
