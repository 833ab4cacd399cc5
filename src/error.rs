//! Error taxonomy for compression, accumulation and import
//!
//! Every failure escalates to the import orchestrator; nothing in this crate
//! retries locally. Out-of-range ids are not errors, they are dropped and
//! counted in [`crate::storage::ImportStats`].

use thiserror::Error;

/// Errors raised while building or reading compressed graph structures
#[derive(Debug, Error)]
pub enum CsrError {
    /// A growable buffer would exceed its hard length ceiling
    #[error("capacity overflow: {requested} elements requested, ceiling is {ceiling}")]
    CapacityOverflow {
        /// Number of elements that were requested
        requested: u64,
        /// Hard ceiling of the buffer
        ceiling: usize,
    },

    /// A compressed handle was released a second time
    #[error("compressed handle (slot {slot}) released twice")]
    DoubleRelease {
        /// Arena slot of the handle
        slot: u32,
    },

    /// A compressed handle was read after it had been released
    #[error("compressed handle (slot {slot}) used after release")]
    UseAfterFree {
        /// Arena slot of the handle
        slot: u32,
    },

    /// An unchecked batch insertion went past the buffer capacity
    #[error("batch buffer overflow: capacity of {capacity} records exceeded")]
    BatchOverflow {
        /// Capacity of the batch buffer
        capacity: usize,
    },

    /// Cooperative cancellation was requested
    #[error("import terminated")]
    Terminated,

    /// A property value does not fit the declared channel type
    #[error("cannot convert value `{value}` of property key {key} to {expected}")]
    Conversion {
        /// Property key token
        key: u32,
        /// Rendered offending value
        value: String,
        /// Declared channel type
        expected: &'static str,
    },

    /// The pre-flight estimate exceeds the configured memory budget
    #[error("import needs at least {required} bytes but the budget is {budget} bytes")]
    MemoryBudgetExceeded {
        /// Estimated bytes (min or max, depending on configuration)
        required: u64,
        /// Configured budget in bytes
        budget: u64,
    },

    /// The import state machine was driven out of order
    #[error("invalid import phase transition from {from} to {to}")]
    InvalidPhaseTransition {
        /// Phase the importer was in
        from: &'static str,
        /// Phase that was requested
        to: &'static str,
    },

    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Compressed bytes could not be decoded
    #[error("corrupt compressed data: {0}")]
    Corrupt(String),

    /// The worker pool could not be started
    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    /// A worker task panicked
    #[error("worker panicked: {0}")]
    WorkerPanic(String),

    /// The first failure of an import, with the number of further failures
    #[error("{cause} ({suppressed} further failures suppressed)")]
    Aggregated {
        /// First non-termination failure
        cause: Box<CsrError>,
        /// Number of failures not reported individually
        suppressed: usize,
    },
}

impl CsrError {
    /// The underlying failure, looking through [`CsrError::Aggregated`]
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Aggregated { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Whether this failure is (or wraps) a cooperative termination
    #[must_use]
    pub fn is_termination(&self) -> bool {
        matches!(self.root_cause(), Self::Terminated)
    }

    /// Collapse the failures of many workers into one reported error
    ///
    /// The first failure that is not a termination wins; terminations are
    /// usually a consequence of that failure tripping the flag.
    pub(crate) fn aggregate(mut failures: Vec<Self>) -> Option<Self> {
        if failures.is_empty() {
            return None;
        }
        let position = failures
            .iter()
            .position(|e| !e.is_termination())
            .unwrap_or(0);
        let cause = failures.swap_remove(position);
        let suppressed = failures.len();
        if suppressed == 0 {
            Some(cause)
        } else {
            Some(Self::Aggregated {
                cause: Box::new(cause),
                suppressed,
            })
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T, E = CsrError> = std::result::Result<T, E>;
