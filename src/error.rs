//! Errors.

/// Errors raised by the list-set primitives.
///
/// None of these are contention outcomes: failed compare-and-swaps and failed validations are
/// retried internally and never reach the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A pointer handed to [`MarkedPtr`](crate::MarkedPtr) already had its mark bit set, so the
    /// allocator's alignment guarantee was broken.
    #[error("invariant violation: pointer {addr:#x} has its mark bit set")]
    InvariantViolation {
        /// The offending address.
        addr: usize,
    },
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
