//! Concurrent sorted sets backed by singly linked lists.
//!
//! Five strategies share one node/sentinel layout and one contract
//! ([`ConcurrentSet`]), differing only in how they synchronize:
//!
//! - [`SingleLockListSet`]: one mutex around a [`SequentialListSet`].
//! - [`HandOverHandListSet`]: per-node locks, acquired two at a time while walking.
//! - [`OptimisticListSet`]: unlocked search, then lock two nodes and validate.
//! - [`LazyListSet`]: like optimistic, but removal marks before unlinking and lookups never lock.
//! - [`LockFreeListSet`]: compare-and-swap on [`AtomicMarkedPtr`] links.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![warn(unreachable_pub)]

mod adt;
mod error;
pub mod list_set;
pub mod marked;
mod sync;


pub use adt::{fmt_elements, render, ConcurrentSet};
pub use error::{Error, Result};
pub use list_set::{
    HandOverHandListSet, LazyListSet, LockFreeListSet, OptimisticListSet, SequentialListSet,
    SingleLockListSet,
};
pub use marked::{AtomicMarkedPtr, MarkedPtr};
