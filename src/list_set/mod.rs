//! Sorted sets on singly linked lists bounded by head and tail sentinels.

mod hand_over_hand;
mod lazy;
mod lock_free;
mod optimistic;
mod search;
mod sequential;
mod single_lock;

pub use hand_over_hand::{HandOverHandListSet, Iter as HandOverHandIter};
pub use lazy::LazyListSet;
pub use lock_free::LockFreeListSet;
pub use optimistic::OptimisticListSet;
pub use sequential::{
    IntoIter as SequentialIntoIter, Iter as SequentialIter, SequentialListSet,
};
pub use single_lock::{Drain, SingleLockListSet};
