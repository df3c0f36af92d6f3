//! Synchronization primitives, swapped for `loom`'s under the `check-loom` feature.

cfg_if::cfg_if! {
    if #[cfg(feature = "check-loom")] {
        pub(crate) use loom::sync::atomic::{AtomicBool, AtomicUsize};
        pub(crate) use loom::sync::{Mutex, MutexGuard};
    } else {
        pub(crate) use std::sync::atomic::{AtomicBool, AtomicUsize};
        pub(crate) use std::sync::{Mutex, MutexGuard};
    }
}
