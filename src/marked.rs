//! Pointers carrying a one-bit mark in their least significant bit.
//!
//! Lock-free removal needs to flip a node's "logically removed" flag and swing its successor
//! pointer as one atomic step: a reader that sees the new pointer with the old mark (or the
//! reverse) could splice a node after one that is already being deleted. [`AtomicMarkedPtr`]
//! keeps both halves in a single word so every load, store and compare-and-swap covers the pair.

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::sync::atomic::Ordering;

use crate::error::{Error, Result};
use crate::sync::AtomicUsize;

const MARK_MASK: usize = 1;
const PTR_MASK: usize = !MARK_MASK;

/// A `(pointer, mark)` pair packed into one machine word.
pub struct MarkedPtr<T> {
    word: usize,
    _marker: PhantomData<*mut T>,
}

impl<T> MarkedPtr<T> {
    // Evaluated per `T` on first use: the mark bit is only free if `T` is at least 2-aligned.
    const ALIGNED: () = assert!(
        mem::align_of::<T>() > MARK_MASK,
        "pointee alignment leaves no room for the mark bit"
    );

    fn from_word(word: usize) -> Self {
        Self {
            word,
            _marker: PhantomData,
        }
    }

    /// Packs `ptr` and `mark`, failing if the low bit of `ptr` is already in use.
    pub fn try_new(ptr: *mut T, mark: bool) -> Result<Self> {
        #[allow(clippy::let_unit_value)]
        let () = Self::ALIGNED;

        let addr = ptr as usize;
        if addr & MARK_MASK != 0 {
            return Err(Error::InvariantViolation { addr });
        }
        Ok(Self::from_word(addr | mark as usize))
    }

    /// Packs `ptr` and `mark`.
    ///
    /// # Panics
    ///
    /// Panics with [`Error::InvariantViolation`] if the low bit of `ptr` is set. Every pointer
    /// obtained from an allocation of `T` satisfies this, so a panic here means memory is
    /// already corrupt.
    pub fn new(ptr: *mut T, mark: bool) -> Self {
        match Self::try_new(ptr, mark) {
            Ok(marked) => marked,
            Err(e) => panic!("{}", e),
        }
    }

    /// The null pointer, unmarked.
    pub fn null() -> Self {
        Self::from_word(0)
    }

    /// Returns the pointer half.
    pub fn pointer(self) -> *mut T {
        (self.word & PTR_MASK) as *mut T
    }

    /// Returns the mark half.
    pub fn mark(self) -> bool {
        self.word & MARK_MASK == MARK_MASK
    }

    /// Returns `true` if the pointer half is null, regardless of the mark.
    pub fn is_null(self) -> bool {
        self.pointer().is_null()
    }

    /// Returns a copy with the pointer replaced and the mark kept.
    pub fn with_pointer(self, ptr: *mut T) -> Self {
        Self::new(ptr, self.mark())
    }

    /// Returns a copy with the mark replaced and the pointer kept.
    pub fn with_mark(self, mark: bool) -> Self {
        Self::from_word((self.word & PTR_MASK) | mark as usize)
    }

    /// Dereferences the pointer half.
    ///
    /// # Safety
    ///
    /// The pointer half must be null or point to a live `T` for all of `'a`.
    pub unsafe fn as_ref<'a>(self) -> Option<&'a T> {
        self.pointer().as_ref()
    }
}

impl<T> Clone for MarkedPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for MarkedPtr<T> {}

impl<T> PartialEq for MarkedPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.word == other.word
    }
}

impl<T> Eq for MarkedPtr<T> {}

impl<T> Default for MarkedPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for MarkedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkedPtr")
            .field("pointer", &self.pointer())
            .field("mark", &self.mark())
            .finish()
    }
}

impl<T> fmt::Pointer for MarkedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&(self.pointer() as *const T), f)
    }
}

/// An atomic cell holding a [`MarkedPtr`].
///
/// Only whole-word operations are exposed, so the pointer and the mark are always read and
/// written together.
pub struct AtomicMarkedPtr<T> {
    word: AtomicUsize,
    _marker: PhantomData<*mut T>,
}

unsafe impl<T: Send + Sync> Send for AtomicMarkedPtr<T> {}
unsafe impl<T: Send + Sync> Sync for AtomicMarkedPtr<T> {}

impl<T> AtomicMarkedPtr<T> {
    /// Creates a cell holding `(ptr, mark)`.
    ///
    /// # Panics
    ///
    /// Panics if the low bit of `ptr` is set; see [`MarkedPtr::new`].
    pub fn new(ptr: *mut T, mark: bool) -> Self {
        Self::from(MarkedPtr::new(ptr, mark))
    }

    /// Creates a cell holding an unmarked null pointer.
    pub fn null() -> Self {
        Self::from(MarkedPtr::null())
    }

    /// Loads the pair.
    pub fn load(&self) -> MarkedPtr<T> {
        MarkedPtr::from_word(self.word.load(Ordering::Acquire))
    }

    /// Loads the pointer half.
    pub fn get_pointer(&self) -> *mut T {
        self.load().pointer()
    }

    /// Loads the mark half.
    pub fn get_mark(&self) -> bool {
        self.load().mark()
    }

    /// Stores `(ptr, mark)`.
    pub fn store(&self, ptr: *mut T, mark: bool) {
        self.word
            .store(MarkedPtr::new(ptr, mark).word, Ordering::Release);
    }

    /// Stores `(ptr, mark)` and returns the previous pair.
    pub fn swap(&self, ptr: *mut T, mark: bool) -> MarkedPtr<T> {
        MarkedPtr::from_word(
            self.word
                .swap(MarkedPtr::new(ptr, mark).word, Ordering::AcqRel),
        )
    }

    /// Replaces `(expected_ptr, expected_mark)` with `(new_ptr, new_mark)` if the cell holds
    /// exactly the expected pair. May fail spuriously even when it does, so callers loop.
    pub fn compare_and_swap_weak(
        &self,
        expected_ptr: *mut T,
        expected_mark: bool,
        new_ptr: *mut T,
        new_mark: bool,
    ) -> bool {
        let current = MarkedPtr::new(expected_ptr, expected_mark);
        let new = MarkedPtr::new(new_ptr, new_mark);
        self.word
            .compare_exchange_weak(current.word, new.word, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Like [`compare_and_swap_weak`](Self::compare_and_swap_weak), but fails only if the cell
    /// holds a different pair.
    pub fn compare_and_swap_strong(
        &self,
        expected_ptr: *mut T,
        expected_mark: bool,
        new_ptr: *mut T,
        new_mark: bool,
    ) -> bool {
        let current = MarkedPtr::new(expected_ptr, expected_mark);
        let new = MarkedPtr::new(new_ptr, new_mark);
        self.word
            .compare_exchange(current.word, new.word, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl<T> From<MarkedPtr<T>> for AtomicMarkedPtr<T> {
    fn from(marked: MarkedPtr<T>) -> Self {
        Self {
            word: AtomicUsize::new(marked.word),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for AtomicMarkedPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for AtomicMarkedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(), f)
    }
}
