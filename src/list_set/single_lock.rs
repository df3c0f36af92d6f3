use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::sequential::{IntoIter, SequentialListSet};
use crate::adt::fmt_elements;
use crate::sync::{Mutex, MutexGuard};
use crate::ConcurrentSet;

// Global acquisition order for operations that lock two sets at once. Not a model-checked
// primitive, so it stays a plain std atomic under loom.
static LOCK_ORDER: AtomicUsize = AtomicUsize::new(0);

/// Concurrent sorted singly linked list guarded by a single mutex.
///
/// Every operation runs the sequential algorithm with the whole list locked, so operations
/// linearize in lock acquisition order. Operations on two sets lock both, always in the order
/// the sets were created, so they cannot deadlock against each other.
pub struct SingleLockListSet<T> {
    inner: Mutex<SequentialListSet<T>>,
    order: usize,
}

impl<T> SingleLockListSet<T> {
    /// Creates a new, empty list-set.
    pub fn new() -> Self {
        Self::from_sequential(SequentialListSet::new())
    }

    /// Wraps an existing sequential set.
    pub fn from_sequential(set: SequentialListSet<T>) -> Self {
        Self {
            inner: Mutex::new(set),
            order: LOCK_ORDER.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Unwraps the sequential set.
    pub fn into_sequential(self) -> SequentialListSet<T> {
        self.inner.into_inner().expect("list-set mutex poisoned")
    }

    fn lock(&self) -> MutexGuard<'_, SequentialListSet<T>> {
        self.inner.lock().expect("list-set mutex poisoned")
    }

    /// Runs `f` with both sets locked, taking the locks in creation order. A set paired with
    /// itself is locked once.
    fn with_both<R>(
        &self,
        other: &Self,
        f: impl FnOnce(&SequentialListSet<T>, &SequentialListSet<T>) -> R,
    ) -> R {
        if ptr::eq(self, other) {
            let set = self.lock();
            return f(&*set, &*set);
        }

        if self.order < other.order {
            let ours = self.lock();
            let theirs = other.lock();
            f(&*ours, &*theirs)
        } else {
            let theirs = other.lock();
            let ours = self.lock();
            f(&*ours, &*theirs)
        }
    }

    /// Returns `true` if a thread panicked while holding the lock. Every later operation on a
    /// poisoned set panics.
    #[cfg(not(feature = "check-loom"))]
    pub fn is_poisoned(&self) -> bool {
        self.inner.is_poisoned()
    }

    /// Returns the number of elements in the set.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Removes and returns the least element, if any.
    pub fn remove_min(&self) -> Option<T> {
        self.lock().remove_min()
    }

    /// Removes the elements in ascending order.
    ///
    /// The returned iterator holds the lock until dropped, and dropping it removes whatever it
    /// has not yet yielded, so the set is empty afterwards.
    pub fn drain(&self) -> Drain<'_, T> {
        Drain(self.lock())
    }
}

impl<T: Ord> SingleLockListSet<T> {
    /// Returns `true` if `self` and `other` share no element.
    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.with_both(other, |ours, theirs| ours.is_disjoint(theirs))
    }

    /// Returns `true` if every element of `self` is in `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        self.with_both(other, |ours, theirs| ours.is_subset(theirs))
    }

    /// Returns `true` if every element of `other` is in `self`.
    pub fn is_superset(&self, other: &Self) -> bool {
        self.with_both(other, |ours, theirs| ours.is_superset(theirs))
    }
}

impl<T: Ord + Clone> SingleLockListSet<T> {
    /// A new set of the elements in both `self` and `other`.
    pub fn intersection(&self, other: &Self) -> Self {
        let set = self.with_both(other, |ours, theirs| ours.intersection(theirs));
        Self::from_sequential(set)
    }

    /// A new set of the elements in either set.
    pub fn union(&self, other: &Self) -> Self {
        let set = self.with_both(other, |ours, theirs| ours.union(theirs));
        Self::from_sequential(set)
    }

    /// A new set of the elements in `self` but not in `other`.
    pub fn difference(&self, other: &Self) -> Self {
        let set = self.with_both(other, |ours, theirs| ours.difference(theirs));
        Self::from_sequential(set)
    }

    /// A new set of the elements in exactly one of the two sets.
    pub fn symmetric_difference(&self, other: &Self) -> Self {
        let set = self.with_both(other, |ours, theirs| ours.symmetric_difference(theirs));
        Self::from_sequential(set)
    }
}

impl<T: Ord> ConcurrentSet<T> for SingleLockListSet<T> {
    fn insert(&self, value: T) -> bool {
        self.lock().insert(value)
    }

    fn member(&self, value: &T) -> bool {
        self.lock().member(value)
    }

    fn remove(&self, value: &T) -> bool {
        self.lock().remove(value)
    }

    fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.lock().iter().cloned().collect()
    }

    fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T> Default for SingleLockListSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<SequentialListSet<T>> for SingleLockListSet<T> {
    fn from(set: SequentialListSet<T>) -> Self {
        Self::from_sequential(set)
    }
}

impl<T> IntoIterator for SingleLockListSet<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_sequential().into_iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for SingleLockListSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SingleLockListSet").field(&*self.lock()).finish()
    }
}

impl<T: fmt::Display> fmt::Display for SingleLockListSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_elements(f, self.lock().iter())
    }
}

/// Draining iterator returned by [`SingleLockListSet::drain`].
pub struct Drain<'l, T>(MutexGuard<'l, SequentialListSet<T>>);

impl<T> Iterator for Drain<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.remove_min()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.0.len(), Some(self.0.len()))
    }
}

impl<T> ExactSizeIterator for Drain<'_, T> {}

impl<T> Drop for Drain<'_, T> {
    fn drop(&mut self) {
        for _ in self.by_ref() {}
    }
}

impl<T> fmt::Debug for Drain<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Drain").field(&self.0.len()).finish()
    }
}
