use std::fmt;
use std::sync::atomic::Ordering;

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use tracing::trace;

use super::search::{self, Chain};
use crate::adt::fmt_elements;
use crate::sync::{AtomicBool, Mutex, MutexGuard};
use crate::ConcurrentSet;

struct Node<T> {
    element: Option<T>,
    next: Atomic<Node<T>>,
    lock: Mutex<()>,
    marked: AtomicBool,
}

/// Concurrent sorted singly linked list using lazy synchronization.
///
/// Like [`OptimisticListSet`](crate::OptimisticListSet), mutations search without locks, then
/// lock two adjacent nodes and validate. Removal first marks the node as logically deleted and
/// only then unlinks it, so validation is a local check instead of a rescan and `member` never
/// locks or retries.
pub struct LazyListSet<T> {
    head: Node<T>,
}

// Two adjacent nodes, both locked, unmarked and linked.
struct Window<'g, T> {
    pred: &'g Node<T>,
    curr: Shared<'g, Node<T>>,
    _pred_lock: MutexGuard<'g, ()>,
    _curr_lock: MutexGuard<'g, ()>,
}

impl<T> Node<T> {
    fn new(element: Option<T>, next: Shared<'_, Self>) -> Self {
        Self {
            element,
            next: Atomic::from(next),
            lock: Mutex::new(()),
            marked: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().expect("list-set node lock poisoned")
    }

    fn is_marked(&self) -> bool {
        self.marked.load(Ordering::Acquire)
    }
}

impl<T> Chain<T> for Node<T> {
    fn element(&self) -> Option<&T> {
        self.element.as_ref()
    }

    fn successor<'g>(&'g self, guard: &'g Guard) -> Option<&'g Self> {
        // SAFETY: `guard` is pinned, so nodes unlinked after it was pinned are not yet freed.
        unsafe { self.next.load(Ordering::Acquire, guard).as_ref() }
    }

    fn is_live(&self) -> bool {
        !self.is_marked()
    }
}

impl<'g, T> Window<'g, T> {
    fn curr(&self) -> &'g Node<T> {
        // SAFETY: `curr` is the successor of a non-tail node, so it is not null.
        unsafe { self.curr.deref() }
    }
}

impl<T> LazyListSet<T> {
    /// Creates a new, empty list-set.
    pub fn new() -> Self {
        let tail = Owned::new(Node::new(None, Shared::null()));
        let head = Node::new(None, Shared::null());
        head.next.store(tail, Ordering::Relaxed);
        Self { head }
    }
}

impl<T: Ord> LazyListSet<T> {
    fn locate<'g>(&'g self, key: &T, guard: &'g Guard) -> Window<'g, T> {
        let mut retries = 0usize;
        loop {
            let pred = search::find_predecessor(&self.head, key, guard);
            let pred_lock = pred.lock();
            let curr = pred.next.load(Ordering::Acquire, guard);
            // SAFETY: `pred` is never the tail, so `curr` is not null; `guard` keeps it allocated.
            let curr_node = unsafe { curr.deref() };
            let curr_lock = curr_node.lock();

            // Both locks are held, so neither node can be marked or relinked under us. `curr` was
            // re-read under the lock and may be a node inserted below `key` since the search.
            if !pred.is_marked()
                && !curr_node.is_marked()
                && !curr_node.precedes(key)
                && pred.next.load(Ordering::Acquire, guard) == curr
            {
                return Window {
                    pred,
                    curr,
                    _pred_lock: pred_lock,
                    _curr_lock: curr_lock,
                };
            }

            retries += 1;
            trace!(retries, "lazy validation failed, retrying");
        }
    }
}

impl<T: Ord> ConcurrentSet<T> for LazyListSet<T> {
    fn insert(&self, value: T) -> bool {
        let guard = epoch::pin();
        let window = self.locate(&value, &guard);
        if window.curr().holds(&value) {
            return false;
        }

        let node = Owned::new(Node::new(Some(value), window.curr));
        window.pred.next.store(node, Ordering::Release);
        true
    }

    fn member(&self, value: &T) -> bool {
        let guard = epoch::pin();
        let pred = search::find_predecessor(&self.head, value, &guard);
        search::successor_holds(pred, value, &guard)
    }

    fn remove(&self, value: &T) -> bool {
        let guard = epoch::pin();
        let window = self.locate(value, &guard);
        let curr = window.curr();
        if !curr.holds(value) {
            return false;
        }

        // Logical removal: from here on `member` reports the value absent.
        curr.marked.store(true, Ordering::Release);
        let next = curr.next.load(Ordering::Acquire, &guard);
        window.pred.next.store(next, Ordering::Release);
        // SAFETY: `curr` is now unreachable from the head, and only this thread unlinked it.
        unsafe { guard.defer_destroy(window.curr) };
        true
    }

    fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        let guard = epoch::pin();
        search::elements(&self.head, &guard).cloned().collect()
    }

    fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        search::is_empty(&self.head, &guard)
    }
}

impl<T> Drop for LazyListSet<T> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` excludes every other thread, and unlinked nodes were already
        // handed to the collector, so each linked node is freed here exactly once.
        unsafe {
            let guard = epoch::unprotected();
            let mut curr = self.head.next.load(Ordering::Relaxed, guard);
            while let Some(node) = curr.try_into_owned() {
                curr = node.next.load(Ordering::Relaxed, guard);
            }
        }
    }
}

impl<T> Default for LazyListSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for LazyListSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = epoch::pin();
        f.debug_set()
            .entries(search::elements(&self.head, &guard))
            .finish()
    }
}

impl<T: fmt::Display> fmt::Display for LazyListSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = epoch::pin();
        fmt_elements(f, search::elements(&self.head, &guard))
    }
}
