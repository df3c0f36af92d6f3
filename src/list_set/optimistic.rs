use std::fmt;
use std::ptr;
use std::sync::atomic::Ordering;

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use tracing::trace;

use super::search::{self, Chain};
use crate::adt::fmt_elements;
use crate::sync::{Mutex, MutexGuard};
use crate::ConcurrentSet;

struct Node<T> {
    element: Option<T>,
    next: Atomic<Node<T>>,
    lock: Mutex<()>,
}

/// Concurrent sorted singly linked list using optimistic fine-grained locking.
///
/// Searches run without locks. A mutation then locks the two nodes it believes are adjacent and
/// validates by rescanning from the head that they still are; if not, it starts over. Nodes
/// unlinked while unlocked searches may still be standing on them are reclaimed through
/// `crossbeam_epoch`.
pub struct OptimisticListSet<T> {
    head: Node<T>,
}

// Two adjacent nodes, both locked and validated.
struct Window<'g, T> {
    pred: &'g Node<T>,
    curr: Shared<'g, Node<T>>,
    _pred_lock: MutexGuard<'g, ()>,
    _curr_lock: MutexGuard<'g, ()>,
}

impl<T> Node<T> {
    fn new(element: Option<T>, next: Shared<'_, Self>) -> Owned<Self> {
        Owned::new(Self {
            element,
            next: Atomic::from(next),
            lock: Mutex::new(()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().expect("list-set node lock poisoned")
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
}

impl<'g, T> Window<'g, T> {
    fn curr(&self) -> &'g Node<T> {
        // SAFETY: `curr` is the validated successor of a non-tail node, so it is not null.
        unsafe { self.curr.deref() }
    }
}

impl<T> OptimisticListSet<T> {
    /// Creates a new, empty list-set.
    pub fn new() -> Self {
        let tail = Node::new(None, Shared::null());
        Self {
            head: Node {
                element: None,
                next: Atomic::from(tail),
                lock: Mutex::new(()),
            },
        }
    }

    /// Checks that `pred` is still reachable from the head and still points at `curr`.
    fn validate(&self, pred: &Node<T>, curr: Shared<'_, Node<T>>, guard: &Guard) -> bool {
        let mut node = &self.head;
        loop {
            if ptr::eq(node, pred) {
                return pred.next.load(Ordering::Acquire, guard) == curr;
            }
            match node.successor(guard) {
                Some(next) => node = next,
                None => return false,
            }
        }
    }
}

impl<T: Ord> OptimisticListSet<T> {
    /// Locks the predecessor of the first node not less than `key` together with that node,
    /// retrying until validation succeeds with the pair still bracketing `key`.
    fn locate<'g>(&'g self, key: &T, guard: &'g Guard) -> Window<'g, T> {
        let mut retries = 0usize;
        loop {
            let pred = search::find_predecessor(&self.head, key, guard);
            let pred_lock = pred.lock();
            let curr = pred.next.load(Ordering::Acquire, guard);
            // SAFETY: `pred` is never the tail, so `curr` is not null; `guard` keeps it allocated.
            let curr_node = unsafe { curr.deref() };
            let curr_lock = curr_node.lock();

            // `curr` is re-read under the lock, so a node inserted after the unlocked search may
            // now sit between `pred` and `key`.
            if !curr_node.precedes(key) && self.validate(pred, curr, guard) {
                return Window {
                    pred,
                    curr,
                    _pred_lock: pred_lock,
                    _curr_lock: curr_lock,
                };
            }

            retries += 1;
            trace!(retries, "optimistic validation failed, retrying");
        }
    }
}

impl<T: Ord> ConcurrentSet<T> for OptimisticListSet<T> {
    fn insert(&self, value: T) -> bool {
        let guard = epoch::pin();
        let window = self.locate(&value, &guard);
        if window.curr().holds(&value) {
            return false;
        }

        window
            .pred
            .next
            .store(Node::new(Some(value), window.curr), Ordering::Release);
        true
    }

    fn member(&self, value: &T) -> bool {
        let guard = epoch::pin();
        let window = self.locate(value, &guard);
        window.curr().holds(value)
    }

    fn remove(&self, value: &T) -> bool {
        let guard = epoch::pin();
        let window = self.locate(value, &guard);
        let curr = window.curr();
        if !curr.holds(value) {
            return false;
        }

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

impl<T> Drop for OptimisticListSet<T> {
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

impl<T> Default for OptimisticListSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for OptimisticListSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = epoch::pin();
        f.debug_set()
            .entries(search::elements(&self.head, &guard))
            .finish()
    }
}

impl<T: fmt::Display> fmt::Display for OptimisticListSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = epoch::pin();
        fmt_elements(f, search::elements(&self.head, &guard))
    }
}
