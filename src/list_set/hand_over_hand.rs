use std::fmt;
use std::mem;
use std::ptr;

use super::search::{holds, precedes};
use crate::adt::fmt_elements;
use crate::sync::{Mutex, MutexGuard};
use crate::ConcurrentSet;

struct Node<T> {
    element: Option<T>,
    next: Mutex<*mut Node<T>>,
}

/// Concurrent sorted singly linked list using hand-over-hand lock coupling.
///
/// Each node's lock guards its `next` pointer. A traversal always takes the successor's lock
/// before giving up the current one, so it holds two adjacent locks at every step and no node
/// can be spliced in or out next to it.
pub struct HandOverHandListSet<T> {
    head: Node<T>,
}

unsafe impl<T: Send> Send for HandOverHandListSet<T> {}
unsafe impl<T: Send + Sync> Sync for HandOverHandListSet<T> {}

// Two adjacent locked links: `pred` guards `pred.next`, which points at the current node, and
// `curr` guards the current node's own `next`.
//
//   pred -> curr -> ...
struct Cursor<'l, T> {
    pred: MutexGuard<'l, *mut Node<T>>,
    curr: MutexGuard<'l, *mut Node<T>>,
}

impl<T> Node<T> {
    fn new(element: Option<T>, next: *mut Self) -> *mut Self {
        Box::into_raw(Box::new(Self {
            element,
            next: Mutex::new(next),
        }))
    }

    fn lock(&self) -> MutexGuard<'_, *mut Self> {
        self.next.lock().expect("list-set node lock poisoned")
    }
}

impl<'l, T> Cursor<'l, T> {
    /// The node between the two held locks.
    fn curr(&self) -> &'l Node<T> {
        // SAFETY: `pred`'s lock is held, so the node it points to cannot be unlinked or freed.
        unsafe { &**self.pred }
    }

    /// Moves both locks one node forward, acquiring the new one before releasing the old.
    fn advance(&mut self) {
        // SAFETY: the caller only advances past element nodes, whose `next` is never null, and
        // `curr`'s lock keeps that successor alive.
        let next = unsafe { &**self.curr }.lock();
        self.pred = mem::replace(&mut self.curr, next);
    }
}

impl<T> HandOverHandListSet<T> {
    /// Creates a new, empty list-set.
    pub fn new() -> Self {
        Self {
            head: Node {
                element: None,
                next: Mutex::new(Node::new(None, ptr::null_mut())),
            },
        }
    }

    /// An iterator visiting all elements in ascending order.
    ///
    /// The iterator holds one node lock at a time and couples to the next before releasing it,
    /// so it never observes a node mid-splice. Elements are cloned out because a node may be
    /// freed as soon as the iterator moves past it.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter(self.head.lock())
    }
}

impl<T: Ord> HandOverHandListSet<T> {
    /// Finds the predecessor of the first node whose element is not less than `key`, returning
    /// with the locks on that predecessor and on its successor held.
    fn find_predecessor_locking(&self, key: &T) -> Cursor<'_, T> {
        let pred = self.head.lock();
        // SAFETY: the head's successor is never null, and `pred` keeps it linked.
        let curr = unsafe { &**pred }.lock();
        let mut cursor = Cursor { pred, curr };

        while precedes(cursor.curr().element.as_ref(), key) {
            cursor.advance();
        }
        cursor
    }
}

impl<T: Ord> ConcurrentSet<T> for HandOverHandListSet<T> {
    fn insert(&self, value: T) -> bool {
        let mut cursor = self.find_predecessor_locking(&value);
        if holds(cursor.curr().element.as_ref(), &value) {
            return false;
        }

        *cursor.pred = Node::new(Some(value), *cursor.pred);
        true
    }

    fn member(&self, value: &T) -> bool {
        let cursor = self.find_predecessor_locking(value);
        holds(cursor.curr().element.as_ref(), value)
    }

    fn remove(&self, value: &T) -> bool {
        let Cursor { mut pred, curr } = self.find_predecessor_locking(value);
        let node = *pred;
        // SAFETY: see `Cursor::curr`.
        if !holds(unsafe { &*node }.element.as_ref(), value) {
            return false;
        }

        *pred = *curr;
        // Release the node's own lock before freeing the mutex it lives in. Every other path to
        // the node goes through `pred`, which stays locked until the node is gone.
        drop(curr);
        // SAFETY: unlinked above, and nobody else can hold a reference to it.
        drop(unsafe { Box::from_raw(node) });
        true
    }

    fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.iter().collect()
    }

    fn is_empty(&self) -> bool {
        let head = self.head.lock();
        // SAFETY: the head's lock keeps its successor linked.
        unsafe { &**head }.element.is_none()
    }
}

/// Iterator over the elements of a [`HandOverHandListSet`].
pub struct Iter<'l, T>(MutexGuard<'l, *mut Node<T>>);

impl<'l, T: Clone> Iterator for Iter<'l, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: the held lock guards the link to `node`, so it stays allocated.
        let node = unsafe { &**self.0 };
        // The tail sentinel is the only node without an element.
        let element = node.element.as_ref()?.clone();
        self.0 = node.lock();
        Some(element)
    }
}

impl<T> fmt::Debug for Iter<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Iter").field(&*self.0).finish()
    }
}

impl<T> Drop for HandOverHandListSet<T> {
    fn drop(&mut self) {
        let mut curr = *self.head.lock();
        while !curr.is_null() {
            // SAFETY: `&mut self` excludes every other thread; each node is freed exactly once.
            let node = unsafe { Box::from_raw(curr) };
            curr = *node.lock();
        }
    }
}

impl<T> Default for HandOverHandListSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for HandOverHandListSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T: Clone + fmt::Display> fmt::Display for HandOverHandListSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_elements(f, self.iter())
    }
}
