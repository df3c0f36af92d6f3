use std::fmt;
use std::ptr;

use crossbeam_epoch::{self as epoch, Guard};
use tracing::trace;

use super::search::{self, Chain};
use crate::adt::fmt_elements;
use crate::marked::AtomicMarkedPtr;
use crate::ConcurrentSet;

// A node's mark lives in its own outgoing link: a marked link means the node itself is logically
// removed, and also that nothing may be spliced in after it.
struct Node<T> {
    element: Option<T>,
    link: AtomicMarkedPtr<Node<T>>,
}

/// Lock-free sorted singly linked list (Harris-Michael).
///
/// Removal is two-phase: mark the victim's link, then swing the predecessor's link past it. Any
/// traversal that meets a marked node finishes the unlink on the remover's behalf. Unlinked nodes
/// are reclaimed through `crossbeam_epoch` once no pinned thread can still be reading them.
pub struct LockFreeListSet<T> {
    head: Node<T>,
}

impl<T> Node<T> {
    fn new(element: Option<T>, next: *mut Self) -> *mut Self {
        Box::into_raw(Box::new(Self {
            element,
            link: AtomicMarkedPtr::new(next, false),
        }))
    }

    /// The element of a non-sentinel node.
    fn key(&self) -> &T {
        self.element
            .as_ref()
            .expect("sentinel nodes are never inserted")
    }
}

impl<T> Chain<T> for Node<T> {
    fn element(&self) -> Option<&T> {
        self.element.as_ref()
    }

    fn successor<'g>(&'g self, _guard: &'g Guard) -> Option<&'g Self> {
        // SAFETY: `_guard` is pinned, so nodes unlinked after it was pinned are not yet freed.
        unsafe { self.link.load().as_ref() }
    }

    fn is_live(&self) -> bool {
        !self.link.get_mark()
    }
}

/// Hands an unlinked node to the collector.
///
/// # Safety
///
/// `node` must be unreachable from the head, and this must be the only call retiring it.
unsafe fn retire<T>(node: *mut Node<T>, guard: &Guard) {
    guard.defer_unchecked(move || drop(Box::from_raw(node)));
}

impl<T> LockFreeListSet<T> {
    /// Creates a new, empty list-set.
    pub fn new() -> Self {
        Self {
            head: Node {
                element: None,
                link: AtomicMarkedPtr::new(Node::new(None, ptr::null_mut()), false),
            },
        }
    }
}

impl<T: Ord> LockFreeListSet<T> {
    /// Finds the predecessor of the first unmarked node not less than `key`, physically
    /// unlinking every marked node on the way.
    ///
    /// Returns the predecessor and its successor. If an unlink loses a race, the predecessor may
    /// itself be gone, so the search restarts from the head.
    fn find_predecessor_deleting<'g>(
        &'g self,
        key: &T,
        guard: &'g Guard,
    ) -> (&'g Node<T>, *mut Node<T>) {
        let mut restarts = 0usize;
        'retry: loop {
            let mut pred = &self.head;
            loop {
                // Only the tail has a null link, and `pred` is never the tail.
                let mut curr = pred.link.get_pointer();
                loop {
                    // SAFETY: `curr` was read from a live link while `guard` is pinned.
                    let succ = unsafe { &*curr }.link.load();
                    if !succ.mark() {
                        break;
                    }

                    if !pred
                        .link
                        .compare_and_swap_weak(curr, false, succ.pointer(), false)
                    {
                        restarts += 1;
                        trace!(restarts, "unlink of a marked node failed, restarting search");
                        continue 'retry;
                    }

                    trace!("unlinked a marked node");
                    // SAFETY: the CAS above removed the only link to `curr`.
                    unsafe { retire(curr, guard) };
                    curr = succ.pointer();
                }

                // SAFETY: as above.
                let curr_node = unsafe { &*curr };
                if !curr_node.precedes(key) {
                    return (pred, curr);
                }
                pred = curr_node;
            }
        }
    }
}

impl<T: Clone> LockFreeListSet<T> {
    /// Removes and returns the least element, if any.
    ///
    /// Marks the first unmarked node and then unlinks it, exactly as `remove` does. The element
    /// is cloned out because readers pinned before the unlink may still be looking at it.
    /// The result is the least element as of the last read of the head's link; a smaller element
    /// inserted concurrently after that read stays in the set.
    pub fn remove_min(&self) -> Option<T> {
        let guard = epoch::pin();

        let mut restarts = 0usize;
        loop {
            let curr = self.head.link.get_pointer();
            // SAFETY: `curr` was read from a live link while `guard` is pinned.
            let curr_node = unsafe { &*curr };
            // Only the tail has no element.
            let element = curr_node.element.as_ref()?;
            let succ = curr_node.link.load();

            if succ.mark() {
                // A remover got here first. Its link is frozen, so finish the unlink for it.
                if self
                    .head
                    .link
                    .compare_and_swap_strong(curr, false, succ.pointer(), false)
                {
                    // SAFETY: the CAS above removed the only link to `curr`.
                    unsafe { retire(curr, &guard) };
                }
                continue;
            }

            if !curr_node
                .link
                .compare_and_swap_weak(succ.pointer(), false, succ.pointer(), true)
            {
                restarts += 1;
                trace!(restarts, "remove_min lost a race, restarting");
                continue;
            }

            let element = element.clone();
            if self
                .head
                .link
                .compare_and_swap_strong(curr, false, succ.pointer(), false)
            {
                // SAFETY: as above.
                unsafe { retire(curr, &guard) };
            }
            return Some(element);
        }
    }
}

impl<T: Ord> ConcurrentSet<T> for LockFreeListSet<T> {
    fn insert(&self, value: T) -> bool {
        let guard = epoch::pin();
        let node = Node::new(Some(value), ptr::null_mut());
        // SAFETY: `node` stays private to this thread until the CAS below publishes it.
        let new = unsafe { &*node };

        let mut restarts = 0usize;
        loop {
            let (pred, curr) = self.find_predecessor_deleting(new.key(), &guard);
            // SAFETY: `curr` was read from a live link while `guard` is pinned.
            if unsafe { &*curr }.holds(new.key()) {
                // SAFETY: never published.
                drop(unsafe { Box::from_raw(node) });
                return false;
            }

            new.link.store(curr, false);
            if pred.link.compare_and_swap_weak(curr, false, node, false) {
                return true;
            }

            restarts += 1;
            trace!(restarts, "insert lost a race, restarting");
        }
    }

    fn member(&self, value: &T) -> bool {
        let guard = epoch::pin();
        let pred = search::find_predecessor(&self.head, value, &guard);
        search::successor_holds(pred, value, &guard)
    }

    fn remove(&self, value: &T) -> bool {
        let guard = epoch::pin();

        let mut restarts = 0usize;
        loop {
            let (pred, curr) = self.find_predecessor_deleting(value, &guard);
            // SAFETY: `curr` was read from a live link while `guard` is pinned.
            let curr_node = unsafe { &*curr };
            if !curr_node.holds(value) {
                return false;
            }

            // Logical removal. Fails if someone marked `curr` first or spliced in after it.
            let succ = curr_node.link.get_pointer();
            if !curr_node.link.compare_and_swap_weak(succ, false, succ, true) {
                restarts += 1;
                trace!(restarts, "mark lost a race, restarting");
                continue;
            }

            // Physical removal. On failure a later traversal unlinks it instead.
            if pred.link.compare_and_swap_strong(curr, false, succ, false) {
                // SAFETY: the CAS above removed the only link to `curr`.
                unsafe { retire(curr, &guard) };
            }
            return true;
        }
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

impl<T> Drop for LockFreeListSet<T> {
    fn drop(&mut self) {
        // Marked nodes still linked here were never retired, so freeing the whole chain frees
        // each node exactly once.
        let mut curr = self.head.link.get_pointer();
        while !curr.is_null() {
            // SAFETY: `&mut self` excludes every other thread.
            let node = unsafe { Box::from_raw(curr) };
            curr = node.link.get_pointer();
        }
    }
}

impl<T> Default for LockFreeListSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for LockFreeListSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = epoch::pin();
        f.debug_set()
            .entries(search::elements(&self.head, &guard))
            .finish()
    }
}

impl<T: fmt::Display> fmt::Display for LockFreeListSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = epoch::pin();
        fmt_elements(f, search::elements(&self.head, &guard))
    }
}
