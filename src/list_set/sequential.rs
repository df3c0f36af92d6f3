use std::cmp::Ordering;
use std::fmt;

use itertools::{EitherOrBoth, Itertools};

use super::search::{holds, precedes};
use crate::adt::fmt_elements;

#[derive(Debug)]
struct Node<T> {
    element: Option<T>,
    next: Option<Box<Node<T>>>,
}

/// Single-threaded sorted singly linked list with head and tail sentinels.
///
/// This is the algorithm every concurrent variant protects; [`SingleLockListSet`] wraps it in a
/// mutex as is.
///
/// [`SingleLockListSet`]: crate::SingleLockListSet
pub struct SequentialListSet<T> {
    len: usize,
    head: Node<T>,
}

impl<T> Node<T> {
    fn sentinel(next: Option<Box<Self>>) -> Self {
        Self {
            element: None,
            next,
        }
    }
}

impl<T: Ord> Node<T> {
    fn successor_holds(&self, key: &T) -> bool {
        self.next
            .as_ref()
            .map_or(false, |succ| holds(succ.element.as_ref(), key))
    }

    fn successor_precedes(&self, key: &T) -> bool {
        self.next
            .as_ref()
            .map_or(false, |succ| precedes(succ.element.as_ref(), key))
    }
}

impl<T> SequentialListSet<T> {
    /// Creates a new, empty list-set.
    pub fn new() -> Self {
        Self {
            len: 0,
            head: Node::sentinel(Some(Box::new(Node::sentinel(None)))),
        }
    }

    /// Returns the number of elements in the set.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// An iterator visiting all elements in ascending order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter(self.head.next.as_deref())
    }

    /// Removes and returns the least element, if any.
    pub fn remove_min(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }

        let mut first = self.head.next.take()?;
        self.head.next = first.next.take();
        self.len -= 1;
        first.element
    }
}

impl<T: Ord> SequentialListSet<T> {
    fn find_predecessor(&self, key: &T) -> &Node<T> {
        let mut pred = &self.head;
        while let Some(succ) = pred.next.as_deref() {
            if !precedes(succ.element.as_ref(), key) {
                break;
            }
            pred = succ;
        }
        pred
    }

    fn find_predecessor_mut(&mut self, key: &T) -> &mut Node<T> {
        let mut pred = &mut self.head;
        while pred.successor_precedes(key) {
            match pred.next {
                Some(ref mut succ) => pred = &mut **succ,
                None => break,
            }
        }
        pred
    }

    /// Returns `true` iff the set contains `key`.
    pub fn member(&self, key: &T) -> bool {
        self.find_predecessor(key).successor_holds(key)
    }

    /// Adds `key` to the set. Returns whether it was newly inserted.
    pub fn insert(&mut self, key: T) -> bool {
        let pred = self.find_predecessor_mut(&key);
        if pred.successor_holds(&key) {
            return false;
        }

        let next = pred.next.take();
        pred.next = Some(Box::new(Node {
            element: Some(key),
            next,
        }));
        self.len += 1;
        true
    }

    /// Removes `key` from the set. Returns whether it was present.
    pub fn remove(&mut self, key: &T) -> bool {
        let pred = self.find_predecessor_mut(key);
        if !pred.successor_holds(key) {
            return false;
        }

        if let Some(mut curr) = pred.next.take() {
            pred.next = curr.next.take();
        }
        self.len -= 1;
        true
    }
}

impl<T: Ord> SequentialListSet<T> {
    /// Returns `true` if `self` and `other` share no element.
    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.merge(other).all(|pair| !pair.is_both())
    }

    /// Returns `true` if every element of `self` is in `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        self.merge(other).all(|pair| !pair.is_left())
    }

    /// Returns `true` if every element of `other` is in `self`.
    pub fn is_superset(&self, other: &Self) -> bool {
        other.is_subset(self)
    }

    // Both lists are strictly ascending, so one merge pass pairs up equal elements.
    fn merge<'l>(
        &'l self,
        other: &'l Self,
    ) -> impl Iterator<Item = EitherOrBoth<&'l T, &'l T>> + 'l {
        self.iter().merge_join_by(other.iter(), |a, b| a.cmp(b))
    }
}

impl<T: Ord + Clone> SequentialListSet<T> {
    /// The elements in both `self` and `other`.
    pub fn intersection(&self, other: &Self) -> Self {
        Self::from_ascending(self.merge(other).filter_map(|pair| match pair {
            EitherOrBoth::Both(a, _) => Some(a.clone()),
            _ => None,
        }))
    }

    /// The elements in `self`, `other` or both.
    pub fn union(&self, other: &Self) -> Self {
        Self::from_ascending(self.merge(other).map(|pair| match pair {
            EitherOrBoth::Both(e, _) | EitherOrBoth::Left(e) | EitherOrBoth::Right(e) => e.clone(),
        }))
    }

    /// The elements in `self` but not in `other`.
    pub fn difference(&self, other: &Self) -> Self {
        Self::from_ascending(self.merge(other).filter_map(|pair| match pair {
            EitherOrBoth::Left(a) => Some(a.clone()),
            _ => None,
        }))
    }

    /// The elements in exactly one of `self` and `other`.
    pub fn symmetric_difference(&self, other: &Self) -> Self {
        Self::from_ascending(self.merge(other).filter_map(|pair| match pair {
            EitherOrBoth::Left(e) | EitherOrBoth::Right(e) => Some(e.clone()),
            EitherOrBoth::Both(..) => None,
        }))
    }
}

impl<T> SequentialListSet<T> {
    /// Builds a list from elements already in strictly ascending order, back to front.
    fn from_ascending<I: IntoIterator<Item = T>>(elements: I) -> Self {
        let elements = elements.into_iter().collect::<Vec<_>>();
        let len = elements.len();
        let mut next = Some(Box::new(Node::sentinel(None)));
        for element in elements.into_iter().rev() {
            next = Some(Box::new(Node {
                element: Some(element),
                next,
            }));
        }
        Self {
            len,
            head: Node::sentinel(next),
        }
    }
}

impl<T> Default for SequentialListSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for SequentialListSet<T> {
    fn drop(&mut self) {
        // Unlink one node at a time; the default drop would recurse once per node.
        let mut curr = self.head.next.take();
        while let Some(mut node) = curr {
            curr = node.next.take();
        }
    }
}

impl<T: Ord> FromIterator<T> for SequentialListSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<T: Ord> Extend<T> for SequentialListSet<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for element in iter {
            self.insert(element);
        }
    }
}

impl<T: PartialEq> PartialEq for SequentialListSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<T: Eq> Eq for SequentialListSet<T> {}

/// Sets compare lexicographically by their ascending elements.
impl<T: PartialOrd> PartialOrd for SequentialListSet<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.iter().partial_cmp(other.iter())
    }
}

impl<T: Ord> Ord for SequentialListSet<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.iter().cmp(other.iter())
    }
}

impl<T: fmt::Debug> fmt::Debug for SequentialListSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T: fmt::Display> fmt::Display for SequentialListSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_elements(f, self.iter())
    }
}

/// Iterator over the elements of a [`SequentialListSet`].
#[derive(Debug)]
pub struct Iter<'l, T>(Option<&'l Node<T>>);

impl<'l, T> Iterator for Iter<'l, T> {
    type Item = &'l T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.0?;
        // The tail sentinel is the only node without an element.
        let element = node.element.as_ref()?;
        self.0 = node.next.as_deref();
        Some(element)
    }
}

impl<'l, T> IntoIterator for &'l SequentialListSet<T> {
    type Item = &'l T;
    type IntoIter = Iter<'l, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T> IntoIterator for SequentialListSet<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter(self)
    }
}

/// Owning iterator over the elements of a [`SequentialListSet`], in ascending order.
#[derive(Debug)]
pub struct IntoIter<T>(SequentialListSet<T>);

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.remove_min()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.0.len(), Some(self.0.len()))
    }
}

impl<T> ExactSizeIterator for IntoIter<T> {}
