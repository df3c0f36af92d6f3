//! Predecessor search shared by the strategies that read links without locks.

use std::iter;

use crossbeam_epoch::Guard;

/// Returns `true` if a node holding `element` sorts strictly before `key`.
///
/// Sentinels hold no element and never precede anything, so a search always stops at the tail.
pub(crate) fn precedes<T: Ord>(element: Option<&T>, key: &T) -> bool {
    matches!(element, Some(element) if element < key)
}

/// Returns `true` if a node holding `element` holds exactly `key`.
pub(crate) fn holds<T: Ord>(element: Option<&T>, key: &T) -> bool {
    element == Some(key)
}

/// A node that can be walked without taking locks while `guard` is pinned.
pub(crate) trait Chain<T>: Sized {
    /// The node's element, `None` for sentinels.
    fn element(&self) -> Option<&T>;

    /// The next node, `None` only for the tail sentinel.
    fn successor<'g>(&'g self, guard: &'g Guard) -> Option<&'g Self>;

    /// Whether the node is logically present. Only the logical-deletion variants ever say no.
    fn is_live(&self) -> bool {
        true
    }

    fn precedes(&self, key: &T) -> bool
    where
        T: Ord,
    {
        precedes(self.element(), key)
    }

    fn holds(&self, key: &T) -> bool
    where
        T: Ord,
    {
        holds(self.element(), key)
    }
}

/// Finds the last node whose element is less than `key`, or `head` if there is none.
///
/// If `key` is in the list it is the result's immediate successor; otherwise it belongs right
/// after the result. Takes no locks, so under concurrent mutation the result may already have been
/// unlinked by the time it is returned; callers validate as their protocol requires.
pub(crate) fn find_predecessor<'g, T, N>(head: &'g N, key: &T, guard: &'g Guard) -> &'g N
where
    T: Ord,
    N: Chain<T>,
{
    let mut pred = head;
    while let Some(succ) = pred.successor(guard).filter(|succ| succ.precedes(key)) {
        pred = succ;
    }
    pred
}

/// Returns `true` if the node right after `pred` is live and holds `key`.
pub(crate) fn successor_holds<'g, T, N>(pred: &'g N, key: &T, guard: &'g Guard) -> bool
where
    T: Ord,
    N: Chain<T>,
{
    pred.successor(guard)
        .map_or(false, |curr| curr.holds(key) && curr.is_live())
}

/// Elements of the live nodes after `head`, in list order.
pub(crate) fn elements<'g, T, N>(head: &'g N, guard: &'g Guard) -> impl Iterator<Item = &'g T> + 'g
where
    T: 'g,
    N: Chain<T> + 'g,
{
    iter::successors(head.successor(guard), move |&node| node.successor(guard))
        .filter(|node| node.is_live())
        .filter_map(|node| node.element())
}

/// Returns `true` if no live node follows `head`.
pub(crate) fn is_empty<'g, T, N>(head: &'g N, guard: &'g Guard) -> bool
where
    T: 'g,
    N: Chain<T> + 'g,
{
    elements(head, guard).next().is_none()
}
