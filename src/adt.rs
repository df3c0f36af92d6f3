//! The set contract shared by every list-set, and its canonical rendering.

use std::fmt;

/// Trait for a concurrent sorted set.
///
/// Every operation is linearizable: it appears to take effect atomically at some instant between
/// its invocation and its return.
pub trait ConcurrentSet<T> {
    /// Adds the value to the set. Returns whether the value was newly inserted.
    fn insert(&self, value: T) -> bool;

    /// Returns `true` iff the set contains the value.
    fn member(&self, value: &T) -> bool;

    /// Removes the value from the set. Returns whether the value was present in the set.
    fn remove(&self, value: &T) -> bool;

    /// Collects the elements in ascending order.
    ///
    /// The walk excludes concurrent mutators only as far as the strategy's own traversal does,
    /// so under contention the result reflects some interleaving of the racing operations, not
    /// necessarily the final state.
    fn to_vec(&self) -> Vec<T>
    where
        T: Clone;

    /// Returns `true` if the set holds no elements.
    fn is_empty(&self) -> bool;
}

/// Writes `elements` as `{ e1, e2, ..., en }`, or `{}` when there are none.
pub fn fmt_elements<I>(f: &mut fmt::Formatter<'_>, elements: I) -> fmt::Result
where
    I: IntoIterator,
    I::Item: fmt::Display,
{
    let mut elements = elements.into_iter().peekable();
    if elements.peek().is_none() {
        return f.write_str("{}");
    }
    write!(f, "{{ {} }}", itertools::join(elements, ", "))
}

/// Renders the current contents of `set` the way its `Display` impl does.
pub fn render<T, S>(set: &S) -> String
where
    T: fmt::Display + Clone,
    S: ConcurrentSet<T> + ?Sized,
{
    struct Rendered<T>(Vec<T>);

    impl<T: fmt::Display> fmt::Display for Rendered<T> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            fmt_elements(f, &self.0)
        }
    }

    Rendered(set.to_vec()).to_string()
}
