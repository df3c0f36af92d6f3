//! Conformance and randomized stress drivers for [`ConcurrentSet`] implementations.

use std::collections::{BTreeSet, HashMap};
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::cmp;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use crossbeam_utils::thread;
use itertools::Itertools;
use rand::prelude::*;

use crate::adt::render;
use crate::ConcurrentSet;

/// Types that can be drawn at random from a key space small enough to collide often.
pub trait RandGen {
    /// Draws a random value.
    fn rand_gen(rng: &mut ThreadRng) -> Self;
}

impl RandGen for u8 {
    fn rand_gen(rng: &mut ThreadRng) -> Self {
        rng.gen()
    }
}

impl RandGen for u32 {
    fn rand_gen(rng: &mut ThreadRng) -> Self {
        rng.gen_range(0..1024)
    }
}

impl RandGen for i32 {
    fn rand_gen(rng: &mut ThreadRng) -> Self {
        rng.gen_range(-512..512)
    }
}

impl RandGen for usize {
    fn rand_gen(rng: &mut ThreadRng) -> Self {
        rng.gen_range(0..1024)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Insert,
    Member,
    Remove,
}

impl Op {
    const ALL: [Op; 3] = [Op::Insert, Op::Member, Op::Remove];

    fn apply<T, S: ConcurrentSet<T>>(self, set: &S, key: T) -> bool {
        match self {
            Op::Insert => set.insert(key),
            Op::Member => set.member(&key),
            Op::Remove => set.remove(&key),
        }
    }
}

fn assert_strictly_ascending<T: Ord + Debug>(elements: &[T]) {
    for (a, b) in elements.iter().tuple_windows() {
        assert!(a < b, "{:?} is not strictly before {:?}", a, b);
    }
}

/// Checks the fixed single-threaded scenarios every strategy must pass, including the rendered
/// form of the set.
pub fn conformance<S>()
where
    S: Default + ConcurrentSet<i32> + Display,
{
    let set = S::default();
    assert_eq!(set.to_string(), "{}");
    assert!(set.is_empty());
    assert!(!set.member(&5));
    assert!(!set.remove(&5));

    assert!(set.insert(2));
    assert_eq!(set.to_string(), "{ 2 }");
    assert!(set.insert(4));
    assert!(set.insert(3));
    assert_eq!(set.to_string(), "{ 2, 3, 4 }");
    assert_eq!(render::<i32, _>(&set), "{ 2, 3, 4 }");
    assert_eq!(set.to_vec(), vec![2, 3, 4]);
    assert!(!set.insert(4));
    assert_eq!(set.to_string(), "{ 2, 3, 4 }");

    assert!(!set.member(&1));
    assert!(set.member(&2));
    assert!(set.member(&3));
    assert!(set.member(&4));
    assert!(!set.member(&5));

    // Insert and remove idempotence.
    assert!(set.remove(&3));
    assert!(!set.remove(&3));
    assert!(!set.member(&3));
    assert!(set.insert(3));
    assert!(!set.insert(3));
    assert!(set.remove(&3));
    assert!(set.insert(3));
    assert!(set.remove(&3));

    // A missing key between two present ones.
    let set = S::default();
    assert!(set.insert(4));
    assert!(set.insert(6));
    assert!(!set.remove(&5));
    assert!(!set.member(&5));
    assert_eq!(set.to_string(), "{ 4, 6 }");

    // Boundaries.
    assert!(set.insert(i32::MIN));
    assert!(set.insert(i32::MAX));
    assert_eq!(set.to_vec(), vec![i32::MIN, 4, 6, i32::MAX]);
    assert!(set.remove(&i32::MIN));
    assert!(set.remove(&i32::MAX));
    assert!(set.remove(&4));
    assert!(set.remove(&6));
    assert!(set.is_empty());
    assert_eq!(set.to_string(), "{}");
}

/// Many threads insert the same keys in different orders. Every key is inserted exactly once and
/// the final list is exactly `0..keys`, in order and without duplicates.
pub fn insert_contended<S>(threads: usize, keys: usize, rounds: usize)
where
    S: Default + Sync + ConcurrentSet<usize>,
{
    for round in 0..rounds {
        let set = S::default();
        let barrier = Barrier::new(threads);

        let wins = thread::scope(|s| {
            let handles = (0..threads)
                .map(|_| {
                    s.spawn(|_| {
                        let mut order = (0..keys).collect::<Vec<_>>();
                        order.shuffle(&mut thread_rng());
                        barrier.wait();
                        order.into_iter().filter(|&key| set.insert(key)).count()
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .sum::<usize>()
        })
        .unwrap();

        assert_eq!(wins, keys, "round {}", round);
        assert_eq!(set.to_vec(), (0..keys).collect::<Vec<_>>(), "round {}", round);
    }
}

/// An element that counts how many times it has been dropped. Ordered by key alone.
#[derive(Debug, Clone)]
pub struct Tracked {
    key: usize,
    drops: Arc<AtomicUsize>,
}

impl Tracked {
    /// A new element with `key`, reporting drops to `drops`.
    pub fn new(key: usize, drops: &Arc<AtomicUsize>) -> Self {
        Self {
            key,
            drops: Arc::clone(drops),
        }
    }
}

impl PartialEq for Tracked {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Tracked {}

impl PartialOrd for Tracked {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tracked {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Pins and flushes the current thread until `drops` reaches `expected`, giving deferred
/// destructors the chance to run.
fn settle(drops: &AtomicUsize, expected: usize) {
    for _ in 0..100_000 {
        if drops.load(Ordering::SeqCst) >= expected {
            return;
        }
        crossbeam_epoch::pin().flush();
        std::thread::yield_now();
    }
}

/// Checks that every element is dropped exactly once: rejected duplicates right away, removed
/// elements once reclaimed, and the rest when the set is dropped.
pub fn reclamation<S>()
where
    S: Default + ConcurrentSet<Tracked>,
{
    const STORED: usize = 100;

    let drops = Arc::new(AtomicUsize::new(0));
    let set = S::default();
    for key in 0..STORED {
        assert!(set.insert(Tracked::new(key, &drops)));
    }

    let duplicates = (0..STORED).step_by(5).count();
    for key in (0..STORED).step_by(5) {
        assert!(!set.insert(Tracked::new(key, &drops)));
    }
    assert_eq!(drops.load(Ordering::SeqCst), duplicates);

    // Each removal drops its lookup key now and the stored element once reclaimed.
    let removed = (0..STORED).step_by(2).count();
    for key in (0..STORED).step_by(2) {
        assert!(set.remove(&Tracked::new(key, &drops)));
    }
    let expected = duplicates + 2 * removed;
    settle(&drops, expected);
    assert_eq!(drops.load(Ordering::SeqCst), expected);

    assert!(set.member(&Tracked::new(1, &drops)));
    assert!(!set.member(&Tracked::new(2, &drops)));
    drop(set);
    assert_eq!(drops.load(Ordering::SeqCst), 2 + STORED + duplicates + removed);
}

/// Runs random operations on one thread, checking every result against a [`BTreeSet`].
pub fn stress_sequential<T, S>(steps: usize)
where
    T: Ord + Clone + Debug + RandGen,
    S: Default + ConcurrentSet<T>,
{
    let set = S::default();
    let mut reference = BTreeSet::new();
    let mut rng = thread_rng();

    for step in 0..steps {
        let key = T::rand_gen(&mut rng);
        let op = *Op::ALL.choose(&mut rng).unwrap();
        let expected = match op {
            Op::Insert => reference.insert(key.clone()),
            Op::Member => reference.contains(&key),
            Op::Remove => reference.remove(&key),
        };
        assert_eq!(
            op.apply(&set, key.clone()),
            expected,
            "step {}: {:?}({:?})",
            step,
            op,
            key
        );

        if step % 64 == 0 {
            assert_eq!(set.to_vec(), reference.iter().cloned().collect::<Vec<_>>());
        }
    }

    assert_eq!(set.to_vec(), reference.into_iter().collect::<Vec<_>>());
}

/// Two threads race to insert the same key into an empty set: exactly one wins.
pub fn insert_race<S>(rounds: usize)
where
    S: Default + Sync + ConcurrentSet<i32>,
{
    for _ in 0..rounds {
        let set = S::default();
        let barrier = Barrier::new(2);

        let results = thread::scope(|s| {
            let handles = (0..2)
                .map(|_| {
                    s.spawn(|_| {
                        barrier.wait();
                        set.insert(5)
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        })
        .unwrap();

        assert_eq!(results.iter().filter(|&&won| won).count(), 1);
        assert_eq!(set.to_vec(), vec![5]);
    }
}

/// Readers poll a key while another thread removes it. Once the removal has returned, no
/// reader may see the key again.
pub fn remove_visibility<S>(rounds: usize)
where
    S: Default + Sync + ConcurrentSet<i32>,
{
    const READERS: usize = 3;

    for _ in 0..rounds {
        let set = S::default();
        for key in 0..16 {
            assert!(set.insert(key));
        }
        let removed = AtomicUsize::new(0);
        let barrier = Barrier::new(READERS + 1);

        thread::scope(|s| {
            for _ in 0..READERS {
                s.spawn(|_| {
                    barrier.wait();
                    loop {
                        let done = removed.load(Ordering::SeqCst) == 1;
                        let present = set.member(&7);
                        if done {
                            assert!(!present, "removed key is still visible");
                            break;
                        }
                    }
                });
            }
            s.spawn(|_| {
                barrier.wait();
                assert!(set.remove(&7));
                removed.store(1, Ordering::SeqCst);
            });
        })
        .unwrap();

        assert!(!set.member(&7));
        assert_eq!(set.to_vec().len(), 15);
    }
}

/// Runs random operations from many threads, then checks that the final contents agree with the
/// net number of successful insertions and removals of every key.
pub fn stress_concurrent<T, S>(threads: usize, steps: usize)
where
    T: Ord + Clone + Debug + Hash + Send + RandGen,
    S: Default + Sync + ConcurrentSet<T>,
{
    let set = S::default();

    let balances = thread::scope(|s| {
        let handles = (0..threads)
            .map(|_| {
                s.spawn(|_| {
                    let mut rng = thread_rng();
                    let mut balance = HashMap::<T, isize>::new();
                    for _ in 0..steps {
                        let key = T::rand_gen(&mut rng);
                        let op = *Op::ALL.choose(&mut rng).unwrap();
                        if op.apply(&set, key.clone()) {
                            match op {
                                Op::Insert => *balance.entry(key).or_default() += 1,
                                Op::Remove => *balance.entry(key).or_default() -= 1,
                                Op::Member => {}
                            }
                        }
                    }
                    balance
                })
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Vec<_>>()
    })
    .unwrap();

    let mut total = HashMap::<T, isize>::new();
    for (key, delta) in balances.into_iter().flatten() {
        *total.entry(key).or_default() += delta;
    }

    let contents = set.to_vec();
    assert_strictly_ascending(&contents);

    for (key, net) in &total {
        assert!(
            *net == 0 || *net == 1,
            "{:?} has net balance {} of successful inserts over removes",
            key,
            net
        );
        assert_eq!(set.member(key), *net == 1, "{:?}", key);
    }
    let expected = total
        .into_iter()
        .filter(|(_, net)| *net == 1)
        .map(|(key, _)| key)
        .sorted()
        .collect::<Vec<_>>();
    assert_eq!(contents, expected);
}

#[derive(Debug)]
struct Log<T> {
    op: Op,
    key: T,
    result: bool,
    start: usize,
    end: usize,
}

impl<T> Log<T> {
    fn precedes(&self, other: &Self) -> bool {
        self.end < other.start
    }

    fn overlaps_window(&self, after: &Self, before: &Self) -> bool {
        // Could be linearized strictly between `after` and `before`.
        self.end > after.start && self.start < before.end
    }
}

/// Runs random operations from many threads while logging each operation's interval on a
/// shared clock, then checks per key that the history admits a legal sequential order.
///
/// The checks are necessary conditions of linearizability for a set of one key:
/// - two successful insertions ordered in real time have a successful removal that could fall
///   between them, and symmetrically for removals;
/// - every successful removal, successful `member` and failed insertion could follow some
///   successful insertion;
/// - the final contents agree with the net balance of successful operations.
pub fn log_concurrent<T, S>(threads: usize, steps: usize)
where
    T: Ord + Clone + Debug + Hash + Send + Sync + RandGen,
    S: Default + Sync + ConcurrentSet<T>,
{
    let set = S::default();
    let clock = AtomicUsize::new(0);

    let logs = thread::scope(|s| {
        let handles = (0..threads)
            .map(|_| {
                s.spawn(|_| {
                    let mut rng = thread_rng();
                    let mut logs = Vec::with_capacity(steps);
                    for _ in 0..steps {
                        let key = T::rand_gen(&mut rng);
                        let op = *Op::ALL.choose(&mut rng).unwrap();
                        let start = clock.fetch_add(1, Ordering::SeqCst);
                        let result = op.apply(&set, key.clone());
                        let end = clock.fetch_add(1, Ordering::SeqCst);
                        logs.push(Log {
                            op,
                            key,
                            result,
                            start,
                            end,
                        });
                    }
                    logs
                })
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect::<Vec<_>>()
    })
    .unwrap();

    let by_key = logs.into_iter().into_group_map_by(|log| log.key.clone());
    for (key, logs) in &by_key {
        let successes = |op: Op| {
            logs.iter()
                .filter(move |log| log.op == op && log.result)
                .collect::<Vec<_>>()
        };
        let inserts = successes(Op::Insert);
        let removes = successes(Op::Remove);

        for (ordered, between) in [(&inserts, &removes), (&removes, &inserts)] {
            for (a, b) in ordered.iter().tuple_combinations() {
                let (first, second) = if a.precedes(b) {
                    (a, b)
                } else if b.precedes(a) {
                    (b, a)
                } else {
                    continue;
                };
                assert!(
                    between.iter().any(|m| m.overlaps_window(first, second)),
                    "{:?}: nothing separates {:?} and {:?}",
                    key,
                    first,
                    second
                );
            }
        }

        for log in logs {
            let needs_insert = matches!(
                (log.op, log.result),
                (Op::Remove, true) | (Op::Member, true) | (Op::Insert, false)
            );
            if needs_insert {
                assert!(
                    inserts.iter().any(|i| i.start < log.end),
                    "{:?}: {:?} saw the key before any insertion",
                    key,
                    log
                );
            }
        }

        let net = inserts.len() as isize - removes.len() as isize;
        assert!(net == 0 || net == 1, "{:?}: net balance {}", key, net);
        assert_eq!(set.member(key), net == 1, "{:?}", key);
    }

    assert_strictly_ascending(&set.to_vec());
}
