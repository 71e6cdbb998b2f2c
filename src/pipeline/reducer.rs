//! Single-consumer reduction of mapped pairs

use crate::logging::TRACE_TARGET;
use std::collections::hash_map::{Entry, HashMap};
use std::fmt::Debug;
use std::hash::Hash;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// What folding one pair did to the result mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOutcome {
    /// First value seen for the key.
    Inserted,
    /// Combined with the accumulated value.
    Merged,
}

/// Fold one pair into `results`.
///
/// ```
/// use parfold::pipeline::reducer::{fold_pair, FoldOutcome};
/// use std::collections::HashMap;
///
/// let mut counts = HashMap::new();
/// let mut sum = |a: u32, b: u32| a + b;
/// assert_eq!(fold_pair(&mut counts, "one", 1, &mut sum), FoldOutcome::Inserted);
/// assert_eq!(fold_pair(&mut counts, "one", 1, &mut sum), FoldOutcome::Merged);
/// assert_eq!(counts["one"], 2);
/// ```
pub fn fold_pair<K, V, G>(
    results: &mut HashMap<K, V>,
    key: K,
    value: V,
    reduce_fn: &mut G,
) -> FoldOutcome
where
    K: Eq + Hash,
    G: FnMut(V, V) -> V,
{
    match results.entry(key) {
        Entry::Occupied(slot) => {
            // The first key seen stays in the mapping.
            let (key, accumulated) = slot.remove_entry();
            results.insert(key, reduce_fn(accumulated, value));
            FoldOutcome::Merged
        }
        Entry::Vacant(slot) => {
            slot.insert(value);
            FoldOutcome::Inserted
        }
    }
}

pub(crate) struct Reduction<K, V> {
    pub(crate) results: HashMap<K, V>,
    pub(crate) pairs: u64,
}

pub(crate) struct Reducer<K, V> {
    output: mpsc::Receiver<(K, V)>,
    trace: bool,
}

impl<K, V> Reducer<K, V>
where
    K: Eq + Hash + Debug,
    V: Debug,
{
    pub(crate) fn new(output: mpsc::Receiver<(K, V)>, trace: bool) -> Self {
        Self { output, trace }
    }

    /// Drain the output channel until it is closed and empty.
    pub(crate) async fn drain<G>(mut self, mut reduce_fn: G) -> Reduction<K, V>
    where
        G: FnMut(V, V) -> V,
    {
        let mut results = HashMap::new();
        let mut pairs = 0u64;

        while let Some((key, value)) = self.output.recv().await {
            pairs += 1;
            if self.trace {
                match results.get(&key) {
                    Some(accumulated) => info!(
                        target: TRACE_TARGET,
                        key = ?key,
                        accumulated = ?accumulated,
                        incoming = ?value,
                        "merge"
                    ),
                    None => info!(target: TRACE_TARGET, key = ?key, value = ?value, "insert"),
                }
            }
            fold_pair(&mut results, key, value, &mut reduce_fn);
        }

        debug!("Reduced {} pairs into {} keys", pairs, results.len());
        Reduction { results, pairs }
    }
}
