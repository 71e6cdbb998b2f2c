//! Property-based tests for the end-to-end pipeline

use crate::pipeline::reducer::fold_pair;
use crate::{PipelineBuilder, PipelineStats};
use proptest::prelude::*;
use std::collections::HashMap;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("failed to build runtime")
}

/// Each item emits (item % buckets, item) and (item % buckets, 1) keyed apart.
fn run_sum(
    items: Vec<u64>,
    workers: usize,
    buckets: u64,
) -> (HashMap<(u64, bool), u64>, PipelineStats) {
    runtime().block_on(async move {
        let mut pipeline = PipelineBuilder::new().workers(workers).build();
        pipeline
            .feed_iter(items)
            .unwrap()
            .map(move |n: u64| [((n % buckets, true), n), ((n % buckets, false), 1)])
            .unwrap();
        pipeline.reduce_with_stats(|a, b| a + b).await.unwrap()
    })
}

fn sequential_sum(items: &[u64], buckets: u64) -> HashMap<(u64, bool), u64> {
    let mut expected = HashMap::new();
    let mut sum = |a: u64, b: u64| a + b;
    for &n in items {
        fold_pair(&mut expected, (n % buckets, true), n, &mut sum);
        fold_pair(&mut expected, (n % buckets, false), 1, &mut sum);
    }
    expected
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    // Property test: result does not depend on the pool size
    #[test]
    fn test_pool_size_invariance(
        items in prop::collection::vec(0u64..10_000, 0..300),
        workers in 2usize..9,
        buckets in 1u64..20,
    ) {
        let (single, _) = run_sum(items.clone(), 1, buckets);
        let (pooled, _) = run_sum(items.clone(), workers, buckets);

        prop_assert_eq!(&single, &pooled);
        prop_assert_eq!(pooled, sequential_sum(&items, buckets));
    }

    // Property test: every item is mapped once and every pair reduced once
    #[test]
    fn test_no_loss_or_duplication(
        items in prop::collection::vec(0u64..1_000_000, 0..300),
        workers in 0usize..9,
    ) {
        let count = items.len() as u64;
        let (results, stats) = run_sum(items, workers, 7);

        prop_assert!(stats.is_lossless());
        prop_assert_eq!(stats.items_fed, count);
        prop_assert_eq!(stats.items_mapped, count);
        prop_assert_eq!(stats.pairs_reduced, count * 2);
        prop_assert_eq!(stats.workers, workers.max(1));
        prop_assert_eq!(stats.keys, results.len());

        let counted: u64 = results
            .iter()
            .filter(|((_, is_sum), _)| !*is_sum)
            .map(|(_, v)| *v)
            .sum();
        prop_assert_eq!(counted, count);
    }
}
