//! Pipeline controller
//!
//! The controller owns the channel ends and the supervisor handles of one run
//! and enforces the call sequence: build, feed, map, reduce.
//!
//! ```text
//! feeders ──► input channel ──► mapper pool (N) ──► output channel ──► reducer
//!                 ▲                                      ▲
//!          input supervisor                        output closer
//! ```

pub mod feeder;
pub mod mapper;
pub mod reducer;
pub mod stats;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result, Stage};
use feeder::{InputFeeder, InputSupervisor};
use futures::stream::{self, Stream};
use mapper::MapperPool;
use reducer::Reducer;
use stats::PipelineStats;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::hash::Hash;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Fluent configuration for a [`Pipeline`]
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mapper workers. Zero is treated as one.
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Log every emit, insert and merge event under the `parfold::trace` target.
    pub fn trace(mut self, trace: bool) -> Self {
        self.config.trace = trace;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build<I, K, V>(self) -> Pipeline<I, K, V> {
        Pipeline::with_config(self.config)
    }
}

struct RunningStages<K, V> {
    pool: MapperPool<K, V>,
    input: InputSupervisor,
}

/// One in-process map-reduce run.
///
/// Feeders and mapper workers run on Tokio's blocking pool and the
/// supervisors are Tokio tasks, so every method that starts work must be
/// called from within a Tokio runtime.
pub struct Pipeline<I, K, V> {
    config: PipelineConfig,
    feeder: InputFeeder<I>,
    stages: Option<RunningStages<K, V>>,
}

impl<I, K, V> Pipeline<I, K, V> {
    /// Pipeline with the default configuration: one worker, no tracing.
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        let config = config.normalized();
        Self {
            feeder: InputFeeder::new(config.workers),
            config,
            stages: None,
        }
    }

    /// Effective configuration, with the worker count already normalized.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Whether the map stage has been started.
    pub fn is_mapping(&self) -> bool {
        self.stages.is_some()
    }
}

impl<I, K, V> fmt::Debug for Pipeline<I, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("feeders", &self.feeder.feeder_count())
            .field("mapping", &self.is_mapping())
            .finish()
    }
}

impl<I, K, V> Default for Pipeline<I, K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, K, V> Pipeline<I, K, V>
where
    I: Send + 'static,
    K: Eq + Hash + Debug + Send + 'static,
    V: Debug + Send + 'static,
{
    /// Feed a finite sequence. Items are forwarded in iteration order.
    pub fn feed_iter<T>(&mut self, items: T) -> Result<&mut Self>
    where
        T: IntoIterator<Item = I>,
        T::IntoIter: Send + 'static,
    {
        self.feed_stream(stream::iter(items))
    }

    /// Feed an externally driven stream; the input stays open until it ends.
    pub fn feed_stream<S>(&mut self, source: S) -> Result<&mut Self>
    where
        S: Stream<Item = I> + Send + 'static,
    {
        self.feeder.attach(source)?;
        Ok(self)
    }

    /// Feed everything sent on `receiver` until all of its senders are dropped.
    pub fn feed_channel(&mut self, receiver: mpsc::Receiver<I>) -> Result<&mut Self> {
        self.feed_stream(ReceiverStream::new(receiver))
    }

    /// Start the mapper pool. Closes the input to further feeders.
    ///
    /// `map_fn` may return any number of pairs per item, e.g. an `Option`,
    /// an array or a `Vec`.
    pub fn map<F, R>(&mut self, map_fn: F) -> Result<&mut Self>
    where
        F: Fn(I) -> R + Send + Sync + 'static,
        R: IntoIterator<Item = (K, V)>,
    {
        if self.stages.is_some() {
            return Err(PipelineError::MapAlreadyStarted);
        }

        debug!(
            "Starting map stage: {} workers, {} feeders",
            self.config.workers,
            self.feeder.feeder_count()
        );
        let (input_rx, input) = self.feeder.close();
        let pool = MapperPool::start(self.config.workers, self.config.trace, input_rx, map_fn);
        self.stages = Some(RunningStages { pool, input });
        Ok(self)
    }

    /// Drain the pipeline and return the result mapping.
    ///
    /// Waits until every feeder, mapper and supervisor has finished. A panic
    /// in any of them is returned as [`PipelineError::TaskPanicked`]; a panic
    /// in `reduce_fn` unwinds through this call.
    pub async fn reduce<G>(self, reduce_fn: G) -> Result<HashMap<K, V>>
    where
        G: FnMut(V, V) -> V,
    {
        let (results, _) = self.reduce_with_stats(reduce_fn).await?;
        Ok(results)
    }

    /// Like [`reduce`](Self::reduce), also returning per-stage counters.
    pub async fn reduce_with_stats<G>(self, reduce_fn: G) -> Result<(HashMap<K, V>, PipelineStats)>
    where
        G: FnMut(V, V) -> V,
    {
        let RunningStages { pool, input } = self.stages.ok_or(PipelineError::MapNotStarted)?;
        let (output, closer) = pool.into_parts();

        let reduction = Reducer::new(output, self.config.trace)
            .drain(reduce_fn)
            .await;
        let worker_reports = closer.join().await?;
        let feeder_reports = input.join().await?;

        let stats = PipelineStats::collect(
            &feeder_reports,
            &worker_reports,
            reduction.pairs,
            reduction.results.len(),
        );
        debug!(
            "Pipeline finished: {} items fed, {} pairs reduced into {} keys",
            stats.items_fed, stats.pairs_reduced, stats.keys
        );
        Ok((reduction.results, stats))
    }
}

/// Run `task` on Tokio's blocking pool under the caller's tracing subscriber.
pub(crate) fn spawn_dedicated<F, T>(task: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    tokio::task::spawn_blocking(move || tracing::dispatcher::with_default(&dispatch, task))
}

/// Join every handle of one stage in spawn order.
///
/// All handles are awaited even after a failure; the first failure is returned.
pub(crate) async fn join_stage<T>(stage: Stage, handles: Vec<JoinHandle<T>>) -> Result<Vec<T>> {
    let mut reports = Vec::with_capacity(handles.len());
    let mut failure = None;

    for (index, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(report) => reports.push(report),
            Err(err) => {
                let error = PipelineError::from_join(stage, index, err);
                warn!("{}", error);
                failure.get_or_insert(error);
            }
        }
    }

    match failure {
        Some(error) => Err(error),
        None => Ok(reports),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builder_normalizes_config() {
        let pipeline: Pipeline<u8, u8, u8> = PipelineBuilder::new().workers(0).trace(true).build();
        assert_eq!(pipeline.config().workers, 1);
        assert!(pipeline.config().trace);
        assert!(!pipeline.is_mapping());
        assert!(format!("{pipeline:?}").contains("mapping: false"));
    }

    #[tokio::test]
    async fn test_builder_config_replaces_fields() {
        let config = PipelineConfig {
            workers: 3,
            trace: false,
        };
        let pipeline: Pipeline<u8, u8, u8> = PipelineBuilder::new()
            .trace(true)
            .config(config)
            .build();
        assert_eq!(pipeline.config().workers, 3);
        assert!(!pipeline.config().trace);
    }

    #[tokio::test]
    async fn test_word_count() {
        let mut pipeline = Pipeline::new();
        pipeline
            .feed_iter(vec!["three", "three", "three", "one"])
            .unwrap()
            .map(|word| [(word, 1)])
            .unwrap();
        assert!(pipeline.is_mapping());

        let result = pipeline.reduce(|a, b| a + b).await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result["three"], 3);
        assert_eq!(result["one"], 1);
    }

    #[tokio::test]
    async fn test_map_twice_is_rejected() {
        let mut pipeline: Pipeline<u32, u32, u32> = Pipeline::new();
        pipeline.feed_iter(vec![1, 2]).unwrap();
        pipeline.map(|n| Some((n, n))).unwrap();

        let err = pipeline.map(|n| Some((n, n))).unwrap_err();
        assert!(matches!(err, PipelineError::MapAlreadyStarted));

        // The first map stage is unaffected.
        let result = pipeline.reduce(|a, b| a + b).await.unwrap();
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_feed_after_map_is_rejected() {
        let mut pipeline: Pipeline<u32, u32, u32> = Pipeline::new();
        pipeline.map(|n| Some((n, n))).unwrap();

        let err = pipeline.feed_iter(vec![1]).unwrap_err();
        assert!(matches!(err, PipelineError::InputClosed));
    }

    #[tokio::test]
    async fn test_reduce_without_map_is_rejected() {
        let mut pipeline: Pipeline<u32, u32, u32> = Pipeline::new();
        pipeline.feed_iter(vec![1, 2, 3]).unwrap();

        let err = pipeline.reduce(|a, b| a + b).await.unwrap_err();
        assert!(matches!(err, PipelineError::MapNotStarted));
    }

    #[test]
    fn test_pool_maps_in_parallel_on_current_thread_runtime() {
        let started = std::time::Instant::now();
        let result = tokio_test::block_on(async {
            let mut pipeline = PipelineBuilder::new().workers(4).build();
            pipeline
                .feed_iter(0..4u32)
                .unwrap()
                .map(|n| {
                    std::thread::sleep(std::time::Duration::from_millis(250));
                    [("sum", n)]
                })
                .unwrap();
            pipeline.reduce(|a, b| a + b).await
        })
        .unwrap();

        assert_eq!(result["sum"], 6);
        let elapsed = started.elapsed();
        assert!(elapsed < std::time::Duration::from_millis(750), "took {elapsed:?}");
    }

    #[test]
    fn test_runs_on_current_thread_runtime() {
        let result = tokio_test::block_on(async {
            let mut pipeline = PipelineBuilder::new().workers(3).build();
            pipeline
                .feed_iter(vec![2u64, 3, 5, 7])
                .unwrap()
                .feed_iter(vec![11u64, 13])
                .unwrap()
                .map(|p| [(p % 2 == 0, p)])
                .unwrap();
            pipeline.reduce(|a, b| a * b).await
        })
        .unwrap();

        assert_eq!(result[&true], 2);
        assert_eq!(result[&false], 3 * 5 * 7 * 11 * 13);
    }

    async fn fails(message: &'static str) -> u32 {
        panic!("{}", message)
    }

    #[tokio::test]
    async fn test_join_stage_reports_first_failure_after_joining_all() {
        let handles = vec![
            tokio::spawn(async { 1 }),
            tokio::spawn(fails("first")),
            tokio::spawn(fails("second")),
        ];

        let err = join_stage(Stage::Feeder, handles).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::TaskPanicked { index: 1, ref message, .. } if message == "first"
        ));
    }
}
