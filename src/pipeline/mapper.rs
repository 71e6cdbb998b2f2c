//! Mapper pool and output closer
//!
//! Each worker runs on its own thread from Tokio's blocking pool and holds a
//! clone of the multi-consumer input receiver, so every item is mapped by
//! exactly one worker and N mapping calls can run at once. The output closer
//! owns the original output sender and drops it only after every worker has
//! been joined.

use super::{join_stage, spawn_dedicated};
use crate::error::{PipelineError, Result, Stage};
use crate::logging::TRACE_TARGET;
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Work done by a single mapper worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    /// Input items this worker received and mapped
    pub items: u64,
    /// Pairs this worker delivered to the output channel
    pub pairs: u64,
}

pub(crate) struct MapperPool<K, V> {
    output: mpsc::Receiver<(K, V)>,
    closer: OutputCloser,
}

impl<K, V> MapperPool<K, V>
where
    K: Debug + Send + 'static,
    V: Debug + Send + 'static,
{
    /// Spawn `workers` mappers reading from `input` and the closer supervising them.
    pub(crate) fn start<I, F, R>(workers: usize, trace: bool, input: Receiver<I>, map_fn: F) -> Self
    where
        I: Send + 'static,
        F: Fn(I) -> R + Send + Sync + 'static,
        R: IntoIterator<Item = (K, V)>,
    {
        let workers = workers.max(1);
        let (sender, output) = mpsc::channel(workers);
        let map_fn = Arc::new(map_fn);

        debug!("Spawning {} mapper workers", workers);
        let handles = (0..workers)
            .map(|index| {
                let input = input.clone();
                let output = sender.clone();
                let map_fn = map_fn.clone();
                spawn_dedicated(move || run_worker(index, input, output, &*map_fn, trace))
            })
            .collect();

        Self {
            output,
            closer: OutputCloser::spawn(sender, handles),
        }
    }
}

impl<K, V> MapperPool<K, V> {
    pub(crate) fn into_parts(self) -> (mpsc::Receiver<(K, V)>, OutputCloser) {
        (self.output, self.closer)
    }
}

fn run_worker<I, K, V, F, R>(
    index: usize,
    input: Receiver<I>,
    output: mpsc::Sender<(K, V)>,
    map_fn: &F,
    trace: bool,
) -> WorkerReport
where
    F: Fn(I) -> R,
    R: IntoIterator<Item = (K, V)>,
    K: Debug,
    V: Debug,
{
    let mut report = WorkerReport::default();

    // Ends once the input is closed and drained.
    for item in input.iter() {
        report.items += 1;

        for (key, value) in map_fn(item) {
            if trace {
                info!(target: TRACE_TARGET, worker = index, key = ?key, value = ?value, "emit");
            }
            if output.blocking_send((key, value)).is_err() {
                warn!(
                    "Mapper {} stopped after {} items: output channel has no reader",
                    index, report.items
                );
                return report;
            }
            report.pairs += 1;
        }
    }

    debug!(
        "Mapper {} finished: {} items, {} pairs",
        index, report.items, report.pairs
    );
    report
}

/// Joins the mapper pool, then closes the output channel exactly once.
pub(crate) struct OutputCloser {
    handle: JoinHandle<Result<Vec<WorkerReport>>>,
}

impl OutputCloser {
    fn spawn<T: Send + 'static>(
        sender: mpsc::Sender<T>,
        workers: Vec<JoinHandle<WorkerReport>>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let joined = join_stage(Stage::Mapper, workers).await;
            drop(sender);
            debug!("Output channel closed");
            joined
        });
        Self { handle }
    }

    pub(crate) async fn join(self) -> Result<Vec<WorkerReport>> {
        self.handle
            .await
            .map_err(|err| PipelineError::from_join(Stage::OutputCloser, 0, err))?
    }
}
