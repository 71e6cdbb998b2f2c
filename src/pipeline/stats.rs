//! Per-run accounting
//!
//! Every stage counts what it handled in task-local state and hands the
//! counts back through its join handle.

use super::feeder::FeederReport;
use super::mapper::WorkerReport;
use serde::{Deserialize, Serialize};

/// Counters collected over one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Size of the mapper pool
    pub workers: usize,
    /// Number of attached feeders
    pub feeders: usize,
    /// Items forwarded onto the input channel
    pub items_fed: u64,
    /// Items received and mapped by the pool
    pub items_mapped: u64,
    /// Pairs sent onto the output channel
    pub pairs_emitted: u64,
    /// Pairs folded by the reducer
    pub pairs_reduced: u64,
    /// Distinct keys in the result mapping
    pub keys: usize,
    /// Items mapped by each worker, indexed by worker
    pub items_per_worker: Vec<u64>,
}

impl PipelineStats {
    pub(crate) fn collect(
        feeders: &[FeederReport],
        workers: &[WorkerReport],
        pairs_reduced: u64,
        keys: usize,
    ) -> Self {
        Self {
            workers: workers.len(),
            feeders: feeders.len(),
            items_fed: feeders.iter().map(|f| f.items).sum(),
            items_mapped: workers.iter().map(|w| w.items).sum(),
            pairs_emitted: workers.iter().map(|w| w.pairs).sum(),
            pairs_reduced,
            keys,
            items_per_worker: workers.iter().map(|w| w.items).collect(),
        }
    }

    /// True when nothing was dropped or duplicated between stages.
    pub fn is_lossless(&self) -> bool {
        self.items_fed == self.items_mapped && self.pairs_emitted == self.pairs_reduced
    }
}
