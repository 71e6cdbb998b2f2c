//! Input feeders
//!
//! Every attached source gets its own forwarding task on Tokio's blocking
//! pool. The bounded input channel is created on the first attachment; it is
//! closed by the input supervisor once the map stage has started and every
//! feeder has finished.

use super::{join_stage, spawn_dedicated};
use crate::error::{PipelineError, Result, Stage};
use crossbeam_channel::{Receiver, Sender};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Items forwarded by a single feeder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeederReport {
    pub items: u64,
}

pub(crate) struct InputFeeder<I> {
    capacity: usize,
    sender: Option<Sender<I>>,
    receiver: Option<Receiver<I>>,
    feeders: Vec<JoinHandle<FeederReport>>,
    closed: bool,
}

impl<I> InputFeeder<I> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            sender: None,
            receiver: None,
            feeders: Vec::new(),
            closed: false,
        }
    }

    pub(crate) fn feeder_count(&self) -> usize {
        self.feeders.len()
    }
}

impl<I: Send + 'static> InputFeeder<I> {
    /// Spawn a task forwarding every element of `source` onto the input channel.
    pub(crate) fn attach<S>(&mut self, source: S) -> Result<()>
    where
        S: Stream<Item = I> + Send + 'static,
    {
        if self.closed {
            return Err(PipelineError::InputClosed);
        }

        let sender = self.channel_sender();
        let index = self.feeders.len();
        debug!("Attaching input feeder {}", index);
        self.feeders
            .push(spawn_dedicated(move || forward(index, source, sender)));
        Ok(())
    }

    /// Hand the receiving half to the mapper pool and start the input supervisor.
    ///
    /// With no feeder attached the channel is created here and closes as soon
    /// as the supervisor runs.
    pub(crate) fn close(&mut self) -> (Receiver<I>, InputSupervisor) {
        self.closed = true;
        let (sender, receiver) = match (self.sender.take(), self.receiver.take()) {
            (Some(sender), Some(receiver)) => (sender, receiver),
            _ => crossbeam_channel::bounded(self.capacity),
        };
        let feeders = std::mem::take(&mut self.feeders);
        (receiver, InputSupervisor::spawn(sender, feeders))
    }

    fn channel_sender(&mut self) -> Sender<I> {
        if let Some(sender) = &self.sender {
            return sender.clone();
        }
        let (sender, receiver) = crossbeam_channel::bounded(self.capacity);
        debug!("Created input channel with capacity {}", self.capacity);
        self.receiver = Some(receiver);
        self.sender = Some(sender.clone());
        sender
    }
}

/// Pull `source` to completion, blocking on the input channel while it is full.
fn forward<I, S>(index: usize, source: S, sender: Sender<I>) -> FeederReport
where
    S: Stream<Item = I>,
{
    // Sources may depend on the runtime's timers and channels.
    let runtime = Handle::current();
    let mut source = Box::pin(source);
    let mut report = FeederReport::default();

    while let Some(item) = runtime.block_on(source.next()) {
        if sender.send(item).is_err() {
            warn!(
                "Feeder {} stopped after {} items: no mapper is receiving input",
                index, report.items
            );
            break;
        }
        report.items += 1;
    }

    debug!("Feeder {} finished after {} items", index, report.items);
    report
}

/// Joins every feeder, then drops the last controller-owned sender.
pub(crate) struct InputSupervisor {
    handle: JoinHandle<Result<Vec<FeederReport>>>,
}

impl InputSupervisor {
    fn spawn<I: Send + 'static>(sender: Sender<I>, feeders: Vec<JoinHandle<FeederReport>>) -> Self {
        let handle = tokio::spawn(async move {
            let count = feeders.len();
            let joined = join_stage(Stage::Feeder, feeders).await;
            drop(sender);
            debug!("Input channel closed after {} feeders finished", count);
            joined
        });
        Self { handle }
    }

    pub(crate) async fn join(self) -> Result<Vec<FeederReport>> {
        self.handle
            .await
            .map_err(|err| PipelineError::from_join(Stage::InputSupervisor, 0, err))?
    }
}
