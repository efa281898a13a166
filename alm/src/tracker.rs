//! Tracks a single message from signing to execution.

use std::sync::Arc;

use alloy::primitives::B256;
use serde::Serialize;
use tokio::{sync::watch, task::JoinSet, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span};

use crate::{
    cache::SignatureCache,
    client::ChainHandles,
    finalization::FinalizationWatcher,
    message::{Direction, Message},
    metrics,
    signatures::SignatureAggregator,
    status::{Confirmation, ExecutionData, Status, reduce},
};

/// Everything known about a message at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackerSnapshot {
    pub confirmations: Vec<Confirmation>,
    pub status: Status,
    pub signature_collected: bool,
    pub execution_data: ExecutionData,
}

impl TrackerSnapshot {
    /// Returns `false` if the update was ignored because the confirmation list is already frozen.
    fn apply_confirmations(&mut self, confirmations: Vec<Confirmation>, collected: bool) -> bool {
        if self.signature_collected {
            return false;
        }
        self.confirmations = confirmations;
        self.signature_collected = collected;
        self.status = reduce(&self.execution_data, self.signature_collected);
        true
    }

    /// Returns `false` if execution data was already recorded.
    fn apply_execution(&mut self, execution_data: ExecutionData) -> bool {
        if self.execution_data.is_finalized() {
            return false;
        }
        self.execution_data = execution_data;
        self.status = reduce(&self.execution_data, self.signature_collected);
        true
    }
}

/// A handle to the background tasks tracking one message. The tasks are cancelled when the handle is dropped or shut
/// down.
///
/// Must be created from within a tokio runtime.
#[derive(Debug)]
pub struct MessageTracker {
    message: Message,
    direction: Direction,
    receipt: Option<B256>,
    started: Instant,
    cache: Arc<SignatureCache>,
    state: Arc<watch::Sender<TrackerSnapshot>>,
    cancel: CancellationToken,
    /// Cancels the facets started by the most recent call to [MessageTracker::update_chains].
    generation: CancellationToken,
    tasks: JoinSet<()>,
}

impl MessageTracker {
    /// Start tracking `message`. `receipt` is the hash of the transaction which sent it, if known.
    pub fn spawn(
        message: Message,
        receipt: Option<B256>,
        direction: Direction,
        home: &ChainHandles,
        foreign: &ChainHandles,
        cache: Arc<SignatureCache>,
    ) -> Self {
        let (state, _) = watch::channel(TrackerSnapshot::default());
        let cancel = CancellationToken::new();
        let mut tracker = MessageTracker {
            message,
            direction,
            receipt,
            started: Instant::now(),
            cache,
            state: Arc::new(state),
            generation: cancel.child_token(),
            cancel,
            tasks: JoinSet::new(),
        };
        tracker.start(home, foreign);
        tracker
    }

    /// Restart tracking with new chain handles, for example once a chain which was unavailable has connected. Facets
    /// which have already converged are not restarted, and results from the previous handles still in flight are
    /// discarded.
    pub fn update_chains(&mut self, home: &ChainHandles, foreign: &ChainHandles) {
        self.generation.cancel();
        self.generation = self.cancel.child_token();
        while self.tasks.try_join_next().is_some() {}
        self.start(home, foreign);
    }

    fn start(&mut self, home: &ChainHandles, foreign: &ChainHandles) {
        let snapshot = self.snapshot();
        let span = info_span!(
            "message",
            message_id = %self.message.id,
            direction = ?self.direction,
            receipt = ?self.receipt,
        );

        if snapshot.signature_collected {
            debug!(message_id = %self.message.id, "signatures already collected");
        } else {
            let aggregator =
                SignatureAggregator::new(&self.message, self.direction, home, self.cache.clone());
            let state = self.state.clone();
            let generation = self.generation.clone();
            let cancel = self.generation.clone();
            self.tasks.spawn(
                async move {
                    aggregator
                        .run(cancel, move |confirmations, collected| {
                            state.send_if_modified(|snapshot| {
                                !generation.is_cancelled()
                                    && snapshot.apply_confirmations(confirmations, collected)
                            });
                        })
                        .await
                }
                .instrument(span.clone()),
            );
        }

        if snapshot.execution_data.is_finalized() {
            debug!(message_id = %self.message.id, "already finalized");
        } else {
            let watcher = FinalizationWatcher::new(&self.message, self.direction, home, foreign);
            let (direction, started) = (self.direction, self.started);
            let state = self.state.clone();
            let generation = self.generation.clone();
            let cancel = self.generation.clone();
            self.tasks.spawn(
                async move {
                    watcher
                        .run(cancel, move |execution_data| {
                            state.send_if_modified(|snapshot| {
                                if generation.is_cancelled() || !snapshot.apply_execution(execution_data) {
                                    return false;
                                }
                                metrics::record_final_status(direction, snapshot.status, started.elapsed());
                                true
                            });
                        })
                        .await
                }
                .instrument(span),
            );
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Observe every change to the message's state.
    pub fn subscribe(&self) -> watch::Receiver<TrackerSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        self.state.borrow().clone()
    }

    pub fn confirmations(&self) -> Vec<Confirmation> {
        self.state.borrow().confirmations.clone()
    }

    pub fn status(&self) -> Status {
        self.state.borrow().status
    }

    pub fn signature_collected(&self) -> bool {
        self.state.borrow().signature_collected
    }

    pub fn execution_data(&self) -> ExecutionData {
        self.state.borrow().execution_data
    }

    /// Wait until the message has been executed. Never returns for a message which is never finalized.
    pub async fn wait_for_final_status(&self) -> Status {
        let mut receiver = self.subscribe();
        match receiver.wait_for(|snapshot| snapshot.status.is_final()).await {
            Ok(snapshot) => snapshot.status,
            // The sender lives as long as `self`, so this cannot happen.
            Err(_) => self.status(),
        }
    }

    /// Cancel all polling and wait for the background tasks to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        while self.tasks.join_next().await.is_some() {}
    }
}

impl Drop for MessageTracker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
