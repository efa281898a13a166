//! Watches the destination bridge for the event which proves a message was executed.

use std::{sync::Arc, time::Duration};

use alloy::primitives::B256;
use anyhow::Result;
use tokio::{
    select,
    time::{Instant, sleep},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    client::{BridgeContract, ChainClient, ChainHandles, FinalizationLog},
    message::{Direction, FinalizationEvent, Message},
    metrics::Poll,
    status::{ConfirmationStatus, ExecutionData, Progress},
};

#[derive(Debug, Clone)]
pub struct FinalizationWatcher {
    message_id: B256,
    direction: Direction,
    event: FinalizationEvent,
    bridge: Option<Arc<dyn BridgeContract>>,
    client: Option<Arc<dyn ChainClient>>,
    polling_interval: Duration,
}

impl FinalizationWatcher {
    /// Home to foreign messages finalize on the foreign chain, everything else on the home chain.
    pub fn new(
        message: &Message,
        direction: Direction,
        home: &ChainHandles,
        foreign: &ChainHandles,
    ) -> Self {
        let destination = if direction.is_from_home() {
            foreign
        } else {
            home
        };
        FinalizationWatcher {
            message_id: message.id,
            direction,
            event: direction.finalization_event(),
            bridge: destination.bridge.clone(),
            client: destination.client.clone(),
            polling_interval: destination.polling_interval,
        }
    }

    /// Look for the finalization event once.
    ///
    /// If the chain ever emitted more than one event for the same message, the first in log order is used.
    pub async fn poll(&self) -> Progress<ExecutionData> {
        let start = Instant::now();
        let (progress, error) = self.poll_once().await;
        Poll {
            operation: "finalization_query",
            direction: self.direction,
            outcome: progress.outcome(),
            error,
        }
        .record(start.elapsed());
        progress
    }

    /// Also returns the kind of query that failed, if any.
    async fn poll_once(&self) -> (Progress<ExecutionData>, Option<&'static str>) {
        let (Some(bridge), Some(client)) = (&self.bridge, &self.client) else {
            return (Progress::NotReady, None);
        };

        let events = match bridge
            .finalization_events(self.event, self.message_id)
            .await
        {
            Ok(events) => events,
            Err(e) => {
                warn!(message_id = %self.message_id, event = %self.event, "querying events failed: {e:?}");
                return (Progress::Pending(()), Some("event-query-error"));
            }
        };
        let Some(log) = events.first() else {
            return (Progress::Pending(()), None);
        };
        if events.len() > 1 {
            warn!(
                message_id = %self.message_id,
                event = %self.event,
                count = events.len(),
                "found more than one finalization event, using the first"
            );
        }

        match Self::execution_data(client.as_ref(), log).await {
            Ok(data) => (Progress::Confirmed(data), None),
            Err(e) => {
                warn!(message_id = %self.message_id, tx_hash = %log.tx_hash, "resolving finalization failed: {e:?}");
                (Progress::Pending(()), Some("receipt-query-error"))
            }
        }
    }

    async fn execution_data(client: &dyn ChainClient, log: &FinalizationLog) -> Result<ExecutionData> {
        let (validator, timestamp) = tokio::try_join!(
            client.transaction_sender(log.tx_hash),
            client.block_timestamp(log.block_number)
        )?;

        Ok(ExecutionData {
            status: ConfirmationStatus::Confirmed,
            validator,
            tx_hash: log.tx_hash,
            timestamp,
            execution_result: log.execution_result,
        })
    }

    /// Poll until the event is found, then publish it. Returns straight away if a chain handle is missing.
    pub async fn run(self, cancel: CancellationToken, publish: impl FnOnce(ExecutionData) + Send) {
        loop {
            let progress = select! {
                biased;
                _ = cancel.cancelled() => return,
                progress = self.poll() => progress,
            };

            match progress {
                Progress::NotReady => {
                    debug!(message_id = %self.message_id, "destination chain not ready, not watching for finalization");
                    return;
                }
                Progress::Pending(()) => {
                    debug!(message_id = %self.message_id, event = %self.event, "not finalized yet");
                }
                Progress::Confirmed(data) => {
                    info!(
                        message_id = %self.message_id,
                        tx_hash = %data.tx_hash,
                        validator = %data.validator,
                        execution_result = data.execution_result,
                        "message finalized"
                    );
                    publish(data);
                    return;
                }
            }

            select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = sleep(self.polling_interval) => {}
            }
        }
    }
}
