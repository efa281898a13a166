//! Polls the home bridge for each validator's signature of a message until enough of them have signed.

use std::{sync::Arc, time::Duration};

use alloy::primitives::{Address, B256};
use futures::future::join_all;
use tokio::{
    select,
    time::{Instant, sleep},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    cache::SignatureCache,
    client::{BridgeContract, ChainClient, ChainHandles},
    message::{Direction, Message, SignatureCheck, validator_message_hash},
    metrics::Poll,
    status::{Confirmation, ConfirmationStatus, Progress},
};

#[derive(Debug, Clone)]
pub struct SignatureAggregator {
    message_id: B256,
    message_hash: B256,
    direction: Direction,
    check: SignatureCheck,
    bridge: Option<Arc<dyn BridgeContract>>,
    client: Option<Arc<dyn ChainClient>>,
    validators: Option<Vec<Address>>,
    required_signatures: usize,
    polling_interval: Duration,
    cache: Arc<SignatureCache>,
}

impl SignatureAggregator {
    /// Signatures are always collected on the home chain, whichever way the message travels.
    pub fn new(
        message: &Message,
        direction: Direction,
        home: &ChainHandles,
        cache: Arc<SignatureCache>,
    ) -> Self {
        SignatureAggregator {
            message_id: message.id,
            message_hash: message.hash(),
            direction,
            check: direction.signature_check(),
            bridge: home.bridge.clone(),
            client: home.client.clone(),
            validators: home.validators.clone(),
            required_signatures: home.required_signatures,
            polling_interval: home.polling_interval,
            cache,
        }
    }

    /// The flag is set if the bridge could not be queried.
    async fn check_validator(&self, bridge: &dyn BridgeContract, validator: Address) -> (Confirmation, bool) {
        let hash = validator_message_hash(validator, self.message_hash);
        if self.cache.is_confirmed(&hash) {
            let confirmation = Confirmation {
                validator,
                status: ConfirmationStatus::Confirmed,
            };
            return (confirmation, false);
        }

        let (status, failed) = match bridge.is_signed(self.check, hash).await {
            Ok(true) => {
                self.cache.confirm(hash);
                (ConfirmationStatus::Confirmed, false)
            }
            Ok(false) => (ConfirmationStatus::Pending, false),
            Err(e) => {
                warn!(%validator, message_id = %self.message_id, "signature check failed: {e:?}");
                (ConfirmationStatus::Pending, true)
            }
        };
        (Confirmation { validator, status }, failed)
    }

    /// Check every validator once. Validators are queried concurrently and the cache is consulted before each query.
    ///
    /// Once enough validators have signed the confirmed ones are listed first, followed by everyone else marked as
    /// [ConfirmationStatus::NotRequired].
    pub async fn sweep(&self) -> Progress<Vec<Confirmation>, Vec<Confirmation>> {
        let start = Instant::now();
        let (progress, failed) = self.check_all().await;
        Poll {
            operation: "signature_sweep",
            direction: self.direction,
            outcome: progress.outcome(),
            error: (failed > 0).then_some("query-error"),
        }
        .record(start.elapsed());
        progress
    }

    /// Also returns how many bridge queries failed.
    async fn check_all(&self) -> (Progress<Vec<Confirmation>, Vec<Confirmation>>, usize) {
        let (Some(bridge), Some(_), Some(validators)) = (&self.bridge, &self.client, &self.validators)
        else {
            return (Progress::NotReady, 0);
        };

        let (confirmations, failures): (Vec<_>, Vec<_>) = join_all(
            validators
                .iter()
                .map(|validator| self.check_validator(bridge.as_ref(), *validator)),
        )
        .await
        .into_iter()
        .unzip();
        let failed = failures.into_iter().filter(|failed| *failed).count();

        let confirmed = confirmations
            .iter()
            .filter(|c| c.status == ConfirmationStatus::Confirmed)
            .count();
        debug!(
            message_id = %self.message_id,
            confirmed,
            required = self.required_signatures,
            failed,
            "signature sweep"
        );
        if confirmed < self.required_signatures {
            return (Progress::Pending(confirmations), failed);
        }

        let (mut confirmed, outstanding): (Vec<_>, Vec<_>) = confirmations
            .into_iter()
            .partition(|c| c.status == ConfirmationStatus::Confirmed);
        confirmed.extend(outstanding.into_iter().map(|c| Confirmation {
            validator: c.validator,
            status: ConfirmationStatus::NotRequired,
        }));
        (Progress::Confirmed(confirmed), failed)
    }

    /// Sweep until enough signatures are collected, publishing the confirmation list after every sweep along with
    /// whether the signatures are complete. Returns straight away if a chain handle is missing; the caller restarts
    /// it once new handles are available.
    pub async fn run(self, cancel: CancellationToken, publish: impl Fn(Vec<Confirmation>, bool) + Send) {
        loop {
            let progress = select! {
                biased;
                _ = cancel.cancelled() => return,
                progress = self.sweep() => progress,
            };

            match progress {
                Progress::NotReady => {
                    debug!(message_id = %self.message_id, "home chain not ready, not collecting signatures");
                    return;
                }
                Progress::Pending(confirmations) => publish(confirmations, false),
                Progress::Confirmed(confirmations) => {
                    info!(
                        message_id = %self.message_id,
                        required = self.required_signatures,
                        "signatures collected"
                    );
                    publish(confirmations, true);
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
