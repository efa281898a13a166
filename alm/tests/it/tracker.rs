use std::{sync::Arc, time::Duration};

use alloy::primitives::{Address, B256};
use alm::{
    cache::SignatureCache,
    client::ChainHandles,
    message::{Direction, FinalizationEvent},
    status::{Confirmation, ConfirmationStatus, Status},
    tracker::MessageTracker,
};
use tokio::time::sleep;

use crate::{Chain, FOREIGN_INTERVAL, HOME_INTERVAL, message, relayer, validators};

fn confirmation(validator: Address, status: ConfirmationStatus) -> Confirmation {
    Confirmation { validator, status }
}

#[tokio::test(start_paused = true)]
async fn home_to_foreign_message_is_tracked_to_success() {
    let home = Chain::new(HOME_INTERVAL);
    let foreign = Chain::new(FOREIGN_INTERVAL);
    let [a, b, c] = validators();
    home.bridge.sign(a, message().hash());
    home.bridge.sign(b, message().hash());

    let tracker = MessageTracker::spawn(
        message(),
        Some(B256::repeat_byte(0x01)),
        Direction::HomeToForeign,
        &home.home_handles(&validators(), 2),
        &foreign.handles(),
        Arc::new(SignatureCache::new()),
    );

    let mut receiver = tracker.subscribe();
    receiver
        .wait_for(|snapshot| snapshot.signature_collected)
        .await
        .unwrap();
    assert_eq!(
        tracker.confirmations(),
        vec![
            confirmation(a, ConfirmationStatus::Confirmed),
            confirmation(b, ConfirmationStatus::Confirmed),
            confirmation(c, ConfirmationStatus::NotRequired),
        ]
    );
    assert_eq!(tracker.status(), Status::Undefined);

    let tx_hash = B256::repeat_byte(0x22);
    foreign.finalize(FinalizationEvent::RelayedMessage, &message(), tx_hash, 100, true);
    assert_eq!(tracker.wait_for_final_status().await, Status::Success);

    let execution = tracker.execution_data();
    assert_eq!(execution.status, ConfirmationStatus::Confirmed);
    assert_eq!(execution.validator, relayer());
    assert_eq!(execution.tx_hash, tx_hash);
    assert_eq!(execution.timestamp, 1_700_000_100);
    assert!(execution.execution_result);

    tracker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_execution_is_final() {
    let home = Chain::new(HOME_INTERVAL);
    let foreign = Chain::new(FOREIGN_INTERVAL);
    for validator in validators() {
        home.bridge.sign(validator, message().hash());
    }
    foreign.finalize(
        FinalizationEvent::RelayedMessage,
        &message(),
        B256::repeat_byte(0x33),
        7,
        false,
    );

    let tracker = MessageTracker::spawn(
        message(),
        None,
        Direction::HomeToForeign,
        &home.home_handles(&validators(), 2),
        &foreign.handles(),
        Arc::new(SignatureCache::new()),
    );
    assert_eq!(
        tracker.wait_for_final_status().await,
        Status::SuccessMessageFailed
    );

    // Later events for the same message change nothing; the watcher has stopped.
    let queries = foreign.bridge.event_queries();
    foreign.finalize(
        FinalizationEvent::RelayedMessage,
        &message(),
        B256::repeat_byte(0x44),
        8,
        true,
    );
    sleep(FOREIGN_INTERVAL * 5).await;
    assert_eq!(foreign.bridge.event_queries(), queries);
    assert_eq!(tracker.status(), Status::SuccessMessageFailed);
    assert_eq!(tracker.execution_data().tx_hash, B256::repeat_byte(0x33));

    tracker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn foreign_to_home_message_uses_affirmations() {
    let home = Chain::new(HOME_INTERVAL);
    let foreign = Chain::new(FOREIGN_INTERVAL);
    let [a, b, c] = validators();
    // Signatures of the wrong kind do not count.
    home.bridge.sign(a, message().hash());
    home.bridge.affirm(b, message().hash());
    home.bridge.affirm(c, message().hash());

    let tracker = MessageTracker::spawn(
        message(),
        None,
        Direction::ForeignToHome,
        &home.home_handles(&validators(), 2),
        &foreign.handles(),
        Arc::new(SignatureCache::new()),
    );
    tracker
        .subscribe()
        .wait_for(|snapshot| snapshot.signature_collected)
        .await
        .unwrap();
    assert_eq!(
        tracker.confirmations(),
        vec![
            confirmation(b, ConfirmationStatus::Confirmed),
            confirmation(c, ConfirmationStatus::Confirmed),
            confirmation(a, ConfirmationStatus::NotRequired),
        ]
    );

    home.finalize(
        FinalizationEvent::AffirmationCompleted,
        &message(),
        B256::repeat_byte(0x55),
        12,
        true,
    );
    assert_eq!(tracker.wait_for_final_status().await, Status::Success);
    assert_eq!(foreign.bridge.event_queries(), 0);

    tracker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn pending_signatures_are_published_in_validator_order() {
    let home = Chain::new(HOME_INTERVAL);
    let foreign = Chain::new(FOREIGN_INTERVAL);
    let [a, b, c] = validators();
    home.bridge.sign(b, message().hash());

    let tracker = MessageTracker::spawn(
        message(),
        None,
        Direction::HomeToForeign,
        &home.home_handles(&validators(), 2),
        &foreign.handles(),
        Arc::new(SignatureCache::new()),
    );
    tracker
        .subscribe()
        .wait_for(|snapshot| !snapshot.confirmations.is_empty())
        .await
        .unwrap();

    assert_eq!(
        tracker.confirmations(),
        vec![
            confirmation(a, ConfirmationStatus::Pending),
            confirmation(b, ConfirmationStatus::Confirmed),
            confirmation(c, ConfirmationStatus::Pending),
        ]
    );
    assert!(!tracker.signature_collected());

    home.bridge.sign(c, message().hash());
    tracker
        .subscribe()
        .wait_for(|snapshot| snapshot.signature_collected)
        .await
        .unwrap();
    assert_eq!(
        tracker.confirmations(),
        vec![
            confirmation(b, ConfirmationStatus::Confirmed),
            confirmation(c, ConfirmationStatus::Confirmed),
            confirmation(a, ConfirmationStatus::NotRequired),
        ]
    );

    tracker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn finalization_before_signatures_stays_final() {
    let home = Chain::new(HOME_INTERVAL);
    let foreign = Chain::new(FOREIGN_INTERVAL);
    foreign.finalize(
        FinalizationEvent::RelayedMessage,
        &message(),
        B256::repeat_byte(0x66),
        3,
        true,
    );

    let tracker = MessageTracker::spawn(
        message(),
        None,
        Direction::HomeToForeign,
        &home.home_handles(&validators(), 2),
        &foreign.handles(),
        Arc::new(SignatureCache::new()),
    );
    let mut receiver = tracker.subscribe();
    assert_eq!(tracker.wait_for_final_status().await, Status::Success);
    assert!(!tracker.signature_collected());

    for validator in validators() {
        home.bridge.sign(validator, message().hash());
    }
    receiver
        .wait_for(|snapshot| snapshot.signature_collected)
        .await
        .unwrap();
    assert_eq!(tracker.status(), Status::Success);

    tracker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn signature_cache_is_shared_between_trackers() {
    let home = Chain::new(HOME_INTERVAL);
    let foreign = Chain::new(FOREIGN_INTERVAL);
    for validator in validators() {
        home.bridge.sign(validator, message().hash());
    }
    let cache = Arc::new(SignatureCache::new());
    let home_handles = home.home_handles(&validators(), 3);

    let first = MessageTracker::spawn(
        message(),
        None,
        Direction::HomeToForeign,
        &home_handles,
        &foreign.handles(),
        cache.clone(),
    );
    first
        .subscribe()
        .wait_for(|snapshot| snapshot.signature_collected)
        .await
        .unwrap();
    first.shutdown().await;
    assert_eq!(cache.len(), 3);
    let queries = home.bridge.signature_queries();

    // Every answer now comes from the cache, even though the bridge has stopped answering.
    home.bridge.set_failing(true);
    let second = MessageTracker::spawn(
        message(),
        None,
        Direction::HomeToForeign,
        &home_handles,
        &foreign.handles(),
        cache,
    );
    second
        .subscribe()
        .wait_for(|snapshot| snapshot.signature_collected)
        .await
        .unwrap();
    assert_eq!(home.bridge.signature_queries(), queries);
    assert!(
        second
            .confirmations()
            .iter()
            .all(|c| c.status == ConfirmationStatus::Confirmed)
    );

    second.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unavailable_chains_resume_after_update() {
    let home = Chain::new(HOME_INTERVAL);
    let foreign = Chain::new(FOREIGN_INTERVAL);
    for validator in validators() {
        home.bridge.sign(validator, message().hash());
    }
    foreign.finalize(
        FinalizationEvent::RelayedMessage,
        &message(),
        B256::repeat_byte(0x77),
        5,
        true,
    );

    let mut tracker = MessageTracker::spawn(
        message(),
        None,
        Direction::HomeToForeign,
        &ChainHandles::new(HOME_INTERVAL),
        &ChainHandles::new(FOREIGN_INTERVAL),
        Arc::new(SignatureCache::new()),
    );
    sleep(Duration::from_secs(60)).await;
    assert_eq!(home.bridge.signature_queries(), 0);
    assert_eq!(foreign.bridge.event_queries(), 0);
    assert_eq!(tracker.status(), Status::Undefined);
    assert!(tracker.confirmations().is_empty());

    tracker.update_chains(&home.home_handles(&validators(), 2), &foreign.handles());
    assert_eq!(tracker.wait_for_final_status().await, Status::Success);
    tracker
        .subscribe()
        .wait_for(|snapshot| snapshot.signature_collected)
        .await
        .unwrap();

    tracker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn converged_facets_are_not_restarted() {
    let home = Chain::new(HOME_INTERVAL);
    let foreign = Chain::new(FOREIGN_INTERVAL);
    for validator in validators() {
        home.bridge.sign(validator, message().hash());
    }

    let mut tracker = MessageTracker::spawn(
        message(),
        None,
        Direction::HomeToForeign,
        &home.home_handles(&validators(), 2),
        &foreign.handles(),
        Arc::new(SignatureCache::new()),
    );
    tracker
        .subscribe()
        .wait_for(|snapshot| snapshot.signature_collected)
        .await
        .unwrap();
    let signature_queries = home.bridge.signature_queries();
    let confirmations = tracker.confirmations();

    tracker.update_chains(&home.home_handles(&validators(), 2), &foreign.handles());
    sleep(HOME_INTERVAL * 4).await;

    assert_eq!(home.bridge.signature_queries(), signature_queries);
    assert_eq!(tracker.confirmations(), confirmations);
    // The finalization watcher was restarted and keeps polling.
    assert!(foreign.bridge.event_queries() > 1);

    tracker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_polling() {
    let home = Chain::new(HOME_INTERVAL);
    let foreign = Chain::new(FOREIGN_INTERVAL);

    let tracker = MessageTracker::spawn(
        message(),
        None,
        Direction::HomeToForeign,
        &home.home_handles(&validators(), 2),
        &foreign.handles(),
        Arc::new(SignatureCache::new()),
    );
    sleep(HOME_INTERVAL * 3).await;
    assert!(home.bridge.signature_queries() > 0);
    assert!(foreign.bridge.event_queries() > 0);

    tracker.shutdown().await;
    let signature_queries = home.bridge.signature_queries();
    let event_queries = foreign.bridge.event_queries();

    sleep(Duration::from_secs(120)).await;
    assert_eq!(home.bridge.signature_queries(), signature_queries);
    assert_eq!(foreign.bridge.event_queries(), event_queries);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_tracker_stops_polling() {
    let home = Chain::new(HOME_INTERVAL);
    let foreign = Chain::new(FOREIGN_INTERVAL);

    let tracker = MessageTracker::spawn(
        message(),
        None,
        Direction::HomeToForeign,
        &home.home_handles(&validators(), 2),
        &foreign.handles(),
        Arc::new(SignatureCache::new()),
    );
    sleep(HOME_INTERVAL).await;
    drop(tracker);
    // Let the cancelled tasks observe the token.
    sleep(Duration::from_millis(1)).await;
    let signature_queries = home.bridge.signature_queries();

    sleep(Duration::from_secs(120)).await;
    assert_eq!(home.bridge.signature_queries(), signature_queries);
}
