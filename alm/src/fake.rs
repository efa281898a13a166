//! In-memory stand-ins for a bridge contract and a chain client. Tests script the chain state through them and read
//! back how often they were queried.

use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use alloy::{
    primitives::{Address, B256},
    rpc::types::Log,
};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    client::{BridgeContract, ChainClient, FinalizationLog, ValidatorSet},
    error::ChainError,
    message::{FinalizationEvent, SignatureCheck, validator_message_hash},
};

#[derive(Debug, Default)]
pub struct FakeBridge {
    address: Address,
    signed: Mutex<HashSet<(SignatureCheck, B256)>>,
    events: Mutex<HashMap<(FinalizationEvent, B256), Vec<FinalizationLog>>>,
    validator_set: Mutex<Option<ValidatorSet>>,
    failing: AtomicBool,
    signature_queries: AtomicUsize,
    event_queries: AtomicUsize,
}

impl FakeBridge {
    pub fn new(address: Address) -> Self {
        FakeBridge {
            address,
            ..Default::default()
        }
    }

    /// Record `validator`'s signature of a home to foreign message.
    pub fn sign(&self, validator: Address, message_hash: B256) {
        self.signed.lock().insert((
            SignatureCheck::MessagesSigned,
            validator_message_hash(validator, message_hash),
        ));
    }

    /// Record `validator`'s affirmation of a foreign to home message.
    pub fn affirm(&self, validator: Address, message_hash: B256) {
        self.signed.lock().insert((
            SignatureCheck::AffirmationsSigned,
            validator_message_hash(validator, message_hash),
        ));
    }

    pub fn emit(&self, event: FinalizationEvent, message_id: B256, log: FinalizationLog) {
        self.events
            .lock()
            .entry((event, message_id))
            .or_default()
            .push(log);
    }

    pub fn set_validator_set(&self, set: ValidatorSet) {
        *self.validator_set.lock() = Some(set);
    }

    /// Make every query fail until reset. Queries are still counted.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn signature_queries(&self) -> usize {
        self.signature_queries.load(Ordering::SeqCst)
    }

    pub fn event_queries(&self) -> usize {
        self.event_queries.load(Ordering::SeqCst)
    }

    fn check_failing(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("fake bridge configured to fail"));
        }
        Ok(())
    }
}

#[async_trait]
impl BridgeContract for FakeBridge {
    fn address(&self) -> Address {
        self.address
    }

    async fn is_signed(&self, check: SignatureCheck, hash: B256) -> Result<bool> {
        self.signature_queries.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        Ok(self.signed.lock().contains(&(check, hash)))
    }

    async fn finalization_events(
        &self,
        event: FinalizationEvent,
        message_id: B256,
    ) -> Result<Vec<FinalizationLog>> {
        self.event_queries.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        Ok(self
            .events
            .lock()
            .get(&(event, message_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn validator_set(&self) -> Result<ValidatorSet> {
        self.check_failing()?;
        self.validator_set
            .lock()
            .clone()
            .ok_or_else(|| anyhow!("no validator set configured"))
    }
}

#[derive(Debug, Default)]
pub struct FakeChainClient {
    senders: Mutex<HashMap<B256, Address>>,
    logs: Mutex<HashMap<B256, Vec<Log>>>,
    timestamps: Mutex<HashMap<u64, u64>>,
    receipt_queries: AtomicUsize,
    block_queries: AtomicUsize,
}

impl FakeChainClient {
    pub fn set_sender(&self, tx_hash: B256, sender: Address) {
        self.senders.lock().insert(tx_hash, sender);
    }

    pub fn set_logs(&self, tx_hash: B256, logs: Vec<Log>) {
        self.logs.lock().insert(tx_hash, logs);
    }

    pub fn set_block_timestamp(&self, block_number: u64, timestamp: u64) {
        self.timestamps.lock().insert(block_number, timestamp);
    }

    pub fn receipt_queries(&self) -> usize {
        self.receipt_queries.load(Ordering::SeqCst)
    }

    pub fn block_queries(&self) -> usize {
        self.block_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for FakeChainClient {
    async fn transaction_sender(&self, tx_hash: B256) -> Result<Address> {
        self.receipt_queries.fetch_add(1, Ordering::SeqCst);
        Ok(*self
            .senders
            .lock()
            .get(&tx_hash)
            .ok_or(ChainError::ReceiptNotFound(tx_hash))?)
    }

    async fn transaction_logs(&self, tx_hash: B256) -> Result<Vec<Log>> {
        self.receipt_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .logs
            .lock()
            .get(&tx_hash)
            .ok_or(ChainError::ReceiptNotFound(tx_hash))?
            .clone())
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64> {
        self.block_queries.fetch_add(1, Ordering::SeqCst);
        Ok(*self
            .timestamps
            .lock()
            .get(&block_number)
            .ok_or(ChainError::BlockNotFound(block_number))?)
    }
}
