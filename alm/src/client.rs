use std::{fmt::Debug, sync::Arc, time::Duration};

use alloy::{
    eips::BlockNumberOrTag,
    primitives::{Address, B256, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{Filter, Log},
    sol_types::SolEvent,
};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    cfg::ChainConfig,
    contracts::{IAMB, IBridgeValidators},
    error::ChainError,
    message::{Direction, FinalizationEvent, Message, SignatureCheck, messages_from_logs},
};

/// A finalization event as it appears in the destination bridge's log.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FinalizationLog {
    pub tx_hash: B256,
    pub block_number: u64,
    /// Whether the call carried by the message succeeded.
    pub execution_result: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorSet {
    pub validators: Vec<Address>,
    pub required_signatures: usize,
}

impl ValidatorSet {
    /// A quorum of zero, or one larger than the set, could never be reached meaningfully.
    pub fn validate(self) -> Result<Self, ChainError> {
        if self.required_signatures == 0 || self.required_signatures > self.validators.len() {
            return Err(ChainError::InvalidValidatorSet {
                required: U256::from(self.required_signatures),
                validators: self.validators.len(),
            });
        }
        Ok(self)
    }
}

/// The bridge contract deployed on one chain.
#[async_trait]
pub trait BridgeContract: Debug + Send + Sync {
    fn address(&self) -> Address;

    /// Whether the signature stored under `hash` has been submitted. Only the home bridge answers this.
    async fn is_signed(&self, check: SignatureCheck, hash: B256) -> Result<bool>;

    /// Every `event` emitted for `message_id`, from genesis to the latest block, in log order.
    async fn finalization_events(
        &self,
        event: FinalizationEvent,
        message_id: B256,
    ) -> Result<Vec<FinalizationLog>>;

    async fn validator_set(&self) -> Result<ValidatorSet>;
}

/// Read access to one chain.
#[async_trait]
pub trait ChainClient: Debug + Send + Sync {
    /// The account which sent `tx_hash`, taken from its receipt.
    async fn transaction_sender(&self, tx_hash: B256) -> Result<Address>;

    /// The logs in the receipt of `tx_hash`.
    async fn transaction_logs(&self, tx_hash: B256) -> Result<Vec<Log>>;

    /// Block timestamp in seconds since the unix epoch.
    async fn block_timestamp(&self, block_number: u64) -> Result<u64>;
}

/// Everything the tracker needs from one chain. Any missing handle means the chain is not ready yet; the facets
/// depending on it stay idle until the caller supplies new handles.
#[derive(Debug, Clone)]
pub struct ChainHandles {
    pub client: Option<Arc<dyn ChainClient>>,
    pub bridge: Option<Arc<dyn BridgeContract>>,
    pub validators: Option<Vec<Address>>,
    pub required_signatures: usize,
    pub polling_interval: Duration,
}

impl ChainHandles {
    pub fn new(polling_interval: Duration) -> Self {
        ChainHandles {
            client: None,
            bridge: None,
            validators: None,
            required_signatures: 0,
            polling_interval,
        }
    }

    pub fn with_client(mut self, client: Arc<dyn ChainClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_bridge(mut self, bridge: Arc<dyn BridgeContract>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn with_validator_set(mut self, set: ValidatorSet) -> Self {
        self.validators = Some(set.validators);
        self.required_signatures = set.required_signatures;
        self
    }
}

/// The validator set to track signatures against. Values pinned in `config` win; anything missing is read from the
/// bridge's validator contract. The merged set is checked before it is returned.
pub async fn resolve_validator_set(
    config: &ChainConfig,
    bridge: &dyn BridgeContract,
) -> Result<ValidatorSet> {
    if let (Some(validators), Some(required_signatures)) =
        (&config.validators, config.required_signatures)
    {
        return Ok(ValidatorSet {
            validators: validators.clone(),
            required_signatures,
        }
        .validate()?);
    }

    debug!(chain = %config.name, "reading validator set from the bridge");
    let mut set = bridge.validator_set().await?;
    if let Some(validators) = &config.validators {
        set.validators = validators.clone();
    }
    if let Some(required_signatures) = config.required_signatures {
        set.required_signatures = required_signatures;
    }
    Ok(set.validate()?)
}

/// The messages `tx_hash` sent through `bridge`, in log order. A transaction which sent none is an error.
pub async fn messages_from_transaction(
    client: &dyn ChainClient,
    bridge: &dyn BridgeContract,
    tx_hash: B256,
    direction: Direction,
) -> Result<Vec<Message>> {
    let logs = client.transaction_logs(tx_hash).await?;
    let messages = messages_from_logs(&logs, bridge.address(), direction);
    if messages.is_empty() {
        return Err(anyhow!(
            "transaction {tx_hash} did not send any messages through bridge {}",
            bridge.address()
        ));
    }
    Ok(messages)
}

/// Every `event` the bridge at `bridge_address` emitted for `message_id`, from genesis to the latest block.
fn finalization_filter(bridge_address: Address, event: FinalizationEvent, message_id: B256) -> Filter {
    let signature = match event {
        FinalizationEvent::RelayedMessage => IAMB::RelayedMessage::SIGNATURE_HASH,
        FinalizationEvent::AffirmationCompleted => IAMB::AffirmationCompleted::SIGNATURE_HASH,
    };
    // `messageId` is the third indexed topic of both events.
    Filter::new()
        .address(bridge_address)
        .event_signature(signature)
        .topic3(message_id)
        .from_block(BlockNumberOrTag::Number(0))
        .to_block(BlockNumberOrTag::Latest)
}

/// A JSON-RPC connection to one chain and the bridge deployed on it.
#[derive(Debug, Clone)]
pub struct RpcChain {
    pub name: String,
    pub chain_id: u64,
    provider: DynProvider,
    bridge_address: Address,
}

impl RpcChain {
    pub async fn connect(config: &ChainConfig) -> Result<Self> {
        let provider = ProviderBuilder::new()
            .connect(&config.rpc_url)
            .await?
            .erased();
        let chain_id = provider.get_chain_id().await?;
        info!(
            "Connected to {} (chain id {chain_id}) at {}",
            config.name, config.rpc_url
        );

        Ok(RpcChain {
            name: config.name.clone(),
            chain_id,
            provider,
            bridge_address: config.bridge_address,
        })
    }

    pub fn from_provider(
        name: String,
        chain_id: u64,
        provider: DynProvider,
        bridge_address: Address,
    ) -> Self {
        RpcChain {
            name,
            chain_id,
            provider,
            bridge_address,
        }
    }

    fn bridge(&self) -> IAMB::IAMBInstance<DynProvider> {
        IAMB::new(self.bridge_address, self.provider.clone())
    }
}

#[async_trait]
impl BridgeContract for RpcChain {
    fn address(&self) -> Address {
        self.bridge_address
    }

    async fn is_signed(&self, check: SignatureCheck, hash: B256) -> Result<bool> {
        let bridge = self.bridge();
        let signed = match check {
            SignatureCheck::MessagesSigned => bridge.messagesSigned(hash).call().await?,
            SignatureCheck::AffirmationsSigned => bridge.affirmationsSigned(hash).call().await?,
        };
        Ok(signed)
    }

    async fn finalization_events(
        &self,
        event: FinalizationEvent,
        message_id: B256,
    ) -> Result<Vec<FinalizationLog>> {
        let filter = finalization_filter(self.bridge_address, event, message_id);
        let logs = self.provider.get_logs(&filter).await?;
        debug!(chain = %self.name, %event, %message_id, count = logs.len(), "queried finalization events");

        logs.iter()
            .map(|log| {
                let execution_result = match event {
                    FinalizationEvent::RelayedMessage => {
                        log.log_decode::<IAMB::RelayedMessage>()?.inner.data.status
                    }
                    FinalizationEvent::AffirmationCompleted => {
                        log.log_decode::<IAMB::AffirmationCompleted>()?
                            .inner
                            .data
                            .status
                    }
                };
                Ok::<_, anyhow::Error>(FinalizationLog {
                    tx_hash: log
                        .transaction_hash
                        .ok_or(ChainError::MissingLogField("transaction hash"))?,
                    block_number: log
                        .block_number
                        .ok_or(ChainError::MissingLogField("block number"))?,
                    execution_result,
                })
            })
            .collect()
    }

    async fn validator_set(&self) -> Result<ValidatorSet> {
        let validator_contract = self.bridge().validatorContract().call().await?;
        let contract = IBridgeValidators::new(validator_contract, self.provider.clone());
        let validators = contract.validatorList().call().await?;
        let required = contract.requiredSignatures().call().await?;

        if required > U256::from(validators.len()) {
            return Err(ChainError::InvalidValidatorSet {
                required,
                validators: validators.len(),
            }
            .into());
        }

        Ok(ValidatorSet {
            validators,
            required_signatures: required.to::<usize>(),
        }
        .validate()?)
    }
}

#[async_trait]
impl ChainClient for RpcChain {
    async fn transaction_sender(&self, tx_hash: B256) -> Result<Address> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await?
            .ok_or(ChainError::ReceiptNotFound(tx_hash))?;
        Ok(receipt.from)
    }

    async fn transaction_logs(&self, tx_hash: B256) -> Result<Vec<Log>> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await?
            .ok_or(ChainError::ReceiptNotFound(tx_hash))?;
        Ok(receipt.inner.logs().to_vec())
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(block_number))
            .await?
            .ok_or(ChainError::BlockNotFound(block_number))?;
        Ok(block.header.timestamp)
    }
}
