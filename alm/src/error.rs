use alloy::primitives::{B256, U256};

/// Errors from reading bridge state off a chain.
#[derive(thiserror::Error, Debug)]
pub enum ChainError {
    #[error("transaction receipt {0} not found")]
    ReceiptNotFound(B256),
    #[error("block {0} not found")]
    BlockNotFound(u64),
    #[error("log is missing its {0}")]
    MissingLogField(&'static str),
    #[error("invalid validator set: {required} signatures required from {validators} validators")]
    InvalidValidatorSet { required: U256, validators: usize },
}
