use alloy::primitives::B256;
use dashmap::DashSet;

/// Validator signatures which have been seen on chain, keyed by the validator-scoped message hash (see
/// [crate::message::validator_message_hash]).
///
/// Once a validator has signed a message the bridge never forgets it, so entries are only ever added. One cache is
/// created at startup and shared by every tracker; it lives as long as the process.
#[derive(Debug, Default)]
pub struct SignatureCache {
    confirmed: DashSet<B256>,
}

impl SignatureCache {
    pub fn new() -> Self {
        SignatureCache::default()
    }

    pub fn is_confirmed(&self, hash: &B256) -> bool {
        self.confirmed.contains(hash)
    }

    /// Record a confirmed signature. Returns `false` if it was already known. Inserting the same hash from several
    /// trackers at once is harmless.
    pub fn confirm(&self, hash: B256) -> bool {
        self.confirmed.insert(hash)
    }

    pub fn len(&self) -> usize {
        self.confirmed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.confirmed.is_empty()
    }
}
