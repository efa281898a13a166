use std::fmt::{self, Display, Formatter};

use alloy::{
    primitives::{Address, B256, Bytes, keccak256},
    rpc::types::Log,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::contracts::IAMB;

/// Which way a message travels. Home to foreign messages are signed by validators on the home chain and relayed to the
/// foreign chain; foreign to home messages are affirmed by validators on the home chain.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    HomeToForeign,
    ForeignToHome,
}

impl Direction {
    pub fn from_home(from_home: bool) -> Self {
        if from_home {
            Direction::HomeToForeign
        } else {
            Direction::ForeignToHome
        }
    }

    pub fn is_from_home(self) -> bool {
        self == Direction::HomeToForeign
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::HomeToForeign => "home_to_foreign",
            Direction::ForeignToHome => "foreign_to_home",
        }
    }

    /// The home bridge method which reports whether a validator has signed.
    pub fn signature_check(self) -> SignatureCheck {
        match self {
            Direction::HomeToForeign => SignatureCheck::MessagesSigned,
            Direction::ForeignToHome => SignatureCheck::AffirmationsSigned,
        }
    }

    /// The event the destination bridge emits once the message is executed.
    pub fn finalization_event(self) -> FinalizationEvent {
        match self {
            Direction::HomeToForeign => FinalizationEvent::RelayedMessage,
            Direction::ForeignToHome => FinalizationEvent::AffirmationCompleted,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SignatureCheck {
    MessagesSigned,
    AffirmationsSigned,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FinalizationEvent {
    RelayedMessage,
    AffirmationCompleted,
}

impl FinalizationEvent {
    pub fn name(self) -> &'static str {
        match self {
            FinalizationEvent::RelayedMessage => "RelayedMessage",
            FinalizationEvent::AffirmationCompleted => "AffirmationCompleted",
        }
    }
}

impl Display for FinalizationEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: B256,
    /// The encoded message. Validators sign the hash of this.
    pub data: Bytes,
}

impl Message {
    pub fn new(id: B256, data: Bytes) -> Self {
        Message { id, data }
    }

    pub fn hash(&self) -> B256 {
        keccak256(&self.data)
    }
}

/// The key the bridge stores a validator's signature under: `keccak256(abi.encodePacked(validator, messageHash))`.
pub fn validator_message_hash(validator: Address, message_hash: B256) -> B256 {
    let mut packed = [0u8; 52];
    packed[..20].copy_from_slice(validator.as_slice());
    packed[20..].copy_from_slice(message_hash.as_slice());
    keccak256(packed)
}

/// Extract the messages a user request transaction sent, in log order. Logs emitted by contracts other than
/// `bridge_address` are skipped.
pub fn messages_from_logs(logs: &[Log], bridge_address: Address, direction: Direction) -> Vec<Message> {
    logs.iter()
        .filter(|log| log.address() == bridge_address)
        .filter_map(|log| {
            let decoded = match direction {
                Direction::HomeToForeign => log
                    .log_decode::<IAMB::UserRequestForSignature>()
                    .map(|l| (l.inner.data.messageId, l.inner.data.encodedData)),
                Direction::ForeignToHome => log
                    .log_decode::<IAMB::UserRequestForAffirmation>()
                    .map(|l| (l.inner.data.messageId, l.inner.data.encodedData)),
            };
            match decoded {
                Ok((id, data)) => Some(Message::new(id, data)),
                Err(e) => {
                    debug!(?e, "skipping bridge log which is not a user request");
                    None
                }
            }
        })
        .collect()
}
