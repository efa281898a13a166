use std::fmt::{self, Display, Formatter};

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize, Serializer};

/// The state of a single validator's signature, or of the finalization.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfirmationStatus {
    #[default]
    Pending,
    Confirmed,
    /// The validator had not signed by the time enough others had.
    NotRequired,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Confirmation {
    #[serde(serialize_with = "checksummed")]
    pub validator: Address,
    pub status: ConfirmationStatus,
}

/// Where and how a message was executed on its destination chain. Zeroed until the finalization event has been
/// observed.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionData {
    pub status: ConfirmationStatus,
    /// The account which submitted the finalizing transaction.
    #[serde(serialize_with = "checksummed")]
    pub validator: Address,
    pub tx_hash: B256,
    pub timestamp: u64,
    pub execution_result: bool,
}

/// Addresses leave the process in their EIP-55 form; `Address`'s own serializer writes lowercase hex.
fn checksummed<S: Serializer>(address: &Address, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&address.to_checksum(None))
}

impl ExecutionData {
    pub fn is_finalized(&self) -> bool {
        !self.tx_hash.is_zero()
    }
}

/// The overall state of a message.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[default]
    Undefined,
    /// The message was executed.
    Success,
    /// The message was delivered but the call it carried reverted.
    SuccessMessageFailed,
}

impl Status {
    pub fn is_final(self) -> bool {
        self != Status::Undefined
    }

    pub fn name(self) -> &'static str {
        match self {
            Status::Undefined => "undefined",
            Status::Success => "success",
            Status::SuccessMessageFailed => "success_message_failed",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Status::Undefined => f.write_str("undefined"),
            Status::Success => f.write_str("success"),
            Status::SuccessMessageFailed => f.write_str("success, message failed"),
        }
    }
}

/// Derive the status of a message from what has been observed so far.
///
/// Finalization always wins. Collecting every signature without a finalization event leaves the status `Undefined`;
/// callers tell "waiting for signatures" and "waiting for execution" apart with `signature_collected`.
pub fn reduce(execution: &ExecutionData, _signature_collected: bool) -> Status {
    if execution.is_finalized() {
        if execution.execution_result {
            Status::Success
        } else {
            Status::SuccessMessageFailed
        }
    } else {
        Status::Undefined
    }
}

/// The outcome of polling one facet of a message once.
///
/// `NotReady` and `Pending` are retried the same way today. They are kept apart so that a missing chain handle can be
/// treated differently from a chain that has simply not caught up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress<C, P = ()> {
    /// A chain handle needed to poll is missing.
    NotReady,
    /// The facet was polled but has not converged.
    Pending(P),
    /// The facet has converged and will not change again.
    Confirmed(C),
}

impl<C, P> Progress<C, P> {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Progress::Confirmed(_))
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Progress::NotReady => "not_ready",
            Progress::Pending(_) => "pending",
            Progress::Confirmed(_) => "confirmed",
        }
    }
}
