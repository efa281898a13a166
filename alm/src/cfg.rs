use std::time::Duration;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    /// Human readable name of the chain, used in logs.
    pub name: String,
    /// JSON-RPC endpoint. Either `http(s)://` or `ws(s)://`.
    pub rpc_url: String,
    /// Address of the arbitrary message bridge contract on this chain.
    pub bridge_address: Address,
    /// How long to wait between two polls against this chain. Defaults to 5 seconds.
    #[serde(default = "polling_interval_default")]
    pub polling_interval: Duration,
    /// Validators allowed to sign messages. Only meaningful for the home chain. If not set, the list is read from the
    /// bridge's validator contract at startup.
    #[serde(default)]
    pub validators: Option<Vec<Address>>,
    /// Number of signatures needed before a message counts as signed. Only meaningful for the home chain. If not set,
    /// it is read from the bridge's validator contract at startup.
    #[serde(default)]
    pub required_signatures: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The chain validators sign messages on.
    pub home: ChainConfig,
    pub foreign: ChainConfig,
    /// The base address of the OTLP collector. If not set, metrics will not be exported.
    #[serde(default)]
    pub otlp_collector_endpoint: Option<String>,
}

pub fn polling_interval_default() -> Duration {
    Duration::from_secs(5)
}
