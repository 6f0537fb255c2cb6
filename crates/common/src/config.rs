//! Node config loader using TOML and serde.
//!
//! Only process-level settings live here. Consensus parameters are stored in
//! chain state; the `[params]` table merely seeds them at genesis.

use serde::Deserialize;
use std::path::Path;
use std::fs;

use crate::base_chain::BaseChainConfig;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NodeConfig {
    /// Data directory holding the LMDB environment.
    pub data_dir: String,

    /// Bind address for the query API (e.g., "127.0.0.1:1317")
    pub bind_addr: String,

    /// Execution chain id recorded in every span.
    pub chain_id: String,

    /// Base-chain client timeout / retry policy.
    pub base_chain: BaseChainConfig,

    /// Genesis module parameters.
    pub params: GenesisParams,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            data_dir: "./data".to_string(),
            bind_addr: "127.0.0.1:1317".to_string(),
            chain_id: "15001".to_string(),
            base_chain: BaseChainConfig::default(),
            params: GenesisParams::default(),
        }
    }
}

/// Genesis values for the chain's module parameters.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct GenesisParams {
    pub producer_count: u32,
    pub span_duration: u64,
    pub sprint_duration: u64,
    /// Seconds a buffered checkpoint may wait before a no-ack is accepted.
    pub checkpoint_buffer_time: u64,
    pub genesis_checkpoint_start: u64,
    pub max_checkpoint_length: u64,
}

impl Default for GenesisParams {
    fn default() -> Self {
        Self {
            producer_count: 4,
            span_duration: 6400,
            sprint_duration: 64,
            checkpoint_buffer_time: 1000,
            genesis_checkpoint_start: 1,
            max_checkpoint_length: 1024,
        }
    }
}

/// Load config from a TOML file path.
/// If file is missing or parse fails, an error is returned.
pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<NodeConfig> {
    let p = path.as_ref();
    let s = fs::read_to_string(p)?;
    let cfg: NodeConfig = toml::from_str(&s)?;
    Ok(cfg)
}
