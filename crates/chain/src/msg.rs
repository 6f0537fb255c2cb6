//! Messages delivered by consensus and applied by [`crate::app::BridgeApp`].

use serde::{Deserialize, Serialize};

use bridge_common::{Address, Hash};

use crate::validator::{de_hex, ser_hex};

/// Message variants, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Msg {
    /// Put a checkpoint into the buffer
    ProposeCheckpoint {
        proposer: Address,
        start_block: u64,
        end_block: u64,
        root_hash: Hash,
        timestamp: u64,
    },

    /// Base chain accepted the buffered checkpoint
    AcknowledgeCheckpoint {
        header_index: u64,
        timestamp: u64,
    },

    /// Buffered checkpoint timed out
    NoAckCheckpoint {
        timestamp: u64,
    },

    ValidatorJoin {
        address: Address,
        #[serde(serialize_with = "ser_hex", deserialize_with = "de_hex")]
        signer_pubkey: Vec<u8>,
        voting_power: i64,
        start_epoch: u64,
        end_epoch: u64,
    },

    ValidatorExit {
        address: Address,
        end_epoch: u64,
    },

    ValidatorUpdateSigner {
        address: Address,
        #[serde(serialize_with = "ser_hex", deserialize_with = "de_hex")]
        signer_pubkey: Vec<u8>,
    },

    /// Fee top-up. `amount` is a decimal string; `sequence` identifies the
    /// base-chain event (`tx_hash:log_index`) for replay protection.
    AddFee {
        account: Address,
        amount: String,
        #[serde(default)]
        sequence: Option<String>,
    },

    /// Withdrawal executed on the base chain. `amount` `"0"` withdraws the
    /// whole balance.
    WithdrawFee {
        account: Address,
        amount: String,
    },
}

impl Msg {
    /// Module that handles the message.
    pub fn route(&self) -> &'static str {
        match self {
            Msg::ProposeCheckpoint { .. } | Msg::AcknowledgeCheckpoint { .. } | Msg::NoAckCheckpoint { .. } => "checkpoint",
            Msg::ValidatorJoin { .. } | Msg::ValidatorExit { .. } | Msg::ValidatorUpdateSigner { .. } => "staking",
            Msg::AddFee { .. } | Msg::WithdrawFee { .. } => "fee",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Msg::ProposeCheckpoint { .. } => "propose_checkpoint",
            Msg::AcknowledgeCheckpoint { .. } => "acknowledge_checkpoint",
            Msg::NoAckCheckpoint { .. } => "no_ack_checkpoint",
            Msg::ValidatorJoin { .. } => "validator_join",
            Msg::ValidatorExit { .. } => "validator_exit",
            Msg::ValidatorUpdateSigner { .. } => "validator_update_signer",
            Msg::AddFee { .. } => "add_fee",
            Msg::WithdrawFee { .. } => "withdraw_fee",
        }
    }
}
