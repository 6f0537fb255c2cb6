//! # Bridge Common Crate
//!
//! Shared value types and the base-chain abstraction.
//!
//! ## Modules
//! - `types`: `Address`, `Hash`, `FeeAmount`
//! - `crypto`: Keccak-256 helpers
//! - `base_chain`: `BaseChainSource` trait, errors, client policy
//! - `mock_base_chain`: in-memory source for tests
//! - `config`: node configuration (TOML)
//!
//! ## Base Chain Architecture
//! ```text
//! ┌──────────────────┐
//! │ BaseChainSource  │  <- Abstract trait
//! └────────┬─────────┘
//!          │
//!    ┌─────┴──────┐
//!    │            │
//! ┌──▼───┐  ┌─────▼────────┐
//! │ RPC  │  │MockBaseChain │
//! └──────┘  └──────────────┘
//! ```

pub mod types;
pub mod crypto;
pub mod base_chain;
pub mod mock_base_chain;
pub mod config;

pub use types::{Address, Hash, FeeAmount};
pub use base_chain::{BaseBlockHeader, BaseChainConfig, BaseChainError, BaseChainSource};
pub use mock_base_chain::MockBaseChain;
pub use config::{NodeConfig, GenesisParams};
