//! Common types module for the oracle keeper.
//!
//! This module defines the data types shared by every keeper component: oracle
//! reports and their eligibility, batch and gas planning types, transaction
//! delivery types, chain events and configuration validation helpers.

/// Batch, call and gas planning types for oracle writes.
pub mod batch;
/// Transaction delivery types for blockchain interactions.
pub mod delivery;
/// Decoded oracle events pushed from the chain.
pub mod events;
/// Network, contract and token configuration types.
pub mod network;
/// Implementation registry trait.
pub mod registry;
/// Oracle report types and eligibility annotations.
pub mod report;
/// Redacting wrapper for sensitive strings.
pub mod secret_string;
/// Storage types for managing persistent data.
pub mod storage;
/// Utility functions for formatting and conversions.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use alloy_primitives::{Address, Bytes, FixedBytes, B256, U256};
pub use batch::*;
pub use delivery::*;
pub use events::*;
pub use network::{ContractAddresses, NetworkConfig, TokenConfig, TokenPair};
pub use registry::ImplementationRegistry;
pub use report::*;
pub use secret_string::SecretString;
pub use storage::*;
pub use utils::{current_timestamp, format_token_amount, saturating_u64, with_0x_prefix};
pub use validation::*;
