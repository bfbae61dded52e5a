//! Network configuration types.
//!
//! The keeper runs against a single chain. This module describes where to reach
//! it, which oracle contracts to talk to and which token pair it trades.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// Configuration for a token the keeper posts collateral in.
///
/// # Fields
///
/// * `address` - The on-chain address of the token contract
/// * `symbol` - Symbol used to query the price feed (e.g. "WETH", "USDC")
/// * `decimals` - The number of decimal places for the token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct TokenConfig {
	pub address: Address,
	pub symbol: String,
	pub decimals: u8,
}

/// The allow-listed token pair, in oracle order (`token1`, `token2`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenPair {
	pub token1: TokenConfig,
	pub token2: TokenConfig,
}

impl TokenPair {
	/// Returns true if `(token1, token2)` matches this pair exactly.
	pub fn matches(&self, token1: Address, token2: Address) -> bool {
		self.token1.address == token1 && self.token2.address == token2
	}

	/// Looks up a token of the pair by address.
	pub fn get(&self, address: Address) -> Option<&TokenConfig> {
		if self.token1.address == address {
			Some(&self.token1)
		} else if self.token2.address == address {
			Some(&self.token2)
		} else {
			None
		}
	}
}

/// Addresses of the oracle contracts.
///
/// # Fields
///
/// * `oracle` - The openOracle contract (reads, disputes, initial reports)
/// * `batcher` - Batch helper used for `safeSettleReports` and friends
/// * `data_provider` - Bulk reader exposing `getData(startId, endId)`
/// * `beacon` - Optional settlement beacon exposing `freeMoneyLight()`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ContractAddresses {
	pub oracle: Address,
	pub batcher: Address,
	pub data_provider: Address,
	#[serde(default)]
	pub beacon: Option<Address>,
}

/// Chain the keeper operates on.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
	/// Chain id used when signing. Defaults to Arbitrum One.
	#[serde(default = "default_chain_id")]
	pub chain_id: u64,
	/// HTTP(S) endpoint used for reads, simulation and receipts.
	pub rpc_url: String,
	/// Endpoint raw transactions are broadcast to. Falls back to `rpc_url`.
	#[serde(default)]
	pub sequencer_url: Option<String>,
	pub contracts: ContractAddresses,
	pub tokens: TokenPair,
}

fn default_chain_id() -> u64 {
	42161
}

impl NetworkConfig {
	/// Endpoint used for broadcasting signed transactions.
	pub fn broadcast_url(&self) -> &str {
		self.sequencer_url.as_deref().unwrap_or(&self.rpc_url)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn token(byte: u8, symbol: &str, decimals: u8) -> TokenConfig {
		TokenConfig {
			address: Address::repeat_byte(byte),
			symbol: symbol.to_string(),
			decimals,
		}
	}

	#[test]
	fn test_pair_matching_is_ordered() {
		let pair = TokenPair {
			token1: token(1, "WETH", 18),
			token2: token(2, "USDC", 6),
		};
		assert!(pair.matches(Address::repeat_byte(1), Address::repeat_byte(2)));
		assert!(!pair.matches(Address::repeat_byte(2), Address::repeat_byte(1)));
		assert_eq!(pair.get(Address::repeat_byte(2)).map(|t| t.decimals), Some(6));
		assert!(pair.get(Address::ZERO).is_none());
	}
}
