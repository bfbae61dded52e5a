//! Alloy-based chain writer.
//!
//! Reads, simulations and receipt lookups go through the query RPC. Raw
//! transactions are broadcast through the sequencer RPC when one is
//! configured, which on Arbitrum skips the public node's mempool hop.

use crate::bindings::IERC20;
use crate::{DeliveryError, DeliveryFactory, DeliveryInterface, DeliveryRegistry};
use alloy_network::TransactionBuilder;
use alloy_primitives::{Address, Bytes, U256};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::SolCall;
use alloy_transport_http::Http;
use async_trait::async_trait;
use keeper_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, NetworkConfig, Schema, Transaction,
	TransactionHash, TransactionReceipt, ValidationError,
};

type HttpProvider = RootProvider<Http<reqwest::Client>>;

/// Alloy-based delivery implementation.
pub struct AlloyDelivery {
	/// Provider used for everything except broadcasts.
	query: HttpProvider,
	/// Provider raw transactions are sent to.
	sequencer: HttpProvider,
}

impl AlloyDelivery {
	/// Creates providers for the query and sequencer endpoints.
	///
	/// When `sequencer_url` is `None` the query endpoint is used for both.
	pub fn new(rpc_url: &str, sequencer_url: Option<&str>) -> Result<Self, DeliveryError> {
		let query = RootProvider::new_http(rpc_url.parse().map_err(|e| {
			DeliveryError::InvalidConfig(format!("Invalid RPC URL {}: {}", rpc_url, e))
		})?);
		let sequencer = match sequencer_url {
			Some(url) => RootProvider::new_http(url.parse().map_err(|e| {
				DeliveryError::InvalidConfig(format!("Invalid sequencer URL {}: {}", url, e))
			})?),
			None => query.clone(),
		};

		Ok(Self { query, sequencer })
	}

	async fn call(&self, to: Address, input: Vec<u8>) -> Result<Bytes, DeliveryError> {
		let request = TransactionRequest::default()
			.with_to(to)
			.with_input(input);
		self.query
			.call(&request)
			.await
			.map_err(|e| DeliveryError::classify(e.to_string()))
	}
}

/// Configuration schema for the Alloy delivery implementation.
///
/// Both fields are optional and override the `[network]` endpoints.
pub struct AlloyDeliverySchema;

fn http_url(value: &toml::Value) -> Result<(), String> {
	match value.as_str() {
		Some(url) if url.starts_with("http://") || url.starts_with("https://") => Ok(()),
		Some(_) => Err("URL must start with http:// or https://".to_string()),
		None => Err("Expected string value".to_string()),
	}
}

impl ConfigSchema for AlloyDeliverySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			// Required fields
			vec![],
			// Optional fields
			vec![
				Field::new("rpc_url", FieldType::String).with_validator(http_url),
				Field::new("sequencer_url", FieldType::String).with_validator(http_url),
			],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl DeliveryInterface for AlloyDelivery {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(AlloyDeliverySchema)
	}

	async fn send_raw_transaction(
		&self,
		payload: &Bytes,
	) -> Result<TransactionHash, DeliveryError> {
		let pending = self
			.sequencer
			.send_raw_transaction(payload)
			.await
			.map_err(|e| DeliveryError::classify(e.to_string()))?;

		Ok(TransactionHash(*pending.tx_hash()))
	}

	async fn estimate_gas(&self, from: Address, tx: &Transaction) -> Result<u64, DeliveryError> {
		let request = TransactionRequest::default()
			.with_from(from)
			.with_to(tx.to)
			.with_input(tx.data.clone())
			.with_value(tx.value);

		self.query
			.estimate_gas(&request)
			.await
			.map_err(|e| DeliveryError::classify(e.to_string()))
	}

	async fn get_receipt(
		&self,
		hash: &TransactionHash,
	) -> Result<Option<TransactionReceipt>, DeliveryError> {
		let receipt = self
			.query
			.get_transaction_receipt(hash.0)
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get receipt: {}", e)))?;

		Ok(receipt.map(|receipt| TransactionReceipt {
			hash: TransactionHash(receipt.transaction_hash),
			block_number: receipt.block_number.unwrap_or(0),
			gas_used: receipt.gas_used as u64,
			success: receipt.status(),
			logs: receipt
				.inner
				.logs()
				.iter()
				.map(|log| log.inner.clone())
				.collect(),
		}))
	}

	async fn get_gas_price(&self) -> Result<u128, DeliveryError> {
		self.query
			.get_gas_price()
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get gas price: {}", e)))
	}

	async fn get_nonce(&self, address: Address) -> Result<u64, DeliveryError> {
		self.query
			.get_transaction_count(address)
			.pending()
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get nonce: {}", e)))
	}

	async fn get_balance(&self, address: Address) -> Result<U256, DeliveryError> {
		self.query
			.get_balance(address)
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get balance: {}", e)))
	}

	async fn get_allowance(
		&self,
		token: Address,
		owner: Address,
		spender: Address,
	) -> Result<U256, DeliveryError> {
		let output = self
			.call(token, IERC20::allowanceCall { owner, spender }.abi_encode())
			.await?;

		IERC20::allowanceCall::abi_decode_returns(&output, true)
			.map(|ret| ret._0)
			.map_err(|e| DeliveryError::Network(format!("Invalid allowance response: {}", e)))
	}

	async fn get_block_number(&self) -> Result<u64, DeliveryError> {
		self.query
			.get_block_number()
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get block number: {}", e)))
	}
}

/// Factory function to create an Alloy delivery provider from configuration.
///
/// Endpoints come from `[network]` unless the implementation table overrides
/// them with `rpc_url` or `sequencer_url`.
pub fn create_delivery(
	config: &toml::Value,
	network: &NetworkConfig,
) -> Result<Box<dyn DeliveryInterface>, DeliveryError> {
	AlloyDeliverySchema
		.validate(config)
		.map_err(|e| DeliveryError::InvalidConfig(e.to_string()))?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.unwrap_or(&network.rpc_url);
	let sequencer_url = config
		.get("sequencer_url")
		.and_then(|v| v.as_str())
		.or(network.sequencer_url.as_deref());

	tracing::debug!(
		rpc_url = %rpc_url,
		sequencer = sequencer_url.is_some(),
		"Creating alloy delivery"
	);
	Ok(Box::new(AlloyDelivery::new(rpc_url, sequencer_url)?))
}

/// Registry for the Alloy delivery implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "alloy";
	type Factory = DeliveryFactory;

	fn factory() -> Self::Factory {
		create_delivery
	}
}

impl DeliveryRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_schema_accepts_empty_table() {
		let config = toml::Value::Table(toml::map::Map::new());
		assert!(AlloyDeliverySchema.validate(&config).is_ok());
	}

	#[test]
	fn test_schema_rejects_ws_url() {
		let config: toml::Value = toml::from_str(r#"sequencer_url = "ws://localhost:8546""#).unwrap();
		assert!(AlloyDeliverySchema.validate(&config).is_err());
	}

	#[test]
	fn test_new_rejects_bad_url() {
		assert!(matches!(
			AlloyDelivery::new("not a url", None),
			Err(DeliveryError::InvalidConfig(_))
		));
		assert!(AlloyDelivery::new("http://localhost:8545", Some("https://arb1-sequencer.arbitrum.io/rpc")).is_ok());
	}
}
