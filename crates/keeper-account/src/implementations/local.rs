//! Local private-key signer.

use crate::{AccountError, AccountFactory, AccountInterface, AccountRegistry};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::{EthereumWallet, TransactionBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use keeper_types::{
	with_0x_prefix, Address, Bytes, ConfigSchema, Field, FieldType, ImplementationRegistry,
	Schema, SecretString, Transaction, ValidationError,
};

/// Account backed by a private key held in process memory.
pub struct LocalWallet {
	address: Address,
	wallet: EthereumWallet,
}

impl LocalWallet {
	/// Parses a hex private key, with or without `0x` prefix.
	pub fn new(private_key: &SecretString) -> Result<Self, AccountError> {
		let signer: PrivateKeySigner = private_key.with_exposed(|key| {
			with_0x_prefix(key.trim())
				.parse()
				.map_err(|_| AccountError::InvalidKey("Invalid private key format".to_string()))
		})?;
		let address = signer.address();

		Ok(Self {
			address,
			wallet: EthereumWallet::from(signer),
		})
	}
}

#[async_trait]
impl AccountInterface for LocalWallet {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalWalletSchema)
	}

	async fn address(&self) -> Result<Address, AccountError> {
		Ok(self.address)
	}

	async fn sign_transaction(&self, tx: &Transaction) -> Result<Bytes, AccountError> {
		let nonce = tx
			.nonce
			.ok_or_else(|| AccountError::SigningFailed("Transaction has no nonce".into()))?;
		let gas_limit = tx
			.gas_limit
			.ok_or_else(|| AccountError::SigningFailed("Transaction has no gas limit".into()))?;
		let gas_price = tx
			.gas_price
			.ok_or_else(|| AccountError::SigningFailed("Transaction has no gas price".into()))?;

		let mut request = TransactionRequest::default()
			.with_to(tx.to)
			.with_input(tx.data.clone())
			.with_value(tx.value)
			.with_chain_id(tx.chain_id)
			.with_nonce(nonce)
			.with_gas_limit(gas_limit)
			.with_gas_price(gas_price);
		request.from = Some(self.address);

		let envelope = request
			.build(&self.wallet)
			.await
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;

		Ok(Bytes::from(envelope.encoded_2718()))
	}
}

/// Configuration schema for LocalWallet.
pub struct LocalWalletSchema;

impl ConfigSchema for LocalWalletSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("private_key", FieldType::String).with_validator(|value| {
					let key = value.as_str().unwrap_or_default().trim();
					let hex = key.strip_prefix("0x").unwrap_or(key);
					if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
						return Err("private_key must be 32 bytes of hex".to_string());
					}
					Ok(())
				}),
			],
			vec![],
		);
		schema.validate(config)
	}
}

/// Factory function to create a local wallet from configuration.
///
/// Configuration parameters:
/// - `private_key` (required): hex-encoded secp256k1 key, usually `${PRIVATE_KEY}`
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	LocalWalletSchema
		.validate(config)
		.map_err(|e| AccountError::InvalidKey(e.to_string()))?;

	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.map(SecretString::from)
		.ok_or_else(|| AccountError::InvalidKey("private_key is required".into()))?;

	let wallet = LocalWallet::new(&private_key)?;
	tracing::debug!(address = %wallet.address, "Loaded local signer");
	Ok(Box::new(wallet))
}

/// Registry for the local wallet implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = AccountFactory;

	fn factory() -> Self::Factory {
		create_account
	}
}

impl AccountRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use keeper_types::U256;

	const ANVIL_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	fn wallet() -> LocalWallet {
		LocalWallet::new(&SecretString::from(ANVIL_KEY)).unwrap()
	}

	fn settle_tx(nonce: Option<u64>) -> Transaction {
		Transaction {
			to: Address::repeat_byte(0x22),
			data: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
			value: U256::ZERO,
			chain_id: 42161,
			nonce,
			gas_limit: Some(750_000),
			gas_price: Some(12_000_000),
		}
	}

	#[tokio::test]
	async fn test_address_from_key_without_prefix() {
		let expected: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
			.parse()
			.unwrap();
		assert_eq!(wallet().address().await.unwrap(), expected);
	}

	#[tokio::test]
	async fn test_signing_is_deterministic_per_nonce() {
		let wallet = wallet();
		let first = wallet.sign_transaction(&settle_tx(Some(7))).await.unwrap();
		let again = wallet.sign_transaction(&settle_tx(Some(7))).await.unwrap();
		let next = wallet.sign_transaction(&settle_tx(Some(8))).await.unwrap();

		assert!(!first.is_empty());
		assert_eq!(first, again);
		assert_ne!(first, next);
	}

	#[tokio::test]
	async fn test_signing_requires_nonce() {
		let err = wallet().sign_transaction(&settle_tx(None)).await.unwrap_err();
		assert!(matches!(err, AccountError::SigningFailed(_)));
	}

	#[test]
	fn test_schema_rejects_short_key() {
		let config: toml::Value = toml::from_str("private_key = \"0x1234\"").unwrap();
		assert!(create_account(&config).is_err());
	}
}
