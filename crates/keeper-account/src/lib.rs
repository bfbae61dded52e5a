//! Account management module for the oracle keeper.
//!
//! Transactions are signed locally and broadcast as raw bytes. Nonces are
//! chosen by the submission pipeline, never by the provider.

use async_trait::async_trait;
use keeper_types::{Address, Bytes, ConfigSchema, ImplementationRegistry, Transaction};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	/// Error that occurs when signing operations fail.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// Error that occurs when a cryptographic key is invalid or malformed.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	/// Error that occurs when interacting with the account implementation.
	#[error("Implementation error: {0}")]
	Implementation(String),
}

/// Interface for signing accounts.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Returns the configuration schema for this account implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Address transactions are sent from.
	async fn address(&self) -> Result<Address, AccountError>;

	/// Signs a fully populated transaction and returns its EIP-2718 encoding,
	/// ready for `eth_sendRawTransaction`.
	///
	/// The transaction must carry a nonce, gas limit and gas price.
	async fn sign_transaction(&self, tx: &Transaction) -> Result<Bytes, AccountError>;
}

/// Type alias for account factory functions.
pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

/// Registry trait for account implementations.
pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

/// Get all registered account implementations.
pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Service that manages account operations.
pub struct AccountService {
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	/// Creates a new AccountService with the specified implementation.
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	/// Retrieves the address associated with the managed account.
	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.implementation.address().await
	}

	/// Signs a transaction and returns the raw signed payload.
	pub async fn sign(&self, tx: &Transaction) -> Result<Bytes, AccountError> {
		self.implementation.sign_transaction(tx).await
	}
}
