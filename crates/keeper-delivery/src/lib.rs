//! Transaction delivery module for the oracle keeper.
//!
//! This module talks to the chain on the write side: it encodes typed oracle
//! calls, simulates them, signs them with the account service and broadcasts
//! the raw payload. It also answers the fee, nonce, balance and allowance
//! queries the submission pipeline needs, and waits for receipts under a
//! bounded timeout.
//!
//! Node errors are classified into [`DeliveryError`] variants so callers can
//! tell a nonce race from a stale report state from a plain network failure.

use async_trait::async_trait;
use keeper_account::{AccountError, AccountService};
use keeper_types::{
	Address, Bytes, ConfigSchema, ContractAddresses, ImplementationRegistry, NetworkConfig,
	OracleCall, Transaction, TransactionHash, TransactionReceipt, U256,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod bindings;

/// Re-export implementations
pub mod implementations {
	pub mod alloy;
}

pub use bindings::{decode_settlement_logs, encode_call, EncodedCall, SettlementSummary};

/// Errors that can occur during transaction delivery operations.
#[derive(Debug, Error)]
pub enum DeliveryError {
	/// Error that occurs during network communication.
	#[error("Network error: {0}")]
	Network(String),
	/// The node rejected the nonce as already used.
	#[error("Nonce conflict: {0}")]
	NonceConflict(String),
	/// The node already holds this exact signed payload in its pool.
	#[error("Transaction already known: {0}")]
	AlreadyKnown(String),
	/// A different transaction with the same nonce is queued ahead of ours.
	#[error("Nonce in use by a queued transaction: {0}")]
	NonceInUse(String),
	/// The report changed since it was read; the call can never succeed as built.
	#[error("Stale report state: {0}")]
	StaleState(String),
	/// Execution reverted, either in simulation or on chain.
	#[error("Transaction reverted: {0}")]
	Reverted(String),
	/// No receipt arrived within the configured wait.
	#[error("No receipt for {hash} after {waited_secs}s")]
	ConfirmationTimeout {
		hash: TransactionHash,
		waited_secs: u64,
	},
	/// Error raised by the signing account.
	#[error("Signing error: {0}")]
	Signing(String),
	/// Error that occurs when the delivery configuration is invalid.
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
}

impl From<AccountError> for DeliveryError {
	fn from(err: AccountError) -> Self {
		DeliveryError::Signing(err.to_string())
	}
}

impl DeliveryError {
	/// Classifies a raw node or simulation error message.
	///
	/// A resubmitted payload the pool already holds is [`DeliveryError::AlreadyKnown`],
	/// not a nonce race: the original broadcast went through. Reverts only count as
	/// [`DeliveryError::StaleState`] when they name the oracle's state hash check.
	pub fn classify(message: impl Into<String>) -> Self {
		let message = message.into();
		let lower = message.to_lowercase();

		if lower.contains("already known") || lower.contains("known transaction") {
			DeliveryError::AlreadyKnown(message)
		} else if lower.contains("replacement transaction underpriced") {
			DeliveryError::NonceInUse(message)
		} else if lower.contains("nonce too low")
			|| lower.contains("nonce_expired")
			|| lower.contains("nonce has already been used")
		{
			DeliveryError::NonceConflict(message)
		} else if lower.contains("revert")
			&& (lower.contains("state hash")
				|| lower.contains("statehash")
				|| lower.contains("invalidstatehash"))
		{
			DeliveryError::StaleState(message)
		} else if lower.contains("revert") {
			DeliveryError::Reverted(message)
		} else {
			DeliveryError::Network(message)
		}
	}
}

/// Trait defining the interface for chain writers.
///
/// Implementations never sign: they receive already signed payloads and only
/// move bytes to and from the node.
#[async_trait]
pub trait DeliveryInterface: Send + Sync {
	/// Returns the configuration schema for this delivery implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Broadcasts a signed EIP-2718 payload and returns its hash.
	async fn send_raw_transaction(&self, payload: &Bytes)
		-> Result<TransactionHash, DeliveryError>;

	/// Simulates a transaction from `from` and returns the gas it used.
	async fn estimate_gas(&self, from: Address, tx: &Transaction) -> Result<u64, DeliveryError>;

	/// Returns the receipt if the transaction has been mined.
	async fn get_receipt(
		&self,
		hash: &TransactionHash,
	) -> Result<Option<TransactionReceipt>, DeliveryError>;

	/// Current legacy gas price in wei.
	async fn get_gas_price(&self) -> Result<u128, DeliveryError>;

	/// Next nonce for `address`, counting pending transactions.
	async fn get_nonce(&self, address: Address) -> Result<u64, DeliveryError>;

	/// Native balance in wei.
	async fn get_balance(&self, address: Address) -> Result<U256, DeliveryError>;

	/// ERC-20 allowance granted by `owner` to `spender`.
	async fn get_allowance(
		&self,
		token: Address,
		owner: Address,
		spender: Address,
	) -> Result<U256, DeliveryError>;

	/// Latest block number.
	async fn get_block_number(&self) -> Result<u64, DeliveryError>;
}

/// Type alias for delivery factory functions.
pub type DeliveryFactory =
	fn(&toml::Value, &NetworkConfig) -> Result<Box<dyn DeliveryInterface>, DeliveryError>;

/// Registry trait for delivery implementations.
pub trait DeliveryRegistry: ImplementationRegistry<Factory = DeliveryFactory> {}

/// Get all registered delivery implementations.
pub fn get_all_implementations() -> Vec<(&'static str, DeliveryFactory)> {
	use implementations::alloy;

	vec![(alloy::Registry::NAME, alloy::Registry::factory())]
}

/// Service that builds, signs, broadcasts and confirms oracle transactions.
pub struct DeliveryService {
	implementation: Box<dyn DeliveryInterface>,
	account: Arc<AccountService>,
	chain_id: u64,
	contracts: ContractAddresses,
	confirmation_timeout: Duration,
	receipt_poll_interval: Duration,
}

impl DeliveryService {
	/// Creates a new DeliveryService for the given chain and contracts.
	pub fn new(
		implementation: Box<dyn DeliveryInterface>,
		account: Arc<AccountService>,
		chain_id: u64,
		contracts: ContractAddresses,
		confirmation_timeout: Duration,
	) -> Self {
		Self {
			implementation,
			account,
			chain_id,
			contracts,
			confirmation_timeout,
			receipt_poll_interval: Duration::from_secs(1),
		}
	}

	/// Overrides how often receipts are polled while waiting for confirmation.
	pub fn with_receipt_poll_interval(mut self, interval: Duration) -> Self {
		self.receipt_poll_interval = interval;
		self
	}

	pub fn contracts(&self) -> &ContractAddresses {
		&self.contracts
	}

	/// Address transactions are sent from.
	pub async fn sender(&self) -> Result<Address, DeliveryError> {
		Ok(self.account.get_address().await?)
	}

	/// Encodes a call into an unsigned transaction without gas or nonce.
	pub fn build_transaction(&self, call: &OracleCall) -> Result<Transaction, DeliveryError> {
		let encoded = encode_call(call, &self.contracts)?;
		Ok(Transaction {
			to: encoded.to,
			data: encoded.data,
			value: encoded.value,
			chain_id: self.chain_id,
			nonce: None,
			gas_limit: None,
			gas_price: None,
		})
	}

	/// Simulates a transaction from the keeper's address.
	pub async fn estimate_gas(&self, tx: &Transaction) -> Result<u64, DeliveryError> {
		let from = self.sender().await?;
		self.implementation.estimate_gas(from, tx).await
	}

	/// Current network gas price in wei.
	pub async fn gas_price(&self) -> Result<u128, DeliveryError> {
		self.implementation.get_gas_price().await
	}

	/// Next pending nonce of the keeper's address.
	pub async fn pending_nonce(&self) -> Result<u64, DeliveryError> {
		let from = self.sender().await?;
		self.implementation.get_nonce(from).await
	}

	/// Native balance of the keeper's address.
	pub async fn balance(&self) -> Result<U256, DeliveryError> {
		let from = self.sender().await?;
		self.implementation.get_balance(from).await
	}

	/// Allowance the keeper has granted `spender` on `token`.
	pub async fn allowance(&self, token: Address, spender: Address) -> Result<U256, DeliveryError> {
		let owner = self.sender().await?;
		self.implementation.get_allowance(token, owner, spender).await
	}

	pub async fn block_number(&self) -> Result<u64, DeliveryError> {
		self.implementation.get_block_number().await
	}

	/// Signs a fully populated transaction.
	pub async fn sign(&self, tx: &Transaction) -> Result<Bytes, DeliveryError> {
		Ok(self.account.sign(tx).await?)
	}

	/// Broadcasts a signed payload.
	pub async fn send_raw(&self, payload: &Bytes) -> Result<TransactionHash, DeliveryError> {
		let hash = self.implementation.send_raw_transaction(payload).await?;
		tracing::info!(tx_hash = %hash, "Submitted transaction");
		Ok(hash)
	}

	/// Waits for the receipt of `hash`.
	///
	/// Returns [`DeliveryError::ConfirmationTimeout`] if no receipt shows up within
	/// the configured timeout. A mined but reverted transaction is returned as a
	/// receipt with `success == false`.
	pub async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
	) -> Result<TransactionReceipt, DeliveryError> {
		let poll = async {
			loop {
				match self.implementation.get_receipt(hash).await {
					Ok(Some(receipt)) => return Ok(receipt),
					Ok(None) => {},
					Err(DeliveryError::Network(e)) => {
						tracing::debug!(tx_hash = %hash, error = %e, "Receipt lookup failed");
					},
					Err(e) => return Err(e),
				}
				tokio::time::sleep(self.receipt_poll_interval).await;
			}
		};

		match tokio::time::timeout(self.confirmation_timeout, poll).await {
			Ok(result) => result,
			Err(_) => Err(DeliveryError::ConfirmationTimeout {
				hash: *hash,
				waited_secs: self.confirmation_timeout.as_secs(),
			}),
		}
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use keeper_account::implementations::local::LocalWallet;
	use keeper_types::{SecretString, SettleEntry, B256};
	use std::sync::atomic::{AtomicU32, Ordering};

	pub(crate) const ANVIL_KEY: &str =
		"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	/// Delivery fake that mines a receipt after a number of polls.
	pub(crate) struct FakeChain {
		pub receipt_after_polls: Option<u32>,
		pub polls: AtomicU32,
	}

	#[async_trait]
	impl DeliveryInterface for FakeChain {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(implementations::alloy::AlloyDeliverySchema)
		}

		async fn send_raw_transaction(
			&self,
			_payload: &Bytes,
		) -> Result<TransactionHash, DeliveryError> {
			Ok(TransactionHash(B256::repeat_byte(0xcc)))
		}

		async fn estimate_gas(
			&self,
			_from: Address,
			_tx: &Transaction,
		) -> Result<u64, DeliveryError> {
			Ok(500_000)
		}

		async fn get_receipt(
			&self,
			hash: &TransactionHash,
		) -> Result<Option<TransactionReceipt>, DeliveryError> {
			let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
			match self.receipt_after_polls {
				Some(n) if polls >= n => Ok(Some(TransactionReceipt {
					hash: *hash,
					block_number: 100,
					gas_used: 21_000,
					success: true,
					logs: Vec::new(),
				})),
				_ => Ok(None),
			}
		}

		async fn get_gas_price(&self) -> Result<u128, DeliveryError> {
			Ok(10_000_000)
		}

		async fn get_nonce(&self, _address: Address) -> Result<u64, DeliveryError> {
			Ok(3)
		}

		async fn get_balance(&self, _address: Address) -> Result<U256, DeliveryError> {
			Ok(U256::from(1_000_000_000_000_000_000u128))
		}

		async fn get_allowance(
			&self,
			_token: Address,
			_owner: Address,
			_spender: Address,
		) -> Result<U256, DeliveryError> {
			Ok(U256::ZERO)
		}

		async fn get_block_number(&self) -> Result<u64, DeliveryError> {
			Ok(100)
		}
	}

	fn service(receipt_after_polls: Option<u32>) -> DeliveryService {
		let wallet = LocalWallet::new(&SecretString::from(ANVIL_KEY)).unwrap();
		DeliveryService::new(
			Box::new(FakeChain {
				receipt_after_polls,
				polls: AtomicU32::new(0),
			}),
			Arc::new(AccountService::new(Box::new(wallet))),
			42161,
			ContractAddresses {
				oracle: Address::repeat_byte(0x11),
				batcher: Address::repeat_byte(0x22),
				data_provider: Address::repeat_byte(0x33),
				beacon: None,
			},
			Duration::from_secs(30),
		)
	}

	#[test]
	fn test_classify_node_messages() {
		assert!(matches!(
			DeliveryError::classify("nonce too low: next nonce 5, tx nonce 4"),
			DeliveryError::NonceConflict(_)
		));
		assert!(matches!(
			DeliveryError::classify("NONCE_EXPIRED"),
			DeliveryError::NonceConflict(_)
		));
		assert!(matches!(
			DeliveryError::classify("execution reverted: state hash mismatch"),
			DeliveryError::StaleState(_)
		));
		assert!(matches!(
			DeliveryError::classify("execution reverted: InvalidStateHash()"),
			DeliveryError::StaleState(_)
		));
		assert!(matches!(
			DeliveryError::classify("execution reverted"),
			DeliveryError::Reverted(_)
		));
		assert!(matches!(
			DeliveryError::classify("connection refused"),
			DeliveryError::Network(_)
		));
	}

	#[test]
	fn test_classify_pool_and_revert_reasons() {
		assert!(matches!(
			DeliveryError::classify("already known"),
			DeliveryError::AlreadyKnown(_)
		));
		assert!(matches!(
			DeliveryError::classify("replacement transaction underpriced"),
			DeliveryError::NonceInUse(_)
		));
		// unrelated revert text mentioning "stale" is a plain revert
		assert!(matches!(
			DeliveryError::classify("execution reverted: stale price feed"),
			DeliveryError::Reverted(_)
		));
		// node messages are not reverts
		assert!(matches!(
			DeliveryError::classify("state hash lookup timed out"),
			DeliveryError::Network(_)
		));
	}

	#[test]
	fn test_build_transaction_targets_batcher() {
		let service = service(None);
		let tx = service
			.build_transaction(&OracleCall::SafeSettleReports(vec![SettleEntry {
				report_id: 1,
				state_hash: B256::repeat_byte(1),
			}]))
			.unwrap();
		assert_eq!(tx.to, Address::repeat_byte(0x22));
		assert_eq!(tx.chain_id, 42161);
		assert!(tx.nonce.is_none());
	}

	#[tokio::test(start_paused = true)]
	async fn test_wait_for_confirmation_returns_receipt() {
		let service = service(Some(3));
		let receipt = service
			.wait_for_confirmation(&TransactionHash(B256::repeat_byte(0xcc)))
			.await
			.unwrap();
		assert_eq!(receipt.block_number, 100);
		assert!(receipt.success);
	}

	#[tokio::test(start_paused = true)]
	async fn test_wait_for_confirmation_times_out() {
		let service = service(None);
		let result = service
			.wait_for_confirmation(&TransactionHash(B256::repeat_byte(0xcc)))
			.await;
		assert!(matches!(
			result,
			Err(DeliveryError::ConfirmationTimeout { waited_secs: 30, .. })
		));
	}

	#[tokio::test]
	async fn test_sign_requires_populated_transaction() {
		let service = service(None);
		assert!(service.build_transaction(&OracleCall::FreeMoneyLight).is_err());

		let mut tx = service
			.build_transaction(&OracleCall::SettleReports(vec![1, 2]))
			.unwrap();
		assert!(matches!(service.sign(&tx).await, Err(DeliveryError::Signing(_))));

		tx.nonce = Some(service.pending_nonce().await.unwrap());
		tx.gas_limit = Some(100_000);
		tx.gas_price = Some(service.gas_price().await.unwrap());
		let signed = service.sign(&tx).await.unwrap();
		assert!(!signed.is_empty());
	}
}
