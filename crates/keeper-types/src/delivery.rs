//! Transaction delivery types for the keeper.
//!
//! These types describe transactions on their way to the chain, the receipts
//! coming back, and the per-attempt records kept by the submission pipeline.

use alloy_primitives::{Address, Bytes, Log, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Blockchain transaction hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHash(pub B256);

impl fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// An unsigned transaction ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
	pub to: Address,
	pub data: Bytes,
	pub value: U256,
	pub chain_id: u64,
	pub nonce: Option<u64>,
	pub gas_limit: Option<u64>,
	/// Legacy gas price in wei.
	pub gas_price: Option<u128>,
}

/// Transaction receipt containing execution details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	pub hash: TransactionHash,
	pub block_number: u64,
	pub gas_used: u64,
	/// Whether the transaction executed successfully.
	pub success: bool,
	pub logs: Vec<Log>,
}

/// Lifecycle of a single signing attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionStatus {
	/// Signed, not yet accepted by the node.
	Pending,
	/// Accepted by the node, waiting for inclusion.
	Sent,
	/// Included in a block.
	Confirmed { block_number: u64 },
	/// Rejected, reverted or timed out.
	Failed { reason: String },
}

/// One signed attempt at delivering a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionAttempt {
	/// Name of the call, e.g. `safeSettleReports`.
	pub call: String,
	pub report_ids: Vec<u64>,
	pub nonce: u64,
	pub signed_payload: Bytes,
	pub tx_hash: Option<TransactionHash>,
	pub status: SubmissionStatus,
	pub retry_count: u32,
	/// Unix timestamp of the attempt.
	pub created_at: u64,
}
