//! Oracle write calls, batches and gas planning types.

use alloy_primitives::{Address, FixedBytes, B256, U256};
use serde::{Deserialize, Serialize};

/// One entry of a `safeSettleReports` batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleEntry {
	pub report_id: u64,
	pub state_hash: B256,
}

/// A counter-report submitted through `disputeAndSwap` or `disputeReports`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeEntry {
	pub report_id: u64,
	pub token_to_swap: Address,
	pub new_amount1: U256,
	pub new_amount2: U256,
	pub amt2_expected: U256,
	pub state_hash: B256,
}

/// A first report submitted through `submitInitialReport`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialReportEntry {
	pub report_id: u64,
	pub amount1: U256,
	pub amount2: U256,
	pub state_hash: B256,
}

/// Parameters of a new report instance requested through the batcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRequest {
	pub token1: Address,
	pub token2: Address,
	pub exact_token1_report: U256,
	pub fee_percentage: u64,
	pub multiplier: u64,
	pub settlement_time: u64,
	pub escalation_halt: U256,
	pub dispute_delay: u64,
	pub protocol_fee: u64,
	pub settler_reward: U256,
	pub time_type: bool,
	pub callback_contract: Address,
	pub callback_selector: FixedBytes<4>,
	pub track_disputes: bool,
	pub callback_gas_limit: u64,
	pub keep_fee: bool,
}

/// A typed state-mutating call against the oracle contracts.
///
/// Every variant that touches an existing report carries the `state_hash`
/// last observed for it; the chain rejects the call if it has changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OracleCall {
	/// `oracle.submitInitialReport(id, amount1, amount2, stateHash)` with `value` wei attached.
	SubmitInitialReport { entry: InitialReportEntry, value: U256 },
	/// `oracle.disputeAndSwap(...)`.
	DisputeAndSwap(DisputeEntry),
	/// `batcher.settleReports([{id}])`.
	SettleReports(Vec<u64>),
	/// `batcher.safeSettleReports([{id, stateHash}])`.
	SafeSettleReports(Vec<SettleEntry>),
	/// `batcher.disputeReports(entries, batchAmount1, batchAmount2)`.
	DisputeReports {
		entries: Vec<DisputeEntry>,
		batch_amount1: U256,
		batch_amount2: U256,
	},
	/// `batcher.submitInitialReports(entries, batchAmount1, batchAmount2)`.
	SubmitInitialReports {
		entries: Vec<InitialReportEntry>,
		batch_amount1: U256,
		batch_amount2: U256,
	},
	/// `batcher.requestPrices(requests)` with `value` wei attached.
	RequestPrices { requests: Vec<PriceRequest>, value: U256 },
	/// `token.approve(spender, amount)`.
	Approve {
		token: Address,
		spender: Address,
		amount: U256,
	},
	/// `beacon.freeMoneyLight()`.
	FreeMoneyLight,
}

impl OracleCall {
	/// Short label used in logs and submission records.
	pub fn label(&self) -> &'static str {
		match self {
			OracleCall::SubmitInitialReport { .. } => "submitInitialReport",
			OracleCall::DisputeAndSwap(_) => "disputeAndSwap",
			OracleCall::SettleReports(_) => "settleReports",
			OracleCall::SafeSettleReports(_) => "safeSettleReports",
			OracleCall::DisputeReports { .. } => "disputeReports",
			OracleCall::SubmitInitialReports { .. } => "submitInitialReports",
			OracleCall::RequestPrices { .. } => "requestPrices",
			OracleCall::Approve { .. } => "approve",
			OracleCall::FreeMoneyLight => "freeMoneyLight",
		}
	}

	/// Report ids touched by this call.
	pub fn report_ids(&self) -> Vec<u64> {
		match self {
			OracleCall::SubmitInitialReport { entry, .. } => vec![entry.report_id],
			OracleCall::DisputeAndSwap(entry) => vec![entry.report_id],
			OracleCall::SettleReports(ids) => ids.clone(),
			OracleCall::SafeSettleReports(entries) => entries.iter().map(|e| e.report_id).collect(),
			OracleCall::DisputeReports { entries, .. } => {
				entries.iter().map(|e| e.report_id).collect()
			},
			OracleCall::SubmitInitialReports { entries, .. } => {
				entries.iter().map(|e| e.report_id).collect()
			},
			OracleCall::RequestPrices { .. }
			| OracleCall::Approve { .. }
			| OracleCall::FreeMoneyLight => Vec::new(),
		}
	}
}

/// Where a batch's gas figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GasSource {
	/// A successful simulation, buffered.
	Estimated,
	/// Static `gas_per_report * len` after the simulation kept failing.
	Fallback,
}

/// Gas parameters attached to a call before submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPlan {
	/// Raw figure returned by the simulation, or the static fallback.
	pub estimated_gas: u64,
	/// Gas limit actually submitted. Never above the configured ceiling.
	pub buffered_gas: u64,
	/// Gas price in wei, computed once per cycle.
	pub gas_price: u128,
	/// Nonce used by the latest signing attempt.
	pub nonce: Option<u64>,
	pub source: GasSource,
}

impl GasPlan {
	/// A plan with a fixed gas limit, used for calls that are not batched.
	pub fn fixed(gas_limit: u64, gas_price: u128) -> Self {
		Self {
			estimated_gas: gas_limit,
			buffered_gas: gas_limit,
			gas_price,
			nonce: None,
			source: GasSource::Estimated,
		}
	}

	/// Upper bound on the fee paid by this plan, in wei.
	pub fn max_cost(&self) -> U256 {
		U256::from(self.buffered_gas) * U256::from(self.gas_price)
	}
}

/// A gas-bounded settlement batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleBatch {
	pub entries: Vec<SettleEntry>,
	/// `None` when the batch is empty and nothing was estimated.
	pub gas: Option<GasPlan>,
}

impl SettleBatch {
	pub fn empty() -> Self {
		Self {
			entries: Vec::new(),
			gas: None,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn call(&self) -> OracleCall {
		OracleCall::SafeSettleReports(self.entries.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_report_ids_for_batched_calls() {
		let call = OracleCall::SafeSettleReports(vec![
			SettleEntry {
				report_id: 7,
				state_hash: B256::ZERO,
			},
			SettleEntry {
				report_id: 9,
				state_hash: B256::ZERO,
			},
		]);
		assert_eq!(call.report_ids(), vec![7, 9]);
		assert_eq!(call.label(), "safeSettleReports");
		assert!(OracleCall::FreeMoneyLight.report_ids().is_empty());
	}

	#[test]
	fn test_gas_plan_cost() {
		let plan = GasPlan::fixed(150_000, 200_000_000);
		assert_eq!(plan.max_cost(), U256::from(30_000_000_000_000u64));
	}
}
