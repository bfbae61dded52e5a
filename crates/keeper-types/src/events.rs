//! Decoded oracle events.
//!
//! The event poller decodes chain logs into [`OracleEvent`] values and pushes
//! them into a bounded queue. The engine drains that queue from its single
//! dispatch loop and coalesces duplicates before acting on them.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// A decoded event emitted by the oracle or the settlement beacon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OracleEvent {
	/// A new report instance was requested.
	ReportInstanceCreated {
		report_id: u64,
		token1: Address,
		token2: Address,
		exact_token1_report: U256,
		fee: U256,
		block_number: u64,
	},
	/// The first report for an instance was submitted.
	InitialReportSubmitted {
		report_id: u64,
		reporter: Address,
		amount1: U256,
		amount2: U256,
		block_number: u64,
	},
	/// A report was disputed with new amounts.
	ReportDisputed {
		report_id: u64,
		disputer: Address,
		amount1: U256,
		amount2: U256,
		block_number: u64,
	},
	/// A settlement beacon call settled a batch of reports.
	SettlementBatch {
		reports_settled: u64,
		total_rewards: U256,
		settler: Address,
		block_number: u64,
	},
}

/// Coarse event kind for log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OracleEventKind {
	ReportInstanceCreated,
	InitialReportSubmitted,
	ReportDisputed,
	SettlementBatch,
}

impl OracleEvent {
	pub fn kind(&self) -> OracleEventKind {
		match self {
			OracleEvent::ReportInstanceCreated { .. } => OracleEventKind::ReportInstanceCreated,
			OracleEvent::InitialReportSubmitted { .. } => OracleEventKind::InitialReportSubmitted,
			OracleEvent::ReportDisputed { .. } => OracleEventKind::ReportDisputed,
			OracleEvent::SettlementBatch { .. } => OracleEventKind::SettlementBatch,
		}
	}

	/// Report the event refers to, if it refers to a single one.
	pub fn report_id(&self) -> Option<u64> {
		match self {
			OracleEvent::ReportInstanceCreated { report_id, .. }
			| OracleEvent::InitialReportSubmitted { report_id, .. }
			| OracleEvent::ReportDisputed { report_id, .. } => Some(*report_id),
			OracleEvent::SettlementBatch { .. } => None,
		}
	}

	pub fn block_number(&self) -> u64 {
		match self {
			OracleEvent::ReportInstanceCreated { block_number, .. }
			| OracleEvent::InitialReportSubmitted { block_number, .. }
			| OracleEvent::ReportDisputed { block_number, .. }
			| OracleEvent::SettlementBatch { block_number, .. } => *block_number,
		}
	}

	/// Key under which queued events collapse into one.
	///
	/// Events on the same report collapse regardless of kind; the most recent wins.
	pub fn coalesce_key(&self) -> CoalesceKey {
		match self.report_id() {
			Some(id) => CoalesceKey::Report(id),
			None => CoalesceKey::Settlement,
		}
	}
}

/// Identity of a queued event for coalescing purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoalesceKey {
	Report(u64),
	Settlement,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_coalesce_key_groups_by_report() {
		let created = OracleEvent::ReportInstanceCreated {
			report_id: 5,
			token1: Address::ZERO,
			token2: Address::ZERO,
			exact_token1_report: U256::ZERO,
			fee: U256::ZERO,
			block_number: 10,
		};
		let disputed = OracleEvent::ReportDisputed {
			report_id: 5,
			disputer: Address::ZERO,
			amount1: U256::from(1),
			amount2: U256::from(2),
			block_number: 12,
		};
		assert_eq!(created.coalesce_key(), disputed.coalesce_key());
		assert_eq!(disputed.block_number(), 12);
	}
}
