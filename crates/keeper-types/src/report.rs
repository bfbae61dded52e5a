//! Oracle report types.
//!
//! A report moves through `Created -> InitialReported -> (Disputed)* -> Settled|Distributed`
//! on chain. The keeper only ever observes snapshots of it: either the flat record
//! returned by the bulk data provider, or the three per-report views exposed by
//! the oracle itself (`reportMeta`, `reportStatus`, `extraData`).

use alloy_primitives::{Address, FixedBytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Immutable parameters of a report instance, as returned by `reportMeta(id)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMeta {
	pub token1: Address,
	pub token2: Address,
	/// Swap fee charged on disputes, scaled by 1e7.
	pub fee_percentage: u64,
	/// Escalation factor in percent (e.g. 110 = +10% per dispute).
	pub multiplier: u64,
	pub settlement_time: u64,
	pub exact_token1_report: U256,
	/// Fee paid to the initial reporter, in wei.
	pub fee: U256,
	pub escalation_halt: U256,
	pub dispute_delay: u64,
	/// Protocol fee charged on disputes, scaled by 1e7.
	pub protocol_fee: u64,
	pub settler_reward: U256,
	pub request_block: u64,
	/// `true` when durations are measured in seconds, `false` for blocks.
	pub time_type: bool,
}

/// Mutable state of a report, as returned by `reportStatus(id)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStatus {
	pub current_amount1: U256,
	pub current_amount2: U256,
	pub current_reporter: Address,
	pub initial_reporter: Address,
	pub report_timestamp: u64,
	pub settlement_timestamp: u64,
	pub price: U256,
	pub last_dispute_block: u64,
	pub is_settled: bool,
	pub dispute_occurred: bool,
	pub is_distributed: bool,
	pub initial_report_timestamp: u64,
	pub last_report_true_time: u64,
}

/// Callback and bookkeeping data of a report, as returned by `extraData(id)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraData {
	pub creator: Address,
	pub request_true_time: u64,
	pub callback_contract: Address,
	pub callback_selector: FixedBytes<4>,
	pub track_disputes: bool,
	pub num_reports: u64,
	pub callback_gas_limit: u64,
	pub keep_fee: bool,
	pub state_hash: B256,
}

/// Flat snapshot of one report.
///
/// This is the shape returned by the data provider's `getData(startId, endId)`
/// and can also be assembled from the three per-report views with
/// [`ReportRecord::from_parts`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
	pub report_id: u64,
	pub token1: Address,
	pub token2: Address,
	pub fee_percentage: u64,
	pub multiplier: u64,
	pub settlement_time: u64,
	pub exact_token1_report: U256,
	pub fee: U256,
	pub escalation_halt: U256,
	pub dispute_delay: u64,
	pub protocol_fee: u64,
	pub settler_reward: U256,
	pub request_block: u64,
	pub time_type: bool,
	pub current_amount1: U256,
	pub current_amount2: U256,
	pub current_reporter: Address,
	pub initial_reporter: Address,
	pub report_timestamp: u64,
	pub settlement_timestamp: u64,
	pub price: U256,
	pub last_dispute_block: u64,
	pub is_settled: bool,
	pub dispute_occurred: bool,
	pub is_distributed: bool,
	pub initial_report_timestamp: u64,
	pub last_report_true_time: u64,
	pub creator: Address,
	pub request_true_time: u64,
	pub callback_contract: Address,
	pub callback_selector: FixedBytes<4>,
	pub track_disputes: bool,
	pub num_reports: u64,
	pub callback_gas_limit: u64,
	pub keep_fee: bool,
	pub state_hash: B256,
}

impl ReportRecord {
	/// Assembles a record from the oracle's three per-report views.
	pub fn from_parts(report_id: u64, meta: ReportMeta, status: ReportStatus, extra: ExtraData) -> Self {
		Self {
			report_id,
			token1: meta.token1,
			token2: meta.token2,
			fee_percentage: meta.fee_percentage,
			multiplier: meta.multiplier,
			settlement_time: meta.settlement_time,
			exact_token1_report: meta.exact_token1_report,
			fee: meta.fee,
			escalation_halt: meta.escalation_halt,
			dispute_delay: meta.dispute_delay,
			protocol_fee: meta.protocol_fee,
			settler_reward: meta.settler_reward,
			request_block: meta.request_block,
			time_type: meta.time_type,
			current_amount1: status.current_amount1,
			current_amount2: status.current_amount2,
			current_reporter: status.current_reporter,
			initial_reporter: status.initial_reporter,
			report_timestamp: status.report_timestamp,
			settlement_timestamp: status.settlement_timestamp,
			price: status.price,
			last_dispute_block: status.last_dispute_block,
			is_settled: status.is_settled,
			dispute_occurred: status.dispute_occurred,
			is_distributed: status.is_distributed,
			initial_report_timestamp: status.initial_report_timestamp,
			last_report_true_time: status.last_report_true_time,
			creator: extra.creator,
			request_true_time: extra.request_true_time,
			callback_contract: extra.callback_contract,
			callback_selector: extra.callback_selector,
			track_disputes: extra.track_disputes,
			num_reports: extra.num_reports,
			callback_gas_limit: extra.callback_gas_limit,
			keep_fee: extra.keep_fee,
			state_hash: extra.state_hash,
		}
	}

	/// Returns true if any callback field is set.
	pub fn has_callback(&self) -> bool {
		self.callback_contract != Address::ZERO
			|| self.callback_selector != FixedBytes::<4>::ZERO
			|| self.callback_gas_limit != 0
	}

	/// Returns true once the report has been initialized with a first report.
	pub fn is_initialized(&self) -> bool {
		self.initial_report_timestamp > 0
	}

	/// Settlement deadline in the report's own time domain.
	pub fn deadline(&self) -> u64 {
		self.report_timestamp.saturating_add(self.settlement_time)
	}

	/// Earliest point at which a dispute is accepted, in the report's time domain.
	pub fn dispute_opens_at(&self) -> u64 {
		self.report_timestamp.saturating_add(self.dispute_delay)
	}

	/// Token pair in the order stored on chain.
	pub fn pair(&self) -> (Address, Address) {
		(self.token1, self.token2)
	}
}

/// Action a report currently qualifies for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Eligibility {
	/// Deadline reached; the report may be settled.
	SettleReady,
	/// Inside the dispute window; the report may be disputed.
	DisputeReady,
	/// No action is possible right now.
	Ineligible,
}

/// A report annotated with its deadline and current eligibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
	pub report: ReportRecord,
	/// Settlement deadline, in seconds or blocks depending on `report.time_type`.
	pub deadline: u64,
	pub eligibility: Eligibility,
}

impl Candidate {
	pub fn report_id(&self) -> u64 {
		self.report.report_id
	}

	pub fn is_settle_ready(&self) -> bool {
		self.eligibility == Eligibility::SettleReady
	}

	pub fn is_dispute_ready(&self) -> bool {
		self.eligibility == Eligibility::DisputeReady
	}
}

/// Chain clock read once per cycle.
///
/// Both domains are captured together so eligibility can be derived for every
/// report from a single consistent reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainClock {
	/// Timestamp of the latest block, in seconds.
	pub timestamp: u64,
	/// Block height used for block-based deadlines.
	pub block_number: u64,
}

impl ChainClock {
	/// Returns the "now" matching a report's time domain.
	pub fn now_for(&self, time_type: bool) -> u64 {
		if time_type {
			self.timestamp
		} else {
			self.block_number
		}
	}
}
