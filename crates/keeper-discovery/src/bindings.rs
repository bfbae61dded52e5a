//! Typed bindings for the oracle read surface and its events.
//!
//! The data provider's `getData` returns a flat 36-word record per report.
//! It is declared here as two nested static structs, which encode to the same
//! bytes as the flat tuple.

use alloy_primitives::{Log, B256};
use alloy_sol_types::{sol, SolEvent};
use keeper_types::{saturating_u64, OracleEvent, ReportRecord};

sol! {
	/// First half of the data provider record.
	struct ReportHead {
		uint256 reportId;
		address token1;
		address token2;
		uint256 feePercentage;
		uint256 multiplier;
		uint256 settlementTime;
		uint256 exactToken1Report;
		uint256 fee;
		uint256 escalationHalt;
		uint256 disputeDelay;
		uint256 protocolFee;
		uint256 settlerReward;
		uint256 requestBlock;
		bool timeType;
		uint256 currentAmount1;
		uint256 currentAmount2;
		address currentReporter;
		address initialReporter;
	}

	/// Second half of the data provider record.
	struct ReportTail {
		uint256 reportTimestamp;
		uint256 settlementTimestamp;
		uint256 price;
		uint256 lastDisputeBlock;
		bool isSettled;
		bool disputeOccurred;
		bool isDistributed;
		uint256 initialReportTimestamp;
		uint256 lastReportTrueTime;
		address creator;
		uint256 requestTrueTime;
		address callbackContract;
		bytes4 callbackSelector;
		bool trackDisputes;
		uint256 numReports;
		uint256 callbackGasLimit;
		bool keepFee;
		bytes32 stateHash;
	}

	struct ReportSnapshot {
		ReportHead head;
		ReportTail tail;
	}

	interface IOracleDataProvider {
		function getData(uint256 startId, uint256 endId) external view returns (ReportSnapshot[] memory);
	}

	interface IOpenOracle {
		function reportMeta(uint256 reportId) external view returns (address token1, address token2, uint256 feePercentage, uint256 multiplier, uint256 settlementTime, uint256 exactToken1Report, uint256 fee, uint256 escalationHalt, uint256 disputeDelay, uint256 protocolFee, uint256 settlerReward, uint256 requestBlock, bool timeType);
		function reportStatus(uint256 reportId) external view returns (uint256 currentAmount1, uint256 currentAmount2, address currentReporter, address initialReporter, uint256 reportTimestamp, uint256 settlementTimestamp, uint256 price, uint256 lastDisputeBlock, bool isSettled, bool disputeOccurred, bool isDistributed, uint256 initialReportTimestamp, uint256 lastReportTrueTime);
		function extraData(uint256 reportId) external view returns (address creator, uint256 requestTrueTime, address callbackContract, bytes4 callbackSelector, bool trackDisputes, uint256 numReports, uint256 callbackGasLimit, bool keepFee, bytes32 stateHash);
		function nextReportId() external view returns (uint256);

		event ReportInstanceCreated(uint256 indexed reportId, address indexed token1Address, address indexed token2Address, uint256 feePercentage, uint256 multiplier, uint256 exactToken1Report, uint256 ethFee, address creator, uint256 settlementTime, uint256 escalationHalt, uint256 disputeDelay, uint256 protocolFee, uint256 settlerReward, bool timeType, address callbackContract, bytes4 callbackSelector, bool trackDisputes, uint256 callbackGasLimit, bool keepFee, bytes32 stateHash);
		event InitialReportSubmitted(uint256 indexed reportId, address reporter, uint256 amount1, uint256 amount2, address indexed token1Address, address indexed token2Address, uint256 swapFee, uint256 protocolFee, uint256 settlementTime, uint256 disputeDelay, uint256 escalationHalt, bool timeType, address callbackContract, bytes4 callbackSelector, bool trackDisputes, uint256 callbackGasLimit, bytes32 stateHash);
		event ReportDisputed(uint256 indexed reportId, address disputer, uint256 newAmount1, uint256 newAmount2, address indexed token1Address, address indexed token2Address, uint256 swapFee, uint256 protocolFee, uint256 settlementTime, uint256 disputeDelay, uint256 escalationHalt, bool timeType, address callbackContract, bytes4 callbackSelector, bool trackDisputes, uint256 callbackGasLimit, bytes32 stateHash);
	}

	interface ISettlementBeacon {
		event SettlementBatch(uint256 reportsSettled, uint256 totalRewards, address indexed settler);
	}

	/// Arbitrum system precompile at `0x64`.
	interface IArbSys {
		function arbBlockNumber() external view returns (uint256);
	}
}

impl From<ReportSnapshot> for ReportRecord {
	fn from(snapshot: ReportSnapshot) -> Self {
		let ReportSnapshot { head, tail } = snapshot;
		ReportRecord {
			report_id: saturating_u64(head.reportId),
			token1: head.token1,
			token2: head.token2,
			fee_percentage: saturating_u64(head.feePercentage),
			multiplier: saturating_u64(head.multiplier),
			settlement_time: saturating_u64(head.settlementTime),
			exact_token1_report: head.exactToken1Report,
			fee: head.fee,
			escalation_halt: head.escalationHalt,
			dispute_delay: saturating_u64(head.disputeDelay),
			protocol_fee: saturating_u64(head.protocolFee),
			settler_reward: head.settlerReward,
			request_block: saturating_u64(head.requestBlock),
			time_type: head.timeType,
			current_amount1: head.currentAmount1,
			current_amount2: head.currentAmount2,
			current_reporter: head.currentReporter,
			initial_reporter: head.initialReporter,
			report_timestamp: saturating_u64(tail.reportTimestamp),
			settlement_timestamp: saturating_u64(tail.settlementTimestamp),
			price: tail.price,
			last_dispute_block: saturating_u64(tail.lastDisputeBlock),
			is_settled: tail.isSettled,
			dispute_occurred: tail.disputeOccurred,
			is_distributed: tail.isDistributed,
			initial_report_timestamp: saturating_u64(tail.initialReportTimestamp),
			last_report_true_time: saturating_u64(tail.lastReportTrueTime),
			creator: tail.creator,
			request_true_time: saturating_u64(tail.requestTrueTime),
			callback_contract: tail.callbackContract,
			callback_selector: tail.callbackSelector,
			track_disputes: tail.trackDisputes,
			num_reports: saturating_u64(tail.numReports),
			callback_gas_limit: saturating_u64(tail.callbackGasLimit),
			keep_fee: tail.keepFee,
			state_hash: tail.stateHash,
		}
	}
}

/// Decodes a log from the oracle or the beacon into an [`OracleEvent`].
///
/// Returns `None` for logs with an unknown signature or a malformed body.
pub fn decode_event(log: &Log, block_number: u64) -> Option<OracleEvent> {
	let topic = *log.topics().first()?;

	if topic == IOpenOracle::ReportInstanceCreated::SIGNATURE_HASH {
		let event = IOpenOracle::ReportInstanceCreated::decode_log(log, true).ok()?;
		Some(OracleEvent::ReportInstanceCreated {
			report_id: saturating_u64(event.reportId),
			token1: event.token1Address,
			token2: event.token2Address,
			exact_token1_report: event.exactToken1Report,
			fee: event.ethFee,
			block_number,
		})
	} else if topic == IOpenOracle::InitialReportSubmitted::SIGNATURE_HASH {
		let event = IOpenOracle::InitialReportSubmitted::decode_log(log, true).ok()?;
		Some(OracleEvent::InitialReportSubmitted {
			report_id: saturating_u64(event.reportId),
			reporter: event.reporter,
			amount1: event.amount1,
			amount2: event.amount2,
			block_number,
		})
	} else if topic == IOpenOracle::ReportDisputed::SIGNATURE_HASH {
		let event = IOpenOracle::ReportDisputed::decode_log(log, true).ok()?;
		Some(OracleEvent::ReportDisputed {
			report_id: saturating_u64(event.reportId),
			disputer: event.disputer,
			amount1: event.newAmount1,
			amount2: event.newAmount2,
			block_number,
		})
	} else if topic == ISettlementBeacon::SettlementBatch::SIGNATURE_HASH {
		let event = ISettlementBeacon::SettlementBatch::decode_log(log, true).ok()?;
		Some(OracleEvent::SettlementBatch {
			reports_settled: saturating_u64(event.reportsSettled),
			total_rewards: event.totalRewards,
			settler: event.settler,
			block_number,
		})
	} else {
		None
	}
}

/// Event signatures the poller subscribes to.
pub fn event_signatures() -> Vec<B256> {
	vec![
		IOpenOracle::ReportInstanceCreated::SIGNATURE_HASH,
		IOpenOracle::InitialReportSubmitted::SIGNATURE_HASH,
		IOpenOracle::ReportDisputed::SIGNATURE_HASH,
		ISettlementBeacon::SettlementBatch::SIGNATURE_HASH,
	]
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{Address, FixedBytes, U256};
	use alloy_sol_types::SolValue;

	fn snapshot(id: u64) -> ReportSnapshot {
		ReportSnapshot {
			head: ReportHead {
				reportId: U256::from(id),
				token1: Address::repeat_byte(0xe1),
				token2: Address::repeat_byte(0xe2),
				feePercentage: U256::from(3_000),
				multiplier: U256::from(110),
				settlementTime: U256::from(30),
				exactToken1Report: U256::from(10u64.pow(16)),
				fee: U256::from(10u64.pow(13)),
				escalationHalt: U256::from(10u64.pow(18)),
				disputeDelay: U256::from(5),
				protocolFee: U256::from(1_000),
				settlerReward: U256::from(10u64.pow(14)),
				requestBlock: U256::from(250_000_000u64),
				timeType: true,
				currentAmount1: U256::from(10u64.pow(16)),
				currentAmount2: U256::from(25_000_000u64),
				currentReporter: Address::repeat_byte(0x01),
				initialReporter: Address::repeat_byte(0x01),
			},
			tail: ReportTail {
				reportTimestamp: U256::from(1_700_000_000u64),
				settlementTimestamp: U256::ZERO,
				price: U256::ZERO,
				lastDisputeBlock: U256::ZERO,
				isSettled: false,
				disputeOccurred: false,
				isDistributed: false,
				initialReportTimestamp: U256::from(1_700_000_000u64),
				lastReportTrueTime: U256::from(1_700_000_000u64),
				creator: Address::repeat_byte(0x02),
				requestTrueTime: U256::from(1_699_999_990u64),
				callbackContract: Address::ZERO,
				callbackSelector: FixedBytes::ZERO,
				trackDisputes: false,
				numReports: U256::from(1),
				callbackGasLimit: U256::ZERO,
				keepFee: true,
				stateHash: B256::repeat_byte(0xab),
			},
		}
	}

	#[test]
	fn test_nested_snapshot_has_flat_layout() {
		// 36 static words per record, no per-record offsets.
		let encoded = vec![snapshot(1), snapshot(2)].abi_encode();
		assert_eq!(encoded.len(), 32 + 32 + 2 * 36 * 32);
	}

	#[test]
	fn test_snapshot_into_record() {
		let record = ReportRecord::from(snapshot(1300));
		assert_eq!(record.report_id, 1300);
		assert_eq!(record.multiplier, 110);
		assert_eq!(record.deadline(), 1_700_000_030);
		assert!(record.keep_fee);
		assert!(!record.has_callback());
		assert_eq!(record.state_hash, B256::repeat_byte(0xab));
	}

	#[test]
	fn test_decode_dispute_event() {
		let event = IOpenOracle::ReportDisputed {
			reportId: U256::from(77),
			disputer: Address::repeat_byte(0x09),
			newAmount1: U256::from(11),
			newAmount2: U256::from(22),
			token1Address: Address::repeat_byte(0xe1),
			token2Address: Address::repeat_byte(0xe2),
			swapFee: U256::from(3_000),
			protocolFee: U256::from(1_000),
			settlementTime: U256::from(30),
			disputeDelay: U256::from(5),
			escalationHalt: U256::from(1),
			timeType: true,
			callbackContract: Address::ZERO,
			callbackSelector: FixedBytes::ZERO,
			trackDisputes: false,
			callbackGasLimit: U256::ZERO,
			stateHash: B256::ZERO,
		};
		let log = Log {
			address: Address::repeat_byte(0x11),
			data: event.encode_log_data(),
		};

		let decoded = decode_event(&log, 500).unwrap();
		assert_eq!(
			decoded,
			OracleEvent::ReportDisputed {
				report_id: 77,
				disputer: Address::repeat_byte(0x09),
				amount1: U256::from(11),
				amount2: U256::from(22),
				block_number: 500,
			}
		);
	}

	#[test]
	fn test_unknown_log_is_skipped() {
		let log = Log::new_unchecked(Address::ZERO, vec![B256::repeat_byte(0xff)], Default::default());
		assert!(decode_event(&log, 1).is_none());
	}
}
