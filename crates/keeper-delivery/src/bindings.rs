//! Typed bindings for the oracle write surface.
//!
//! Every state-mutating call the keeper can make is declared here once and
//! encoded from an [`OracleCall`]. Receipts coming back from the settlement
//! beacon are decoded with the event types declared next to it.

use crate::DeliveryError;
use alloy_primitives::{Address, Bytes, Log, U256};
use alloy_sol_types::{sol, SolCall, SolEvent};
use keeper_types::{ContractAddresses, OracleCall};

sol! {
	/// Entry of `settleReports`.
	struct SettleId {
		uint256 reportId;
	}

	/// Entry of `safeSettleReports`.
	struct SettleWithHash {
		uint256 reportId;
		bytes32 stateHash;
	}

	/// Entry of `disputeReports`.
	struct DisputeData {
		uint256 reportId;
		address tokenToSwap;
		uint256 newAmount1;
		uint256 newAmount2;
		uint256 amt2Expected;
		bytes32 stateHash;
	}

	/// Entry of `submitInitialReports`.
	struct InitialReportData {
		uint256 reportId;
		uint256 amount1;
		uint256 amount2;
		bytes32 stateHash;
	}

	/// Entry of `requestPrices`.
	struct PriceRequestData {
		address token1Address;
		address token2Address;
		uint256 exactToken1Report;
		uint256 feePercentage;
		uint256 multiplier;
		uint256 settlementTime;
		uint256 escalationHalt;
		uint256 disputeDelay;
		uint256 protocolFee;
		uint256 settlerReward;
		bool timeType;
		address callbackContract;
		bytes4 callbackSelector;
		bool trackDisputes;
		uint256 callbackGasLimit;
		bool keepFee;
	}

	/// Write functions of the openOracle contract.
	interface IOpenOracle {
		function submitInitialReport(uint256 reportId, uint256 amount1, uint256 amount2, bytes32 stateHash) external payable;
		function disputeAndSwap(uint256 reportId, address tokenToSwap, uint256 newAmount1, uint256 newAmount2, uint256 amt2Expected, bytes32 stateHash) external;
	}

	/// Batch helper in front of the oracle.
	interface IOracleBatcher {
		function settleReports(SettleId[] settles) external;
		function safeSettleReports(SettleWithHash[] settles) external;
		function disputeReports(DisputeData[] disputes, uint256 batchAmount1, uint256 batchAmount2) external;
		function submitInitialReports(InitialReportData[] reports, uint256 batchAmount1, uint256 batchAmount2) external;
		function requestPrices(PriceRequestData[] priceRequests) external payable;
	}

	interface IERC20 {
		function approve(address spender, uint256 amount) external returns (bool);
		function allowance(address owner, address spender) external view returns (uint256);
		function balanceOf(address account) external view returns (uint256);
	}

	/// Settlement beacon paying out accumulated settler rewards.
	interface ISettlementBeacon {
		function freeMoneyLight() external;

		event SettlementBatch(uint256 reportsSettled, uint256 totalRewards, address indexed settler);
		event ReportSettled(uint256 indexed reportId, uint256 reward, address indexed settler);
	}
}

/// A call encoded for a specific contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCall {
	pub to: Address,
	pub data: Bytes,
	pub value: U256,
}

/// Encodes a typed oracle call against the configured contracts.
pub fn encode_call(
	call: &OracleCall,
	contracts: &ContractAddresses,
) -> Result<EncodedCall, DeliveryError> {
	let encoded = match call {
		OracleCall::SubmitInitialReport { entry, value } => EncodedCall {
			to: contracts.oracle,
			data: IOpenOracle::submitInitialReportCall {
				reportId: U256::from(entry.report_id),
				amount1: entry.amount1,
				amount2: entry.amount2,
				stateHash: entry.state_hash,
			}
			.abi_encode()
			.into(),
			value: *value,
		},
		OracleCall::DisputeAndSwap(entry) => EncodedCall {
			to: contracts.oracle,
			data: IOpenOracle::disputeAndSwapCall {
				reportId: U256::from(entry.report_id),
				tokenToSwap: entry.token_to_swap,
				newAmount1: entry.new_amount1,
				newAmount2: entry.new_amount2,
				amt2Expected: entry.amt2_expected,
				stateHash: entry.state_hash,
			}
			.abi_encode()
			.into(),
			value: U256::ZERO,
		},
		OracleCall::SettleReports(ids) => EncodedCall {
			to: contracts.batcher,
			data: IOracleBatcher::settleReportsCall {
				settles: ids
					.iter()
					.map(|id| SettleId {
						reportId: U256::from(*id),
					})
					.collect(),
			}
			.abi_encode()
			.into(),
			value: U256::ZERO,
		},
		OracleCall::SafeSettleReports(entries) => EncodedCall {
			to: contracts.batcher,
			data: IOracleBatcher::safeSettleReportsCall {
				settles: entries
					.iter()
					.map(|e| SettleWithHash {
						reportId: U256::from(e.report_id),
						stateHash: e.state_hash,
					})
					.collect(),
			}
			.abi_encode()
			.into(),
			value: U256::ZERO,
		},
		OracleCall::DisputeReports {
			entries,
			batch_amount1,
			batch_amount2,
		} => EncodedCall {
			to: contracts.batcher,
			data: IOracleBatcher::disputeReportsCall {
				disputes: entries
					.iter()
					.map(|e| DisputeData {
						reportId: U256::from(e.report_id),
						tokenToSwap: e.token_to_swap,
						newAmount1: e.new_amount1,
						newAmount2: e.new_amount2,
						amt2Expected: e.amt2_expected,
						stateHash: e.state_hash,
					})
					.collect(),
				batchAmount1: *batch_amount1,
				batchAmount2: *batch_amount2,
			}
			.abi_encode()
			.into(),
			value: U256::ZERO,
		},
		OracleCall::SubmitInitialReports {
			entries,
			batch_amount1,
			batch_amount2,
		} => EncodedCall {
			to: contracts.batcher,
			data: IOracleBatcher::submitInitialReportsCall {
				reports: entries
					.iter()
					.map(|e| InitialReportData {
						reportId: U256::from(e.report_id),
						amount1: e.amount1,
						amount2: e.amount2,
						stateHash: e.state_hash,
					})
					.collect(),
				batchAmount1: *batch_amount1,
				batchAmount2: *batch_amount2,
			}
			.abi_encode()
			.into(),
			value: U256::ZERO,
		},
		OracleCall::RequestPrices { requests, value } => EncodedCall {
			to: contracts.batcher,
			data: IOracleBatcher::requestPricesCall {
				priceRequests: requests
					.iter()
					.map(|r| PriceRequestData {
						token1Address: r.token1,
						token2Address: r.token2,
						exactToken1Report: r.exact_token1_report,
						feePercentage: U256::from(r.fee_percentage),
						multiplier: U256::from(r.multiplier),
						settlementTime: U256::from(r.settlement_time),
						escalationHalt: r.escalation_halt,
						disputeDelay: U256::from(r.dispute_delay),
						protocolFee: U256::from(r.protocol_fee),
						settlerReward: r.settler_reward,
						timeType: r.time_type,
						callbackContract: r.callback_contract,
						callbackSelector: r.callback_selector,
						trackDisputes: r.track_disputes,
						callbackGasLimit: U256::from(r.callback_gas_limit),
						keepFee: r.keep_fee,
					})
					.collect(),
			}
			.abi_encode()
			.into(),
			value: *value,
		},
		OracleCall::Approve {
			token,
			spender,
			amount,
		} => EncodedCall {
			to: *token,
			data: IERC20::approveCall {
				spender: *spender,
				amount: *amount,
			}
			.abi_encode()
			.into(),
			value: U256::ZERO,
		},
		OracleCall::FreeMoneyLight => {
			let beacon = contracts.beacon.ok_or_else(|| {
				DeliveryError::InvalidConfig("No settlement beacon address configured".into())
			})?;
			EncodedCall {
				to: beacon,
				data: ISettlementBeacon::freeMoneyLightCall {}.abi_encode().into(),
				value: U256::ZERO,
			}
		},
	};

	Ok(encoded)
}

/// Payouts found in a settlement receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementSummary {
	/// `(report_id, reward)` for every `ReportSettled` log.
	pub settled: Vec<(u64, U256)>,
	/// Count from the `SettlementBatch` log, if one was emitted.
	pub reports_settled: Option<u64>,
	/// Total rewards from the `SettlementBatch` log.
	pub total_rewards: U256,
}

/// Decodes beacon settlement logs out of a receipt. Unrelated logs are skipped.
pub fn decode_settlement_logs(logs: &[Log]) -> SettlementSummary {
	let mut summary = SettlementSummary::default();

	for log in logs {
		match log.topics().first() {
			Some(topic) if *topic == ISettlementBeacon::ReportSettled::SIGNATURE_HASH => {
				match ISettlementBeacon::ReportSettled::decode_log(log, true) {
					Ok(event) => summary.settled.push((
						keeper_types::saturating_u64(event.reportId),
						event.reward,
					)),
					Err(e) => tracing::debug!(error = %e, "Skipping malformed ReportSettled log"),
				}
			},
			Some(topic) if *topic == ISettlementBeacon::SettlementBatch::SIGNATURE_HASH => {
				match ISettlementBeacon::SettlementBatch::decode_log(log, true) {
					Ok(event) => {
						summary.reports_settled =
							Some(keeper_types::saturating_u64(event.reportsSettled));
						summary.total_rewards = event.totalRewards;
					},
					Err(e) => tracing::debug!(error = %e, "Skipping malformed SettlementBatch log"),
				}
			},
			_ => {},
		}
	}

	summary
}

#[cfg(test)]
mod tests {
	use super::*;
	use keeper_types::{InitialReportEntry, SettleEntry, B256};

	fn contracts() -> ContractAddresses {
		ContractAddresses {
			oracle: Address::repeat_byte(0x11),
			batcher: Address::repeat_byte(0x22),
			data_provider: Address::repeat_byte(0x33),
			beacon: None,
		}
	}

	#[test]
	fn test_safe_settle_goes_to_batcher() {
		let call = OracleCall::SafeSettleReports(vec![SettleEntry {
			report_id: 1300,
			state_hash: B256::repeat_byte(0xaa),
		}]);
		let encoded = encode_call(&call, &contracts()).unwrap();

		assert_eq!(encoded.to, Address::repeat_byte(0x22));
		assert_eq!(
			&encoded.data[..4],
			IOracleBatcher::safeSettleReportsCall::SELECTOR.as_slice()
		);
		let decoded = IOracleBatcher::safeSettleReportsCall::abi_decode(&encoded.data, true).unwrap();
		assert_eq!(decoded.settles.len(), 1);
		assert_eq!(decoded.settles[0].reportId, U256::from(1300));
		assert_eq!(decoded.settles[0].stateHash, B256::repeat_byte(0xaa));
	}

	#[test]
	fn test_initial_report_carries_value() {
		let call = OracleCall::SubmitInitialReport {
			entry: InitialReportEntry {
				report_id: 7,
				amount1: U256::from(10),
				amount2: U256::from(20),
				state_hash: B256::repeat_byte(1),
			},
			value: U256::from(5),
		};
		let encoded = encode_call(&call, &contracts()).unwrap();
		assert_eq!(encoded.to, Address::repeat_byte(0x11));
		assert_eq!(encoded.value, U256::from(5));
	}

	#[test]
	fn test_free_money_requires_beacon() {
		assert!(matches!(
			encode_call(&OracleCall::FreeMoneyLight, &contracts()),
			Err(DeliveryError::InvalidConfig(_))
		));

		let mut with_beacon = contracts();
		with_beacon.beacon = Some(Address::repeat_byte(0x44));
		let encoded = encode_call(&OracleCall::FreeMoneyLight, &with_beacon).unwrap();
		assert_eq!(encoded.to, Address::repeat_byte(0x44));
		assert_eq!(encoded.data.len(), 4);
	}

	#[test]
	fn test_decode_settlement_logs() {
		let beacon = Address::repeat_byte(0x44);
		let settler = Address::repeat_byte(0x55);
		let settled = ISettlementBeacon::ReportSettled {
			reportId: U256::from(42),
			reward: U256::from(1_000),
			settler,
		};
		let batch = ISettlementBeacon::SettlementBatch {
			reportsSettled: U256::from(1),
			totalRewards: U256::from(1_000),
			settler,
		};
		let logs = vec![
			Log {
				address: beacon,
				data: settled.encode_log_data(),
			},
			Log {
				address: beacon,
				data: batch.encode_log_data(),
			},
			Log::new_unchecked(Address::ZERO, vec![], Bytes::new()),
		];

		let summary = decode_settlement_logs(&logs);
		assert_eq!(summary.settled, vec![(42, U256::from(1_000))]);
		assert_eq!(summary.reports_settled, Some(1));
		assert_eq!(summary.total_rewards, U256::from(1_000));
	}
}
