//! Candidate selection and report policy gates.
//!
//! [`select`] is a pure function over a snapshot of reports and one reading of
//! the chain clock. The policy gates decide whether a selected report is worth
//! the keeper's capital; a failed gate is a [`Rejection`], logged and never
//! retried.

use keeper_config::{DisputeConfig, InitialReportConfig, PolicyConfig};
use keeper_types::{Address, Candidate, ChainClock, Eligibility, ReportRecord, TokenPair, B256, U256};
use thiserror::Error;

/// Annotates every live report with its deadline and eligibility.
///
/// Distributed reports, reports without a state hash and reports that never
/// received an initial report are left out. Input order is preserved. Each
/// report is judged in its own time domain: seconds when `time_type` is set,
/// block height otherwise.
pub fn select(reports: &[ReportRecord], clock: &ChainClock) -> Vec<Candidate> {
	reports
		.iter()
		.filter(|report| {
			!report.is_distributed && report.state_hash != B256::ZERO && report.is_initialized()
		})
		.map(|report| {
			let now = clock.now_for(report.time_type);
			let deadline = report.deadline();
			let eligibility = if report.is_settled {
				Eligibility::Ineligible
			} else if now >= deadline {
				Eligibility::SettleReady
			} else if now >= report.dispute_opens_at() {
				Eligibility::DisputeReady
			} else {
				Eligibility::Ineligible
			};

			Candidate {
				report: report.clone(),
				deadline,
				eligibility,
			}
		})
		.collect()
}

/// Reason a report was not acted on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
	#[error("token pair {token1}/{token2} is not allowed")]
	TokenPairNotAllowed { token1: Address, token2: Address },
	#[error("fee {fee} above maximum {max}")]
	FeeTooHigh { fee: u64, max: u64 },
	#[error("multiplier {multiplier} outside [{min}, {max}]")]
	MultiplierOutOfRange { multiplier: u64, min: u64, max: u64 },
	#[error("exactToken1Report {amount} above maximum {max}")]
	ExposureTooHigh { amount: U256, max: U256 },
	#[error("settlement time {settlement_time} above maximum {max}")]
	SettlementTimeTooLong { settlement_time: u64, max: u64 },
	#[error("protocol fee {fee} above maximum {max}")]
	ProtocolFeeTooHigh { fee: u64, max: u64 },
	#[error("settler reward {reward} wei below minimum {min}")]
	SettlerRewardTooLow { reward: U256, min: U256 },
	#[error("callback not allowed")]
	CallbackNotAllowed,
	#[error("keepFee must be set")]
	KeepFeeRequired,
	#[error("report already has an initial report")]
	AlreadyReported,
	#[error("report is {0:?}")]
	NotEligible(Eligibility),
	#[error("dispute window opens at {opens_at}, now {now}")]
	DisputeWindowNotOpen { opens_at: u64, now: u64 },
	#[error("fee {fee} wei below required {required}")]
	Unprofitable { fee: U256, required: U256 },
}

impl Rejection {
	/// The report may qualify later without any change on chain.
	pub fn is_deferred(&self) -> bool {
		matches!(self, Rejection::DisputeWindowNotOpen { .. })
	}
}

/// Filters applied before disputing a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisputePolicy {
	pub token1: Address,
	pub token2: Address,
	/// Fee ceiling on the 1e7 scale.
	pub max_fee: u64,
	pub min_multiplier: u64,
	pub max_multiplier: u64,
	pub max_exposure: U256,
	pub max_settlement_time: u64,
	pub max_protocol_fee: u64,
	pub min_settler_reward: U256,
}

impl DisputePolicy {
	pub fn from_config(policy: &PolicyConfig, dispute: &DisputeConfig, pair: &TokenPair) -> Self {
		Self::with_multipliers(policy, pair, dispute.min_multiplier, dispute.max_multiplier)
	}

	fn with_multipliers(
		policy: &PolicyConfig,
		pair: &TokenPair,
		min_multiplier: u64,
		max_multiplier: u64,
	) -> Self {
		Self {
			token1: pair.token1.address,
			token2: pair.token2.address,
			max_fee: policy.max_fee,
			min_multiplier,
			max_multiplier,
			max_exposure: U256::from(policy.max_exposure),
			max_settlement_time: policy.max_settlement_time,
			max_protocol_fee: policy.max_protocol_fee,
			min_settler_reward: U256::from(policy.min_settler_reward_wei),
		}
	}

	/// Checks every filter, returning the first one that fails.
	pub fn check(&self, report: &ReportRecord) -> Result<(), Rejection> {
		if report.token1 != self.token1 || report.token2 != self.token2 {
			return Err(Rejection::TokenPairNotAllowed {
				token1: report.token1,
				token2: report.token2,
			});
		}
		if report.fee_percentage > self.max_fee {
			return Err(Rejection::FeeTooHigh {
				fee: report.fee_percentage,
				max: self.max_fee,
			});
		}
		if report.multiplier < self.min_multiplier || report.multiplier > self.max_multiplier {
			return Err(Rejection::MultiplierOutOfRange {
				multiplier: report.multiplier,
				min: self.min_multiplier,
				max: self.max_multiplier,
			});
		}
		if report.exact_token1_report > self.max_exposure {
			return Err(Rejection::ExposureTooHigh {
				amount: report.exact_token1_report,
				max: self.max_exposure,
			});
		}
		if report.settlement_time > self.max_settlement_time {
			return Err(Rejection::SettlementTimeTooLong {
				settlement_time: report.settlement_time,
				max: self.max_settlement_time,
			});
		}
		if report.protocol_fee > self.max_protocol_fee {
			return Err(Rejection::ProtocolFeeTooHigh {
				fee: report.protocol_fee,
				max: self.max_protocol_fee,
			});
		}
		if report.settler_reward < self.min_settler_reward {
			return Err(Rejection::SettlerRewardTooLow {
				reward: report.settler_reward,
				min: self.min_settler_reward,
			});
		}
		if report.has_callback() {
			return Err(Rejection::CallbackNotAllowed);
		}
		Ok(())
	}
}

/// Filters applied before submitting a first report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialReportPolicy {
	pub base: DisputePolicy,
	pub require_keep_fee: bool,
	/// Minimum fee relative to `exactToken1Report`, in basis points.
	pub min_fee_bps: u64,
	/// Safety factor on the simulated gas cost, in percent.
	pub gas_cost_percent: u64,
}

impl InitialReportPolicy {
	pub fn from_config(
		policy: &PolicyConfig,
		initial: &InitialReportConfig,
		pair: &TokenPair,
	) -> Self {
		Self {
			base: DisputePolicy::with_multipliers(
				policy,
				pair,
				initial.min_multiplier,
				initial.max_multiplier,
			),
			require_keep_fee: initial.require_keep_fee,
			min_fee_bps: initial.min_fee_bps,
			gas_cost_percent: (initial.gas_cost_multiplier * 100.0).round() as u64,
		}
	}

	pub fn check(&self, report: &ReportRecord) -> Result<(), Rejection> {
		if report.is_initialized() {
			return Err(Rejection::AlreadyReported);
		}
		self.base.check(report)?;
		if self.require_keep_fee && !report.keep_fee {
			return Err(Rejection::KeepFeeRequired);
		}
		Ok(())
	}

	/// Smallest fee worth reporting for: the larger of the basis-point floor on
	/// `exactToken1Report` and the inflated gas cost.
	pub fn required_fee(&self, exact_token1_report: U256, gas_estimate: u64, gas_price: u128) -> U256 {
		let floor = exact_token1_report * U256::from(self.min_fee_bps) / U256::from(10_000u64);
		let gas_cost = U256::from(gas_estimate) * U256::from(gas_price)
			* U256::from(self.gas_cost_percent)
			/ U256::from(100u64);
		floor.max(gas_cost)
	}

	pub fn check_profitable(
		&self,
		report: &ReportRecord,
		gas_estimate: u64,
		gas_price: u128,
	) -> Result<(), Rejection> {
		let required = self.required_fee(report.exact_token1_report, gas_estimate, gas_price);
		if report.fee < required {
			return Err(Rejection::Unprofitable {
				fee: report.fee,
				required,
			});
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{pair, report};
	use keeper_types::FixedBytes;

	fn clock() -> ChainClock {
		ChainClock {
			timestamp: 1_000,
			block_number: 50,
		}
	}

	#[test]
	fn test_distributed_and_invalid_reports_excluded() {
		let mut distributed = report(1);
		distributed.is_distributed = true;
		let mut no_hash = report(2);
		no_hash.state_hash = B256::ZERO;
		let mut uninitialized = report(3);
		uninitialized.initial_report_timestamp = 0;
		let live = report(4);

		let candidates = select(&[distributed, no_hash, uninitialized, live], &clock());
		assert_eq!(candidates.len(), 1);
		assert_eq!(candidates[0].report_id(), 4);
	}

	#[test]
	fn test_eligibility_windows() {
		// dispute delay 10, settlement time 30
		let mut dispute = report(1);
		dispute.report_timestamp = 975;
		let mut settle = report(2);
		settle.report_timestamp = 970;
		let mut too_early = report(3);
		too_early.report_timestamp = 995;
		let mut settled = report(4);
		settled.report_timestamp = 100;
		settled.is_settled = true;

		let candidates = select(&[dispute, settle, too_early, settled], &clock());
		let eligibility: Vec<_> = candidates.iter().map(|c| c.eligibility).collect();
		assert_eq!(
			eligibility,
			vec![
				Eligibility::DisputeReady,
				Eligibility::SettleReady,
				Eligibility::Ineligible,
				Eligibility::Ineligible,
			]
		);
		assert_eq!(candidates[1].deadline, 1_000);
	}

	#[test]
	fn test_time_domains_never_mixed() {
		// Same numbers, different domains. Seconds say "due", blocks say "not yet".
		let mut by_time = report(1);
		by_time.time_type = true;
		by_time.report_timestamp = 900;
		let mut by_block = report(2);
		by_block.time_type = false;
		by_block.report_timestamp = 900;

		let candidates = select(&[by_time, by_block], &clock());
		assert_eq!(candidates[0].eligibility, Eligibility::SettleReady);
		assert_eq!(candidates[1].eligibility, Eligibility::Ineligible);

		let mut by_block = report(3);
		by_block.time_type = false;
		by_block.report_timestamp = 0;
		let candidates = select(&[by_block], &clock());
		assert_eq!(candidates[0].eligibility, Eligibility::SettleReady);
	}

	#[test]
	fn test_select_is_idempotent() {
		let reports: Vec<_> = (1..=20)
			.map(|id| {
				let mut r = report(id);
				r.report_timestamp = 900 + id * 5;
				r.time_type = id % 3 != 0;
				r.is_settled = id % 7 == 0;
				r
			})
			.collect();

		let first = select(&reports, &clock());
		let second = select(&reports, &clock());
		assert_eq!(first, second);
		let ids: Vec<_> = first.iter().map(|c| c.report_id()).collect();
		let mut sorted = ids.clone();
		sorted.sort();
		assert_eq!(ids, sorted);
	}

	#[test]
	fn test_dispute_policy_gates() {
		let policy = DisputePolicy::from_config(
			&PolicyConfig::default(),
			&DisputeConfig::default(),
			&pair(),
		);
		let good = report(1);
		assert_eq!(policy.check(&good), Ok(()));

		let mut wrong_pair = good.clone();
		wrong_pair.token2 = Address::repeat_byte(0x99);
		assert!(matches!(
			policy.check(&wrong_pair),
			Err(Rejection::TokenPairNotAllowed { .. })
		));

		let mut high_fee = good.clone();
		high_fee.fee_percentage = 5_001;
		assert!(matches!(policy.check(&high_fee), Err(Rejection::FeeTooHigh { .. })));

		let mut low_multiplier = good.clone();
		low_multiplier.multiplier = 100;
		assert!(matches!(
			policy.check(&low_multiplier),
			Err(Rejection::MultiplierOutOfRange { .. })
		));

		let mut exposed = good.clone();
		exposed.exact_token1_report = U256::from(60_000_000_000_000_000u64);
		assert!(matches!(policy.check(&exposed), Err(Rejection::ExposureTooHigh { .. })));

		let mut slow = good.clone();
		slow.settlement_time = 31;
		assert!(matches!(
			policy.check(&slow),
			Err(Rejection::SettlementTimeTooLong { .. })
		));

		let mut protocol = good.clone();
		protocol.protocol_fee = 1_002;
		assert!(matches!(
			policy.check(&protocol),
			Err(Rejection::ProtocolFeeTooHigh { .. })
		));

		let mut cheap = good.clone();
		cheap.settler_reward = U256::from(1u64);
		assert!(matches!(
			policy.check(&cheap),
			Err(Rejection::SettlerRewardTooLow { .. })
		));

		let mut callback = good.clone();
		callback.callback_selector = FixedBytes::<4>::from([0xde, 0xad, 0xbe, 0xef]);
		assert_eq!(policy.check(&callback), Err(Rejection::CallbackNotAllowed));
	}

	#[test]
	fn test_initial_report_policy() {
		let policy = InitialReportPolicy::from_config(
			&PolicyConfig::default(),
			&InitialReportConfig::default(),
			&pair(),
		);

		let mut fresh = report(1);
		fresh.initial_report_timestamp = 0;
		fresh.multiplier = 110;
		fresh.keep_fee = true;
		assert_eq!(policy.check(&fresh), Ok(()));

		assert_eq!(policy.check(&report(2)), Err(Rejection::AlreadyReported));

		let mut no_keep_fee = fresh.clone();
		no_keep_fee.keep_fee = false;
		assert_eq!(policy.check(&no_keep_fee), Err(Rejection::KeepFeeRequired));

		let mut low_multiplier = fresh.clone();
		low_multiplier.multiplier = 105;
		assert!(matches!(
			policy.check(&low_multiplier),
			Err(Rejection::MultiplierOutOfRange { min: 109, .. })
		));
	}

	#[test]
	fn test_initial_report_profitability() {
		let policy = InitialReportPolicy::from_config(
			&PolicyConfig::default(),
			&InitialReportConfig::default(),
			&pair(),
		);
		let exact = U256::from(10_000_000_000_000_000u64); // 0.01 WETH

		// Gas dominates: 200k gas at 0.01 gwei, times 1.5.
		assert_eq!(
			policy.required_fee(exact, 200_000, 10_000_000),
			U256::from(3_000_000_000_000u64)
		);
		// Basis-point floor dominates when gas is free.
		assert_eq!(
			policy.required_fee(exact, 200_000, 0),
			U256::from(1_000_000_000_000u64)
		);

		let mut fresh = report(1);
		fresh.exact_token1_report = exact;
		fresh.fee = U256::from(2_999_999_999_999u64);
		assert!(matches!(
			policy.check_profitable(&fresh, 200_000, 10_000_000),
			Err(Rejection::Unprofitable { .. })
		));
		fresh.fee = U256::from(3_000_000_000_000u64);
		assert_eq!(policy.check_profitable(&fresh, 200_000, 10_000_000), Ok(()));
	}
}
