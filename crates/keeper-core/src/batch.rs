//! Gas-bounded settlement batches.

use crate::gas::buffered;
use crate::retry::{retry, RetryDecision, RetryPolicy};
use keeper_config::SettlementConfig;
use keeper_delivery::DeliveryError;
use keeper_types::{Candidate, GasPlan, GasSource, OracleCall, SettleBatch, SettleEntry};
use std::future::Future;

/// Builds `safeSettleReports` batches from selected candidates.
#[derive(Debug, Clone)]
pub struct BatchBuilder {
	max_batch_size: usize,
	gas_per_report: u64,
	max_gas_limit: u64,
	gas_buffer_percent: u64,
	retry: RetryPolicy,
}

impl BatchBuilder {
	pub fn new(settlement: &SettlementConfig, retry: RetryPolicy) -> Self {
		Self {
			max_batch_size: settlement.max_batch_size,
			gas_per_report: settlement.gas_per_report,
			max_gas_limit: settlement.max_gas_limit,
			gas_buffer_percent: settlement.gas_buffer_percent,
			retry,
		}
	}

	/// Largest batch the static per-report figure allows under the gas ceiling.
	fn shrink_target(&self) -> usize {
		(self.max_gas_limit / self.gas_per_report.max(1)) as usize
	}

	/// Takes up to `max_batch_size` settle-ready candidates, in order, and plans
	/// gas for them.
	///
	/// The simulation goes through the retry policy; once it is exhausted the
	/// plan falls back to `gas_per_report * len` without a buffer. A buffered
	/// estimate above the ceiling shrinks the batch to
	/// `max_gas_limit / gas_per_report` entries, which is computed from the static
	/// figure rather than the estimate and so may not shrink at all. The gas
	/// limit attached to the plan is clamped to the ceiling either way.
	pub async fn build<F, Fut>(
		&self,
		candidates: &[Candidate],
		gas_price: u128,
		estimate: F,
	) -> SettleBatch
	where
		F: Fn(OracleCall) -> Fut,
		Fut: Future<Output = Result<u64, DeliveryError>>,
	{
		let mut entries: Vec<SettleEntry> = candidates
			.iter()
			.filter(|candidate| candidate.is_settle_ready())
			.take(self.max_batch_size)
			.map(|candidate| SettleEntry {
				report_id: candidate.report_id(),
				state_hash: candidate.report.state_hash,
			})
			.collect();

		if entries.is_empty() {
			return SettleBatch::empty();
		}

		let call = OracleCall::SafeSettleReports(entries.clone());
		let estimated = retry(
			&self.retry,
			"estimate safeSettleReports",
			|_| estimate(call.clone()),
			|_| RetryDecision::Retry,
		)
		.await;

		let (estimated_gas, wanted, source) = match estimated {
			Ok(gas) => (
				gas,
				buffered(gas, self.gas_buffer_percent, u64::MAX),
				GasSource::Estimated,
			),
			Err(e) => {
				let fallback = self.gas_per_report.saturating_mul(entries.len() as u64);
				tracing::warn!(
					error = %e,
					fallback_gas = fallback,
					"Gas estimation failed, using static per-report figure"
				);
				(fallback, fallback, GasSource::Fallback)
			},
		};

		if wanted > self.max_gas_limit {
			let target = self.shrink_target();
			if target < entries.len() {
				entries.truncate(target);
			}
			tracing::info!(
				gas = wanted,
				max_gas_limit = self.max_gas_limit,
				batch_size = entries.len(),
				"Batch over gas ceiling, resized"
			);
		}

		let plan = GasPlan {
			estimated_gas,
			buffered_gas: wanted.min(self.max_gas_limit),
			gas_price,
			nonce: None,
			source,
		};
		tracing::info!(
			batch_size = entries.len(),
			report_ids = ?entries.iter().map(|e| e.report_id).collect::<Vec<_>>(),
			gas_limit = plan.buffered_gas,
			source = ?plan.source,
			"Built settlement batch"
		);

		SettleBatch {
			entries,
			gas: Some(plan),
		}
	}
}
