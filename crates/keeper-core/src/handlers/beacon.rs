//! Settlement beacon bot.
//!
//! Calls `freeMoneyLight()` on the beacon when the settler rewards of the most
//! recent settleable reports outweigh the simulated gas cost.

use crate::submission::{SubmissionOutcome, SubmissionPipeline};
use crate::KeeperError;
use keeper_config::BeaconConfig;
use keeper_delivery::decode_settlement_logs;
use keeper_discovery::DiscoveryService;
use keeper_types::{ChainClock, GasPlan, OracleCall, ReportRecord, U256};
use std::sync::Arc;
use tracing::instrument;

/// What one beacon cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeaconReport {
	/// No reports exist or the beacon simulation reverted.
	NothingToSettle,
	BelowThreshold { rewards: U256, threshold: U256 },
	Submitted(SubmissionOutcome),
}

pub struct BeaconHandler {
	discovery: Arc<DiscoveryService>,
	pipeline: Arc<SubmissionPipeline>,
	config: BeaconConfig,
}

impl BeaconHandler {
	pub fn new(
		discovery: Arc<DiscoveryService>,
		pipeline: Arc<SubmissionPipeline>,
		config: BeaconConfig,
	) -> Self {
		Self {
			discovery,
			pipeline,
			config,
		}
	}

	#[instrument(skip_all)]
	pub async fn run_cycle(&self) -> Result<BeaconReport, KeeperError> {
		let clock = self.discovery.health_check().await?;
		let next_id = self.discovery.next_report_id().await?;
		if next_id <= 1 {
			tracing::debug!("No reports available");
			return Ok(BeaconReport::NothingToSettle);
		}

		let delivery = self.pipeline.delivery();
		let gas_price = delivery.gas_price().await?;
		let call = OracleCall::FreeMoneyLight;
		let tx = delivery.build_transaction(&call)?;
		let estimate = match delivery.estimate_gas(&tx).await {
			Ok(gas) => gas,
			Err(e) => {
				tracing::debug!(error = %e, "Beacon simulation failed, nothing to settle");
				return Ok(BeaconReport::NothingToSettle);
			},
		};
		let threshold = U256::from(estimate) * U256::from(gas_price)
			* U256::from(self.config.threshold_percent)
			/ U256::from(100u64);

		let newest = next_id - 1;
		let oldest = newest.saturating_sub(self.config.scan_depth).max(1);
		let reports = self.discovery.get_reports(oldest, next_id).await?;
		let rewards = claimable_rewards(&reports, &clock, threshold);

		if rewards <= threshold {
			tracing::info!(%rewards, %threshold, "Beacon rewards below threshold");
			return Ok(BeaconReport::BelowThreshold { rewards, threshold });
		}

		let capped = gas_price.min(u128::from(self.config.max_gas_price_wei));
		tracing::info!(%rewards, %threshold, gas_price = capped, "Calling freeMoneyLight");
		let plan = GasPlan::fixed(self.config.gas_limit, capped);
		let outcome = self.pipeline.submit(&call, &plan).await;

		if let Some(receipt) = outcome.receipt() {
			let summary = decode_settlement_logs(&receipt.logs);
			tracing::info!(
				tx_hash = %receipt.hash,
				reports_settled = summary.reports_settled.unwrap_or(summary.settled.len() as u64),
				total_rewards = %summary.total_rewards,
				"Beacon settlement confirmed"
			);
		} else {
			tracing::warn!(outcome = %outcome, "Beacon settlement not confirmed");
		}
		Ok(BeaconReport::Submitted(outcome))
	}
}

/// Sum of the settler rewards above `threshold` on reports that are past
/// their deadline and can be settled by the beacon.
fn claimable_rewards(reports: &[ReportRecord], clock: &ChainClock, threshold: U256) -> U256 {
	reports
		.iter()
		.filter(|r| !r.is_settled && !r.is_distributed)
		.filter(|r| !r.current_reporter.is_zero())
		.filter(|r| !r.has_callback())
		.filter(|r| clock.now_for(r.time_type) >= r.deadline())
		.filter(|r| r.settler_reward > threshold)
		.fold(U256::ZERO, |total, r| total.saturating_add(r.settler_reward))
}
