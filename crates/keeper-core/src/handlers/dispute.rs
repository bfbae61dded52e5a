//! Event-driven disputes.
//!
//! When a report receives its first report or a new dispute, the handler
//! re-reads it, checks it passes the policy gate and is inside its dispute
//! window, then answers with a `disputeAndSwap` priced just outside the fee
//! band. A report whose window has not opened yet is rejected with a deferred
//! reason so the engine can come back to it.

use super::ensure_allowance;
use crate::fee_band::compute_counter;
use crate::gas::GasPricer;
use crate::selector::{select, DisputePolicy, Rejection};
use crate::submission::{SubmissionOutcome, SubmissionPipeline};
use crate::KeeperError;
use keeper_discovery::DiscoveryService;
use keeper_price::PriceService;
use keeper_types::{format_token_amount, Eligibility, OracleCall, TokenPair};
use std::sync::Arc;
use tracing::instrument;

pub struct DisputeHandler {
	discovery: Arc<DiscoveryService>,
	pipeline: Arc<SubmissionPipeline>,
	prices: Arc<PriceService>,
	policy: DisputePolicy,
	pair: TokenPair,
	pricer: GasPricer,
}

impl DisputeHandler {
	pub fn new(
		discovery: Arc<DiscoveryService>,
		pipeline: Arc<SubmissionPipeline>,
		prices: Arc<PriceService>,
		policy: DisputePolicy,
		pair: TokenPair,
		pricer: GasPricer,
	) -> Self {
		Self {
			discovery,
			pipeline,
			prices,
			policy,
			pair,
			pricer,
		}
	}

	/// Disputes `report_id` if it is eligible and allowed.
	#[instrument(skip_all, fields(report_id = report_id))]
	pub async fn handle(&self, report_id: u64) -> Result<SubmissionOutcome, KeeperError> {
		let (report, clock) = tokio::try_join!(
			self.discovery.get_report(report_id),
			self.discovery.clock(),
		)?;

		self.policy.check(&report)?;
		let eligibility = select(std::slice::from_ref(&report), &clock)
			.first()
			.map(|c| c.eligibility);
		match eligibility {
			Some(Eligibility::DisputeReady) => {},
			// unsettled and before its deadline, so only the delay is missing
			Some(Eligibility::Ineligible) if !report.is_settled => {
				return Err(Rejection::DisputeWindowNotOpen {
					opens_at: report.dispute_opens_at(),
					now: clock.now_for(report.time_type),
				}
				.into());
			},
			other => {
				return Err(Rejection::NotEligible(other.unwrap_or(Eligibility::Ineligible)).into())
			},
		}

		let prices = self.prices.get_pair_prices(&self.pair).await?;
		let counter = compute_counter(&report, &self.pair, &prices)?;
		tracing::info!(
			amount1 = %format_token_amount(report.current_amount1, self.pair.token1.decimals),
			amount2 = %format_token_amount(report.current_amount2, self.pair.token2.decimals),
			new_amount1 = %format_token_amount(counter.new_amount1, self.pair.token1.decimals),
			new_amount2 = %format_token_amount(counter.new_amount2, self.pair.token2.decimals),
			swaps_token1 = counter.swaps_token1,
			"Computed counter-report"
		);

		let gas_price = self.pricer.current(self.pipeline.delivery()).await?;
		ensure_allowance(
			&self.pipeline,
			&self.pair.token1,
			counter.approval_token1,
			gas_price,
		)
		.await?;
		ensure_allowance(
			&self.pipeline,
			&self.pair.token2,
			counter.approval_token2,
			gas_price,
		)
		.await?;

		let call = OracleCall::DisputeAndSwap(counter.entry());
		let plan = self.pipeline.estimate(&call, gas_price).await?;
		Ok(self.pipeline.submit(&call, &plan).await)
	}
}
