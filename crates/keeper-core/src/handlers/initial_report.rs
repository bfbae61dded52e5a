//! First reports for newly created report instances.

use super::ensure_allowance;
use crate::fee_band::token2_equivalent;
use crate::gas::GasPricer;
use crate::selector::InitialReportPolicy;
use crate::submission::{SubmissionOutcome, SubmissionPipeline};
use crate::KeeperError;
use keeper_discovery::DiscoveryService;
use keeper_price::PriceService;
use keeper_types::{format_token_amount, InitialReportEntry, OracleCall, TokenPair};
use std::sync::Arc;
use tracing::instrument;

pub struct InitialReportHandler {
	discovery: Arc<DiscoveryService>,
	pipeline: Arc<SubmissionPipeline>,
	prices: Arc<PriceService>,
	policy: InitialReportPolicy,
	pair: TokenPair,
	pricer: GasPricer,
}

impl InitialReportHandler {
	pub fn new(
		discovery: Arc<DiscoveryService>,
		pipeline: Arc<SubmissionPipeline>,
		prices: Arc<PriceService>,
		policy: InitialReportPolicy,
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

	/// Submits the first report for `report_id` at the external price.
	///
	/// The report must pass the policy gate and pay a fee that covers the
	/// simulated gas cost. Token approvals are granted only once the report is
	/// known to be worth submitting.
	#[instrument(skip_all, fields(report_id = report_id))]
	pub async fn handle(&self, report_id: u64) -> Result<SubmissionOutcome, KeeperError> {
		let report = self.discovery.get_report(report_id).await?;
		self.policy.check(&report)?;

		let gas_price = self.pricer.current(self.pipeline.delivery()).await?;
		let prices = self.prices.get_pair_prices(&self.pair).await?;
		let amount1 = report.exact_token1_report;
		let amount2 = token2_equivalent(amount1, &self.pair, &prices)?;
		if amount2.is_zero() {
			return Err(KeeperError::Price(format!(
				"{} rounds to zero {}",
				format_token_amount(amount1, self.pair.token1.decimals),
				self.pair.token2.symbol
			)));
		}

		let call = OracleCall::SubmitInitialReport {
			entry: InitialReportEntry {
				report_id,
				amount1,
				amount2,
				state_hash: report.state_hash,
			},
			value: report.fee,
		};
		let plan = self.pipeline.estimate(&call, gas_price).await?;
		self.policy
			.check_profitable(&report, plan.estimated_gas, gas_price)?;

		tracing::info!(
			amount1 = %format_token_amount(amount1, self.pair.token1.decimals),
			amount2 = %format_token_amount(amount2, self.pair.token2.decimals),
			fee = %report.fee,
			gas = plan.estimated_gas,
			"Submitting initial report"
		);
		ensure_allowance(&self.pipeline, &self.pair.token1, amount1, gas_price).await?;
		ensure_allowance(&self.pipeline, &self.pair.token2, amount2, gas_price).await?;

		Ok(self.pipeline.submit(&call, &plan).await)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::retry::RetryPolicy;
	use crate::selector::Rejection;
	use crate::submission::SubmissionSettings;
	use crate::test_support::{
		delivery, discovery, pair, prices, report, storage, unreported, FakeReader, FakeWriter,
		ORACLE,
	};
	use keeper_config::{InitialReportConfig, PolicyConfig};
	use keeper_delivery::DeliveryError;
	use keeper_types::{Address, U256};
	use std::sync::atomic::Ordering;
	use std::time::Duration;

	fn handler(reader: &Arc<FakeReader>, writer: &Arc<FakeWriter>) -> InitialReportHandler {
		let pipeline = SubmissionPipeline::new(
			delivery(writer),
			storage(),
			SubmissionSettings {
				retry: RetryPolicy::new(2, Duration::ZERO),
				min_balance: U256::ZERO,
				max_gas_limit: 7_500_000,
				gas_buffer_percent: 15,
				history_ttl: Duration::from_secs(60),
				dry_run: false,
			},
		);
		InitialReportHandler::new(
			discovery(reader),
			Arc::new(pipeline),
			prices(),
			InitialReportPolicy::from_config(
				&PolicyConfig::default(),
				&InitialReportConfig::default(),
				&pair(),
			),
			pair(),
			GasPricer::new(1.2, None),
		)
	}

	#[tokio::test(start_paused = true)]
	async fn test_reports_at_external_price() {
		let reader = FakeReader::new(vec![unreported(4)], 1_000);
		let writer = Arc::new(FakeWriter::default());

		let outcome = handler(&reader, &writer).handle(4).await.unwrap();
		assert!(outcome.is_confirmed(), "{}", outcome);

		let estimated = writer.estimated.lock().unwrap().clone();
		assert_eq!(estimated.len(), 1);
		assert_eq!(estimated[0].to, ORACLE);
		assert_eq!(estimated[0].value, U256::from(1_000_000_000_000_000u64));
		assert_eq!(writer.sends.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_approves_after_profitability() {
		let reader = FakeReader::new(vec![unreported(4)], 1_000);
		let writer = Arc::new(FakeWriter::default());
		*writer.allowance.lock().unwrap() = U256::ZERO;

		let outcome = handler(&reader, &writer).handle(4).await.unwrap();
		assert!(outcome.is_confirmed());
		assert_eq!(
			writer.estimated_targets(),
			vec![ORACLE, Address::repeat_byte(0xe1), Address::repeat_byte(0xe2)]
		);
		assert_eq!(writer.sends.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn test_already_reported_skipped() {
		let reader = FakeReader::new(vec![report(4)], 1_000);
		let writer = Arc::new(FakeWriter::default());

		let result = handler(&reader, &writer).handle(4).await;
		assert!(matches!(result, Err(KeeperError::Rejected(Rejection::AlreadyReported))));
		assert!(writer.estimated.lock().unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_unprofitable_fee_sends_nothing() {
		let mut r = unreported(4);
		r.fee = U256::from(1_000_000_000_000u64);
		let reader = FakeReader::new(vec![r], 1_000);
		let writer = Arc::new(FakeWriter::default());
		*writer.allowance.lock().unwrap() = U256::ZERO;

		let result = handler(&reader, &writer).handle(4).await;
		assert!(matches!(
			result,
			Err(KeeperError::Rejected(Rejection::Unprofitable { .. }))
		));
		assert_eq!(writer.sends.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_simulation_revert_is_estimation_error() {
		let reader = FakeReader::new(vec![unreported(4)], 1_000);
		let writer = Arc::new(FakeWriter::default());
		writer.script_estimates(vec![Err(DeliveryError::classify(
			"execution reverted: report already submitted",
		))]);

		let result = handler(&reader, &writer).handle(4).await;
		assert!(matches!(result, Err(KeeperError::Estimation(_))));
		assert_eq!(writer.sends.load(Ordering::SeqCst), 0);
	}
}
