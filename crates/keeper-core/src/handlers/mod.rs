//! Bot handlers driven by the engine.
//!
//! The settlement and beacon handlers run once per poll cycle. The dispute and
//! initial report handlers run per report, triggered by queued events. Every
//! handler re-reads the chain before acting and submits through the shared
//! [`SubmissionPipeline`](crate::submission::SubmissionPipeline).

pub mod beacon;
pub mod dispute;
pub mod initial_report;
pub mod settlement;

pub use beacon::{BeaconHandler, BeaconReport};
pub use dispute::DisputeHandler;
pub use initial_report::InitialReportHandler;
pub use settlement::{CycleReport, SettlementHandler};

use crate::submission::{SubmissionOutcome, SubmissionPipeline};
use crate::KeeperError;
use keeper_types::{format_token_amount, Address, OracleCall, TokenConfig, U256};

/// Approves the oracle for `amount` of `token` unless the current allowance
/// already covers it.
///
/// The approval is submitted and confirmed before returning. In dry-run mode the
/// simulated approval counts as granted.
pub(crate) async fn ensure_allowance(
	pipeline: &SubmissionPipeline,
	token: &TokenConfig,
	amount: U256,
	gas_price: u128,
) -> Result<(), KeeperError> {
	if amount.is_zero() {
		return Ok(());
	}
	let delivery = pipeline.delivery();
	let spender: Address = delivery.contracts().oracle;
	let current = delivery.allowance(token.address, spender).await?;
	if current >= amount {
		tracing::debug!(token = %token.symbol, allowance = %current, "Allowance sufficient");
		return Ok(());
	}

	tracing::info!(
		token = %token.symbol,
		amount = %format_token_amount(amount, token.decimals),
		"Approving oracle"
	);
	let call = OracleCall::Approve {
		token: token.address,
		spender,
		amount,
	};
	let plan = pipeline.estimate(&call, gas_price).await?;
	match pipeline.submit(&call, &plan).await {
		SubmissionOutcome::Confirmed { .. } | SubmissionOutcome::Simulated { .. } => Ok(()),
		SubmissionOutcome::Dropped { reason } => Err(KeeperError::StaleState(reason)),
		other => Err(KeeperError::Submission(format!(
			"approval of {} failed: {}",
			token.symbol, other
		))),
	}
}
