//! Cursor-driven batch settlement.
//!
//! Each cycle re-reads the pending reports behind the cursor, reads one
//! `getData` window from the cursor, selects settle-ready reports, builds one
//! gas-bounded `safeSettleReports` batch and submits it. The next scan position
//! is returned to the engine, which persists it.

use crate::batch::BatchBuilder;
use crate::cursor::{advance, ScanPosition};
use crate::gas::GasPricer;
use crate::selector::select;
use crate::submission::{SubmissionOutcome, SubmissionPipeline};
use crate::KeeperError;
use keeper_discovery::DiscoveryService;
use keeper_types::{Candidate, ReportRecord};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::instrument;

/// What one settlement cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
	/// Scan position to use for the next cycle.
	pub position: ScanPosition,
	/// Pending reports re-read behind the cursor.
	pub rechecked: usize,
	/// Reports returned by the window read.
	pub scanned: usize,
	pub settle_ready: usize,
	/// Report ids included in the submitted batch.
	pub batch: Vec<u64>,
	/// `None` when there was nothing to settle.
	pub outcome: Option<SubmissionOutcome>,
}

pub struct SettlementHandler {
	discovery: Arc<DiscoveryService>,
	pipeline: Arc<SubmissionPipeline>,
	builder: BatchBuilder,
	pricer: GasPricer,
	scan_window: u64,
}

impl SettlementHandler {
	pub fn new(
		discovery: Arc<DiscoveryService>,
		pipeline: Arc<SubmissionPipeline>,
		builder: BatchBuilder,
		pricer: GasPricer,
		scan_window: u64,
	) -> Self {
		Self {
			discovery,
			pipeline,
			builder,
			pricer,
			scan_window: scan_window.max(1),
		}
	}

	/// Runs one cycle from `position`.
	///
	/// Fails with [`KeeperError::ProviderUnavailable`] when the health check or a
	/// read fails; the caller must keep its position in that case.
	#[instrument(skip_all, fields(cursor = position.cursor, pending = position.pending.len()))]
	pub async fn run_cycle(&self, position: &ScanPosition) -> Result<CycleReport, KeeperError> {
		let clock = self.discovery.health_check().await?;

		let mut reports = self.recheck(position).await?;
		let rechecked = reports.len();

		let cursor = position.cursor;
		let end = cursor.saturating_add(self.scan_window);
		tracing::debug!(start = cursor, end, "Fetching report window");
		let window = self.discovery.get_reports(cursor, end).await?;
		let scanned = window.len();
		reports.extend(window.iter().cloned());

		let candidates = select(&reports, &clock);
		let settle_ready = candidates.iter().filter(|c| c.is_settle_ready()).count();
		if settle_ready == 0 {
			let next = self.next_position(position, &window, &candidates, &HashSet::new());
			tracing::info!(
				rechecked,
				scanned,
				next_cursor = next.cursor,
				pending = next.pending.len(),
				"No reports ready to settle"
			);
			return Ok(CycleReport {
				position: next,
				rechecked,
				scanned,
				settle_ready,
				batch: Vec::new(),
				outcome: None,
			});
		}

		let gas_price = self.pricer.current(self.pipeline.delivery()).await?;
		let delivery = self.pipeline.delivery().clone();
		let batch = self
			.builder
			.build(&candidates, gas_price, |call| {
				let delivery = delivery.clone();
				async move {
					let tx = delivery.build_transaction(&call)?;
					delivery.estimate_gas(&tx).await
				}
			})
			.await;

		let ids: Vec<u64> = batch.entries.iter().map(|e| e.report_id).collect();
		let outcome = match batch.gas {
			Some(plan) if !batch.is_empty() => Some(self.pipeline.submit(&batch.call(), &plan).await),
			_ => None,
		};

		let settled: HashSet<u64> = match &outcome {
			Some(SubmissionOutcome::Confirmed { .. }) => ids.iter().copied().collect(),
			_ => HashSet::new(),
		};
		let next = self.next_position(position, &window, &candidates, &settled);

		match &outcome {
			Some(SubmissionOutcome::Confirmed { tx_hash, .. }) => tracing::info!(
				settled = ids.len(),
				tx_hash = %tx_hash,
				next_cursor = next.cursor,
				pending = next.pending.len(),
				"Settled batch"
			),
			Some(other) => tracing::warn!(
				batch_size = ids.len(),
				outcome = %other,
				next_cursor = next.cursor,
				"Settlement batch not confirmed"
			),
			None => {},
		}

		Ok(CycleReport {
			position: next,
			rechecked,
			scanned,
			settle_ready,
			batch: ids,
			outcome,
		})
	}

	/// Reads the pending reports behind the cursor, in as few windows as the
	/// scan window allows.
	async fn recheck(&self, position: &ScanPosition) -> Result<Vec<ReportRecord>, KeeperError> {
		let mut reports = Vec::new();
		for (start, end) in position.recheck_ranges(self.scan_window) {
			let records = self.discovery.get_reports(start, end).await?;
			reports.extend(
				records
					.into_iter()
					.filter(|r| position.pending.contains(&r.report_id)),
			);
		}
		Ok(reports)
	}

	/// Next position, stepping over a full window that holds nothing the cursor
	/// can pass, such as a run of requests nobody has reported on yet.
	fn next_position(
		&self,
		position: &ScanPosition,
		window: &[ReportRecord],
		candidates: &[Candidate],
		settled: &HashSet<u64>,
	) -> ScanPosition {
		let mut next = advance(position, window, candidates, settled);
		if next.cursor == position.cursor && window.len() as u64 >= self.scan_window {
			let end = position.cursor.saturating_add(self.scan_window);
			tracing::warn!(
				start = position.cursor,
				end,
				"Window has no initialized reports, moving past it"
			);
			next.cursor = end;
		}
		next
	}
}
