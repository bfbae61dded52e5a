//! Keeper engine that drives every enabled bot from one dispatch loop.
//!
//! Poll ticks run the settlement and beacon cycles, queued chain events run the
//! dispute and initial report handlers. Disputes that arrive before their
//! dispute window opens are parked and retried on every poll tick until they
//! resolve. Everything happens on the loop's own task, so no two submissions
//! ever race for the signer's nonce.

use crate::cursor::{CursorStore, ScanPosition};
use crate::handlers::{BeaconHandler, DisputeHandler, InitialReportHandler, SettlementHandler};
use crate::submission::SubmissionOutcome;
use crate::KeeperError;
use keeper_config::{BotKind, Config};
use keeper_discovery::DiscoveryService;
use keeper_storage::StorageService;
use keeper_types::{format_token_amount, CoalesceKey, OracleEvent};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Errors that stop the engine.
///
/// Cycle and handler failures never surface here; they are logged and the
/// loop carries on.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
}

/// Handlers for the bots enabled in `keeper.bots`.
#[derive(Default)]
pub struct Handlers {
	pub settlement: Option<SettlementHandler>,
	pub dispute: Option<DisputeHandler>,
	pub initial_report: Option<InitialReportHandler>,
	pub beacon: Option<BeaconHandler>,
}

impl Handlers {
	fn listens_for_events(&self) -> bool {
		self.dispute.is_some() || self.initial_report.is_some()
	}
}

pub struct KeeperEngine {
	config: Config,
	storage: Arc<StorageService>,
	discovery: Arc<DiscoveryService>,
	handlers: Handlers,
	cursor: CursorStore,
}

impl KeeperEngine {
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		discovery: Arc<DiscoveryService>,
		handlers: Handlers,
	) -> Self {
		let cursor = CursorStore::new(
			storage.clone(),
			BotKind::SettleBatch.as_str(),
			config.keeper.start_report_id,
		);
		Self {
			config,
			storage,
			discovery,
			handlers,
			cursor,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	/// Runs until Ctrl-C.
	pub async fn run(&self) -> Result<(), EngineError> {
		self.run_until(async {
			let _ = tokio::signal::ctrl_c().await;
		})
		.await
	}

	/// Runs until `shutdown` resolves.
	pub async fn run_until<F>(&self, shutdown: F) -> Result<(), EngineError>
	where
		F: Future<Output = ()>,
	{
		let keeper = &self.config.keeper;
		let (event_tx, mut event_rx) = mpsc::channel(keeper.event_queue_capacity);
		let monitoring = self.handlers.listens_for_events();
		if monitoring {
			self.discovery
				.start_monitoring(event_tx)
				.await
				.map_err(|e| EngineError::Service(e.to_string()))?;
		} else {
			drop(event_tx);
		}

		let mut scan = match self.handlers.settlement {
			Some(_) => self
				.cursor
				.load()
				.await
				.map_err(|e| EngineError::Service(e.to_string()))?,
			None => ScanPosition::at(keeper.start_report_id),
		};
		let mut deferred: BTreeSet<u64> = BTreeSet::new();

		let mut poll = tokio::time::interval(keeper.poll_interval());
		poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
		let mut cleanup = tokio::time::interval(Duration::from_secs(
			self.config.storage.cleanup_interval_seconds,
		));
		cleanup.set_missed_tick_behavior(MissedTickBehavior::Skip);
		tokio::pin!(shutdown);

		let bots: Vec<&str> = keeper.bots.iter().map(BotKind::as_str).collect();
		tracing::info!(
			keeper_id = %keeper.id,
			bots = ?bots,
			cursor = scan.cursor,
			pending = scan.pending.len(),
			dry_run = keeper.dry_run,
			"Keeper started"
		);

		loop {
			tokio::select! {
				biased;

				_ = &mut shutdown => {
					tracing::info!("Shutting down");
					break;
				}

				_ = poll.tick() => {
					self.poll_cycle(&mut scan).await;
					self.revisit_deferred(&mut deferred).await;
				}

				Some(event) = event_rx.recv() => {
					let mut events = vec![event];
					while let Ok(next) = event_rx.try_recv() {
						events.push(next);
					}
					self.dispatch(coalesce(events), &mut deferred).await;
				}

				_ = cleanup.tick() => {
					match self.storage.cleanup_expired().await {
						Ok(count) if count > 0 => {
							tracing::debug!(removed = count, "Storage cleanup");
						},
						Err(e) => tracing::warn!(error = %e, "Storage cleanup failed"),
						_ => {},
					}
				}
			}
		}

		if monitoring {
			self.discovery
				.stop_monitoring()
				.await
				.map_err(|e| EngineError::Service(e.to_string()))?;
		}
		Ok(())
	}

	async fn poll_cycle(&self, scan: &mut ScanPosition) {
		if let Some(handler) = &self.handlers.settlement {
			match self.within_deadline(handler.run_cycle(scan)).await {
				Ok(report) if report.position != *scan => {
					match self.cursor.save(&report.position).await {
						Ok(()) => *scan = report.position,
						Err(e) => tracing::warn!(
							cursor = report.position.cursor,
							error = %e,
							"Failed to persist cursor"
						),
					}
				},
				Ok(_) => {},
				Err(e) => tracing::warn!(
					bot = BotKind::SettleBatch.as_str(),
					cursor = scan.cursor,
					error = %e,
					"Cycle skipped"
				),
			}
		}

		if let Some(handler) = &self.handlers.beacon {
			match self.within_deadline(handler.run_cycle()).await {
				Ok(report) => tracing::debug!(report = ?report, "Beacon cycle finished"),
				Err(e) => tracing::warn!(
					bot = BotKind::Beacon.as_str(),
					error = %e,
					"Cycle skipped"
				),
			}
		}
	}

	async fn dispatch(&self, events: Vec<OracleEvent>, deferred: &mut BTreeSet<u64>) {
		for event in events {
			match event {
				OracleEvent::ReportInstanceCreated { report_id, .. } => {
					if let Some(handler) = &self.handlers.initial_report {
						let result = self.within_deadline(handler.handle(report_id)).await;
						log_result(BotKind::InitialReport, report_id, result);
					}
				},
				OracleEvent::InitialReportSubmitted { report_id, .. }
				| OracleEvent::ReportDisputed { report_id, .. } => {
					self.dispute(report_id, deferred).await;
				},
				OracleEvent::SettlementBatch {
					reports_settled,
					total_rewards,
					settler,
					block_number,
				} => tracing::info!(
					reports_settled,
					total_rewards = %format_token_amount(total_rewards, 18),
					settler = %settler,
					block_number,
					"Settlement batch observed"
				),
			}
		}
	}

	/// Runs the dispute handler, parking the report when its dispute window has
	/// not opened yet.
	async fn dispute(&self, report_id: u64, deferred: &mut BTreeSet<u64>) {
		let Some(handler) = &self.handlers.dispute else {
			return;
		};
		match self.within_deadline(handler.handle(report_id)).await {
			Err(KeeperError::Rejected(reason)) if reason.is_deferred() => {
				if deferred.insert(report_id) {
					tracing::info!(report_id, reason = %reason, "Dispute deferred");
				}
			},
			result => {
				deferred.remove(&report_id);
				log_result(BotKind::Dispute, report_id, result);
			},
		}
	}

	async fn revisit_deferred(&self, deferred: &mut BTreeSet<u64>) {
		let parked: Vec<u64> = deferred.iter().copied().collect();
		for report_id in parked {
			self.dispute(report_id, deferred).await;
		}
	}

	async fn within_deadline<T>(
		&self,
		work: impl Future<Output = Result<T, KeeperError>>,
	) -> Result<T, KeeperError> {
		let limit = self.config.keeper.cycle_timeout();
		tokio::time::timeout(limit, work)
			.await
			.unwrap_or_else(|_| Err(KeeperError::Deadline(limit)))
	}
}

fn log_result(bot: BotKind, report_id: u64, result: Result<SubmissionOutcome, KeeperError>) {
	let bot = bot.as_str();
	match result {
		Ok(outcome @ (SubmissionOutcome::Confirmed { .. } | SubmissionOutcome::Simulated { .. })) => {
			tracing::info!(bot, report_id, outcome = %outcome, "Report handled")
		},
		Ok(outcome) => {
			tracing::warn!(bot, report_id, outcome = %outcome, "Submission not confirmed")
		},
		Err(KeeperError::Rejected(reason)) => {
			tracing::info!(bot, report_id, reason = %reason, "Report skipped")
		},
		Err(e) => tracing::warn!(bot, report_id, error = %e, "Report handling failed"),
	}
}

/// Collapses a drained event backlog to one event per report.
///
/// The most recent event for a key replaces earlier ones in place, so reports
/// are still handled in the order they first showed up.
pub fn coalesce(events: Vec<OracleEvent>) -> Vec<OracleEvent> {
	let mut slots: HashMap<CoalesceKey, usize> = HashMap::new();
	let mut latest: Vec<OracleEvent> = Vec::with_capacity(events.len());
	for event in events {
		match slots.get(&event.coalesce_key()) {
			Some(&slot) => latest[slot] = event,
			None => {
				slots.insert(event.coalesce_key(), latest.len());
				latest.push(event);
			},
		}
	}
	latest
}
