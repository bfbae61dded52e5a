//! Nonce-safe transaction submission.
//!
//! A call moves through `Built -> Signed -> Sent -> Confirmed`, or fails out of
//! `Sent` and is re-signed on the next attempt. The pending nonce is read right
//! before every signature so a competing transaction from the same key never
//! leaves the keeper holding a stale value.

use crate::gas::buffered;
use crate::retry::{retry, RetryDecision, RetryError, RetryPolicy};
use crate::KeeperError;
use alloy_primitives::keccak256;
use keeper_config::Config;
use keeper_delivery::{DeliveryError, DeliveryService};
use keeper_storage::StorageService;
use keeper_types::{
	current_timestamp, GasPlan, GasSource, OracleCall, StorageKey, SubmissionAttempt,
	SubmissionStatus, Transaction, TransactionHash, TransactionReceipt, U256,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Terminal result of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
	/// Mined and executed successfully.
	Confirmed {
		tx_hash: TransactionHash,
		nonce: u64,
		block_number: u64,
		receipt: TransactionReceipt,
	},
	/// Mined, but execution reverted.
	Reverted {
		tx_hash: TransactionHash,
		nonce: u64,
		block_number: u64,
	},
	/// Broadcast, but no receipt within the confirmation timeout.
	ConfirmationTimeout { tx_hash: TransactionHash, nonce: u64 },
	/// The report changed under the call; nothing to retry this cycle.
	Dropped { reason: String },
	/// Retries exhausted or a non-retryable error.
	Abandoned { attempts: u32, reason: String },
	/// The wallet holds less than the configured minimum.
	InsufficientBalance { balance: U256, required: U256 },
	/// Dry run: signed nothing, sent nothing.
	Simulated { call: &'static str, gas_limit: u64 },
}

impl SubmissionOutcome {
	pub fn is_confirmed(&self) -> bool {
		matches!(self, SubmissionOutcome::Confirmed { .. })
	}

	pub fn receipt(&self) -> Option<&TransactionReceipt> {
		match self {
			SubmissionOutcome::Confirmed { receipt, .. } => Some(receipt),
			_ => None,
		}
	}
}

impl fmt::Display for SubmissionOutcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SubmissionOutcome::Confirmed {
				tx_hash,
				block_number,
				..
			} => write!(f, "confirmed {} in block {}", tx_hash, block_number),
			SubmissionOutcome::Reverted {
				tx_hash,
				block_number,
				..
			} => write!(f, "reverted {} in block {}", tx_hash, block_number),
			SubmissionOutcome::ConfirmationTimeout { tx_hash, .. } => {
				write!(f, "no receipt for {}", tx_hash)
			},
			SubmissionOutcome::Dropped { reason } => write!(f, "dropped: {}", reason),
			SubmissionOutcome::Abandoned { attempts, reason } => {
				write!(f, "abandoned after {} attempts: {}", attempts, reason)
			},
			SubmissionOutcome::InsufficientBalance { balance, required } => {
				write!(f, "balance {} below minimum {}", balance, required)
			},
			SubmissionOutcome::Simulated { call, gas_limit } => {
				write!(f, "dry run {} with gas limit {}", call, gas_limit)
			},
		}
	}
}

/// Retry classification for broadcasts.
///
/// A nonce held by another queued transaction is not retried: re-signing at the
/// next nonce could land the same action twice.
fn classify_send(error: &DeliveryError) -> RetryDecision {
	match error {
		DeliveryError::NonceConflict(_) => RetryDecision::RetryImmediately,
		DeliveryError::StaleState(_)
		| DeliveryError::NonceInUse(_)
		| DeliveryError::AlreadyKnown(_)
		| DeliveryError::Signing(_)
		| DeliveryError::InvalidConfig(_) => RetryDecision::Abort,
		_ => RetryDecision::Retry,
	}
}

/// Retry classification for simulations. Reverts are deterministic.
fn classify_estimate(error: &DeliveryError) -> RetryDecision {
	match error {
		DeliveryError::StaleState(_)
		| DeliveryError::Reverted(_)
		| DeliveryError::Signing(_)
		| DeliveryError::InvalidConfig(_) => RetryDecision::Abort,
		_ => RetryDecision::Retry,
	}
}

/// Limits applied by the pipeline.
#[derive(Debug, Clone)]
pub struct SubmissionSettings {
	pub retry: RetryPolicy,
	pub min_balance: U256,
	pub max_gas_limit: u64,
	pub gas_buffer_percent: u64,
	pub history_ttl: Duration,
	pub dry_run: bool,
}

impl SubmissionSettings {
	pub fn from_config(config: &Config) -> Self {
		Self {
			retry: RetryPolicy::from(&config.retry),
			min_balance: config.gas.min_balance(),
			max_gas_limit: config.settlement.max_gas_limit,
			gas_buffer_percent: config.settlement.gas_buffer_percent,
			history_ttl: Duration::from_secs(config.storage.submission_ttl_seconds),
			dry_run: config.keeper.dry_run,
		}
	}
}

/// Signs, sends and confirms oracle calls.
pub struct SubmissionPipeline {
	delivery: Arc<DeliveryService>,
	storage: Arc<StorageService>,
	settings: SubmissionSettings,
}

impl SubmissionPipeline {
	pub fn new(
		delivery: Arc<DeliveryService>,
		storage: Arc<StorageService>,
		settings: SubmissionSettings,
	) -> Self {
		Self {
			delivery,
			storage,
			settings,
		}
	}

	pub fn delivery(&self) -> &Arc<DeliveryService> {
		&self.delivery
	}

	pub fn is_dry_run(&self) -> bool {
		self.settings.dry_run
	}

	/// Simulates `call` and returns a buffered gas plan clamped to the ceiling.
	///
	/// Unlike settlement batches there is no static fallback here: a call that
	/// cannot be simulated is not sent.
	pub async fn estimate(&self, call: &OracleCall, gas_price: u128) -> Result<GasPlan, KeeperError> {
		let tx = self.delivery.build_transaction(call)?;
		let estimated = retry(
			&self.settings.retry,
			call.label(),
			|_| self.delivery.estimate_gas(&tx),
			classify_estimate,
		)
		.await;

		match estimated {
			Ok(gas) => Ok(GasPlan {
				estimated_gas: gas,
				buffered_gas: buffered(
					gas,
					self.settings.gas_buffer_percent,
					self.settings.max_gas_limit,
				),
				gas_price,
				nonce: None,
				source: GasSource::Estimated,
			}),
			Err(e) => match e.into_inner() {
				DeliveryError::StaleState(msg) => Err(KeeperError::StaleState(msg)),
				other => Err(KeeperError::Estimation(other.to_string())),
			},
		}
	}

	/// Submits `call` with the gas limit and price of `plan`.
	///
	/// Never returns an error: every failure is folded into an outcome the
	/// caller logs.
	pub async fn submit(&self, call: &OracleCall, plan: &GasPlan) -> SubmissionOutcome {
		let label = call.label();
		let report_ids = call.report_ids();

		let mut tx = match self.delivery.build_transaction(call) {
			Ok(tx) => tx,
			Err(e) => {
				return SubmissionOutcome::Abandoned {
					attempts: 0,
					reason: e.to_string(),
				}
			},
		};
		tx.gas_limit = Some(plan.buffered_gas.min(self.settings.max_gas_limit));
		tx.gas_price = Some(plan.gas_price);

		match self.delivery.balance().await {
			Ok(balance) if balance < self.settings.min_balance => {
				tracing::warn!(
					call = label,
					%balance,
					required = %self.settings.min_balance,
					"Wallet balance below minimum, skipping submission"
				);
				return SubmissionOutcome::InsufficientBalance {
					balance,
					required: self.settings.min_balance,
				};
			},
			Ok(_) => {},
			Err(e) => {
				return SubmissionOutcome::Abandoned {
					attempts: 0,
					reason: format!("balance check failed: {}", e),
				}
			},
		}

		if self.settings.dry_run {
			tracing::info!(
				call = label,
				?report_ids,
				to = %tx.to,
				value = %tx.value,
				gas_limit = ?tx.gas_limit,
				gas_price = plan.gas_price,
				"Dry run, not sending"
			);
			return SubmissionOutcome::Simulated {
				call: label,
				gas_limit: tx.gas_limit.unwrap_or_default(),
			};
		}

		let sent = retry(
			&self.settings.retry,
			label,
			|attempt| self.send_once(&tx, label, &report_ids, attempt),
			classify_send,
		)
		.await;

		let (tx_hash, nonce, mut record) = match sent {
			Ok(sent) => sent,
			Err(RetryError::Aborted {
				error: DeliveryError::StaleState(reason),
				..
			}) => {
				tracing::info!(call = label, ?report_ids, %reason, "Report state changed, dropping");
				return SubmissionOutcome::Dropped { reason };
			},
			Err(e) => {
				tracing::error!(call = label, ?report_ids, error = %e, "Submission abandoned");
				return SubmissionOutcome::Abandoned {
					attempts: e.attempts(),
					reason: e.into_inner().to_string(),
				};
			},
		};

		let outcome = match self.delivery.wait_for_confirmation(&tx_hash).await {
			Ok(receipt) if receipt.success => {
				record.status = SubmissionStatus::Confirmed {
					block_number: receipt.block_number,
				};
				tracing::info!(
					call = label,
					?report_ids,
					tx_hash = %tx_hash,
					nonce,
					block_number = receipt.block_number,
					gas_used = receipt.gas_used,
					"Transaction confirmed"
				);
				SubmissionOutcome::Confirmed {
					tx_hash,
					nonce,
					block_number: receipt.block_number,
					receipt,
				}
			},
			Ok(receipt) => {
				record.status = SubmissionStatus::Failed {
					reason: "reverted".into(),
				};
				tracing::warn!(
					call = label,
					?report_ids,
					tx_hash = %tx_hash,
					block_number = receipt.block_number,
					"Transaction reverted"
				);
				SubmissionOutcome::Reverted {
					tx_hash,
					nonce,
					block_number: receipt.block_number,
				}
			},
			Err(DeliveryError::ConfirmationTimeout { waited_secs, .. }) => {
				record.status = SubmissionStatus::Failed {
					reason: format!("no receipt after {}s", waited_secs),
				};
				tracing::warn!(call = label, tx_hash = %tx_hash, waited_secs, "Confirmation timed out");
				SubmissionOutcome::ConfirmationTimeout { tx_hash, nonce }
			},
			Err(e) => {
				record.status = SubmissionStatus::Failed {
					reason: e.to_string(),
				};
				tracing::error!(call = label, tx_hash = %tx_hash, error = %e, "Receipt lookup failed");
				SubmissionOutcome::Abandoned {
					attempts: record.retry_count + 1,
					reason: e.to_string(),
				}
			},
		};

		self.record(&tx_hash, &record).await;
		outcome
	}

	/// One signing attempt: fresh nonce, sign, broadcast.
	async fn send_once(
		&self,
		tx: &Transaction,
		label: &'static str,
		report_ids: &[u64],
		attempt: u32,
	) -> Result<(TransactionHash, u64, SubmissionAttempt), DeliveryError> {
		let nonce = self.delivery.pending_nonce().await?;
		let mut signed = tx.clone();
		signed.nonce = Some(nonce);
		let payload = self.delivery.sign(&signed).await?;

		let local_hash = TransactionHash(keccak256(&payload));
		let mut record = SubmissionAttempt {
			call: label.to_string(),
			report_ids: report_ids.to_vec(),
			nonce,
			signed_payload: payload.clone(),
			tx_hash: None,
			status: SubmissionStatus::Pending,
			retry_count: attempt - 1,
			created_at: current_timestamp(),
		};
		tracing::debug!(call = label, nonce, attempt, "Signed transaction");

		match self.delivery.send_raw(&payload).await {
			Ok(hash) => {
				record.tx_hash = Some(hash);
				record.status = SubmissionStatus::Sent;
				self.record(&hash, &record).await;
				Ok((hash, nonce, record))
			},
			Err(DeliveryError::AlreadyKnown(reason)) => {
				// the pool holds this exact payload, so its hash is ours
				tracing::info!(
					call = label,
					tx_hash = %local_hash,
					nonce,
					%reason,
					"Transaction already in pool"
				);
				record.tx_hash = Some(local_hash);
				record.status = SubmissionStatus::Sent;
				self.record(&local_hash, &record).await;
				Ok((local_hash, nonce, record))
			},
			Err(e) => {
				record.status = SubmissionStatus::Failed {
					reason: e.to_string(),
				};
				self.record(&local_hash, &record).await;
				Err(e)
			},
		}
	}

	async fn record(&self, hash: &TransactionHash, attempt: &SubmissionAttempt) {
		if let Err(e) = self
			.storage
			.store_with_ttl(
				StorageKey::Submissions,
				&hash.to_string(),
				attempt,
				Some(self.settings.history_ttl),
			)
			.await
		{
			tracing::warn!(tx_hash = %hash, error = %e, "Failed to record submission attempt");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{delivery, storage, FakeWriter, ReceiptMode};
	use keeper_types::{SettleEntry, B256};
	use std::sync::atomic::Ordering;

	fn settings() -> SubmissionSettings {
		SubmissionSettings {
			retry: RetryPolicy::new(3, Duration::from_millis(1_000)),
			min_balance: U256::from(50_000_000_000_000_000u64),
			max_gas_limit: 7_500_000,
			gas_buffer_percent: 15,
			history_ttl: Duration::from_secs(3600),
			dry_run: false,
		}
	}

	fn pipeline(writer: &Arc<FakeWriter>, settings: SubmissionSettings) -> SubmissionPipeline {
		SubmissionPipeline::new(delivery(writer), storage(), settings)
	}

	fn settle_call() -> OracleCall {
		OracleCall::SafeSettleReports(vec![SettleEntry {
			report_id: 1,
			state_hash: B256::repeat_byte(1),
		}])
	}

	fn plan() -> GasPlan {
		GasPlan::fixed(500_000, 12_000_000)
	}

	#[tokio::test(start_paused = true)]
	async fn test_nonce_conflict_refetches_and_succeeds() {
		let writer = Arc::new(FakeWriter::default());
		writer.script_sends(vec![DeliveryError::classify("nonce too low: next nonce 8")]);
		let pipeline = pipeline(&writer, settings());

		let outcome = pipeline.submit(&settle_call(), &plan()).await;

		assert!(outcome.is_confirmed(), "{}", outcome);
		assert_eq!(writer.nonce_reads.load(Ordering::SeqCst), 2);
		assert_eq!(writer.sends.load(Ordering::SeqCst), 1);
		match outcome {
			SubmissionOutcome::Confirmed { nonce, block_number, .. } => {
				assert_eq!(nonce, 7);
				assert_eq!(block_number, 1_000);
			},
			other => panic!("unexpected outcome {:?}", other),
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_already_known_waits_on_local_hash() {
		let writer = Arc::new(FakeWriter::default());
		writer.script_sends(vec![DeliveryError::classify("already known")]);
		let store = storage();
		let pipeline = SubmissionPipeline::new(delivery(&writer), store.clone(), settings());

		let outcome = pipeline.submit(&settle_call(), &plan()).await;

		assert!(outcome.is_confirmed(), "{}", outcome);
		assert_eq!(writer.nonce_reads.load(Ordering::SeqCst), 1);
		assert_eq!(writer.sends.load(Ordering::SeqCst), 0);
		let tx_hash = match outcome {
			SubmissionOutcome::Confirmed { tx_hash, nonce, .. } => {
				assert_eq!(nonce, 7);
				tx_hash
			},
			other => panic!("unexpected outcome {:?}", other),
		};
		let attempt: SubmissionAttempt = store
			.retrieve(StorageKey::Submissions, &tx_hash.to_string())
			.await
			.unwrap();
		assert_eq!(tx_hash.0, keccak256(&attempt.signed_payload));
		assert_eq!(attempt.retry_count, 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_underpriced_replacement_is_not_resent() {
		let writer = Arc::new(FakeWriter::default());
		writer.script_sends(vec![DeliveryError::classify(
			"replacement transaction underpriced",
		)]);
		let pipeline = pipeline(&writer, settings());

		let outcome = pipeline.submit(&settle_call(), &plan()).await;
		assert!(matches!(outcome, SubmissionOutcome::Abandoned { attempts: 1, .. }));
		assert_eq!(writer.nonce_reads.load(Ordering::SeqCst), 1);
		assert_eq!(writer.sends.load(Ordering::SeqCst), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_sequential_submissions_use_consecutive_nonces() {
		let writer = Arc::new(FakeWriter::default());
		let pipeline = pipeline(&writer, settings());

		let mut nonces = Vec::new();
		for _ in 0..4 {
			match pipeline.submit(&settle_call(), &plan()).await {
				SubmissionOutcome::Confirmed { nonce, .. } => nonces.push(nonce),
				other => panic!("unexpected outcome {:?}", other),
			}
		}
		assert!(nonces.windows(2).all(|w| w[1] == w[0] + 1));
		assert_eq!(nonces, vec![7, 8, 9, 10]);
	}

	#[tokio::test(start_paused = true)]
	async fn test_stale_state_drops_without_retry() {
		let writer = Arc::new(FakeWriter::default());
		writer.script_sends(vec![DeliveryError::classify(
			"execution reverted: state hash mismatch",
		)]);
		let pipeline = pipeline(&writer, settings());

		let outcome = pipeline.submit(&settle_call(), &plan()).await;
		assert!(matches!(outcome, SubmissionOutcome::Dropped { .. }));
		assert_eq!(writer.nonce_reads.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_network_errors_exhaust_retries() {
		let writer = Arc::new(FakeWriter::default());
		writer.script_sends(vec![
			DeliveryError::Network("502".into()),
			DeliveryError::Network("502".into()),
			DeliveryError::Network("502".into()),
		]);
		let pipeline = pipeline(&writer, settings());
		let started = tokio::time::Instant::now();

		let outcome = pipeline.submit(&settle_call(), &plan()).await;
		assert_eq!(
			outcome,
			SubmissionOutcome::Abandoned {
				attempts: 3,
				reason: "Network error: 502".into(),
			}
		);
		assert_eq!(started.elapsed(), Duration::from_secs(2));
		assert_eq!(writer.sends.load(Ordering::SeqCst), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_missing_receipt_times_out() {
		let writer = Arc::new(FakeWriter {
			receipt_mode: ReceiptMode::Never,
			..Default::default()
		});
		let pipeline = pipeline(&writer, settings());

		let outcome = pipeline.submit(&settle_call(), &plan()).await;
		assert!(matches!(
			outcome,
			SubmissionOutcome::ConfirmationTimeout { nonce: 7, .. }
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_reverted_receipt() {
		let writer = Arc::new(FakeWriter {
			receipt_mode: ReceiptMode::Reverted,
			..Default::default()
		});
		let pipeline = pipeline(&writer, settings());

		let outcome = pipeline.submit(&settle_call(), &plan()).await;
		assert!(matches!(outcome, SubmissionOutcome::Reverted { .. }));
	}

	#[tokio::test]
	async fn test_low_balance_skips_submission() {
		let writer = Arc::new(FakeWriter {
			balance: U256::from(1u64),
			..Default::default()
		});
		let pipeline = pipeline(&writer, settings());

		let outcome = pipeline.submit(&settle_call(), &plan()).await;
		assert!(matches!(outcome, SubmissionOutcome::InsufficientBalance { .. }));
		assert_eq!(writer.nonce_reads.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_dry_run_never_signs() {
		let writer = Arc::new(FakeWriter::default());
		let pipeline = pipeline(
			&writer,
			SubmissionSettings {
				dry_run: true,
				..settings()
			},
		);

		let outcome = pipeline.submit(&settle_call(), &plan()).await;
		assert_eq!(
			outcome,
			SubmissionOutcome::Simulated {
				call: "safeSettleReports",
				gas_limit: 500_000,
			}
		);
		assert_eq!(writer.nonce_reads.load(Ordering::SeqCst), 0);
		assert_eq!(writer.sends.load(Ordering::SeqCst), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_confirmed_attempt_is_recorded() {
		let writer = Arc::new(FakeWriter::default());
		let store = storage();
		let pipeline = SubmissionPipeline::new(delivery(&writer), store.clone(), settings());

		let outcome = pipeline.submit(&settle_call(), &plan()).await;
		let tx_hash = match outcome {
			SubmissionOutcome::Confirmed { tx_hash, .. } => tx_hash,
			other => panic!("unexpected outcome {:?}", other),
		};

		let attempt: SubmissionAttempt = store
			.retrieve(StorageKey::Submissions, &tx_hash.to_string())
			.await
			.unwrap();
		assert_eq!(attempt.call, "safeSettleReports");
		assert_eq!(attempt.report_ids, vec![1]);
		assert_eq!(attempt.nonce, 7);
		assert_eq!(attempt.tx_hash, Some(tx_hash));
		assert_eq!(attempt.status, SubmissionStatus::Confirmed { block_number: 1_000 });
	}

	#[tokio::test(start_paused = true)]
	async fn test_estimate_buffers_and_clamps() {
		let writer = Arc::new(FakeWriter::default());
		writer.script_estimates(vec![
			Err(DeliveryError::Network("timeout".into())),
			Ok(1_000_000),
			Ok(9_000_000),
		]);
		let pipeline = pipeline(&writer, settings());

		let first = pipeline.estimate(&settle_call(), 5).await.unwrap();
		assert_eq!(first.estimated_gas, 1_000_000);
		assert_eq!(first.buffered_gas, 1_150_000);
		assert_eq!(first.gas_price, 5);

		let second = pipeline.estimate(&settle_call(), 5).await.unwrap();
		assert_eq!(second.buffered_gas, 7_500_000);
	}

	#[tokio::test]
	async fn test_estimate_revert_is_not_retried() {
		let writer = Arc::new(FakeWriter::default());
		writer.script_estimates(vec![
			Err(DeliveryError::classify("execution reverted")),
			Ok(1),
		]);
		let pipeline = pipeline(&writer, settings());

		let result = pipeline.estimate(&settle_call(), 5).await;
		assert!(matches!(result, Err(KeeperError::Estimation(_))));
		assert_eq!(writer.estimated.lock().unwrap().len(), 1);
	}
}
