//! Alloy-based chain reader and event poller.

use crate::bindings::{decode_event, event_signatures, IArbSys, IOpenOracle, IOracleDataProvider};
use crate::{DiscoveryError, DiscoveryFactory, DiscoveryInterface, DiscoveryRegistry};
use alloy_network::TransactionBuilder;
use alloy_primitives::{address, Address, U256};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_types::{BlockNumberOrTag, BlockTransactionsKind, Filter, TransactionRequest};
use alloy_sol_types::SolCall;
use alloy_transport_http::Http;
use async_trait::async_trait;
use keeper_types::{
	saturating_u64, ChainClock, ConfigSchema, ContractAddresses, ExtraData, Field, FieldType,
	ImplementationRegistry, NetworkConfig, OracleEvent, ReportMeta, ReportRecord, ReportStatus,
	Schema, ValidationError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

type HttpProvider = RootProvider<Http<reqwest::Client>>;

/// ArbSys precompile.
const ARB_SYS: Address = address!("0000000000000000000000000000000000000064");

/// Alloy chain reader for the oracle contracts.
pub struct AlloyDiscovery {
	provider: HttpProvider,
	contracts: ContractAddresses,
	/// Read block-based deadlines from `ArbSys.arbBlockNumber()` instead of the block header.
	use_arbsys_block_number: bool,
	polling_interval_secs: u64,
	/// Largest block span requested in a single `eth_getLogs`.
	max_block_range: u64,
	last_block: Arc<Mutex<u64>>,
	is_monitoring: Arc<AtomicBool>,
	stop_signal: Arc<Mutex<Option<mpsc::Sender<()>>>>,
}

impl AlloyDiscovery {
	pub fn new(
		rpc_url: &str,
		contracts: ContractAddresses,
		use_arbsys_block_number: bool,
		polling_interval_secs: Option<u64>,
		max_block_range: Option<u64>,
	) -> Result<Self, DiscoveryError> {
		let provider = RootProvider::new_http(
			rpc_url
				.parse()
				.map_err(|e| DiscoveryError::Connection(format!("Invalid RPC URL: {}", e)))?,
		);

		Ok(Self {
			provider,
			contracts,
			use_arbsys_block_number,
			polling_interval_secs: polling_interval_secs.unwrap_or(2),
			max_block_range: max_block_range.unwrap_or(2_000),
			last_block: Arc::new(Mutex::new(0)),
			is_monitoring: Arc::new(AtomicBool::new(false)),
			stop_signal: Arc::new(Mutex::new(None)),
		})
	}

	async fn call<C: SolCall>(&self, to: Address, call: C) -> Result<C::Return, DiscoveryError> {
		let request = TransactionRequest::default()
			.with_to(to)
			.with_input(call.abi_encode());

		let output = self
			.provider
			.call(&request)
			.await
			.map_err(|e| DiscoveryError::Call(format!("{} failed: {}", C::SIGNATURE, e)))?;

		C::abi_decode_returns(&output, true).map_err(|e| {
			DiscoveryError::ParseError(format!("Failed to decode {}: {}", C::SIGNATURE, e))
		})
	}

	/// Polls for oracle and beacon logs and forwards decoded events.
	async fn monitoring_loop(
		provider: HttpProvider,
		addresses: Vec<Address>,
		last_block: Arc<Mutex<u64>>,
		sender: mpsc::Sender<OracleEvent>,
		mut stop_rx: mpsc::Receiver<()>,
		polling_interval_secs: u64,
		max_block_range: u64,
	) {
		let mut interval =
			tokio::time::interval(std::time::Duration::from_secs(polling_interval_secs));
		interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
		interval.tick().await;

		loop {
			tokio::select! {
				_ = interval.tick() => {
					let mut last_block_num = last_block.lock().await;

					let current_block = match provider.get_block_number().await {
						Ok(block) => block,
						Err(e) => {
							tracing::warn!(error = %e, "Failed to get block number");
							continue;
						}
					};

					if current_block <= *last_block_num {
						continue;
					}

					let from_block = *last_block_num + 1;
					let to_block = current_block.min(last_block_num.saturating_add(max_block_range));

					let filter = Filter::new()
						.address(addresses.clone())
						.event_signature(event_signatures())
						.from_block(from_block)
						.to_block(to_block);

					let logs = match provider.get_logs(&filter).await {
						Ok(logs) => logs,
						Err(e) => {
							tracing::warn!(from_block, to_block, error = %e, "Failed to get logs");
							continue;
						}
					};

					for log in logs {
						let block_number = log.block_number.unwrap_or(to_block);
						let Some(event) = decode_event(&log.inner, block_number) else {
							continue;
						};
						tracing::debug!(kind = ?event.kind(), report_id = ?event.report_id(), "Queued event");
						if sender.send(event).await.is_err() {
							tracing::info!("Event queue closed, stopping poller");
							return;
						}
					}

					*last_block_num = to_block;
				}
				_ = stop_rx.recv() => {
					break;
				}
			}
		}
	}
}

/// Configuration schema for the Alloy chain reader.
pub struct AlloyDiscoverySchema;

impl ConfigSchema for AlloyDiscoverySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			// Required fields
			vec![],
			// Optional fields
			vec![
				Field::new("rpc_url", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
							Ok(())
						},
						_ => Err("RPC URL must start with http:// or https://".to_string()),
					}
				}),
				Field::new("use_arbsys_block_number", FieldType::Boolean),
				Field::new(
					"polling_interval_secs",
					FieldType::Integer {
						min: Some(1),
						max: Some(300),
					},
				),
				Field::new(
					"max_block_range",
					FieldType::Integer {
						min: Some(1),
						max: Some(100_000),
					},
				),
			],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl DiscoveryInterface for AlloyDiscovery {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(AlloyDiscoverySchema)
	}

	async fn get_report_meta(&self, report_id: u64) -> Result<ReportMeta, DiscoveryError> {
		let meta = self
			.call(
				self.contracts.oracle,
				IOpenOracle::reportMetaCall {
					reportId: U256::from(report_id),
				},
			)
			.await?;

		Ok(ReportMeta {
			token1: meta.token1,
			token2: meta.token2,
			fee_percentage: saturating_u64(meta.feePercentage),
			multiplier: saturating_u64(meta.multiplier),
			settlement_time: saturating_u64(meta.settlementTime),
			exact_token1_report: meta.exactToken1Report,
			fee: meta.fee,
			escalation_halt: meta.escalationHalt,
			dispute_delay: saturating_u64(meta.disputeDelay),
			protocol_fee: saturating_u64(meta.protocolFee),
			settler_reward: meta.settlerReward,
			request_block: saturating_u64(meta.requestBlock),
			time_type: meta.timeType,
		})
	}

	async fn get_report_status(&self, report_id: u64) -> Result<ReportStatus, DiscoveryError> {
		let status = self
			.call(
				self.contracts.oracle,
				IOpenOracle::reportStatusCall {
					reportId: U256::from(report_id),
				},
			)
			.await?;

		Ok(ReportStatus {
			current_amount1: status.currentAmount1,
			current_amount2: status.currentAmount2,
			current_reporter: status.currentReporter,
			initial_reporter: status.initialReporter,
			report_timestamp: saturating_u64(status.reportTimestamp),
			settlement_timestamp: saturating_u64(status.settlementTimestamp),
			price: status.price,
			last_dispute_block: saturating_u64(status.lastDisputeBlock),
			is_settled: status.isSettled,
			dispute_occurred: status.disputeOccurred,
			is_distributed: status.isDistributed,
			initial_report_timestamp: saturating_u64(status.initialReportTimestamp),
			last_report_true_time: saturating_u64(status.lastReportTrueTime),
		})
	}

	async fn get_extra_data(&self, report_id: u64) -> Result<ExtraData, DiscoveryError> {
		let extra = self
			.call(
				self.contracts.oracle,
				IOpenOracle::extraDataCall {
					reportId: U256::from(report_id),
				},
			)
			.await?;

		Ok(ExtraData {
			creator: extra.creator,
			request_true_time: saturating_u64(extra.requestTrueTime),
			callback_contract: extra.callbackContract,
			callback_selector: extra.callbackSelector,
			track_disputes: extra.trackDisputes,
			num_reports: saturating_u64(extra.numReports),
			callback_gas_limit: saturating_u64(extra.callbackGasLimit),
			keep_fee: extra.keepFee,
			state_hash: extra.stateHash,
		})
	}

	async fn get_next_report_id(&self) -> Result<u64, DiscoveryError> {
		let next = self
			.call(self.contracts.oracle, IOpenOracle::nextReportIdCall {})
			.await?;
		Ok(saturating_u64(next._0))
	}

	async fn get_data(
		&self,
		start_id: u64,
		end_id: u64,
	) -> Result<Vec<ReportRecord>, DiscoveryError> {
		let data = self
			.call(
				self.contracts.data_provider,
				IOracleDataProvider::getDataCall {
					startId: U256::from(start_id),
					endId: U256::from(end_id),
				},
			)
			.await?;

		Ok(data._0.into_iter().map(ReportRecord::from).collect())
	}

	async fn get_clock(&self) -> Result<ChainClock, DiscoveryError> {
		let block = self
			.provider
			.get_block_by_number(BlockNumberOrTag::Latest, BlockTransactionsKind::Hashes)
			.await
			.map_err(|e| DiscoveryError::Connection(format!("Failed to get latest block: {}", e)))?
			.ok_or_else(|| DiscoveryError::Connection("Latest block not found".to_string()))?;

		let block_number = if self.use_arbsys_block_number {
			let arb = self.call(ARB_SYS, IArbSys::arbBlockNumberCall {}).await?;
			saturating_u64(arb._0)
		} else {
			block.header.number
		};

		Ok(ChainClock {
			timestamp: block.header.timestamp,
			block_number,
		})
	}

	async fn start_monitoring(
		&self,
		sender: mpsc::Sender<OracleEvent>,
	) -> Result<(), DiscoveryError> {
		if self.is_monitoring.load(Ordering::SeqCst) {
			return Err(DiscoveryError::AlreadyMonitoring);
		}

		let current_block = self.provider.get_block_number().await.map_err(|e| {
			DiscoveryError::Connection(format!("Failed to get block number: {}", e))
		})?;
		*self.last_block.lock().await = current_block;

		let (stop_tx, stop_rx) = mpsc::channel(1);
		*self.stop_signal.lock().await = Some(stop_tx);

		let mut addresses = vec![self.contracts.oracle];
		addresses.extend(self.contracts.beacon);

		tokio::spawn(Self::monitoring_loop(
			self.provider.clone(),
			addresses,
			self.last_block.clone(),
			sender,
			stop_rx,
			self.polling_interval_secs,
			self.max_block_range,
		));

		self.is_monitoring.store(true, Ordering::SeqCst);
		tracing::info!(from_block = current_block, "Started event poller");
		Ok(())
	}

	async fn stop_monitoring(&self) -> Result<(), DiscoveryError> {
		if !self.is_monitoring.load(Ordering::SeqCst) {
			return Ok(());
		}

		if let Some(stop_tx) = self.stop_signal.lock().await.take() {
			let _ = stop_tx.send(()).await;
		}

		self.is_monitoring.store(false, Ordering::SeqCst);
		Ok(())
	}
}

/// Factory function to create an Alloy chain reader from configuration.
///
/// Optional configuration parameters:
/// - `rpc_url`: overrides `network.rpc_url`
/// - `use_arbsys_block_number`: read block deadlines from ArbSys (defaults to false)
/// - `polling_interval_secs`: event polling interval (defaults to 2)
/// - `max_block_range`: largest `eth_getLogs` span (defaults to 2000)
pub fn create_discovery(
	config: &toml::Value,
	network: &NetworkConfig,
) -> Result<Box<dyn DiscoveryInterface>, DiscoveryError> {
	AlloyDiscoverySchema
		.validate(config)
		.map_err(|e| DiscoveryError::ValidationError(e.to_string()))?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.unwrap_or(&network.rpc_url);
	let use_arbsys_block_number = config
		.get("use_arbsys_block_number")
		.and_then(|v| v.as_bool())
		.unwrap_or(false);
	let polling_interval_secs = config
		.get("polling_interval_secs")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64);
	let max_block_range = config
		.get("max_block_range")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64);

	let discovery = AlloyDiscovery::new(
		rpc_url,
		network.contracts.clone(),
		use_arbsys_block_number,
		polling_interval_secs,
		max_block_range,
	)?;

	Ok(Box::new(discovery))
}

/// Registry for the Alloy chain reader.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "alloy";
	type Factory = DiscoveryFactory;

	fn factory() -> Self::Factory {
		create_discovery
	}
}

impl DiscoveryRegistry for Registry {}
