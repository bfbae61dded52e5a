//! Fakes and fixtures shared by the keeper-core tests.

use async_trait::async_trait;
use keeper_account::{implementations::local::LocalWallet, AccountService};
use keeper_delivery::{DeliveryError, DeliveryInterface, DeliveryService};
use keeper_discovery::{DiscoveryError, DiscoveryInterface, DiscoveryService};
use keeper_price::{implementations::mock::MockPriceFeed, PriceService};
use keeper_storage::{implementations::memory::MemoryStorage, StorageService};
use keeper_types::{
	Address, Bytes, ChainClock, ConfigSchema, ContractAddresses, ExtraData, OracleEvent,
	ReportMeta, ReportRecord, ReportStatus, SecretString, TokenConfig, TokenPair, Transaction,
	TransactionHash, TransactionReceipt, B256, U256,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const ORACLE: Address = Address::new([0x11; 20]);
pub const BEACON: Address = Address::new([0x44; 20]);

pub fn pair() -> TokenPair {
	TokenPair {
		token1: TokenConfig {
			address: Address::repeat_byte(0xe1),
			symbol: "WETH".into(),
			decimals: 18,
		},
		token2: TokenConfig {
			address: Address::repeat_byte(0xe2),
			symbol: "USDC".into(),
			decimals: 6,
		},
	}
}

/// A live, initialized WETH/USDC report that passes the default dispute policy.
///
/// Reported at t=900 in seconds with a 10s dispute delay and a 30s settlement
/// time, so it is settle-ready from t=930.
pub fn report(id: u64) -> ReportRecord {
	ReportRecord {
		report_id: id,
		token1: Address::repeat_byte(0xe1),
		token2: Address::repeat_byte(0xe2),
		fee_percentage: 2222,
		multiplier: 120,
		settlement_time: 30,
		exact_token1_report: U256::from(10_000_000_000_000_000u64),
		fee: U256::from(1_000_000_000_000_000u64),
		escalation_halt: U256::from(1_000_000_000_000_000_000u64),
		dispute_delay: 10,
		protocol_fee: 1000,
		settler_reward: U256::from(100_000_000_000_000u64),
		request_block: 1,
		time_type: true,
		current_amount1: U256::from(10_000_000_000_000_000u64),
		current_amount2: U256::from(30_000_000u64),
		current_reporter: Address::repeat_byte(0xaa),
		initial_reporter: Address::repeat_byte(0xaa),
		report_timestamp: 900,
		initial_report_timestamp: 900,
		last_report_true_time: 900,
		creator: Address::repeat_byte(0xcc),
		request_true_time: 800,
		num_reports: 1,
		keep_fee: true,
		state_hash: B256::left_padding_from(&id.to_be_bytes()),
		..Default::default()
	}
}

/// A freshly created report that has not received its first report yet.
pub fn unreported(id: u64) -> ReportRecord {
	ReportRecord {
		current_amount1: U256::ZERO,
		current_amount2: U256::ZERO,
		current_reporter: Address::ZERO,
		initial_reporter: Address::ZERO,
		report_timestamp: 0,
		initial_report_timestamp: 0,
		last_report_true_time: 0,
		num_reports: 0,
		..report(id)
	}
}

fn split(record: &ReportRecord) -> (ReportMeta, ReportStatus, ExtraData) {
	let r = record.clone();
	(
		ReportMeta {
			token1: r.token1,
			token2: r.token2,
			fee_percentage: r.fee_percentage,
			multiplier: r.multiplier,
			settlement_time: r.settlement_time,
			exact_token1_report: r.exact_token1_report,
			fee: r.fee,
			escalation_halt: r.escalation_halt,
			dispute_delay: r.dispute_delay,
			protocol_fee: r.protocol_fee,
			settler_reward: r.settler_reward,
			request_block: r.request_block,
			time_type: r.time_type,
		},
		ReportStatus {
			current_amount1: r.current_amount1,
			current_amount2: r.current_amount2,
			current_reporter: r.current_reporter,
			initial_reporter: r.initial_reporter,
			report_timestamp: r.report_timestamp,
			settlement_timestamp: r.settlement_timestamp,
			price: r.price,
			last_dispute_block: r.last_dispute_block,
			is_settled: r.is_settled,
			dispute_occurred: r.dispute_occurred,
			is_distributed: r.is_distributed,
			initial_report_timestamp: r.initial_report_timestamp,
			last_report_true_time: r.last_report_true_time,
		},
		ExtraData {
			creator: r.creator,
			request_true_time: r.request_true_time,
			callback_contract: r.callback_contract,
			callback_selector: r.callback_selector,
			track_disputes: r.track_disputes,
			num_reports: r.num_reports,
			callback_gas_limit: r.callback_gas_limit,
			keep_fee: r.keep_fee,
			state_hash: r.state_hash,
		},
	)
}

/// In-memory chain reader.
pub struct FakeReader {
	pub reports: Mutex<BTreeMap<u64, ReportRecord>>,
	/// `None` makes every clock read fail with a connection error.
	pub clock: Mutex<Option<ChainClock>>,
	/// `(start, end)` of every `getData` call.
	pub data_calls: Mutex<Vec<(u64, u64)>>,
	pub events: Mutex<Vec<OracleEvent>>,
}

impl FakeReader {
	pub fn new(reports: Vec<ReportRecord>, timestamp: u64) -> Arc<Self> {
		Arc::new(Self {
			reports: Mutex::new(reports.into_iter().map(|r| (r.report_id, r)).collect()),
			clock: Mutex::new(Some(ChainClock {
				timestamp,
				block_number: timestamp,
			})),
			data_calls: Mutex::new(Vec::new()),
			events: Mutex::new(Vec::new()),
		})
	}

	pub fn set_offline(&self) {
		*self.clock.lock().unwrap() = None;
	}

	pub fn upsert(&self, report: ReportRecord) {
		self.reports.lock().unwrap().insert(report.report_id, report);
	}

	fn lookup(&self, report_id: u64) -> Result<ReportRecord, DiscoveryError> {
		self.reports
			.lock()
			.unwrap()
			.get(&report_id)
			.cloned()
			.ok_or_else(|| DiscoveryError::Call(format!("execution reverted: no report {}", report_id)))
	}

	fn online(&self) -> Result<ChainClock, DiscoveryError> {
		(*self.clock.lock().unwrap())
			.ok_or_else(|| DiscoveryError::Connection("connection refused".into()))
	}
}

pub struct SharedReader(pub Arc<FakeReader>);

#[async_trait]
impl DiscoveryInterface for SharedReader {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(keeper_discovery::implementations::alloy::AlloyDiscoverySchema)
	}

	async fn get_report_meta(&self, report_id: u64) -> Result<ReportMeta, DiscoveryError> {
		self.0.online()?;
		Ok(split(&self.0.lookup(report_id)?).0)
	}

	async fn get_report_status(&self, report_id: u64) -> Result<ReportStatus, DiscoveryError> {
		self.0.online()?;
		Ok(split(&self.0.lookup(report_id)?).1)
	}

	async fn get_extra_data(&self, report_id: u64) -> Result<ExtraData, DiscoveryError> {
		self.0.online()?;
		Ok(split(&self.0.lookup(report_id)?).2)
	}

	async fn get_next_report_id(&self) -> Result<u64, DiscoveryError> {
		self.0.online()?;
		let reports = self.0.reports.lock().unwrap();
		Ok(reports.keys().next_back().map_or(1, |id| id + 1))
	}

	async fn get_data(
		&self,
		start_id: u64,
		end_id: u64,
	) -> Result<Vec<ReportRecord>, DiscoveryError> {
		self.0.online()?;
		self.0.data_calls.lock().unwrap().push((start_id, end_id));
		let reports = self.0.reports.lock().unwrap();
		Ok(reports.range(start_id..end_id).map(|(_, r)| r.clone()).collect())
	}

	async fn get_clock(&self) -> Result<ChainClock, DiscoveryError> {
		self.0.online()
	}

	async fn start_monitoring(
		&self,
		sender: mpsc::Sender<OracleEvent>,
	) -> Result<(), DiscoveryError> {
		let events = self.0.events.lock().unwrap().clone();
		for event in events {
			sender
				.send(event)
				.await
				.map_err(|e| DiscoveryError::Connection(e.to_string()))?;
		}
		Ok(())
	}

	async fn stop_monitoring(&self) -> Result<(), DiscoveryError> {
		Ok(())
	}
}

/// What `get_receipt` answers once a transaction has been sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptMode {
	Success,
	Reverted,
	Never,
}

/// In-memory chain writer with a scripted send and estimate sequence.
pub struct FakeWriter {
	/// Next pending nonce. Bumped by every accepted send.
	pub nonce: AtomicU64,
	pub nonce_reads: AtomicU32,
	/// Errors returned by the next sends, in order. Empty means accept.
	pub send_script: Mutex<VecDeque<DeliveryError>>,
	pub sends: AtomicU32,
	/// Results returned by the next estimates. Empty means `default_estimate`.
	pub estimate_script: Mutex<VecDeque<Result<u64, DeliveryError>>>,
	pub default_estimate: u64,
	/// Targets of every estimate, in order.
	pub estimated: Mutex<Vec<Transaction>>,
	pub receipt_mode: ReceiptMode,
	pub receipt_logs: Vec<alloy_primitives::Log>,
	pub balance: U256,
	pub allowance: Mutex<U256>,
	pub gas_price: u128,
}

impl Default for FakeWriter {
	fn default() -> Self {
		Self {
			nonce: AtomicU64::new(7),
			nonce_reads: AtomicU32::new(0),
			send_script: Mutex::new(VecDeque::new()),
			sends: AtomicU32::new(0),
			estimate_script: Mutex::new(VecDeque::new()),
			default_estimate: 200_000,
			estimated: Mutex::new(Vec::new()),
			receipt_mode: ReceiptMode::Success,
			receipt_logs: Vec::new(),
			balance: U256::from(1_000_000_000_000_000_000u128),
			allowance: Mutex::new(U256::MAX),
			gas_price: 10_000_000,
		}
	}
}

impl FakeWriter {
	pub fn script_sends(&self, errors: Vec<DeliveryError>) {
		self.send_script.lock().unwrap().extend(errors);
	}

	pub fn script_estimates(&self, results: Vec<Result<u64, DeliveryError>>) {
		self.estimate_script.lock().unwrap().extend(results);
	}

	pub fn estimated_targets(&self) -> Vec<Address> {
		self.estimated.lock().unwrap().iter().map(|tx| tx.to).collect()
	}
}

fn hash_for(send: u32) -> TransactionHash {
	TransactionHash(B256::left_padding_from(&u64::from(send).to_be_bytes()))
}

pub struct SharedWriter(pub Arc<FakeWriter>);

#[async_trait]
impl DeliveryInterface for SharedWriter {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(keeper_delivery::implementations::alloy::AlloyDeliverySchema)
	}

	async fn send_raw_transaction(
		&self,
		_payload: &Bytes,
	) -> Result<TransactionHash, DeliveryError> {
		if let Some(error) = self.0.send_script.lock().unwrap().pop_front() {
			return Err(error);
		}
		self.0.nonce.fetch_add(1, Ordering::SeqCst);
		let send = self.0.sends.fetch_add(1, Ordering::SeqCst) + 1;
		Ok(hash_for(send))
	}

	async fn estimate_gas(&self, _from: Address, tx: &Transaction) -> Result<u64, DeliveryError> {
		self.0.estimated.lock().unwrap().push(tx.clone());
		match self.0.estimate_script.lock().unwrap().pop_front() {
			Some(result) => result,
			None => Ok(self.0.default_estimate),
		}
	}

	async fn get_receipt(
		&self,
		hash: &TransactionHash,
	) -> Result<Option<TransactionReceipt>, DeliveryError> {
		let success = match self.0.receipt_mode {
			ReceiptMode::Never => return Ok(None),
			ReceiptMode::Success => true,
			ReceiptMode::Reverted => false,
		};
		Ok(Some(TransactionReceipt {
			hash: *hash,
			block_number: 1_000,
			gas_used: 100_000,
			success,
			logs: self.0.receipt_logs.clone(),
		}))
	}

	async fn get_gas_price(&self) -> Result<u128, DeliveryError> {
		Ok(self.0.gas_price)
	}

	async fn get_nonce(&self, _address: Address) -> Result<u64, DeliveryError> {
		self.0.nonce_reads.fetch_add(1, Ordering::SeqCst);
		Ok(self.0.nonce.load(Ordering::SeqCst))
	}

	async fn get_balance(&self, _address: Address) -> Result<U256, DeliveryError> {
		Ok(self.0.balance)
	}

	async fn get_allowance(
		&self,
		_token: Address,
		_owner: Address,
		_spender: Address,
	) -> Result<U256, DeliveryError> {
		Ok(*self.0.allowance.lock().unwrap())
	}

	async fn get_block_number(&self) -> Result<u64, DeliveryError> {
		Ok(1_000)
	}
}

pub fn contracts() -> ContractAddresses {
	ContractAddresses {
		oracle: ORACLE,
		batcher: Address::repeat_byte(0x22),
		data_provider: Address::repeat_byte(0x33),
		beacon: Some(BEACON),
	}
}

pub fn delivery(writer: &Arc<FakeWriter>) -> Arc<DeliveryService> {
	let wallet = LocalWallet::new(&SecretString::from(ANVIL_KEY)).unwrap();
	Arc::new(
		DeliveryService::new(
			Box::new(SharedWriter(writer.clone())),
			Arc::new(AccountService::new(Box::new(wallet))),
			42161,
			contracts(),
			Duration::from_secs(30),
		)
		.with_receipt_poll_interval(Duration::from_millis(10)),
	)
}

pub fn discovery(reader: &Arc<FakeReader>) -> Arc<DiscoveryService> {
	Arc::new(DiscoveryService::new(Box::new(SharedReader(reader.clone()))))
}

pub fn storage() -> Arc<StorageService> {
	Arc::new(StorageService::new(Box::new(MemoryStorage::new())))
}

pub fn prices() -> Arc<PriceService> {
	Arc::new(PriceService::new(Box::new(MockPriceFeed::default())))
}
