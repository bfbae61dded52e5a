//! Configuration builder for creating test and development configurations.

use crate::{
	AccountConfig, BeaconConfig, BotKind, Config, DeliveryConfig, DiscoveryConfig,
	DisputeConfig, GasConfig, InitialReportConfig, KeeperConfig, PolicyConfig, PriceConfig,
	RetryConfig, SettlementConfig, StorageConfig,
};
use keeper_types::{Address, ContractAddresses, NetworkConfig, TokenConfig, TokenPair};
use std::collections::HashMap;

/// Anvil's first dev account.
const DEV_PRIVATE_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Builder for creating `Config` instances with a fluent API.
///
/// Defaults mirror production values except for the retry delay, which is
/// zero so tests never sleep.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	keeper_id: String,
	bots: Vec<BotKind>,
	dry_run: bool,
	start_report_id: u64,
	settlement: SettlementConfig,
	gas: GasConfig,
	retry: RetryConfig,
	policy: PolicyConfig,
	beacon: Option<Address>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self {
			keeper_id: "test-keeper".to_string(),
			bots: vec![BotKind::SettleBatch],
			dry_run: false,
			start_report_id: 1,
			settlement: SettlementConfig::default(),
			gas: GasConfig::default(),
			retry: RetryConfig {
				max_retries: 3,
				retry_delay_ms: 0,
			},
			policy: PolicyConfig::default(),
			beacon: None,
		}
	}

	pub fn keeper_id(mut self, id: impl Into<String>) -> Self {
		self.keeper_id = id.into();
		self
	}

	pub fn bots(mut self, bots: Vec<BotKind>) -> Self {
		self.bots = bots;
		self
	}

	pub fn dry_run(mut self, dry_run: bool) -> Self {
		self.dry_run = dry_run;
		self
	}

	pub fn start_report_id(mut self, id: u64) -> Self {
		self.start_report_id = id;
		self
	}

	pub fn settlement(mut self, settlement: SettlementConfig) -> Self {
		self.settlement = settlement;
		self
	}

	pub fn gas(mut self, gas: GasConfig) -> Self {
		self.gas = gas;
		self
	}

	pub fn retry(mut self, retry: RetryConfig) -> Self {
		self.retry = retry;
		self
	}

	pub fn policy(mut self, policy: PolicyConfig) -> Self {
		self.policy = policy;
		self
	}

	pub fn beacon(mut self, beacon: Address) -> Self {
		self.beacon = Some(beacon);
		self
	}

	/// Builds the `Config` with the configured values.
	pub fn build(self) -> Config {
		let memory = HashMap::from([(
			"memory".to_string(),
			toml::Value::Table(toml::map::Map::new()),
		)]);
		let mut local = toml::map::Map::new();
		local.insert(
			"private_key".to_string(),
			toml::Value::String(DEV_PRIVATE_KEY.to_string()),
		);

		Config {
			keeper: KeeperConfig {
				id: self.keeper_id,
				bots: self.bots,
				poll_interval_ms: 1_000,
				cycle_timeout_seconds: 30,
				start_report_id: self.start_report_id,
				scan_window: 100,
				event_queue_capacity: 16,
				dry_run: self.dry_run,
			},
			network: NetworkConfig {
				chain_id: 42161,
				rpc_url: "http://localhost:8545".to_string(),
				sequencer_url: None,
				contracts: ContractAddresses {
					oracle: Address::repeat_byte(0x11),
					batcher: Address::repeat_byte(0x22),
					data_provider: Address::repeat_byte(0x33),
					beacon: self.beacon,
				},
				tokens: TokenPair {
					token1: TokenConfig {
						address: Address::repeat_byte(0xe1),
						symbol: "WETH".to_string(),
						decimals: 18,
					},
					token2: TokenConfig {
						address: Address::repeat_byte(0xe2),
						symbol: "USDC".to_string(),
						decimals: 6,
					},
				},
			},
			account: AccountConfig {
				primary: "local".to_string(),
				implementations: HashMap::from([("local".to_string(), toml::Value::Table(local))]),
			},
			storage: StorageConfig {
				primary: "memory".to_string(),
				implementations: memory,
				cleanup_interval_seconds: 60,
				submission_ttl_seconds: 3600,
			},
			delivery: DeliveryConfig::default(),
			discovery: DiscoveryConfig::default(),
			price: Some(PriceConfig {
				primary: "mock".to_string(),
				implementations: HashMap::from([(
					"mock".to_string(),
					toml::Value::Table(toml::map::Map::new()),
				)]),
			}),
			settlement: self.settlement,
			gas: self.gas,
			retry: self.retry,
			policy: self.policy,
			dispute: DisputeConfig::default(),
			initial_report: InitialReportConfig::default(),
			beacon: BeaconConfig::default(),
		}
	}
}
