//! Configuration module for the oracle keeper.
//!
//! This module provides structures and utilities for managing keeper configuration.
//! It supports loading configuration from TOML files and provides validation to ensure
//! all required configuration values are properly set.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files for better organization:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

#[cfg(feature = "testing")]
pub mod builders;
mod loader;

use keeper_types::{NetworkConfig, U256};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub use loader::ConfigLoader;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the keeper.
///
/// Pluggable sections (`account`, `storage`, `delivery`, `discovery`, `price`) carry
/// raw TOML tables per implementation, validated by each implementation's schema
/// when the engine is built. The remaining sections are typed knobs with defaults
/// matching the production bots.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity and scheduling of this keeper instance.
	pub keeper: KeeperConfig,
	/// Chain, contracts and token pair.
	pub network: NetworkConfig,
	/// Signing account.
	pub account: AccountConfig,
	/// Storage backend for the cursor and submission history.
	pub storage: StorageConfig,
	/// Transaction delivery.
	#[serde(default)]
	pub delivery: DeliveryConfig,
	/// Chain reads and event polling.
	#[serde(default)]
	pub discovery: DiscoveryConfig,
	/// USD price feed. Required by the dispute and initial report bots.
	pub price: Option<PriceConfig>,
	/// Settlement batch sizing.
	#[serde(default)]
	pub settlement: SettlementConfig,
	/// Gas pricing and wallet balance guard.
	#[serde(default)]
	pub gas: GasConfig,
	/// Retry policy shared by estimation and submission.
	#[serde(default)]
	pub retry: RetryConfig,
	/// Report filters shared by the dispute and initial report bots.
	#[serde(default)]
	pub policy: PolicyConfig,
	#[serde(default)]
	pub dispute: DisputeConfig,
	#[serde(default)]
	pub initial_report: InitialReportConfig,
	#[serde(default)]
	pub beacon: BeaconConfig,
}

/// Bot roles a keeper instance can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BotKind {
	/// Settles matured reports in gas-bounded `safeSettleReports` batches.
	SettleBatch,
	/// Disputes mispriced reports with `disputeAndSwap`.
	Dispute,
	/// Submits first reports for new instances.
	InitialReport,
	/// Calls the settlement beacon when accumulated rewards cover gas.
	Beacon,
}

impl BotKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			BotKind::SettleBatch => "settle_batch",
			BotKind::Dispute => "dispute",
			BotKind::InitialReport => "initial_report",
			BotKind::Beacon => "beacon",
		}
	}
}

/// Configuration specific to the keeper instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeeperConfig {
	/// Unique identifier for this keeper instance.
	pub id: String,
	/// Bots run by this instance.
	#[serde(default = "default_bots")]
	pub bots: Vec<BotKind>,
	/// Interval between poll cycles, in milliseconds.
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	/// Deadline for a single cycle or event handler, in seconds.
	#[serde(default = "default_cycle_timeout_seconds")]
	pub cycle_timeout_seconds: u64,
	/// Cursor value used when storage holds none.
	#[serde(default = "default_start_report_id")]
	pub start_report_id: u64,
	/// Number of report ids read per `getData` call.
	#[serde(default = "default_scan_window")]
	pub scan_window: u64,
	/// Capacity of the bounded event queue.
	#[serde(default = "default_event_queue_capacity")]
	pub event_queue_capacity: usize,
	/// Simulate and log every action without broadcasting.
	#[serde(default)]
	pub dry_run: bool,
}

fn default_bots() -> Vec<BotKind> {
	vec![BotKind::SettleBatch]
}

fn default_poll_interval_ms() -> u64 {
	5_000
}

fn default_cycle_timeout_seconds() -> u64 {
	120
}

fn default_start_report_id() -> u64 {
	1217
}

fn default_scan_window() -> u64 {
	100
}

fn default_event_queue_capacity() -> usize {
	256
}

impl KeeperConfig {
	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	pub fn cycle_timeout(&self) -> Duration {
		Duration::from_secs(self.cycle_timeout_seconds)
	}

	pub fn runs(&self, bot: BotKind) -> bool {
		self.bots.contains(&bot)
	}
}

/// Configuration for account management.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of account implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds for cleaning up expired storage entries.
	#[serde(default = "default_cleanup_interval_seconds")]
	pub cleanup_interval_seconds: u64,
	/// How long submission records are kept, in seconds.
	#[serde(default = "default_submission_ttl_seconds")]
	pub submission_ttl_seconds: u64,
}

fn default_cleanup_interval_seconds() -> u64 {
	3600
}

fn default_submission_ttl_seconds() -> u64 {
	7 * 24 * 3600
}

/// Configuration for transaction delivery.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
	/// Which implementation to use as primary.
	#[serde(default = "default_alloy")]
	pub primary: String,
	/// Map of delivery implementation names to their configurations.
	#[serde(default = "default_alloy_implementations")]
	pub implementations: HashMap<String, toml::Value>,
	/// How long to wait for a receipt before reporting a confirmation timeout.
	#[serde(default = "default_confirmation_timeout_seconds")]
	pub confirmation_timeout_seconds: u64,
}

fn default_confirmation_timeout_seconds() -> u64 {
	90
}

impl Default for DeliveryConfig {
	fn default() -> Self {
		Self {
			primary: default_alloy(),
			implementations: default_alloy_implementations(),
			confirmation_timeout_seconds: default_confirmation_timeout_seconds(),
		}
	}
}

/// Configuration for chain reads and event polling.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
	/// Which implementation to use as primary.
	#[serde(default = "default_alloy")]
	pub primary: String,
	/// Map of discovery implementation names to their configurations.
	#[serde(default = "default_alloy_implementations")]
	pub implementations: HashMap<String, toml::Value>,
}

impl Default for DiscoveryConfig {
	fn default() -> Self {
		Self {
			primary: default_alloy(),
			implementations: default_alloy_implementations(),
		}
	}
}

fn default_alloy() -> String {
	"alloy".to_string()
}

fn default_alloy_implementations() -> HashMap<String, toml::Value> {
	HashMap::from([(
		default_alloy(),
		toml::Value::Table(toml::map::Map::new()),
	)])
}

/// Configuration for the USD price feed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PriceConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of price feed implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Settlement batch sizing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SettlementConfig {
	/// Maximum number of reports per `safeSettleReports` call.
	#[serde(default = "default_max_batch_size")]
	pub max_batch_size: usize,
	/// Static per-report gas assumption used for fallback and shrinking.
	#[serde(default = "default_gas_per_report")]
	pub gas_per_report: u64,
	/// Hard ceiling on the gas limit of any submitted transaction.
	#[serde(default = "default_max_gas_limit")]
	pub max_gas_limit: u64,
	/// Percentage added on top of successful gas estimates.
	#[serde(default = "default_gas_buffer_percent")]
	pub gas_buffer_percent: u64,
}

fn default_max_batch_size() -> usize {
	10
}

fn default_gas_per_report() -> u64 {
	750_000
}

fn default_max_gas_limit() -> u64 {
	7_500_000
}

fn default_gas_buffer_percent() -> u64 {
	15
}

impl Default for SettlementConfig {
	fn default() -> Self {
		Self {
			max_batch_size: default_max_batch_size(),
			gas_per_report: default_gas_per_report(),
			max_gas_limit: default_max_gas_limit(),
			gas_buffer_percent: default_gas_buffer_percent(),
		}
	}
}

/// Gas pricing and wallet balance guard.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GasConfig {
	/// Multiplier applied to the node's gas price.
	#[serde(default = "default_gas_price_multiplier")]
	pub price_multiplier: f64,
	/// Optional hard ceiling on the gas price, in wei.
	#[serde(default)]
	pub max_gas_price_wei: Option<u64>,
	/// Submissions are skipped while the wallet holds less than this, in wei.
	#[serde(default = "default_min_balance_wei")]
	pub min_balance_wei: u64,
}

fn default_gas_price_multiplier() -> f64 {
	1.2
}

fn default_min_balance_wei() -> u64 {
	50_000_000_000_000_000 // 0.05 ETH
}

impl Default for GasConfig {
	fn default() -> Self {
		Self {
			price_multiplier: default_gas_price_multiplier(),
			max_gas_price_wei: None,
			min_balance_wei: default_min_balance_wei(),
		}
	}
}

impl GasConfig {
	pub fn min_balance(&self) -> U256 {
		U256::from(self.min_balance_wei)
	}
}

/// Retry policy shared by gas estimation and submission.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
	/// Total attempts before giving up.
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	/// Fixed delay between attempts, in milliseconds.
	#[serde(default = "default_retry_delay_ms")]
	pub retry_delay_ms: u64,
}

fn default_max_retries() -> u32 {
	3
}

fn default_retry_delay_ms() -> u64 {
	1_000
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_retries: default_max_retries(),
			retry_delay_ms: default_retry_delay_ms(),
		}
	}
}

impl RetryConfig {
	pub fn delay(&self) -> Duration {
		Duration::from_millis(self.retry_delay_ms)
	}
}

/// Report filters shared by the dispute and initial report bots.
///
/// Fee values use the oracle's 1e7 scale (1000 = 0.01%).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyConfig {
	#[serde(default = "default_max_fee")]
	pub max_fee: u64,
	/// Largest `exactToken1Report` accepted, in token1 base units.
	#[serde(default = "default_max_exposure")]
	pub max_exposure: u64,
	#[serde(default = "default_max_settlement_time")]
	pub max_settlement_time: u64,
	#[serde(default = "default_max_protocol_fee")]
	pub max_protocol_fee: u64,
	/// Smallest settler reward accepted, in wei.
	#[serde(default = "default_min_settler_reward_wei")]
	pub min_settler_reward_wei: u64,
}

fn default_max_fee() -> u64 {
	5_000
}

fn default_max_exposure() -> u64 {
	50_000_000_000_000_000 // 0.05 WETH
}

fn default_max_settlement_time() -> u64 {
	30
}

fn default_max_protocol_fee() -> u64 {
	1_001
}

fn default_min_settler_reward_wei() -> u64 {
	30_000_000_000_000 // 0.00003 ETH
}

impl Default for PolicyConfig {
	fn default() -> Self {
		Self {
			max_fee: default_max_fee(),
			max_exposure: default_max_exposure(),
			max_settlement_time: default_max_settlement_time(),
			max_protocol_fee: default_max_protocol_fee(),
			min_settler_reward_wei: default_min_settler_reward_wei(),
		}
	}
}

/// Dispute bot settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DisputeConfig {
	#[serde(default = "default_dispute_min_multiplier")]
	pub min_multiplier: u64,
	#[serde(default = "default_max_multiplier")]
	pub max_multiplier: u64,
}

fn default_dispute_min_multiplier() -> u64 {
	101
}

fn default_max_multiplier() -> u64 {
	150
}

impl Default for DisputeConfig {
	fn default() -> Self {
		Self {
			min_multiplier: default_dispute_min_multiplier(),
			max_multiplier: default_max_multiplier(),
		}
	}
}

/// Initial report bot settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InitialReportConfig {
	#[serde(default = "default_initial_min_multiplier")]
	pub min_multiplier: u64,
	#[serde(default = "default_max_multiplier")]
	pub max_multiplier: u64,
	/// Only report on instances that keep the reporter fee.
	#[serde(default = "default_true")]
	pub require_keep_fee: bool,
	/// Safety factor applied to the simulated gas cost.
	#[serde(default = "default_gas_cost_multiplier")]
	pub gas_cost_multiplier: f64,
	/// Minimum reporter fee relative to `exactToken1Report`, in basis points.
	#[serde(default = "default_min_fee_bps")]
	pub min_fee_bps: u64,
}

fn default_initial_min_multiplier() -> u64 {
	109
}

fn default_true() -> bool {
	true
}

fn default_gas_cost_multiplier() -> f64 {
	1.5
}

fn default_min_fee_bps() -> u64 {
	1
}

impl Default for InitialReportConfig {
	fn default() -> Self {
		Self {
			min_multiplier: default_initial_min_multiplier(),
			max_multiplier: default_max_multiplier(),
			require_keep_fee: default_true(),
			gas_cost_multiplier: default_gas_cost_multiplier(),
			min_fee_bps: default_min_fee_bps(),
		}
	}
}

/// Settlement beacon bot settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BeaconConfig {
	/// Number of most recent report ids inspected per cycle.
	#[serde(default = "default_scan_depth")]
	pub scan_depth: u64,
	/// Fixed gas limit for `freeMoneyLight()`.
	#[serde(default = "default_beacon_gas_limit")]
	pub gas_limit: u64,
	/// Gas price ceiling for beacon calls, in wei.
	#[serde(default = "default_beacon_max_gas_price_wei")]
	pub max_gas_price_wei: u64,
	/// Rewards must exceed the simulated cost by this percentage.
	#[serde(default = "default_threshold_percent")]
	pub threshold_percent: u64,
}

fn default_scan_depth() -> u64 {
	8
}

fn default_beacon_gas_limit() -> u64 {
	150_000
}

fn default_beacon_max_gas_price_wei() -> u64 {
	200_000_000 // 0.2 gwei
}

fn default_threshold_percent() -> u64 {
	105
}

impl Default for BeaconConfig {
	fn default() -> Self {
		Self {
			scan_depth: default_scan_depth(),
			gas_limit: default_beacon_gas_limit(),
			max_gas_price_wei: default_beacon_max_gas_price_wei(),
			threshold_percent: default_threshold_percent(),
		}
	}
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut replacements = Vec::new();
	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)));
				},
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to keep earlier offsets valid
	let mut result = input.to_string();
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file with environment variable resolution.
	///
	/// Supports `include = ["file1.toml", "file2.toml"]`; each top-level
	/// section must be unique across all included files.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Validates cross-field constraints that serde cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.keeper.id.is_empty() {
			return Err(ConfigError::Validation("Keeper ID cannot be empty".into()));
		}
		if self.keeper.bots.is_empty() {
			return Err(ConfigError::Validation(
				"At least one bot must be enabled".into(),
			));
		}
		if self.keeper.poll_interval_ms == 0 {
			return Err(ConfigError::Validation(
				"poll_interval_ms must be greater than 0".into(),
			));
		}
		if self.keeper.cycle_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"cycle_timeout_seconds must be greater than 0".into(),
			));
		}
		if self.keeper.scan_window == 0 {
			return Err(ConfigError::Validation(
				"scan_window must be greater than 0".into(),
			));
		}
		if self.keeper.event_queue_capacity == 0 {
			return Err(ConfigError::Validation(
				"event_queue_capacity must be greater than 0".into(),
			));
		}

		if self.network.rpc_url.is_empty() {
			return Err(ConfigError::Validation(
				"network.rpc_url cannot be empty".into(),
			));
		}
		if self.network.tokens.token1.address == self.network.tokens.token2.address {
			return Err(ConfigError::Validation(
				"network.tokens must name two different tokens".into(),
			));
		}

		validate_pluggable("account", &self.account.primary, &self.account.implementations)?;
		validate_pluggable("storage", &self.storage.primary, &self.storage.implementations)?;
		validate_pluggable(
			"delivery",
			&self.delivery.primary,
			&self.delivery.implementations,
		)?;
		validate_pluggable(
			"discovery",
			&self.discovery.primary,
			&self.discovery.implementations,
		)?;

		if self.storage.cleanup_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds must be greater than 0".into(),
			));
		}
		if self.storage.cleanup_interval_seconds > 86400 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds cannot exceed 86400 (24 hours)".into(),
			));
		}
		if self.delivery.confirmation_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"confirmation_timeout_seconds must be greater than 0".into(),
			));
		}

		if self.keeper.runs(BotKind::Dispute) || self.keeper.runs(BotKind::InitialReport) {
			let price = self.price.as_ref().ok_or_else(|| {
				ConfigError::Validation(
					"The dispute and initial_report bots require a [price] section".into(),
				)
			})?;
			validate_pluggable("price", &price.primary, &price.implementations)?;
		}
		if self.keeper.runs(BotKind::Beacon) && self.network.contracts.beacon.is_none() {
			return Err(ConfigError::Validation(
				"The beacon bot requires network.contracts.beacon".into(),
			));
		}

		let settlement = &self.settlement;
		if settlement.max_batch_size == 0 {
			return Err(ConfigError::Validation(
				"settlement.max_batch_size must be at least 1".into(),
			));
		}
		if settlement.gas_per_report == 0 {
			return Err(ConfigError::Validation(
				"settlement.gas_per_report must be greater than 0".into(),
			));
		}
		if settlement.max_gas_limit < settlement.gas_per_report {
			return Err(ConfigError::Validation(format!(
				"settlement.max_gas_limit ({}) must cover at least one report ({})",
				settlement.max_gas_limit, settlement.gas_per_report
			)));
		}

		if !(1.0..=10.0).contains(&self.gas.price_multiplier) {
			return Err(ConfigError::Validation(
				"gas.price_multiplier must be between 1.0 and 10.0".into(),
			));
		}
		if self.retry.max_retries == 0 {
			return Err(ConfigError::Validation(
				"retry.max_retries must be at least 1".into(),
			));
		}

		if self.dispute.min_multiplier > self.dispute.max_multiplier {
			return Err(ConfigError::Validation(
				"dispute.min_multiplier cannot exceed dispute.max_multiplier".into(),
			));
		}
		if self.dispute.min_multiplier <= 100 {
			return Err(ConfigError::Validation(
				"dispute.min_multiplier must be above 100".into(),
			));
		}
		if self.initial_report.min_multiplier > self.initial_report.max_multiplier {
			return Err(ConfigError::Validation(
				"initial_report.min_multiplier cannot exceed initial_report.max_multiplier".into(),
			));
		}
		if self.initial_report.gas_cost_multiplier < 1.0 {
			return Err(ConfigError::Validation(
				"initial_report.gas_cost_multiplier must be at least 1.0".into(),
			));
		}
		if self.beacon.threshold_percent < 100 {
			return Err(ConfigError::Validation(
				"beacon.threshold_percent must be at least 100".into(),
			));
		}

		Ok(())
	}
}

/// Checks that a pluggable section names an existing primary implementation.
fn validate_pluggable(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Implementation of FromStr trait for Config to enable parsing from string.
///
/// Environment variables are resolved and the configuration is validated
/// after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
