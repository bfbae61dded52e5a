//! USD price feeds for the oracle keeper.
//!
//! Dispute and initial-report sizing need the USD value of both sides of the
//! token pair. This module provides a small trait over price sources with a
//! live CoinGecko implementation and a fixed-price mock.

use async_trait::async_trait;
use keeper_types::{ConfigSchema, ImplementationRegistry, TokenPair};
use rust_decimal::Decimal;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod coingecko;
	pub mod mock;
}

/// Errors that can occur during price feed operations.
#[derive(Debug, Error)]
pub enum PriceFeedError {
	/// Error that occurs during network communication with price data sources.
	#[error("Network error: {0}")]
	Network(String),
	/// Error that occurs when a symbol is not supported by the price feed.
	#[error("Token not supported: {0}")]
	TokenNotSupported(String),
	/// The source answered but returned no usable price.
	#[error("Price data unavailable: {0}")]
	PriceUnavailable(String),
	/// Error that occurs when configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for price feed implementations.
#[async_trait]
pub trait PriceFeedInterface: Send + Sync {
	/// Returns the configuration schema for this price feed implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// USD price of one whole unit of `symbol`.
	async fn get_usd_price(&self, symbol: &str) -> Result<Decimal, PriceFeedError>;
}

/// Type alias for price feed factory functions.
pub type PriceFeedFactory =
	fn(&toml::Value) -> Result<Box<dyn PriceFeedInterface>, PriceFeedError>;

/// Registry trait for price feed implementations.
pub trait PriceFeedRegistry: ImplementationRegistry<Factory = PriceFeedFactory> {}

/// Get all registered price feed implementations.
pub fn get_all_implementations() -> Vec<(&'static str, PriceFeedFactory)> {
	use implementations::{coingecko, mock};

	vec![
		(coingecko::Registry::NAME, coingecko::Registry::factory()),
		(mock::Registry::NAME, mock::Registry::factory()),
	]
}

/// USD prices of both sides of a pair, read together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairPrices {
	pub token1_usd: Decimal,
	pub token2_usd: Decimal,
}

/// Service wrapping the configured price feed.
pub struct PriceService {
	implementation: Box<dyn PriceFeedInterface>,
}

impl PriceService {
	pub fn new(implementation: Box<dyn PriceFeedInterface>) -> Self {
		Self { implementation }
	}

	/// USD price of one whole unit of `symbol`. Zero or negative prices are rejected.
	pub async fn get_usd_price(&self, symbol: &str) -> Result<Decimal, PriceFeedError> {
		let price = self.implementation.get_usd_price(symbol).await?;
		if price <= Decimal::ZERO {
			return Err(PriceFeedError::PriceUnavailable(format!(
				"Non-positive price {} for {}",
				price, symbol
			)));
		}
		Ok(price)
	}

	/// Reads both prices of a pair concurrently.
	pub async fn get_pair_prices(&self, pair: &TokenPair) -> Result<PairPrices, PriceFeedError> {
		let (token1_usd, token2_usd) = tokio::try_join!(
			self.get_usd_price(&pair.token1.symbol),
			self.get_usd_price(&pair.token2.symbol),
		)?;
		tracing::debug!(
			token1 = %pair.token1.symbol,
			token2 = %pair.token2.symbol,
			%token1_usd,
			%token2_usd,
			"Fetched pair prices"
		);
		Ok(PairPrices {
			token1_usd,
			token2_usd,
		})
	}
}
