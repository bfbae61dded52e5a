//! CoinGecko simple-price feed.
//!
//! Symbols are mapped to CoinGecko coin ids (`WETH` -> `ethereum`,
//! `USDC` -> `usd-coin` by default) and fetched from `/simple/price`.

use crate::{PriceFeedError, PriceFeedFactory, PriceFeedInterface, PriceFeedRegistry};
use async_trait::async_trait;
use keeper_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, SecretString, ValidationError,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Price feed backed by the CoinGecko REST API.
pub struct CoinGeckoPriceFeed {
	client: reqwest::Client,
	base_url: String,
	api_key: Option<SecretString>,
	/// Upper-case symbol -> CoinGecko coin id.
	ids: HashMap<String, String>,
}

impl CoinGeckoPriceFeed {
	pub fn new(
		base_url: String,
		api_key: Option<SecretString>,
		timeout: Duration,
		id_overrides: HashMap<String, String>,
	) -> Result<Self, PriceFeedError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| PriceFeedError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

		let mut ids = HashMap::from([
			("WETH".to_string(), "ethereum".to_string()),
			("ETH".to_string(), "ethereum".to_string()),
			("USDC".to_string(), "usd-coin".to_string()),
		]);
		for (symbol, id) in id_overrides {
			ids.insert(symbol.to_uppercase(), id);
		}

		Ok(Self {
			client,
			base_url: base_url.trim_end_matches('/').to_string(),
			api_key,
			ids,
		})
	}

	fn coin_id(&self, symbol: &str) -> Result<&str, PriceFeedError> {
		self.ids
			.get(&symbol.to_uppercase())
			.map(String::as_str)
			.ok_or_else(|| PriceFeedError::TokenNotSupported(symbol.to_string()))
	}
}

/// One coin's entry in a `/simple/price` response.
#[derive(Debug, Deserialize)]
struct UsdQuote {
	usd: Option<serde_json::Number>,
}

/// `/simple/price` response body, keyed by coin id.
type SimplePriceResponse = HashMap<String, UsdQuote>;

/// Extracts `body[id].usd` as an exact decimal.
fn parse_simple_price(body: &SimplePriceResponse, id: &str) -> Result<Decimal, PriceFeedError> {
	let number = body
		.get(id)
		.and_then(|coin| coin.usd.as_ref())
		.ok_or_else(|| PriceFeedError::PriceUnavailable(format!("No USD price for {}", id)))?;

	let text = number.to_string();
	Decimal::from_str(&text)
		.or_else(|_| Decimal::from_scientific(&text))
		.map_err(|e| PriceFeedError::PriceUnavailable(format!("Invalid price {}: {}", text, e)))
}

/// Configuration schema for the CoinGecko feed.
pub struct CoinGeckoSchema;

impl ConfigSchema for CoinGeckoSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			// Required fields
			vec![],
			// Optional fields
			vec![
				Field::new("base_url", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
							Ok(())
						},
						_ => Err("base_url must start with http:// or https://".to_string()),
					}
				}),
				Field::new("api_key", FieldType::String),
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(60),
					},
				),
				Field::new("ids", FieldType::Table(Schema::new(vec![], vec![]))),
			],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl PriceFeedInterface for CoinGeckoPriceFeed {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(CoinGeckoSchema)
	}

	async fn get_usd_price(&self, symbol: &str) -> Result<Decimal, PriceFeedError> {
		let id = self.coin_id(symbol)?;
		let url = format!("{}/simple/price", self.base_url);

		let mut request = self
			.client
			.get(&url)
			.query(&[("ids", id), ("vs_currencies", "usd")]);
		if let Some(key) = &self.api_key {
			request = request.header("x-cg-demo-api-key", key.expose_secret());
		}

		let response = request
			.send()
			.await
			.map_err(|e| PriceFeedError::Network(format!("CoinGecko request failed: {}", e)))?;
		if !response.status().is_success() {
			return Err(PriceFeedError::Network(format!(
				"CoinGecko returned {}",
				response.status()
			)));
		}

		let body: SimplePriceResponse = response
			.json()
			.await
			.map_err(|e| PriceFeedError::Network(format!("Invalid CoinGecko response: {}", e)))?;

		parse_simple_price(&body, id)
	}
}

/// Factory function to create a CoinGecko feed from configuration.
///
/// Optional configuration parameters:
/// - `base_url`: API root (defaults to the public v3 endpoint)
/// - `api_key`: demo API key sent as `x-cg-demo-api-key`
/// - `timeout_seconds`: request timeout (defaults to 10)
/// - `ids`: extra `SYMBOL = "coin-id"` mappings
pub fn create_price_feed(config: &toml::Value) -> Result<Box<dyn PriceFeedInterface>, PriceFeedError> {
	CoinGeckoSchema
		.validate(config)
		.map_err(|e| PriceFeedError::Configuration(e.to_string()))?;

	let base_url = config
		.get("base_url")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_BASE_URL)
		.to_string();
	let api_key = config
		.get("api_key")
		.and_then(|v| v.as_str())
		.filter(|k| !k.is_empty())
		.map(SecretString::from);
	let timeout = Duration::from_secs(
		config
			.get("timeout_seconds")
			.and_then(|v| v.as_integer())
			.unwrap_or(10) as u64,
	);
	let ids = config
		.get("ids")
		.and_then(|v| v.as_table())
		.map(|table| {
			table
				.iter()
				.filter_map(|(symbol, id)| id.as_str().map(|id| (symbol.clone(), id.to_string())))
				.collect()
		})
		.unwrap_or_default();

	Ok(Box::new(CoinGeckoPriceFeed::new(base_url, api_key, timeout, ids)?))
}

/// Registry for the CoinGecko price feed implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "coingecko";
	type Factory = PriceFeedFactory;

	fn factory() -> Self::Factory {
		create_price_feed
	}
}

impl PriceFeedRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_simple_price() {
		let body: SimplePriceResponse = serde_json::from_value(serde_json::json!({
			"ethereum": { "usd": 3456.78 },
			"usd-coin": { "usd": 0.999912 },
			"delisted": {}
		}))
		.unwrap();
		assert_eq!(
			parse_simple_price(&body, "ethereum").unwrap(),
			Decimal::from_str("3456.78").unwrap()
		);
		assert_eq!(
			parse_simple_price(&body, "usd-coin").unwrap(),
			Decimal::from_str("0.999912").unwrap()
		);
		assert!(matches!(
			parse_simple_price(&body, "bitcoin"),
			Err(PriceFeedError::PriceUnavailable(_))
		));
		assert!(matches!(
			parse_simple_price(&body, "delisted"),
			Err(PriceFeedError::PriceUnavailable(_))
		));
	}

	#[test]
	fn test_symbol_mapping_with_overrides() {
		let feed = CoinGeckoPriceFeed::new(
			DEFAULT_BASE_URL.to_string(),
			None,
			Duration::from_secs(5),
			HashMap::from([("arb".to_string(), "arbitrum".to_string())]),
		)
		.unwrap();

		assert_eq!(feed.coin_id("weth").unwrap(), "ethereum");
		assert_eq!(feed.coin_id("ARB").unwrap(), "arbitrum");
		assert!(feed.coin_id("DOGE").is_err());
	}

	#[test]
	fn test_factory_validates_config() {
		let config: toml::Value = toml::from_str("timeout_seconds = 0").unwrap();
		assert!(matches!(
			create_price_feed(&config),
			Err(PriceFeedError::Configuration(_))
		));

		let config: toml::Value = toml::from_str(r#"base_url = "https://pro-api.coingecko.com/api/v3""#).unwrap();
		assert!(create_price_feed(&config).is_ok());
	}
}
