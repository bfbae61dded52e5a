//! Fixed-price feed for tests and dry runs.

use crate::{PriceFeedError, PriceFeedFactory, PriceFeedInterface, PriceFeedRegistry};
use async_trait::async_trait;
use keeper_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

/// Price feed answering from a static table keyed by upper-case symbol.
pub struct MockPriceFeed {
	prices: HashMap<String, Decimal>,
}

impl MockPriceFeed {
	/// Creates a feed with the built-in WETH/USDC prices, overridden by `overrides`.
	pub fn new(overrides: HashMap<String, Decimal>) -> Self {
		let mut prices = HashMap::from([
			("WETH".to_string(), Decimal::from(3000)),
			("ETH".to_string(), Decimal::from(3000)),
			("USDC".to_string(), Decimal::ONE),
		]);
		for (symbol, price) in overrides {
			prices.insert(symbol.to_uppercase(), price);
		}
		Self { prices }
	}
}

impl Default for MockPriceFeed {
	fn default() -> Self {
		Self::new(HashMap::new())
	}
}

/// Configuration schema for the mock feed.
pub struct MockPriceFeedSchema;

impl ConfigSchema for MockPriceFeedSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![Field::new("prices", FieldType::Table(Schema::new(vec![], vec![])))
				.with_validator(|value| {
					let table = value.as_table().ok_or("prices must be a table")?;
					for (symbol, price) in table {
						parse_price(price)
							.map_err(|e| format!("Invalid price for {}: {}", symbol, e))?;
					}
					Ok(())
				})],
		);

		schema.validate(config)
	}
}

fn parse_price(value: &toml::Value) -> Result<Decimal, String> {
	match value {
		toml::Value::String(s) => Decimal::from_str(s).map_err(|e| e.to_string()),
		toml::Value::Integer(i) => Ok(Decimal::from(*i)),
		toml::Value::Float(f) => Decimal::try_from(*f).map_err(|e| e.to_string()),
		_ => Err("expected a number or a numeric string".to_string()),
	}
}

#[async_trait]
impl PriceFeedInterface for MockPriceFeed {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MockPriceFeedSchema)
	}

	async fn get_usd_price(&self, symbol: &str) -> Result<Decimal, PriceFeedError> {
		self.prices
			.get(&symbol.to_uppercase())
			.copied()
			.ok_or_else(|| PriceFeedError::TokenNotSupported(symbol.to_string()))
	}
}

/// Factory function to create a mock price feed from configuration.
pub fn create_price_feed(config: &toml::Value) -> Result<Box<dyn PriceFeedInterface>, PriceFeedError> {
	MockPriceFeedSchema
		.validate(config)
		.map_err(|e| PriceFeedError::Configuration(e.to_string()))?;

	let mut overrides = HashMap::new();
	if let Some(table) = config.get("prices").and_then(|v| v.as_table()) {
		for (symbol, value) in table {
			let price = parse_price(value).map_err(PriceFeedError::Configuration)?;
			overrides.insert(symbol.clone(), price);
		}
	}

	Ok(Box::new(MockPriceFeed::new(overrides)))
}

/// Registry for the mock price feed implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "mock";
	type Factory = PriceFeedFactory;

	fn factory() -> Self::Factory {
		create_price_feed
	}
}

impl PriceFeedRegistry for Registry {}
