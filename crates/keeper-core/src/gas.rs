//! Gas price and gas limit arithmetic.

use keeper_config::GasConfig;
use keeper_delivery::{DeliveryError, DeliveryService};

/// Applies the configured multiplier and ceiling to the node's gas price.
///
/// The price is read once per cycle and reused for every submission in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPricer {
	/// Multiplier in thousandths, so 1.2 is stored as 1200.
	multiplier_permille: u128,
	max_gas_price: Option<u128>,
}

impl GasPricer {
	pub fn new(multiplier: f64, max_gas_price: Option<u128>) -> Self {
		Self {
			multiplier_permille: (multiplier * 1000.0).round().max(0.0) as u128,
			max_gas_price,
		}
	}

	pub fn from_config(config: &GasConfig) -> Self {
		Self::new(
			config.price_multiplier,
			config.max_gas_price_wei.map(u128::from),
		)
	}

	/// Inflated and capped price for a given base price.
	pub fn apply(&self, base: u128) -> u128 {
		let inflated = base.saturating_mul(self.multiplier_permille) / 1000;
		match self.max_gas_price {
			Some(ceiling) => inflated.min(ceiling),
			None => inflated,
		}
	}

	/// Reads the node's gas price and applies multiplier and ceiling.
	pub async fn current(&self, delivery: &DeliveryService) -> Result<u128, DeliveryError> {
		let base = delivery.gas_price().await?;
		let price = self.apply(base);
		tracing::debug!(base_gas_price = base, gas_price = price, "Gas price for cycle");
		Ok(price)
	}
}

/// Adds `buffer_percent` to an estimate and clamps it to `ceiling`.
pub fn buffered(estimate: u64, buffer_percent: u64, ceiling: u64) -> u64 {
	let with_buffer = (estimate as u128) * (100 + buffer_percent as u128) / 100;
	with_buffer.min(ceiling as u128) as u64
}
