//! Counter-report arithmetic for disputes.
//!
//! A dispute only counts if its implied price lands outside the fee band
//! around the current report's price. All arithmetic is done in `U256`; USD
//! prices enter as exact decimal fractions so no floating point is involved.

use keeper_price::PairPrices;
use keeper_types::{Address, DisputeEntry, ReportRecord, TokenPair, B256, U256};
use rust_decimal::Decimal;
use thiserror::Error;

/// Fixed-point scale of implied prices.
pub const PRICE_SCALE: u64 = 1_000_000_000_000_000_000;
/// Scale of `feePercentage` and `protocolFee`.
pub const FEE_SCALE: u64 = 10_000_000;
/// Upper bound on 5% nudges before giving up on a counter amount.
pub const MAX_NUDGES: u32 = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeeBandError {
	#[error("division by zero: current amount2 is zero")]
	DivisionByZero,
	#[error("invalid price: {0}")]
	InvalidPrice(String),
	#[error("arithmetic overflow")]
	Overflow,
	#[error("counter price still inside the fee band after {nudges} adjustments")]
	BandUnreachable { nudges: u32 },
}

/// Price interval in which a counter-report is not a valid dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBand {
	pub old_price: U256,
	pub lower: U256,
	pub upper: U256,
}

impl FeeBand {
	pub fn new(amount1: U256, amount2: U256, fee_percentage: u64) -> Result<Self, FeeBandError> {
		if amount2.is_zero() {
			return Err(FeeBandError::DivisionByZero);
		}
		let old_price = implied_price(amount1, amount2)?;
		let boundary = old_price
			.checked_mul(U256::from(fee_percentage))
			.ok_or(FeeBandError::Overflow)?
			/ U256::from(FEE_SCALE);

		Ok(Self {
			old_price,
			lower: old_price.saturating_sub(boundary),
			upper: old_price
				.checked_add(boundary)
				.ok_or(FeeBandError::Overflow)?,
		})
	}

	/// Inclusive on both ends.
	pub fn contains(&self, price: U256) -> bool {
		price >= self.lower && price <= self.upper
	}
}

/// A computed dispute: the counter amounts plus what the keeper must approve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterReport {
	pub report_id: u64,
	pub token_to_swap: Address,
	/// True when `token_to_swap` is the pair's token1.
	pub swaps_token1: bool,
	pub new_amount1: U256,
	pub new_amount2: U256,
	pub amt2_expected: U256,
	pub state_hash: B256,
	pub band: FeeBand,
	/// Allowance the oracle needs on token1.
	pub approval_token1: U256,
	/// Allowance the oracle needs on token2.
	pub approval_token2: U256,
}

impl CounterReport {
	pub fn implied_price(&self) -> Result<U256, FeeBandError> {
		implied_price(self.new_amount1, self.new_amount2)
	}

	pub fn entry(&self) -> DisputeEntry {
		DisputeEntry {
			report_id: self.report_id,
			token_to_swap: self.token_to_swap,
			new_amount1: self.new_amount1,
			new_amount2: self.new_amount2,
			amt2_expected: self.amt2_expected,
			state_hash: self.state_hash,
		}
	}
}

/// `amount1 * 1e18 / amount2`.
pub fn implied_price(amount1: U256, amount2: U256) -> Result<U256, FeeBandError> {
	if amount2.is_zero() {
		return Err(FeeBandError::DivisionByZero);
	}
	Ok(amount1
		.checked_mul(U256::from(PRICE_SCALE))
		.ok_or(FeeBandError::Overflow)?
		/ amount2)
}

/// Next token1 stake: multiplicative below the escalation halt, `+1` above it.
///
/// Always strictly greater than `amount1`.
pub fn escalate(amount1: U256, multiplier: u64, escalation_halt: U256) -> Result<U256, FeeBandError> {
	let plus_one = amount1.checked_add(U256::from(1u64)).ok_or(FeeBandError::Overflow)?;
	if amount1 >= escalation_halt {
		return Ok(plus_one);
	}

	let scaled = amount1
		.checked_mul(U256::from(multiplier))
		.ok_or(FeeBandError::Overflow)?
		/ U256::from(100u64);
	Ok(if scaled > amount1 { scaled } else { plus_one })
}

/// Splits a positive decimal into an exact `numerator / denominator`.
fn price_fraction(price: Decimal) -> Result<(U256, U256), FeeBandError> {
	if price <= Decimal::ZERO {
		return Err(FeeBandError::InvalidPrice(price.to_string()));
	}
	let numerator = U256::from(price.mantissa().unsigned_abs());
	let denominator = pow10(price.scale())?;
	Ok((numerator, denominator))
}

fn pow10(exponent: u32) -> Result<U256, FeeBandError> {
	U256::from(10u64)
		.checked_pow(U256::from(exponent))
		.ok_or(FeeBandError::Overflow)
}

fn mul_all(factors: &[U256]) -> Result<U256, FeeBandError> {
	factors.iter().try_fold(U256::from(1u64), |acc, factor| {
		acc.checked_mul(*factor).ok_or(FeeBandError::Overflow)
	})
}

/// `amount * fee / 1e7`.
fn fee_on(amount: U256, fee: u64) -> Result<U256, FeeBandError> {
	Ok(amount
		.checked_mul(U256::from(fee))
		.ok_or(FeeBandError::Overflow)?
		/ U256::from(FEE_SCALE))
}

/// Amount of token2, in base units, worth the same USD as `amount1` of token1.
///
/// Rounds down.
pub fn token2_equivalent(
	amount1: U256,
	pair: &TokenPair,
	prices: &PairPrices,
) -> Result<U256, FeeBandError> {
	let (num1, den1) = price_fraction(prices.token1_usd)?;
	let (num2, den2) = price_fraction(prices.token2_usd)?;
	let unit1 = pow10(pair.token1.decimals as u32)?;
	let unit2 = pow10(pair.token2.decimals as u32)?;
	Ok(mul_all(&[amount1, num1, den2, unit2])? / mul_all(&[den1, num2, unit1])?)
}

/// Computes a counter-report whose implied price clears the fee band.
///
/// The side with the lower USD notional is swapped (token1 on ties). The new
/// token2 amount matches the USD value of the escalated token1 amount at the
/// external cross rate, then is nudged by 5% per step (down when swapping
/// token1, up otherwise) until the implied price leaves the band.
pub fn compute_counter(
	report: &ReportRecord,
	pair: &TokenPair,
	prices: &PairPrices,
) -> Result<CounterReport, FeeBandError> {
	let amount1 = report.current_amount1;
	let amount2 = report.current_amount2;
	let band = FeeBand::new(amount1, amount2, report.fee_percentage)?;

	let (num1, den1) = price_fraction(prices.token1_usd)?;
	let (num2, den2) = price_fraction(prices.token2_usd)?;
	let unit1 = pow10(pair.token1.decimals as u32)?;
	let unit2 = pow10(pair.token2.decimals as u32)?;

	// USD notionals over the common denominator den1 * den2 * unit1 * unit2.
	let value1 = mul_all(&[amount1, num1, den2, unit2])?;
	let value2 = mul_all(&[amount2, num2, den1, unit1])?;
	let swaps_token1 = value1 <= value2;

	let new_amount1 = escalate(amount1, report.multiplier, report.escalation_halt)?;
	let mut new_amount2 = token2_equivalent(new_amount1, pair, prices)?;

	let mut nudges = 0;
	loop {
		if new_amount2.is_zero() {
			return Err(FeeBandError::BandUnreachable { nudges });
		}
		if !band.contains(implied_price(new_amount1, new_amount2)?) {
			break;
		}
		if nudges == MAX_NUDGES {
			return Err(FeeBandError::BandUnreachable { nudges });
		}
		let factor = if swaps_token1 { 95u64 } else { 105u64 };
		new_amount2 = new_amount2
			.checked_mul(U256::from(factor))
			.ok_or(FeeBandError::Overflow)?
			/ U256::from(100u64);
		nudges += 1;
	}

	let (approval_token1, approval_token2) = if swaps_token1 {
		let held = amount1
			.checked_add(fee_on(amount1, report.fee_percentage)?)
			.and_then(|v| v.checked_add(fee_on(amount1, report.protocol_fee).ok()?))
			.ok_or(FeeBandError::Overflow)?;
		(held, new_amount2.saturating_sub(amount2))
	} else {
		let held = amount2
			.checked_add(fee_on(amount2, report.fee_percentage)?)
			.and_then(|v| v.checked_add(fee_on(amount2, report.protocol_fee).ok()?))
			.and_then(|v| v.checked_add(new_amount2))
			.ok_or(FeeBandError::Overflow)?;
		(new_amount1.saturating_sub(amount1), held)
	};

	Ok(CounterReport {
		report_id: report.report_id,
		token_to_swap: if swaps_token1 { report.token1 } else { report.token2 },
		swaps_token1,
		new_amount1,
		new_amount2,
		amt2_expected: amount2,
		state_hash: report.state_hash,
		band,
		approval_token1,
		approval_token2,
	})
}
