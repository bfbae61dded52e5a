//! Numeric conversions between on-chain and host integer widths.

use alloy_primitives::U256;

/// Narrows a `U256` to `u64`, saturating at `u64::MAX`.
///
/// Report ids, timestamps, block numbers and durations are `uint256` on chain
/// but always fit in 64 bits in practice.
pub fn saturating_u64(value: U256) -> u64 {
	u64::try_from(value).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_saturating_u64() {
		assert_eq!(saturating_u64(U256::from(1217u64)), 1217);
		assert_eq!(saturating_u64(U256::MAX), u64::MAX);
	}
}
