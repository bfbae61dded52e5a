//! Storage-related types for the keeper.

use std::str::FromStr;

/// Storage namespaces.
///
/// Replaces string literals with typed variants for storage operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Last processed report id, one entry per bot.
	Cursor,
	/// Reports behind the cursor still waiting to be settled, one entry per bot.
	PendingSettlements,
	/// Submission attempts keyed by transaction hash.
	Submissions,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Cursor => "cursor",
			StorageKey::PendingSettlements => "pending",
			StorageKey::Submissions => "submissions",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Cursor, Self::PendingSettlements, Self::Submissions].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"cursor" => Ok(Self::Cursor),
			"pending" => Ok(Self::PendingSettlements),
			"submissions" => Ok(Self::Submissions),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_round_trip_names() {
		for key in StorageKey::all() {
			assert_eq!(key.as_str().parse::<StorageKey>(), Ok(key));
		}
		assert!("orders".parse::<StorageKey>().is_err());
	}
}
