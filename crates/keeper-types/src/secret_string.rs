//! Redacting wrapper for private keys and API tokens.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroizing;

const REDACTED: &str = "<redacted>";

/// A string that is zeroed on drop and never printed.
///
/// Used for the signer's private key and price feed API keys, both of which
/// travel through TOML configuration and would otherwise end up in debug logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(Zeroizing<String>);

impl SecretString {
	pub fn new(value: impl Into<String>) -> Self {
		Self(Zeroizing::new(value.into()))
	}

	/// Returns the secret value. Callers must not log the result.
	pub fn expose_secret(&self) -> &str {
		&self.0
	}

	/// Runs `f` with the secret value, keeping its exposure scoped.
	pub fn with_exposed<F, R>(&self, f: F) -> R
	where
		F: FnOnce(&str) -> R,
	{
		f(&self.0)
	}

	pub fn is_empty(&self) -> bool {
		self.0.trim().is_empty()
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SecretString({})", REDACTED)
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl From<String> for SecretString {
	fn from(s: String) -> Self {
		Self::new(s)
	}
}

impl From<&str> for SecretString {
	fn from(s: &str) -> Self {
		Self::new(s)
	}
}

// Serialized output is always redacted; configs are never written back to disk.
impl Serialize for SecretString {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(REDACTED)
	}
}

impl<'de> Deserialize<'de> for SecretString {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		String::deserialize(deserializer).map(SecretString::new)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_never_printed() {
		let key = SecretString::from("0xdeadbeef");
		assert_eq!(format!("{:?}", key), "SecretString(<redacted>)");
		assert_eq!(key.to_string(), "<redacted>");
		assert_eq!(serde_json::to_string(&key).unwrap(), "\"<redacted>\"");
	}

	#[test]
	fn test_deserialize_and_expose() {
		let key: SecretString = serde_json::from_str("\"0xdeadbeef\"").unwrap();
		assert_eq!(key.expose_secret(), "0xdeadbeef");
		assert_eq!(key.with_exposed(|s| s.len()), 10);
		assert!(SecretString::from("  ").is_empty());
	}
}
