//! Registry trait for self-registering implementations.
//!
//! Every pluggable backend (storage, account, delivery, discovery, price feed)
//! exposes a `Registry` type that ties its configuration name to its factory.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation.
	///
	/// This matches the key under the `implementations` table, for example
	/// `storage.implementations.file` or `price.implementations.coingecko`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Returns the factory that builds this implementation from its TOML table.
	fn factory() -> Self::Factory;
}
