//! Registry of every implementation compiled into the keeper binary.

use keeper_core::KeeperFactories;
use std::collections::HashMap;

fn named<F>(implementations: Vec<(&'static str, F)>, component: &str) -> HashMap<String, F> {
	implementations
		.into_iter()
		.map(|(name, factory)| {
			tracing::debug!(component, implementation = name, "Registered");
			(name.to_string(), factory)
		})
		.collect()
}

/// Collects the factories registered by each component crate.
pub fn all_factories() -> KeeperFactories {
	KeeperFactories {
		storage: named(keeper_storage::get_all_implementations(), "storage"),
		account: named(keeper_account::get_all_implementations(), "account"),
		delivery: named(keeper_delivery::get_all_implementations(), "delivery"),
		discovery: named(keeper_discovery::get_all_implementations(), "discovery"),
		price: named(keeper_price::get_all_implementations(), "price"),
	}
}
