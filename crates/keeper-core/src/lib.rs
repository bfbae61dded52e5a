//! Report lifecycle automation for the openOracle keeper.
//!
//! This crate holds the decision logic that turns chain reads into oracle
//! writes: the candidate selector, the fee-band dispute calculator, the
//! gas-bounded settlement batch builder and the nonce-safe submission
//! pipeline. The [`engine::KeeperEngine`] drives them from a single dispatch
//! loop fed by a poll interval and a bounded event queue.

use keeper_delivery::DeliveryError;
use keeper_discovery::DiscoveryError;
use keeper_price::PriceFeedError;
use keeper_storage::StorageError;
use std::time::Duration;
use thiserror::Error;

pub mod batch;
pub mod builder;
pub mod cursor;
pub mod engine;
pub mod fee_band;
pub mod gas;
pub mod handlers;
pub mod retry;
pub mod selector;
pub mod submission;

#[cfg(test)]
pub(crate) mod test_support;

pub use builder::{BuilderError, KeeperBuilder, KeeperFactories};
pub use engine::{EngineError, KeeperEngine};
pub use fee_band::FeeBandError;
pub use selector::Rejection;
pub use submission::SubmissionOutcome;

/// Errors raised while acting on a single cycle or event.
///
/// None of these escape the engine loop; each is logged against the cycle
/// or report that produced it.
#[derive(Debug, Error)]
pub enum KeeperError {
	/// The RPC endpoint failed a read; the cycle is skipped as a whole.
	#[error("Provider unavailable: {0}")]
	ProviderUnavailable(String),
	/// The report failed a policy gate.
	#[error("Rejected: {0}")]
	Rejected(#[from] Rejection),
	/// Gas simulation kept failing for a call that has no static fallback.
	#[error("Gas estimation failed: {0}")]
	Estimation(String),
	/// The report's state hash changed since it was read.
	#[error("Stale report state: {0}")]
	StaleState(String),
	#[error("Nonce conflict: {0}")]
	NonceConflict(String),
	#[error("Submission failed: {0}")]
	Submission(String),
	#[error("Fee band error: {0}")]
	FeeBand(#[from] FeeBandError),
	#[error("Price feed error: {0}")]
	Price(String),
	#[error("Storage error: {0}")]
	Storage(String),
	/// The cycle did not finish within its deadline.
	#[error("Deadline of {0:?} exceeded")]
	Deadline(Duration),
}

impl From<DiscoveryError> for KeeperError {
	fn from(err: DiscoveryError) -> Self {
		KeeperError::ProviderUnavailable(err.to_string())
	}
}

impl From<DeliveryError> for KeeperError {
	fn from(err: DeliveryError) -> Self {
		match err {
			DeliveryError::NonceConflict(msg) => KeeperError::NonceConflict(msg),
			DeliveryError::StaleState(msg) => KeeperError::StaleState(msg),
			DeliveryError::Network(msg) => KeeperError::ProviderUnavailable(msg),
			other => KeeperError::Submission(other.to_string()),
		}
	}
}

impl From<PriceFeedError> for KeeperError {
	fn from(err: PriceFeedError) -> Self {
		KeeperError::Price(err.to_string())
	}
}

impl From<StorageError> for KeeperError {
	fn from(err: StorageError) -> Self {
		KeeperError::Storage(err.to_string())
	}
}
