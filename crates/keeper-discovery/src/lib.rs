//! Chain reading and event discovery for the oracle keeper.
//!
//! This module exposes the oracle's read surface (per-report views, the bulk
//! data provider and the chain clock) and a log poller that pushes decoded
//! [`OracleEvent`]s into a bounded channel owned by the engine.

use async_trait::async_trait;
use keeper_types::{
	ChainClock, ConfigSchema, ExtraData, ImplementationRegistry, NetworkConfig, OracleEvent,
	ReportMeta, ReportRecord, ReportStatus,
};
use thiserror::Error;
use tokio::sync::mpsc;

pub mod bindings;

/// Re-export implementations
pub mod implementations {
	pub mod alloy;
}

/// Errors that can occur while reading the chain.
#[derive(Debug, Error)]
pub enum DiscoveryError {
	/// Error that occurs when the node cannot be reached.
	#[error("Connection error: {0}")]
	Connection(String),
	/// Error that occurs when a contract call fails.
	#[error("Call failed: {0}")]
	Call(String),
	/// Error that occurs when trying to start monitoring on an already active implementation.
	#[error("Already monitoring")]
	AlreadyMonitoring,
	/// Error that occurs when parsing or decoding data fails.
	#[error("Parse error: {0}")]
	ParseError(String),
	/// Error that occurs when validating configuration.
	#[error("Validation error: {0}")]
	ValidationError(String),
}

/// Read access to the oracle contracts.
#[async_trait]
pub trait DiscoveryInterface: Send + Sync {
	/// Returns the configuration schema for this discovery implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// `oracle.reportMeta(id)`.
	async fn get_report_meta(&self, report_id: u64) -> Result<ReportMeta, DiscoveryError>;

	/// `oracle.reportStatus(id)`.
	async fn get_report_status(&self, report_id: u64) -> Result<ReportStatus, DiscoveryError>;

	/// `oracle.extraData(id)`.
	async fn get_extra_data(&self, report_id: u64) -> Result<ExtraData, DiscoveryError>;

	/// `oracle.nextReportId()`.
	async fn get_next_report_id(&self) -> Result<u64, DiscoveryError>;

	/// `dataProvider.getData(startId, endId)`, in the order returned by the contract.
	async fn get_data(
		&self,
		start_id: u64,
		end_id: u64,
	) -> Result<Vec<ReportRecord>, DiscoveryError>;

	/// Reads the latest block timestamp and block height together.
	async fn get_clock(&self) -> Result<ChainClock, DiscoveryError>;

	/// Starts pushing decoded events into `sender`.
	///
	/// The sender is bounded; the poller waits for room rather than dropping.
	async fn start_monitoring(
		&self,
		sender: mpsc::Sender<OracleEvent>,
	) -> Result<(), DiscoveryError>;

	/// Stops the event poller.
	async fn stop_monitoring(&self) -> Result<(), DiscoveryError>;
}

/// Type alias for discovery factory functions.
pub type DiscoveryFactory =
	fn(&toml::Value, &NetworkConfig) -> Result<Box<dyn DiscoveryInterface>, DiscoveryError>;

/// Registry trait for discovery implementations.
pub trait DiscoveryRegistry: ImplementationRegistry<Factory = DiscoveryFactory> {}

/// Get all registered discovery implementations.
pub fn get_all_implementations() -> Vec<(&'static str, DiscoveryFactory)> {
	use implementations::alloy;

	vec![(alloy::Registry::NAME, alloy::Registry::factory())]
}

/// Service wrapping the chain reader.
pub struct DiscoveryService {
	implementation: Box<dyn DiscoveryInterface>,
}

impl DiscoveryService {
	pub fn new(implementation: Box<dyn DiscoveryInterface>) -> Self {
		Self { implementation }
	}

	/// Returns the chain clock, or an error if the node is unreachable.
	///
	/// Used as the per-cycle health check.
	pub async fn health_check(&self) -> Result<ChainClock, DiscoveryError> {
		self.implementation.get_clock().await
	}

	pub async fn clock(&self) -> Result<ChainClock, DiscoveryError> {
		self.implementation.get_clock().await
	}

	/// Reads one report through the oracle's three per-report views.
	pub async fn get_report(&self, report_id: u64) -> Result<ReportRecord, DiscoveryError> {
		let (meta, status, extra) = tokio::try_join!(
			self.implementation.get_report_meta(report_id),
			self.implementation.get_report_status(report_id),
			self.implementation.get_extra_data(report_id),
		)?;

		Ok(ReportRecord::from_parts(report_id, meta, status, extra))
	}

	/// Reads a window of reports through the bulk data provider.
	pub async fn get_reports(
		&self,
		start_id: u64,
		end_id: u64,
	) -> Result<Vec<ReportRecord>, DiscoveryError> {
		self.implementation.get_data(start_id, end_id).await
	}

	pub async fn next_report_id(&self) -> Result<u64, DiscoveryError> {
		self.implementation.get_next_report_id().await
	}

	pub async fn start_monitoring(
		&self,
		sender: mpsc::Sender<OracleEvent>,
	) -> Result<(), DiscoveryError> {
		self.implementation.start_monitoring(sender).await
	}

	pub async fn stop_monitoring(&self) -> Result<(), DiscoveryError> {
		self.implementation.stop_monitoring().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use keeper_types::{Address, B256, U256};

	struct StaticReader;

	#[async_trait]
	impl DiscoveryInterface for StaticReader {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(implementations::alloy::AlloyDiscoverySchema)
		}

		async fn get_report_meta(&self, _report_id: u64) -> Result<ReportMeta, DiscoveryError> {
			Ok(ReportMeta {
				token1: Address::repeat_byte(0xe1),
				multiplier: 110,
				settlement_time: 30,
				time_type: true,
				..Default::default()
			})
		}

		async fn get_report_status(
			&self,
			_report_id: u64,
		) -> Result<ReportStatus, DiscoveryError> {
			Ok(ReportStatus {
				current_amount1: U256::from(5),
				report_timestamp: 1_000,
				initial_report_timestamp: 1_000,
				..Default::default()
			})
		}

		async fn get_extra_data(&self, report_id: u64) -> Result<ExtraData, DiscoveryError> {
			if report_id == 0 {
				return Err(DiscoveryError::Call("execution reverted".into()));
			}
			Ok(ExtraData {
				state_hash: B256::repeat_byte(0xab),
				..Default::default()
			})
		}

		async fn get_next_report_id(&self) -> Result<u64, DiscoveryError> {
			Ok(1)
		}

		async fn get_data(
			&self,
			_start_id: u64,
			_end_id: u64,
		) -> Result<Vec<ReportRecord>, DiscoveryError> {
			Ok(Vec::new())
		}

		async fn get_clock(&self) -> Result<ChainClock, DiscoveryError> {
			Err(DiscoveryError::Connection("connection refused".into()))
		}

		async fn start_monitoring(
			&self,
			_sender: mpsc::Sender<OracleEvent>,
		) -> Result<(), DiscoveryError> {
			Ok(())
		}

		async fn stop_monitoring(&self) -> Result<(), DiscoveryError> {
			Ok(())
		}
	}

	#[tokio::test]
	async fn test_get_report_joins_views() {
		let service = DiscoveryService::new(Box::new(StaticReader));
		let report = service.get_report(9).await.unwrap();

		assert_eq!(report.report_id, 9);
		assert_eq!(report.token1, Address::repeat_byte(0xe1));
		assert_eq!(report.current_amount1, U256::from(5));
		assert_eq!(report.state_hash, B256::repeat_byte(0xab));
		assert_eq!(report.deadline(), 1_030);
	}

	#[tokio::test]
	async fn test_get_report_fails_if_any_view_fails() {
		let service = DiscoveryService::new(Box::new(StaticReader));
		assert!(matches!(
			service.get_report(0).await,
			Err(DiscoveryError::Call(_))
		));
	}

	#[tokio::test]
	async fn test_health_check_surfaces_connection_errors() {
		let service = DiscoveryService::new(Box::new(StaticReader));
		assert!(matches!(
			service.health_check().await,
			Err(DiscoveryError::Connection(_))
		));
	}
}
