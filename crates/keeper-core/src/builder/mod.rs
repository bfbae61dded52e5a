//! Builder for composing a [`KeeperEngine`] from pluggable implementations.
//!
//! Each pluggable section of the configuration names a primary implementation;
//! the builder looks up its factory, constructs the service and then wires the
//! handlers for the bots listed in `keeper.bots`.

use crate::batch::BatchBuilder;
use crate::engine::{Handlers, KeeperEngine};
use crate::gas::GasPricer;
use crate::handlers::{BeaconHandler, DisputeHandler, InitialReportHandler, SettlementHandler};
use crate::retry::RetryPolicy;
use crate::selector::{DisputePolicy, InitialReportPolicy};
use crate::submission::{SubmissionPipeline, SubmissionSettings};
use keeper_account::{AccountFactory, AccountService};
use keeper_config::{BotKind, Config};
use keeper_delivery::{DeliveryFactory, DeliveryService};
use keeper_discovery::{DiscoveryFactory, DiscoveryService};
use keeper_price::{PriceFeedFactory, PriceService};
use keeper_storage::{StorageFactory, StorageService};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while building the engine.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factories for every pluggable component, keyed by implementation name.
#[derive(Default)]
pub struct KeeperFactories {
	pub storage: HashMap<String, StorageFactory>,
	pub account: HashMap<String, AccountFactory>,
	pub delivery: HashMap<String, DeliveryFactory>,
	pub discovery: HashMap<String, DiscoveryFactory>,
	pub price: HashMap<String, PriceFeedFactory>,
}

/// Looks up the factory for the primary implementation of a section and
/// constructs it.
fn create<F, T, E>(
	component: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
	build: impl FnOnce(&F, &toml::Value) -> Result<T, E>,
) -> Result<T, BuilderError>
where
	E: Display,
{
	let factory = factories.get(primary).ok_or_else(|| {
		BuilderError::MissingComponent(format!(
			"no {} implementation named '{}'",
			component, primary
		))
	})?;
	let config = implementations.get(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"{} primary '{}' has no configuration",
			component, primary
		))
	})?;

	match build(factory, config) {
		Ok(implementation) => {
			tracing::info!(component, implementation = %primary, "Loaded");
			Ok(implementation)
		},
		Err(e) => {
			tracing::error!(
				component,
				implementation = %primary,
				error = %e,
				"Failed to create implementation"
			);
			Err(BuilderError::Config(format!(
				"Failed to create {} implementation '{}': {}",
				component, primary, e
			)))
		},
	}
}

/// Builder for constructing a KeeperEngine with pluggable implementations.
pub struct KeeperBuilder {
	config: Config,
}

impl KeeperBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the engine and the handlers of every enabled bot.
	pub async fn build(self, factories: KeeperFactories) -> Result<KeeperEngine, BuilderError> {
		let config = self.config;

		let storage = create(
			"storage",
			&config.storage.primary,
			&config.storage.implementations,
			&factories.storage,
			|factory, value| factory(value),
		)?;
		let storage = Arc::new(StorageService::new(storage));

		let account = create(
			"account",
			&config.account.primary,
			&config.account.implementations,
			&factories.account,
			|factory, value| factory(value),
		)?;
		let account = Arc::new(AccountService::new(account));
		let address = account.get_address().await.map_err(|e| {
			BuilderError::Config(format!("Failed to get keeper address: {}", e))
		})?;
		tracing::info!(address = %address, chain_id = config.network.chain_id, "Keeper account");

		let delivery = create(
			"delivery",
			&config.delivery.primary,
			&config.delivery.implementations,
			&factories.delivery,
			|factory, value| factory(value, &config.network),
		)?;
		let delivery = Arc::new(DeliveryService::new(
			delivery,
			account,
			config.network.chain_id,
			config.network.contracts.clone(),
			Duration::from_secs(config.delivery.confirmation_timeout_seconds),
		));

		let discovery = create(
			"discovery",
			&config.discovery.primary,
			&config.discovery.implementations,
			&factories.discovery,
			|factory, value| factory(value, &config.network),
		)?;
		let discovery = Arc::new(DiscoveryService::new(discovery));

		let needs_prices =
			config.keeper.runs(BotKind::Dispute) || config.keeper.runs(BotKind::InitialReport);
		let prices = match (&config.price, needs_prices) {
			(Some(price), true) => {
				let feed = create(
					"price",
					&price.primary,
					&price.implementations,
					&factories.price,
					|factory, value| factory(value),
				)?;
				Some(Arc::new(PriceService::new(feed)))
			},
			(None, true) => {
				return Err(BuilderError::MissingComponent(
					"[price] section required by the dispute and initial report bots".into(),
				))
			},
			(_, false) => None,
		};

		if config.keeper.runs(BotKind::Beacon) && config.network.contracts.beacon.is_none() {
			return Err(BuilderError::Config(
				"beacon bot enabled without network.contracts.beacon".into(),
			));
		}

		let pipeline = Arc::new(SubmissionPipeline::new(
			delivery,
			storage.clone(),
			SubmissionSettings::from_config(&config),
		));
		let pricer = GasPricer::from_config(&config.gas);
		let pair = config.network.tokens.clone();

		let mut handlers = Handlers::default();
		if config.keeper.runs(BotKind::SettleBatch) {
			handlers.settlement = Some(SettlementHandler::new(
				discovery.clone(),
				pipeline.clone(),
				BatchBuilder::new(&config.settlement, RetryPolicy::from(&config.retry)),
				pricer,
				config.keeper.scan_window,
			));
		}
		if let Some(prices) = &prices {
			if config.keeper.runs(BotKind::Dispute) {
				handlers.dispute = Some(DisputeHandler::new(
					discovery.clone(),
					pipeline.clone(),
					prices.clone(),
					DisputePolicy::from_config(&config.policy, &config.dispute, &pair),
					pair.clone(),
					pricer,
				));
			}
			if config.keeper.runs(BotKind::InitialReport) {
				handlers.initial_report = Some(InitialReportHandler::new(
					discovery.clone(),
					pipeline.clone(),
					prices.clone(),
					InitialReportPolicy::from_config(
						&config.policy,
						&config.initial_report,
						&pair,
					),
					pair.clone(),
					pricer,
				));
			}
		}
		if config.keeper.runs(BotKind::Beacon) {
			handlers.beacon = Some(BeaconHandler::new(
				discovery.clone(),
				pipeline,
				config.beacon.clone(),
			));
		}

		Ok(KeeperEngine::new(config, storage, discovery, handlers))
	}
}
