//! Main entry point for the openOracle keeper.
//!
//! Loads the configuration, wires the configured implementations into a
//! keeper engine and runs the enabled bots until interrupted.

use clap::Parser;
use keeper_config::Config;
use keeper_core::KeeperBuilder;
use std::path::PathBuf;

mod factories;

/// Command-line arguments for the keeper.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config/keeper.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(false)
		.init();

	let path = args.config.to_string_lossy();
	let config = Config::from_file(&path).await?;
	tracing::info!(keeper_id = %config.keeper.id, config = %path, "Loaded configuration");

	let engine = KeeperBuilder::new(config)
		.build(factories::all_factories())
		.await?;
	engine.run().await?;

	tracing::info!("Stopped keeper");
	Ok(())
}
