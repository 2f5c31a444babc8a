//! Main entry point for the order lifecycle service.
//!
//! Loads configuration, builds the lifecycle engine over the configured storage
//! backend and runs the periodic timeout scanner until interrupted. With
//! `--once` it performs a single scan pass and exits.

use clap::Parser;
use lifecycle_config::Config;
use lifecycle_core::{LifecycleBuilder, LifecycleEngine, LifecycleFactories};
use std::path::PathBuf;
use std::time::Duration;

mod notifications;

const LISTENER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Command-line arguments for the lifecycle service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml", env = "ORDER_LIFECYCLE_CONFIG")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	/// Run a single scan pass, print its report and exit
	#[arg(long)]
	once: bool,
}

/// Main entry point for the lifecycle service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the lifecycle engine with the storage implementations
/// 5. Runs the scanner until interrupted, or once with `--once`
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started order lifecycle service");

	let config_path = args
		.config
		.to_str()
		.ok_or("Configuration path is not valid UTF-8")?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let engine = build_engine(config)?;
	let listener = notifications::spawn_listener(engine.event_bus().subscribe());

	if args.once {
		let report = engine.scanner().run_once().await?;
		println!("{}", serde_json::to_string_pretty(&report)?);
	} else {
		engine.initialize().await?;
		tokio::signal::ctrl_c().await?;
		tracing::info!("Received shutdown signal");
		engine.shutdown().await;
	}

	// Dropping the engine closes the bus so the listener drains and exits
	drop(engine);
	match tokio::time::timeout(LISTENER_DRAIN_TIMEOUT, listener).await {
		Ok(Ok(())) => {},
		Ok(Err(e)) => tracing::warn!("Notification listener ended abnormally: {}", e),
		Err(_) => tracing::warn!("Notification listener did not drain in time"),
	}

	tracing::info!("Stopped order lifecycle service");
	Ok(())
}

/// Builds the lifecycle engine with every storage implementation this binary ships.
fn build_engine(config: Config) -> Result<LifecycleEngine, Box<dyn std::error::Error>> {
	let storage_factories = lifecycle_storage::get_all_implementations()
		.into_iter()
		.map(|(name, factory)| (name.to_string(), factory))
		.collect();

	Ok(LifecycleBuilder::new(config).build(LifecycleFactories { storage_factories })?)
}
