//! Main entry point for the contract deployment service.
//!
//! This binary runs the deployment pipeline: it accepts deployment requests,
//! drives them through compilation and on-chain submission, polls for
//! confirmation, and aggregates per-chain daily metrics. Storage backend and
//! chain clients are constructed from configuration and injected into the
//! engine.

use alloy_signer_local::PrivateKeySigner;
use clap::Parser;
use deployer_chain::{ChainClient, ChainClientService};
use deployer_config::Config;
use deployer_core::DeployerEngine;
use deployer_storage::implementations::file::FileStorage;
use deployer_storage::implementations::memory::MemoryStorage;
use deployer_storage::{DeploymentStore, StorageInterface};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use deployer_chain::implementations::evm::alloy::EvmChainClient;

/// Command-line arguments for the deployment service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Main entry point for the deployment service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the engine with the configured backends
/// 5. Runs the pipeline until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started deployment service");

	// Load configuration
	let config = Config::from_file(args.config.to_str().ok_or("Invalid config path")?).await?;
	tracing::info!("Loaded configuration [{}]", config.deployer.id);

	let engine = build_engine(config).await?;

	engine.initialize().await?;
	engine.run().await?;

	tracing::info!("Stopped deployment service");
	Ok(())
}

/// Builds the engine with the configured storage backend and one EVM client
/// per configured chain.
async fn build_engine(config: Config) -> Result<DeployerEngine, Box<dyn std::error::Error>> {
	let backend: Box<dyn StorageInterface> = match config.storage.backend.as_str() {
		"file" => {
			// Validation guarantees a path for the file backend.
			let path = config.storage.path.as_deref().unwrap_or("./data");
			Box::new(FileStorage::open(path)?)
		},
		_ => Box::new(MemoryStorage::new()),
	};
	let store = Arc::new(DeploymentStore::new(backend));

	let signer: PrivateKeySigner = config.deployer.submitter_key.parse()?;

	let mut clients: HashMap<u64, Box<dyn ChainClient>> = HashMap::new();
	for (chain_id, chain_config) in &config.chains {
		let client = EvmChainClient::new(*chain_id, chain_config, signer.clone())?;
		clients.insert(*chain_id, Box::new(client));
		tracing::info!(
			chain_id,
			name = chain_config.name.as_deref().unwrap_or("unnamed"),
			priority = chain_config.priority,
			"Configured chain client"
		);
	}
	let chain = Arc::new(ChainClientService::new(clients));

	Ok(DeployerEngine::new(config, store, chain).await)
}
