//! Configuration module for the contract deployment pipeline.
//!
//! This module provides structures and utilities for managing pipeline
//! configuration. It supports loading configuration from TOML files with
//! `${VAR}` / `${VAR:-default}` environment variable resolution and provides
//! validation to ensure all required configuration values are properly set.

use deployer_types::{deserialize_chains, ChainsConfig};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the deployment pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Configuration specific to this pipeline instance.
	pub deployer: DeployerConfig,
	/// Target chain table.
	#[serde(deserialize_with = "deserialize_chains")]
	pub chains: ChainsConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Submission worker pool and retry tuning.
	#[serde(default)]
	pub submission: SubmissionConfig,
	/// Confirmation polling pool and budget tuning.
	#[serde(default)]
	pub confirmation: ConfirmationConfig,
	/// Gas handling tuning.
	#[serde(default)]
	pub gas: GasConfig,
}

/// Configuration specific to this pipeline instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeployerConfig {
	/// Unique identifier for this pipeline instance.
	pub id: String,
	/// Hex-encoded private key used to sign deployment transactions.
	pub submitter_key: String,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which backend to use: "memory" or "file".
	pub backend: String,
	/// Base directory for the file backend.
	#[serde(default)]
	pub path: Option<String>,
}

/// Tuning for the deployment submission queue (spec: bounded pool, bounded
/// attempts, exponential retry delay).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmissionConfig {
	/// Number of concurrent submission workers.
	#[serde(default = "default_submission_workers")]
	pub workers: usize,
	/// Attempts per job before it is surfaced as permanently failed.
	#[serde(default = "default_submission_attempts")]
	pub max_attempts: u32,
	/// Base delay for the exponential retry backoff, in milliseconds.
	#[serde(default = "default_submission_retry_base_ms")]
	pub retry_base_delay_ms: u64,
}

impl Default for SubmissionConfig {
	fn default() -> Self {
		Self {
			workers: default_submission_workers(),
			max_attempts: default_submission_attempts(),
			retry_base_delay_ms: default_submission_retry_base_ms(),
		}
	}
}

fn default_submission_workers() -> usize {
	4
}

fn default_submission_attempts() -> u32 {
	3
}

fn default_submission_retry_base_ms() -> u64 {
	2_000
}

/// Tuning for the confirmation polling queue (spec: fixed backoff, bounded
/// poll budget).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfirmationConfig {
	/// Number of concurrent polling workers. Polls are cheap and numerous,
	/// so this pool runs wider than the submission pool.
	#[serde(default = "default_confirmation_workers")]
	pub workers: usize,
	/// Receipt polls per transaction before the task times out.
	#[serde(default = "default_confirmation_retries")]
	pub max_retries: u32,
	/// Delay before the first poll, in milliseconds.
	#[serde(default = "default_initial_delay_ms")]
	pub initial_delay_ms: u64,
	/// Fixed delay between polls, in milliseconds.
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
}

impl Default for ConfirmationConfig {
	fn default() -> Self {
		Self {
			workers: default_confirmation_workers(),
			max_retries: default_confirmation_retries(),
			initial_delay_ms: default_initial_delay_ms(),
			poll_interval_ms: default_poll_interval_ms(),
		}
	}
}

fn default_confirmation_workers() -> usize {
	8
}

fn default_confirmation_retries() -> u32 {
	deployer_types::DEFAULT_MAX_CONFIRMATION_RETRIES
}

fn default_initial_delay_ms() -> u64 {
	15_000
}

fn default_poll_interval_ms() -> u64 {
	30_000
}

/// Gas handling tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GasConfig {
	/// Percentage added to the gas estimate when the caller supplies no
	/// explicit limit.
	#[serde(default = "default_gas_margin")]
	pub safety_margin_percent: u64,
}

impl Default for GasConfig {
	fn default() -> Self {
		Self {
			safety_margin_percent: default_gas_margin(),
		}
	}
}

fn default_gas_margin() -> u64 {
	20
}

/// Upper bound on a config file; anything larger is a mistake, not a workload.
const MAX_CONFIG_BYTES: usize = 1024 * 1024;

/// Expands `${VAR}` and `${VAR:-default}` references against the process
/// environment.
///
/// A referenced variable that is unset and has no default fails the load, so
/// a half-configured pipeline cannot start with an empty key or RPC URL.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	if input.len() > MAX_CONFIG_BYTES {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_CONFIG_BYTES
		)));
	}

	let pattern = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	// Single pass over the input, copying the text between references and
	// splicing in each resolved value.
	let mut resolved = String::with_capacity(input.len());
	let mut cursor = 0;

	for cap in pattern.captures_iter(input) {
		let Some(reference) = cap.get(0) else {
			continue;
		};
		let name = &cap[1];

		let value = match std::env::var(name) {
			Ok(value) => value,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						name
					)));
				},
			},
		};

		resolved.push_str(&input[cursor..reference.start()]);
		resolved.push_str(&value);
		cursor = reference.end();
	}
	resolved.push_str(&input[cursor..]);

	Ok(resolved)
}

impl Config {
	/// Loads configuration from a file with environment variable resolution.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path).await?;
		content.parse()
	}

	/// Validates the configuration to ensure all required fields are properly set.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.deployer.id.is_empty() {
			return Err(ConfigError::Validation("Deployer ID cannot be empty".into()));
		}
		if self.deployer.submitter_key.is_empty() {
			return Err(ConfigError::Validation(
				"Submitter key cannot be empty".into(),
			));
		}

		if self.chains.is_empty() {
			return Err(ConfigError::Validation(
				"Chains configuration cannot be empty".into(),
			));
		}
		for (chain_id, chain) in &self.chains {
			if chain.rpc_url.is_empty() {
				return Err(ConfigError::Validation(format!(
					"Chain {} must have rpc_url",
					chain_id
				)));
			}
			if chain.compiler_url.is_empty() {
				return Err(ConfigError::Validation(format!(
					"Chain {} must have compiler_url",
					chain_id
				)));
			}
			if chain.priority == 0 {
				return Err(ConfigError::Validation(format!(
					"Chain {} priority must be at least 1",
					chain_id
				)));
			}
		}

		match self.storage.backend.as_str() {
			"memory" => {},
			"file" => {
				if self.storage.path.as_deref().unwrap_or("").is_empty() {
					return Err(ConfigError::Validation(
						"File storage backend requires a path".into(),
					));
				}
			},
			other => {
				return Err(ConfigError::Validation(format!(
					"Unknown storage backend '{}'",
					other
				)));
			},
		}

		if self.submission.workers == 0 {
			return Err(ConfigError::Validation(
				"Submission workers must be at least 1".into(),
			));
		}
		if self.submission.max_attempts == 0 {
			return Err(ConfigError::Validation(
				"Submission max_attempts must be at least 1".into(),
			));
		}

		if self.confirmation.workers == 0 {
			return Err(ConfigError::Validation(
				"Confirmation workers must be at least 1".into(),
			));
		}
		if self.confirmation.max_retries == 0 {
			return Err(ConfigError::Validation(
				"Confirmation max_retries must be at least 1".into(),
			));
		}

		if self.gas.safety_margin_percent > 100 {
			return Err(ConfigError::Validation(
				"Gas safety margin cannot exceed 100 percent".into(),
			));
		}

		Ok(())
	}
}

/// Implementation of FromStr trait for Config to enable parsing from string.
///
/// Environment variables are resolved and the configuration is automatically
/// validated after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
