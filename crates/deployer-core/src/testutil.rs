//! Shared test doubles for the pipeline tests.

use async_trait::async_trait;
use deployer_chain::{ChainClient, ChainClientService, ChainError};
use deployer_config::{
	Config, ConfirmationConfig, DeployerConfig, GasConfig, StorageConfig, SubmissionConfig,
};
use deployer_types::{
	ChainConfig, CompiledContract, DeploymentSpec, TransactionHash, TransactionReceipt,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Scripted chain client for exercising the pipeline without a chain.
///
/// Receipt behavior follows a script consumed one entry per poll; once the
/// script is empty every further poll returns the configured default. A
/// template whose source contains "broken" fails compilation, and
/// `transient_failures` makes the first N compile calls fail with a network
/// error to exercise the queue's retry policy.
pub(crate) struct MockChainClient {
	pub compile_calls: AtomicU32,
	pub estimate_calls: AtomicU32,
	pub submit_calls: AtomicU32,
	pub receipt_calls: AtomicU32,
	pub last_gas_limit: AtomicU64,
	pub last_gas_price: AtomicU64,
	remaining_transient_failures: AtomicU32,
	receipt_script: Mutex<VecDeque<Option<TransactionReceipt>>>,
	default_receipt: Option<TransactionReceipt>,
}

pub(crate) fn receipt(success: bool) -> TransactionReceipt {
	TransactionReceipt {
		hash: TransactionHash(vec![0xaa; 32]),
		block_number: 7,
		gas_used: 21_000,
		success,
		contract_address: success.then(|| "0x00000000000000000000000000000000c0ffee00".to_string()),
	}
}

impl MockChainClient {
	fn with_script(
		script: Vec<Option<TransactionReceipt>>,
		default_receipt: Option<TransactionReceipt>,
	) -> Self {
		Self {
			compile_calls: AtomicU32::new(0),
			estimate_calls: AtomicU32::new(0),
			submit_calls: AtomicU32::new(0),
			receipt_calls: AtomicU32::new(0),
			last_gas_limit: AtomicU64::new(0),
			last_gas_price: AtomicU64::new(0),
			remaining_transient_failures: AtomicU32::new(0),
			receipt_script: Mutex::new(script.into()),
			default_receipt,
		}
	}

	/// Receipt appears on the `polls`-th poll with the given outcome.
	pub fn with_receipt_after(polls: u32, success: bool) -> Self {
		let script = vec![None; polls.saturating_sub(1) as usize];
		Self::with_script(script, Some(receipt(success)))
	}

	/// Receipt available from the first poll on.
	pub fn succeeding() -> Self {
		Self::with_script(Vec::new(), Some(receipt(true)))
	}

	/// The transaction is never mined.
	pub fn never_mined() -> Self {
		Self::with_script(Vec::new(), None)
	}

	/// Fails the first `n` compile calls with a transient network error.
	pub fn transient_failures(self, n: u32) -> Self {
		self.remaining_transient_failures.store(n, Ordering::SeqCst);
		self
	}
}

#[async_trait]
impl ChainClient for MockChainClient {
	async fn compile(
		&self,
		template_code: &str,
		_parameters: &serde_json::Value,
	) -> Result<CompiledContract, ChainError> {
		self.compile_calls.fetch_add(1, Ordering::SeqCst);

		let remaining = self.remaining_transient_failures.load(Ordering::SeqCst);
		if remaining > 0 {
			if remaining != u32::MAX {
				self.remaining_transient_failures
					.store(remaining - 1, Ordering::SeqCst);
			}
			return Err(ChainError::Network("rpc timeout".into()));
		}

		if template_code.contains("broken") {
			return Err(ChainError::Compile("template failed to compile".into()));
		}

		Ok(CompiledContract {
			bytecode: vec![0x60, 0x80, 0x60, 0x40],
			abi: serde_json::json!([]),
			constructor_args: Vec::new(),
		})
	}

	async fn estimate_deployment_gas(
		&self,
		_artifact: &CompiledContract,
	) -> Result<u64, ChainError> {
		self.estimate_calls.fetch_add(1, Ordering::SeqCst);
		Ok(100_000)
	}

	async fn submit_deployment(
		&self,
		_artifact: &CompiledContract,
		gas_limit: u64,
		gas_price: Option<u128>,
		_priority_fee: Option<u128>,
	) -> Result<TransactionHash, ChainError> {
		let n = self.submit_calls.fetch_add(1, Ordering::SeqCst);
		self.last_gas_limit.store(gas_limit, Ordering::SeqCst);
		self.last_gas_price
			.store(gas_price.unwrap_or(0) as u64, Ordering::SeqCst);
		Ok(TransactionHash(vec![n as u8 + 1; 32]))
	}

	async fn get_receipt(
		&self,
		hash: &TransactionHash,
	) -> Result<Option<TransactionReceipt>, ChainError> {
		self.receipt_calls.fetch_add(1, Ordering::SeqCst);
		let mut script = self.receipt_script.lock().await;
		let receipt = match script.pop_front() {
			Some(entry) => entry,
			None => self.default_receipt.clone(),
		};
		Ok(receipt.map(|mut r| {
			r.hash = hash.clone();
			r
		}))
	}

	async fn get_gas_price(&self) -> Result<u128, ChainError> {
		Ok(1_000_000_000)
	}
}

/// Delegating wrapper so tests keep a handle on the mock's counters while
/// the service owns the boxed client.
struct SharedMock(Arc<MockChainClient>);

#[async_trait]
impl ChainClient for SharedMock {
	async fn compile(
		&self,
		template_code: &str,
		parameters: &serde_json::Value,
	) -> Result<CompiledContract, ChainError> {
		self.0.compile(template_code, parameters).await
	}

	async fn estimate_deployment_gas(
		&self,
		artifact: &CompiledContract,
	) -> Result<u64, ChainError> {
		self.0.estimate_deployment_gas(artifact).await
	}

	async fn submit_deployment(
		&self,
		artifact: &CompiledContract,
		gas_limit: u64,
		gas_price: Option<u128>,
		priority_fee: Option<u128>,
	) -> Result<TransactionHash, ChainError> {
		self.0
			.submit_deployment(artifact, gas_limit, gas_price, priority_fee)
			.await
	}

	async fn get_receipt(
		&self,
		hash: &TransactionHash,
	) -> Result<Option<TransactionReceipt>, ChainError> {
		self.0.get_receipt(hash).await
	}

	async fn get_gas_price(&self) -> Result<u128, ChainError> {
		self.0.get_gas_price().await
	}
}

/// Builds a chain client service with the mock serving one chain.
pub(crate) fn service_with(
	chain_id: u64,
	mock: Arc<MockChainClient>,
) -> Arc<ChainClientService> {
	let mut clients: HashMap<u64, Box<dyn ChainClient>> = HashMap::new();
	clients.insert(chain_id, Box::new(SharedMock(mock)));
	Arc::new(ChainClientService::new(clients))
}

/// A deployment spec targeting the given chain.
pub(crate) fn spec(chain_id: u64) -> DeploymentSpec {
	DeploymentSpec {
		user_id: "user-1".into(),
		chain_id,
		template_id: "erc20".into(),
		template_code: "contract Token {}".into(),
		parameters: serde_json::json!({"name": "Token", "symbol": "TKN"}),
		gas_settings: None,
	}
}

/// Pipeline config with millisecond-scale delays for fast tests.
pub(crate) fn test_config(chain_id: u64) -> Config {
	Config {
		deployer: DeployerConfig {
			id: "deployer-test".into(),
			submitter_key: "0x01".into(),
		},
		chains: HashMap::from([(
			chain_id,
			ChainConfig {
				rpc_url: "http://localhost:8545".into(),
				compiler_url: "http://localhost:9000/compile".into(),
				name: None,
				priority: 10,
			},
		)]),
		storage: StorageConfig {
			backend: "memory".into(),
			path: None,
		},
		submission: SubmissionConfig {
			workers: 2,
			max_attempts: 3,
			retry_base_delay_ms: 10,
		},
		confirmation: ConfirmationConfig {
			workers: 4,
			max_retries: 3,
			initial_delay_ms: 5,
			poll_interval_ms: 5,
		},
		gas: GasConfig {
			safety_margin_percent: 20,
		},
	}
}
