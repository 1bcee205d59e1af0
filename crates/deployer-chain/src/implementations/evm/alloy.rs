//! EVM chain client implementation for the deployment pipeline.
//!
//! This implementation uses the Alloy library to estimate, submit, and
//! monitor deployment transactions on EVM-compatible chains, and a compiler
//! sidecar (reached over HTTP) to turn a contract template plus constructor
//! parameters into a deployable artifact.

use crate::{ChainClient, ChainError};
use alloy_network::EthereumWallet;
use alloy_primitives::FixedBytes;
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_transport_http::Http;
use async_trait::async_trait;
use deployer_types::{
	without_0x_prefix, ChainConfig, CompiledContract, TransactionHash, TransactionReceipt,
};
use serde::Deserialize;
use std::sync::Arc;

/// Response shape of the compiler sidecar.
#[derive(Debug, Deserialize)]
struct CompilerResponse {
	/// Creation bytecode as a hex string.
	bytecode: String,
	/// Contract ABI.
	abi: serde_json::Value,
	/// ABI-encoded constructor arguments as a hex string, when the template
	/// takes any.
	#[serde(default)]
	constructor_args: Option<String>,
	/// Compiler diagnostic when compilation failed.
	#[serde(default)]
	error: Option<String>,
}

/// Alloy-based EVM chain client.
///
/// One instance serves one chain id: it holds the provider (with the signing
/// wallet attached) for that chain's RPC endpoint and the HTTP client for the
/// chain's compiler sidecar.
pub struct EvmChainClient {
	chain_id: u64,
	provider: Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>,
	compiler: reqwest::Client,
	compiler_url: String,
}

impl EvmChainClient {
	/// Creates a new EvmChainClient for the given chain.
	///
	/// The signer is bound to the chain id and wrapped into the provider's
	/// wallet, so submission handles signing internally.
	pub fn new(
		chain_id: u64,
		config: &ChainConfig,
		signer: PrivateKeySigner,
	) -> Result<Self, ChainError> {
		let url = config.rpc_url.parse().map_err(|e| {
			ChainError::Network(format!("Invalid RPC URL for chain {}: {}", chain_id, e))
		})?;

		let chain_signer = signer.with_chain_id(Some(chain_id));
		let wallet = EthereumWallet::from(chain_signer);

		let provider = ProviderBuilder::new()
			.with_recommended_fillers()
			.wallet(wallet)
			.on_http(url);

		Ok(Self {
			chain_id,
			provider: Arc::new(provider) as Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>,
			compiler: reqwest::Client::new(),
			compiler_url: config.compiler_url.clone(),
		})
	}

	/// Concatenates bytecode and encoded constructor arguments into the
	/// transaction input for a contract creation.
	fn init_code(artifact: &CompiledContract) -> Vec<u8> {
		let mut data = artifact.bytecode.clone();
		data.extend_from_slice(&artifact.constructor_args);
		data
	}

	fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, ChainError> {
		hex::decode(without_0x_prefix(value))
			.map_err(|e| ChainError::Compile(format!("Invalid {} hex: {}", field, e)))
	}
}

#[async_trait]
impl ChainClient for EvmChainClient {
	async fn compile(
		&self,
		template_code: &str,
		parameters: &serde_json::Value,
	) -> Result<CompiledContract, ChainError> {
		let response = self
			.compiler
			.post(&self.compiler_url)
			.json(&serde_json::json!({
				"source": template_code,
				"parameters": parameters,
			}))
			.send()
			.await
			.map_err(|e| ChainError::Network(format!("Compiler unreachable: {}", e)))?;

		let status = response.status();
		let body: CompilerResponse = response
			.json()
			.await
			.map_err(|e| ChainError::Compile(format!("Malformed compiler response: {}", e)))?;

		if let Some(error) = body.error {
			return Err(ChainError::Compile(error));
		}
		if !status.is_success() {
			return Err(ChainError::Compile(format!(
				"Compiler returned status {}",
				status
			)));
		}

		let bytecode = Self::decode_hex("bytecode", &body.bytecode)?;
		let constructor_args = match &body.constructor_args {
			Some(args) => Self::decode_hex("constructor_args", args)?,
			None => Vec::new(),
		};

		Ok(CompiledContract {
			bytecode,
			abi: body.abi,
			constructor_args,
		})
	}

	async fn estimate_deployment_gas(
		&self,
		artifact: &CompiledContract,
	) -> Result<u64, ChainError> {
		let request = TransactionRequest::default().input(Self::init_code(artifact).into());

		let estimate = self
			.provider
			.estimate_gas(&request)
			.await
			.map_err(|e| ChainError::Estimation(format!("Failed to estimate gas: {}", e)))?;

		Ok(estimate)
	}

	async fn submit_deployment(
		&self,
		artifact: &CompiledContract,
		gas_limit: u64,
		gas_price: Option<u128>,
		priority_fee: Option<u128>,
	) -> Result<TransactionHash, ChainError> {
		let mut request = TransactionRequest::default()
			.input(Self::init_code(artifact).into())
			.gas_limit(gas_limit);

		if let Some(price) = gas_price {
			request = request.max_fee_per_gas(price);
		}
		if let Some(fee) = priority_fee {
			request = request.max_priority_fee_per_gas(fee);
		}

		// The provider's wallet signs before sending.
		let pending_tx = self
			.provider
			.send_transaction(request)
			.await
			.map_err(|e| ChainError::Submission(format!("Failed to send transaction: {}", e)))?;

		let tx_hash = *pending_tx.tx_hash();
		let hash = TransactionHash(tx_hash.0.to_vec());
		tracing::info!(tx_hash = %hash, chain_id = self.chain_id, "Submitted deployment transaction");

		Ok(hash)
	}

	async fn get_receipt(
		&self,
		hash: &TransactionHash,
	) -> Result<Option<TransactionReceipt>, ChainError> {
		let tx_hash = FixedBytes::<32>::from_slice(&hash.0);

		match self.provider.get_transaction_receipt(tx_hash).await {
			Ok(Some(receipt)) => Ok(Some(TransactionReceipt {
				hash: TransactionHash(receipt.transaction_hash.0.to_vec()),
				block_number: receipt.block_number.unwrap_or(0),
				gas_used: receipt.gas_used as u64,
				success: receipt.status(),
				contract_address: receipt.contract_address.map(|a| a.to_string()),
			})),
			Ok(None) => Ok(None),
			Err(e) => Err(ChainError::Network(format!(
				"Failed to get receipt on chain {}: {}",
				self.chain_id, e
			))),
		}
	}

	async fn get_gas_price(&self) -> Result<u128, ChainError> {
		self.provider
			.get_gas_price()
			.await
			.map_err(|e| ChainError::Network(format!("Failed to get gas price: {}", e)))
	}
}
