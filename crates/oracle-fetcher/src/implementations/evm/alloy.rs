//! EVM read calls through alloy.
//!
//! One provider is kept per `(chain_id, hostname)` pair. The first use of an
//! endpoint checks that it actually serves the configured chain.

use crate::{EvmReadInterface, FetchError};
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use dashmap::DashMap;
use oracle_types::RpcProvider;

#[derive(Default)]
pub struct AlloyEvmReader {
	providers: DashMap<(u64, String), DynProvider>,
}

impl AlloyEvmReader {
	pub fn new() -> Self {
		Self::default()
	}

	async fn provider_for(&self, endpoint: &RpcProvider) -> Result<DynProvider, FetchError> {
		let key = (endpoint.chain_id, endpoint.hostname.clone());
		if let Some(provider) = self.providers.get(&key) {
			return Ok(provider.clone());
		}

		let url = endpoint.hostname.parse().map_err(|e| {
			FetchError::InvalidSource(format!("Invalid RPC URL '{}': {}", endpoint.hostname, e))
		})?;
		let provider = ProviderBuilder::new().connect_http(url).erased();

		let chain_id = provider
			.get_chain_id()
			.await
			.map_err(|e| FetchError::Transport(format!("Failed to get chain ID: {}", e)))?;
		if chain_id != endpoint.chain_id {
			return Err(FetchError::InvalidSource(format!(
				"Chain ID mismatch: expected {}, got {}",
				endpoint.chain_id, chain_id
			)));
		}

		tracing::debug!(chain_id, hostname = %endpoint.hostname, "Connected read provider");
		self.providers.insert(key, provider.clone());
		Ok(provider)
	}
}

#[async_trait]
impl EvmReadInterface for AlloyEvmReader {
	async fn call(
		&self,
		endpoint: &RpcProvider,
		target: Address,
		calldata: Bytes,
	) -> Result<Bytes, FetchError> {
		let provider = self.provider_for(endpoint).await?;
		let request = TransactionRequest::default()
			.with_to(target)
			.with_input(calldata);

		provider
			.call(request)
			.await
			.map_err(|e| FetchError::Transport(format!("eth_call failed: {}", e)))
	}
}

pub fn create_evm_reader(_config: &toml::Value) -> Box<dyn EvmReadInterface> {
	Box::new(AlloyEvmReader::new())
}
