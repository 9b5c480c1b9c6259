//! Data source fetchers.
//!
//! A fetch performs exactly one external read and normalizes the result into
//! a [`NumericValue`]. The transports behind it are capabilities: an
//! [`HttpInterface`] for JSON endpoints and an [`EvmReadInterface`] for
//! read-only contract calls. [`FetchService`] dispatches on the source kind
//! and bounds every call with a fixed timeout.

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use oracle_types::{numeric, DataSource, NumericValue, RpcProvider};
use std::time::Duration;
use thiserror::Error;

pub mod json_path;
pub mod selector;

pub mod implementations {
	pub mod http;
	pub mod evm {
		pub mod alloy;
	}
}

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum FetchError {
	#[error("Fetch timed out after {0:?}")]
	Timeout(Duration),
	#[error("Source answered with HTTP status {0}")]
	HttpStatus(u16),
	#[error("Transport error: {0}")]
	Transport(String),
	#[error("Malformed response: {0}")]
	Malformed(String),
	#[error("Path not found: {0}")]
	PathNotFound(String),
	#[error("Value is not numeric: {0}")]
	NotNumeric(String),
	#[error("Value exceeds numeric precision: {0}")]
	Overflow(String),
	#[error("Invalid source: {0}")]
	InvalidSource(String),
}

/// Response of a single HTTP GET.
#[derive(Debug, Clone)]
pub struct HttpResponse {
	pub status: u16,
	pub body: Vec<u8>,
}

#[async_trait]
pub trait HttpInterface: Send + Sync {
	async fn get(&self, url: &str) -> Result<HttpResponse, FetchError>;
}

/// Read-only contract calls.
#[async_trait]
pub trait EvmReadInterface: Send + Sync {
	/// Executes `eth_call` against `target` and returns the raw return data.
	async fn call(
		&self,
		provider: &RpcProvider,
		target: Address,
		calldata: Bytes,
	) -> Result<Bytes, FetchError>;
}

pub struct FetchService {
	http: Box<dyn HttpInterface>,
	evm: Box<dyn EvmReadInterface>,
	timeout: Duration,
}

impl FetchService {
	pub fn new(
		http: Box<dyn HttpInterface>,
		evm: Box<dyn EvmReadInterface>,
		timeout: Duration,
	) -> Self {
		Self { http, evm, timeout }
	}

	/// Performs one read of `source`. Never retries.
	pub async fn fetch(&self, source: &DataSource) -> Result<NumericValue, FetchError> {
		match tokio::time::timeout(self.timeout, self.fetch_unbounded(source)).await {
			Ok(result) => result,
			Err(_) => Err(FetchError::Timeout(self.timeout)),
		}
	}

	async fn fetch_unbounded(&self, source: &DataSource) -> Result<NumericValue, FetchError> {
		match source {
			DataSource::Http { url, json_path } => self.fetch_http(url, json_path).await,
			DataSource::Evm {
				provider,
				target_address,
				method,
			} => self.fetch_evm(provider, *target_address, method).await,
		}
	}

	async fn fetch_http(&self, url: &str, path: &str) -> Result<NumericValue, FetchError> {
		let response = self.http.get(url).await?;
		if !(200..300).contains(&response.status) {
			return Err(FetchError::HttpStatus(response.status));
		}

		let document: serde_json::Value = serde_json::from_slice(&response.body)
			.map_err(|e| FetchError::Malformed(format!("invalid JSON: {}", e)))?;
		let value = json_path::extract(&document, path)?;

		tracing::debug!(url = %url, path = %path, value = %value, "Fetched HTTP value");
		Ok(value)
	}

	async fn fetch_evm(
		&self,
		provider: &RpcProvider,
		target: Address,
		method: &str,
	) -> Result<NumericValue, FetchError> {
		let selector = selector::method_selector(method)?;
		let output = self
			.evm
			.call(provider, target, Bytes::copy_from_slice(selector.as_slice()))
			.await?;

		if output.len() < 32 {
			return Err(FetchError::Malformed(format!(
				"expected a 32-byte word, got {} bytes",
				output.len()
			)));
		}
		let raw = U256::from_be_slice(&output[..32]);
		let value = numeric::from_uint(raw).map_err(|e| FetchError::Overflow(e.to_string()))?;

		tracing::debug!(
			chain_id = provider.chain_id,
			target = %target,
			method = %method,
			value = %value,
			"Fetched EVM value"
		);
		Ok(value)
	}
}

/// Reads `timeout_ms` from the fetcher section, falling back to the default.
pub fn fetch_timeout(config: &toml::Value) -> Duration {
	config
		.get("timeout_ms")
		.and_then(|v| v.as_integer())
		.filter(|ms| *ms > 0)
		.map(|ms| Duration::from_millis(ms as u64))
		.unwrap_or(DEFAULT_FETCH_TIMEOUT)
}
