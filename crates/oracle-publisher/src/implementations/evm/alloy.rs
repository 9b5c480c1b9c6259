//! Price feed access through alloy.
//!
//! Providers are cached per destination endpoint and signing identity. A
//! destination whose provider names a `credential_path` signs with the key in
//! that file; every other destination signs with the injected default wallet.

use crate::{classify_rpc_error, PriceFeedInterface, PublishError};
use alloy::network::EthereumWallet;
use alloy::primitives::{aliases::U80, FixedBytes, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::sol;
use async_trait::async_trait;
use dashmap::DashMap;
use oracle_account::implementations::local::LocalWallet;
use oracle_account::{AccountInterface, AccountService};
use oracle_types::{
	ConfigSchema, Destination, Field, FieldType, OnchainRound, Schema, TransactionHash,
	TransactionReceipt, ValidationError,
};
use std::time::Duration;

sol! {
	#[sol(rpc)]
	interface IPriceFeed {
		event AnswerUpdated(uint256 indexed current, uint256 indexed roundId, uint256 updatedAt);

		function updatePrice(uint256 answer) external;

		function latestRoundData() external view returns (
			uint80 roundId,
			uint256 answer,
			uint256 startedAt,
			uint256 updatedAt,
			uint80 answeredInRound
		);

		function getRoundData(uint80 _roundId) external view returns (
			uint80 roundId,
			uint256 answer,
			uint256 startedAt,
			uint256 updatedAt,
			uint80 answeredInRound
		);
	}
}

const DEFAULT_CONFIRMATIONS: u64 = 1;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;

#[derive(Clone, PartialEq, Eq, Hash)]
struct ProviderKey {
	chain_id: u64,
	hostname: String,
	credential_path: Option<String>,
}

impl From<&Destination> for ProviderKey {
	fn from(destination: &Destination) -> Self {
		Self {
			chain_id: destination.provider.chain_id,
			hostname: destination.provider.hostname.clone(),
			credential_path: destination.provider.credential_path.clone(),
		}
	}
}

pub struct AlloyPriceFeed {
	default_wallet: Option<EthereumWallet>,
	providers: DashMap<ProviderKey, DynProvider>,
	poll_interval: Duration,
	confirmation_timeout: Duration,
}

impl AlloyPriceFeed {
	pub fn new(
		default_wallet: Option<EthereumWallet>,
		poll_interval: Duration,
		confirmation_timeout: Duration,
	) -> Self {
		Self {
			default_wallet,
			providers: DashMap::new(),
			poll_interval,
			confirmation_timeout,
		}
	}

	fn wallet_for(&self, destination: &Destination) -> Result<Option<EthereumWallet>, PublishError> {
		match &destination.provider.credential_path {
			Some(path) => {
				let wallet = LocalWallet::from_file(path)
					.map_err(|e| PublishError::Unauthorized(e.to_string()))?;
				Ok(Some(wallet.wallet()))
			}
			None => Ok(self.default_wallet.clone()),
		}
	}

	async fn provider(&self, destination: &Destination) -> Result<DynProvider, PublishError> {
		let key = ProviderKey::from(destination);
		if let Some(provider) = self.providers.get(&key) {
			return Ok(provider.clone());
		}

		let url = destination.provider.hostname.parse().map_err(|e| {
			PublishError::InvalidDestination(format!(
				"Invalid RPC URL '{}': {}",
				destination.provider.hostname, e
			))
		})?;
		let provider = match self.wallet_for(destination)? {
			Some(wallet) => ProviderBuilder::new()
				.with_chain_id(destination.provider.chain_id)
				.wallet(wallet)
				.connect_http(url)
				.erased(),
			None => ProviderBuilder::new().connect_http(url).erased(),
		};

		let chain_id = provider
			.get_chain_id()
			.await
			.map_err(|e| classify_rpc_error(&format!("Failed to get chain ID: {}", e)))?;
		if chain_id != destination.provider.chain_id {
			return Err(PublishError::InvalidDestination(format!(
				"Chain ID mismatch: expected {}, got {}",
				destination.provider.chain_id, chain_id
			)));
		}

		self.providers.insert(key, provider.clone());
		Ok(provider)
	}

	fn has_signer(&self, destination: &Destination) -> bool {
		destination.provider.credential_path.is_some() || self.default_wallet.is_some()
	}
}

fn narrow(value: U80, what: &str) -> Result<u64, PublishError> {
	u64::try_from(value)
		.map_err(|_| PublishError::InvalidDestination(format!("{} {} exceeds u64", what, value)))
}

fn seconds(value: U256) -> u64 {
	u64::try_from(value).unwrap_or(u64::MAX)
}

fn tx_hash(hash: &TransactionHash) -> Result<FixedBytes<32>, PublishError> {
	if hash.0.len() != 32 {
		return Err(PublishError::Network(format!(
			"transaction hash {} is not 32 bytes",
			hash
		)));
	}
	Ok(FixedBytes::<32>::from_slice(&hash.0))
}

#[async_trait]
impl PriceFeedInterface for AlloyPriceFeed {
	async fn latest_round(&self, destination: &Destination) -> Result<OnchainRound, PublishError> {
		let provider = self.provider(destination).await?;
		let feed = IPriceFeed::new(destination.contract, provider);

		let data = feed
			.latestRoundData()
			.call()
			.await
			.map_err(|e| classify_rpc_error(&format!("latestRoundData failed: {}", e)))?;

		Ok(OnchainRound {
			round_id: narrow(data.roundId, "round id")?,
			answer: data.answer,
			started_at: seconds(data.startedAt),
			updated_at: seconds(data.updatedAt),
			answered_in_round: narrow(data.answeredInRound, "answered-in round")?,
		})
	}

	async fn round_data(
		&self,
		destination: &Destination,
		round_id: u64,
	) -> Result<Option<OnchainRound>, PublishError> {
		let provider = self.provider(destination).await?;
		let feed = IPriceFeed::new(destination.contract, provider);

		match feed.getRoundData(U80::from(round_id)).call().await {
			Ok(data) if data.updatedAt.is_zero() => Ok(None),
			Ok(data) => Ok(Some(OnchainRound {
				round_id: narrow(data.roundId, "round id")?,
				answer: data.answer,
				started_at: seconds(data.startedAt),
				updated_at: seconds(data.updatedAt),
				answered_in_round: narrow(data.answeredInRound, "answered-in round")?,
			})),
			// Feeds revert on rounds they never stored.
			Err(e) => match classify_rpc_error(&e.to_string()) {
				PublishError::Reverted(_) => Ok(None),
				other => Err(other),
			},
		}
	}

	async fn submit_update(
		&self,
		destination: &Destination,
		answer: U256,
	) -> Result<TransactionHash, PublishError> {
		if !self.has_signer(destination) {
			return Err(PublishError::Unauthorized(
				"no signing identity configured for destination".to_string(),
			));
		}
		let provider = self.provider(destination).await?;
		let feed = IPriceFeed::new(destination.contract, provider);

		let pending = feed
			.updatePrice(answer)
			.send()
			.await
			.map_err(|e| classify_rpc_error(&format!("Failed to send updatePrice: {}", e)))?;

		Ok(TransactionHash(pending.tx_hash().0.to_vec()))
	}

	async fn get_receipt(
		&self,
		destination: &Destination,
		hash: &TransactionHash,
	) -> Result<Option<TransactionReceipt>, PublishError> {
		let provider = self.provider(destination).await?;
		let receipt = provider
			.get_transaction_receipt(tx_hash(hash)?)
			.await
			.map_err(|e| classify_rpc_error(&format!("Failed to get receipt: {}", e)))?;

		Ok(receipt.map(|receipt| TransactionReceipt {
			hash: TransactionHash(receipt.transaction_hash.0.to_vec()),
			block_number: receipt.block_number.unwrap_or(0),
			success: receipt.status(),
		}))
	}

	async fn transaction_known(
		&self,
		destination: &Destination,
		hash: &TransactionHash,
	) -> Result<bool, PublishError> {
		let provider = self.provider(destination).await?;
		let tx = provider
			.get_transaction_by_hash(tx_hash(hash)?)
			.await
			.map_err(|e| classify_rpc_error(&format!("Failed to get transaction: {}", e)))?;
		Ok(tx.is_some())
	}

	async fn wait_for_confirmation(
		&self,
		destination: &Destination,
		hash: &TransactionHash,
		confirmations: u64,
	) -> Result<TransactionReceipt, PublishError> {
		let provider = self.provider(destination).await?;
		let start_time = tokio::time::Instant::now();

		tracing::debug!(
			tx_hash = %hash.short(),
			"Waiting for {} confirmations (timeout: {}s)",
			confirmations,
			self.confirmation_timeout.as_secs()
		);

		loop {
			if start_time.elapsed() > self.confirmation_timeout {
				return Err(PublishError::Unconfirmed {
					tx_hash: hash.to_string(),
					reason: format!(
						"no {} confirmations after {}s",
						confirmations,
						self.confirmation_timeout.as_secs()
					),
				});
			}

			let Some(receipt) = self.get_receipt(destination, hash).await? else {
				tokio::time::sleep(self.poll_interval).await;
				continue;
			};

			let current_block = provider
				.get_block_number()
				.await
				.map_err(|e| classify_rpc_error(&format!("Failed to get block number: {}", e)))?;
			// The including block counts as the first confirmation.
			let depth = current_block.saturating_sub(receipt.block_number) + 1;
			if depth >= confirmations {
				return Ok(receipt);
			}

			tokio::time::sleep(self.poll_interval).await;
		}
	}
}

pub struct AlloyPriceFeedSchema;

impl ConfigSchema for AlloyPriceFeedSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new(
					"confirmations",
					FieldType::Integer {
						min: Some(1),
						max: Some(64),
					},
				),
				Field::new(
					"poll_interval_ms",
					FieldType::Integer {
						min: Some(10),
						max: None,
					},
				),
				Field::new(
					"confirmation_timeout_secs",
					FieldType::Integer {
						min: Some(1),
						max: Some(3600),
					},
				),
			],
		);
		schema.validate(config)
	}
}

fn int_or(config: &toml::Value, key: &str, default: u64) -> u64 {
	config
		.get(key)
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(default)
}

/// Confirmation depth the publisher waits for.
pub fn confirmations(config: &toml::Value) -> u64 {
	int_or(config, "confirmations", DEFAULT_CONFIRMATIONS)
}

/// Creates the alloy price feed backend from the `[publisher]` section.
///
/// Configuration parameters:
/// - `confirmations`: blocks to wait for (default: 1)
/// - `poll_interval_ms`: receipt polling interval (default: 2000)
/// - `confirmation_timeout_secs`: give up waiting after this long (default: 120)
pub fn create_price_feed(
	config: &toml::Value,
	account: Option<&AccountService>,
) -> Result<Box<dyn PriceFeedInterface>, PublishError> {
	AlloyPriceFeedSchema
		.validate(config)
		.map_err(|e| PublishError::InvalidDestination(e.to_string()))?;

	Ok(Box::new(AlloyPriceFeed::new(
		account.map(|a| a.wallet()),
		Duration::from_millis(int_or(config, "poll_interval_ms", DEFAULT_POLL_INTERVAL_MS)),
		Duration::from_secs(int_or(
			config,
			"confirmation_timeout_secs",
			DEFAULT_CONFIRMATION_TIMEOUT_SECS,
		)),
	)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_publisher_config_defaults_and_bounds() {
		let empty = toml::Value::Table(Default::default());
		assert_eq!(confirmations(&empty), DEFAULT_CONFIRMATIONS);
		assert!(create_price_feed(&empty, None).is_ok());

		let config: toml::Value = toml::from_str("confirmations = 0").unwrap();
		assert!(create_price_feed(&config, None).is_err());

		let config: toml::Value = toml::from_str("confirmations = 3").unwrap();
		assert_eq!(confirmations(&config), 3);
	}

	#[test]
	fn test_destination_key_file_overrides_default_wallet() {
		let dir = tempfile::tempdir().unwrap();
		let key_path = dir.path().join("publisher.key");
		std::fs::write(
			&key_path,
			"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80\n",
		)
		.unwrap();

		let feed = AlloyPriceFeed::new(None, Duration::from_millis(10), Duration::from_secs(1));
		let mut destination = Destination {
			contract: oracle_types::Address::repeat_byte(0xe1),
			provider: oracle_types::RpcProvider {
				chain_id: 31337,
				hostname: "http://localhost:8545".to_string(),
				credential_path: None,
			},
			decimals: 8,
		};
		assert!(feed.wallet_for(&destination).unwrap().is_none());

		destination.provider.credential_path = Some(key_path.display().to_string());
		assert!(feed.wallet_for(&destination).unwrap().is_some());

		destination.provider.credential_path =
			Some(dir.path().join("missing.key").display().to_string());
		assert!(matches!(
			feed.wallet_for(&destination),
			Err(PublishError::Unauthorized(_))
		));
	}

	#[test]
	fn test_hash_must_be_32_bytes() {
		assert!(tx_hash(&TransactionHash(vec![1; 32])).is_ok());
		assert!(tx_hash(&TransactionHash(vec![1; 4])).is_err());
	}

	#[test]
	fn test_update_price_calldata_layout() {
		use alloy::sol_types::SolCall;

		let call = IPriceFeed::updatePriceCall {
			answer: U256::from(123_456_000_000u64),
		};
		let data = call.abi_encode();
		assert_eq!(data.len(), 4 + 32);
		assert_eq!(&data[..4], IPriceFeed::updatePriceCall::SELECTOR.as_slice());
		assert_eq!(U256::from_be_slice(&data[4..]), U256::from(123_456_000_000u64));
	}
}
