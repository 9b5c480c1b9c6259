//! Publisher identity.
//!
//! The pipeline never handles keys itself. It asks an [`AccountInterface`]
//! for the address it publishes from and for a wallet the transaction layer
//! can sign with.

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use async_trait::async_trait;
use thiserror::Error;

pub mod implementations {
	pub mod local;
}

#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Failed to read credential: {0}")]
	Credential(String),
	#[error("Invalid account configuration: {0}")]
	Configuration(String),
}

#[async_trait]
pub trait AccountInterface: Send + Sync {
	async fn address(&self) -> Result<Address, AccountError>;

	/// Wallet handed to the provider builder for signing submissions.
	fn wallet(&self) -> EthereumWallet;
}

pub struct AccountService {
	provider: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(provider: Box<dyn AccountInterface>) -> Self {
		Self { provider }
	}

	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.provider.address().await
	}

	pub fn wallet(&self) -> EthereumWallet {
		self.provider.wallet()
	}
}
