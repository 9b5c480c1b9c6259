//! Local private key wallet.

use crate::{AccountError, AccountInterface};
use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use oracle_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use std::path::Path;

/// Wallet backed by a private key held in memory.
///
/// Suitable for development and for deployments where the key is mounted as
/// a file next to the service.
#[derive(Clone)]
pub struct LocalWallet {
	signer: PrivateKeySigner,
}

impl LocalWallet {
	/// Parses a hex private key, with or without the `0x` prefix.
	pub fn new(private_key_hex: &str) -> Result<Self, AccountError> {
		check_key_format(private_key_hex).map_err(AccountError::InvalidKey)?;
		let signer = private_key_hex
			.trim()
			.parse::<PrivateKeySigner>()
			.map_err(|e| AccountError::InvalidKey(format!("Invalid private key: {}", e)))?;

		Ok(Self { signer })
	}

	/// Reads the key from a file holding the hex string.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AccountError> {
		let path = path.as_ref();
		let contents = std::fs::read_to_string(path)
			.map_err(|e| AccountError::Credential(format!("{}: {}", path.display(), e)))?;
		Self::new(contents.trim())
	}

	pub fn signer_address(&self) -> Address {
		self.signer.address()
	}
}

fn check_key_format(key: &str) -> Result<(), String> {
	let key = key.trim();
	let key_without_prefix = key.strip_prefix("0x").unwrap_or(key);

	if key_without_prefix.len() != 64 {
		return Err("Private key must be 64 hex characters (32 bytes)".to_string());
	}
	if hex::decode(key_without_prefix).is_err() {
		return Err("Private key must be valid hexadecimal".to_string());
	}
	Ok(())
}

/// Exactly one of `private_key` or `key_file` must be present.
pub struct LocalWalletSchema;

impl ConfigSchema for LocalWalletSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("private_key", FieldType::String).with_validator(|value| {
					value
						.as_str()
						.map(check_key_format)
						.unwrap_or_else(|| Err("private_key must be a string".to_string()))
				}),
				Field::new("key_file", FieldType::String),
			],
		);
		schema.validate(config)?;

		let has_key = config.get("private_key").is_some();
		let has_file = config.get("key_file").is_some();
		if has_key == has_file {
			return Err(ValidationError::InvalidValue {
				field: "private_key".to_string(),
				message: "set exactly one of private_key or key_file".to_string(),
			});
		}
		Ok(())
	}
}

#[async_trait]
impl AccountInterface for LocalWallet {
	async fn address(&self) -> Result<Address, AccountError> {
		Ok(self.signer.address())
	}

	fn wallet(&self) -> EthereumWallet {
		EthereumWallet::from(self.signer.clone())
	}
}

/// Creates a local wallet from its configuration section.
///
/// Configuration parameters:
/// - `private_key`: hex private key
/// - `key_file`: path to a file holding the hex private key
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	LocalWalletSchema
		.validate(config)
		.map_err(|e| AccountError::Configuration(e.to_string()))?;

	let wallet = match config.get("private_key").and_then(|v| v.as_str()) {
		Some(key) => LocalWallet::new(key)?,
		None => {
			let path = config
				.get("key_file")
				.and_then(|v| v.as_str())
				.ok_or_else(|| AccountError::Configuration("key_file missing".to_string()))?;
			LocalWallet::from_file(path)?
		}
	};

	tracing::info!(address = %wallet.signer_address(), "Loaded local publisher wallet");
	Ok(Box::new(wallet))
}
