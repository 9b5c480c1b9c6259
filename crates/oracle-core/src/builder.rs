//! Wires configured backends into an [`OracleEngine`].

use crate::engine::OracleEngine;
use crate::event_bus::EventBus;
use crate::pipeline::{OraclePipeline, RetryPolicy, ValidationPolicy};
use crate::registry::Registry;
use crate::service::{AllowAll, AuthorizationInterface, OracleService, OwnerOnly};
use crate::EngineError;
use oracle_account::{AccountError, AccountInterface, AccountService};
use oracle_config::Config;
use oracle_fetcher::{EvmReadInterface, FetchError, FetchService, HttpInterface};
use oracle_publisher::{PriceFeedInterface, PublishError, PublishService};
use oracle_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;

// Type aliases for factory functions
type StorageFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> + Send + Sync>;
type AccountFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> + Send + Sync>;
type HttpFactory = Box<dyn Fn(&toml::Value) -> Result<Box<dyn HttpInterface>, FetchError> + Send + Sync>;
type EvmFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn EvmReadInterface>, FetchError> + Send + Sync>;
type PriceFeedFactory = Box<
	dyn Fn(&toml::Value, Option<&AccountService>) -> Result<Box<dyn PriceFeedInterface>, PublishError>
		+ Send
		+ Sync,
>;

const EVENT_BUS_CAPACITY: usize = 1000;

pub struct OracleBuilder {
	config: Config,
	storage_factories: HashMap<String, StorageFactory>,
	account_factories: HashMap<String, AccountFactory>,
	http_factory: Option<HttpFactory>,
	evm_factory: Option<EvmFactory>,
	price_feed_factory: Option<PriceFeedFactory>,
	authorization: Option<Box<dyn AuthorizationInterface>>,
}

impl OracleBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			storage_factories: HashMap::new(),
			account_factories: HashMap::new(),
			http_factory: None,
			evm_factory: None,
			price_feed_factory: None,
			authorization: None,
		}
	}

	pub fn with_storage_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> + Send + Sync + 'static,
	{
		self.storage_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_account_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> + Send + Sync + 'static,
	{
		self.account_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_http_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn HttpInterface>, FetchError> + Send + Sync + 'static,
	{
		self.http_factory = Some(Box::new(factory));
		self
	}

	pub fn with_evm_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn EvmReadInterface>, FetchError> + Send + Sync + 'static,
	{
		self.evm_factory = Some(Box::new(factory));
		self
	}

	pub fn with_price_feed_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&toml::Value, Option<&AccountService>) -> Result<Box<dyn PriceFeedInterface>, PublishError>
			+ Send
			+ Sync
			+ 'static,
	{
		self.price_feed_factory = Some(Box::new(factory));
		self
	}

	/// Overrides the authorization derived from `[api] owner_token`.
	pub fn with_authorization(mut self, authorization: Box<dyn AuthorizationInterface>) -> Self {
		self.authorization = Some(authorization);
		self
	}

	pub async fn build(self) -> Result<OracleEngine, EngineError> {
		// Storage and the persisted registry
		let storage_factory = self
			.storage_factories
			.get(&self.config.storage.backend)
			.ok_or_else(|| {
				EngineError::Config(format!(
					"Unknown storage backend '{}'",
					self.config.storage.backend
				))
			})?;
		let storage_backend = storage_factory(&self.config.storage.config)
			.map_err(|e| EngineError::Config(e.to_string()))?;
		let registry = Arc::new(Registry::load(Arc::new(StorageService::new(storage_backend))).await?);

		// Default publishing identity
		let account = match &self.config.account {
			Some(section) => {
				let factory = self.account_factories.get(&section.backend).ok_or_else(|| {
					EngineError::Config(format!("Unknown account backend '{}'", section.backend))
				})?;
				let account = AccountService::new(
					factory(&section.config).map_err(|e| EngineError::Config(e.to_string()))?,
				);
				let address = account
					.get_address()
					.await
					.map_err(|e| EngineError::Config(e.to_string()))?;
				tracing::info!(address = %address, "Loaded publishing account");
				Some(account)
			}
			None => {
				tracing::warn!(
					"No default account configured; destinations must name a credential_path"
				);
				None
			}
		};

		// Fetchers
		let fetcher_config = &self.config.fetcher.config;
		let http = self
			.http_factory
			.ok_or_else(|| EngineError::Config("HTTP factory not provided".into()))?(
			fetcher_config,
		)
		.map_err(|e| EngineError::Config(e.to_string()))?;
		let evm = self
			.evm_factory
			.ok_or_else(|| EngineError::Config("EVM reader factory not provided".into()))?(
			fetcher_config,
		)
		.map_err(|e| EngineError::Config(e.to_string()))?;
		let fetcher = Arc::new(FetchService::new(
			http,
			evm,
			oracle_fetcher::fetch_timeout(fetcher_config),
		));

		// Publisher
		let publisher_config = &self.config.publisher.config;
		let feed = self
			.price_feed_factory
			.ok_or_else(|| EngineError::Config("Price feed factory not provided".into()))?(
			publisher_config,
			account.as_ref(),
		)
		.map_err(|e| EngineError::Config(e.to_string()))?;
		let publisher = Arc::new(PublishService::new(
			feed,
			oracle_publisher::confirmations(publisher_config),
		));

		let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
		let pipeline = Arc::new(OraclePipeline::new(
			registry.clone(),
			fetcher,
			publisher.clone(),
			event_bus.clone(),
			ValidationPolicy::from(&self.config.validation),
			RetryPolicy::from(&self.config.publisher),
		));

		let authorization = self.authorization.unwrap_or_else(|| {
			match self
				.config
				.api
				.as_ref()
				.and_then(|api| api.owner_token.clone())
			{
				Some(token) => Box::new(OwnerOnly::new(token)) as Box<dyn AuthorizationInterface>,
				None => Box::new(AllowAll),
			}
		});
		let service = Arc::new(OracleService::new(
			registry.clone(),
			pipeline.clone(),
			publisher,
			event_bus.clone(),
			authorization,
		));

		service
			.seed(&self.config.oracles)
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;

		Ok(OracleEngine::new(
			self.config,
			registry,
			pipeline,
			service,
			event_bus,
		))
	}
}
