//! Durable table of registered oracles.
//!
//! Each row holds an oracle's configuration and its scheduling bookkeeping.
//! Rows live under the `oracles` namespace of the storage backend and the
//! insertion order under `registry:index`; every mutation is written through
//! before it becomes visible in memory, so a restart rebuilds exactly what
//! callers last observed.

use crate::RegistryError;
use oracle_storage::StorageService;
use oracle_types::{OracleConfig, OracleId, OracleMetadata, MAX_FEED_DECIMALS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const ENTRY_NAMESPACE: &str = "oracles";
const INDEX_NAMESPACE: &str = "registry";
const INDEX_KEY: &str = "index";

/// One registry row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleEntry {
	/// What the operator registered.
	pub config: OracleConfig,
	/// What the pipeline has done so far.
	#[serde(default)]
	pub metadata: OracleMetadata,
}

#[derive(Default)]
struct Table {
	entries: HashMap<OracleId, OracleEntry>,
	order: Vec<OracleId>,
}

impl Table {
	fn destination_owner(&self, config: &OracleConfig) -> Option<&OracleId> {
		let key = config.destination.key();
		self.entries
			.values()
			.find(|e| e.config.id != config.id && e.config.destination.key() == key)
			.map(|e| &e.config.id)
	}
}

fn check_config(config: &OracleConfig) -> Result<(), RegistryError> {
	if config.threshold == 0 {
		return Err(RegistryError::InvalidThreshold(config.id.clone()));
	}
	if config.destination.decimals > MAX_FEED_DECIMALS {
		return Err(RegistryError::InvalidDecimals {
			id: config.id.clone(),
			decimals: config.destination.decimals,
		});
	}
	Ok(())
}

/// Registered oracles kept in memory and written through to storage.
pub struct Registry {
	storage: Arc<StorageService>,
	table: RwLock<Table>,
}

impl Registry {
	/// Rebuilds the registry from storage. An empty backend yields an empty registry.
	pub async fn load(storage: Arc<StorageService>) -> Result<Self, RegistryError> {
		let index: Vec<OracleId> = storage
			.retrieve_optional(INDEX_NAMESPACE, INDEX_KEY)
			.await?
			.unwrap_or_default();

		let mut table = Table::default();
		for id in index {
			match storage
				.retrieve_optional::<OracleEntry>(ENTRY_NAMESPACE, id.as_str())
				.await?
			{
				Some(entry) => {
					table.order.push(id.clone());
					table.entries.insert(id, entry);
				}
				None => {
					tracing::warn!(oracle_id = %id, "Indexed oracle has no stored row, dropping it");
				}
			}
		}

		tracing::info!(oracles = table.order.len(), "Loaded oracle registry");
		Ok(Self {
			storage,
			table: RwLock::new(table),
		})
	}

	/// Adds a new oracle with empty bookkeeping and appends it to the order.
	///
	/// Fails on a duplicate id, a zero threshold, unsupported feed decimals or
	/// a destination another oracle already publishes to.
	pub async fn register(&self, config: OracleConfig) -> Result<OracleId, RegistryError> {
		check_config(&config)?;

		let mut table = self.table.write().await;
		if table.entries.contains_key(&config.id) {
			return Err(RegistryError::DuplicateId(config.id));
		}
		if let Some(owner) = table.destination_owner(&config) {
			return Err(RegistryError::DestinationInUse {
				destination: config.destination.key().to_string(),
				owner: owner.clone(),
			});
		}

		let id = config.id.clone();
		let entry = OracleEntry {
			config,
			metadata: OracleMetadata::default(),
		};
		let mut order = table.order.clone();
		order.push(id.clone());

		self.persist_entry(&entry).await?;
		self.storage.store(INDEX_NAMESPACE, INDEX_KEY, &order).await?;

		table.entries.insert(id.clone(), entry);
		table.order = order;
		Ok(id)
	}

	/// Replaces the whole record. Bookkeeping is kept unless the destination
	/// changed, in which case it starts over.
	pub async fn update(&self, config: OracleConfig) -> Result<(), RegistryError> {
		check_config(&config)?;

		let mut table = self.table.write().await;
		let current = table
			.entries
			.get(&config.id)
			.ok_or_else(|| RegistryError::NotFound(config.id.clone()))?;
		if let Some(owner) = table.destination_owner(&config) {
			return Err(RegistryError::DestinationInUse {
				destination: config.destination.key().to_string(),
				owner: owner.clone(),
			});
		}

		let metadata = if current.config.destination == config.destination {
			current.metadata.clone()
		} else {
			tracing::info!(oracle_id = %config.id, "Destination changed, resetting bookkeeping");
			OracleMetadata::default()
		};
		let entry = OracleEntry { config, metadata };

		self.persist_entry(&entry).await?;
		table.entries.insert(entry.config.id.clone(), entry);
		Ok(())
	}

	/// Deletes the oracle's row and drops it from the order.
	pub async fn remove(&self, id: &OracleId) -> Result<(), RegistryError> {
		let mut table = self.table.write().await;
		if !table.entries.contains_key(id) {
			return Err(RegistryError::NotFound(id.clone()));
		}

		let order: Vec<OracleId> = table.order.iter().filter(|o| *o != id).cloned().collect();
		self.storage.store(INDEX_NAMESPACE, INDEX_KEY, &order).await?;
		self.storage.remove(ENTRY_NAMESPACE, id.as_str()).await?;

		table.entries.remove(id);
		table.order = order;
		Ok(())
	}

	/// Configuration of `id`.
	pub async fn get(&self, id: &OracleId) -> Result<OracleConfig, RegistryError> {
		self.entry(id).await.map(|e| e.config)
	}

	/// Configuration and bookkeeping of `id`, as one snapshot.
	pub async fn entry(&self, id: &OracleId) -> Result<OracleEntry, RegistryError> {
		self.table
			.read()
			.await
			.entries
			.get(id)
			.cloned()
			.ok_or_else(|| RegistryError::NotFound(id.clone()))
	}

	pub async fn contains(&self, id: &OracleId) -> bool {
		self.table.read().await.entries.contains_key(id)
	}

	/// Configurations in registration order.
	pub async fn list(&self) -> Vec<OracleConfig> {
		self.entries().await.into_iter().map(|e| e.config).collect()
	}

	/// Full rows in registration order.
	pub async fn entries(&self) -> Vec<OracleEntry> {
		let table = self.table.read().await;
		table
			.order
			.iter()
			.filter_map(|id| table.entries.get(id).cloned())
			.collect()
	}

	/// Ids in registration order.
	pub async fn ids(&self) -> Vec<OracleId> {
		self.table.read().await.order.clone()
	}

	/// Scheduling bookkeeping of `id`.
	pub async fn metadata(&self, id: &OracleId) -> Result<OracleMetadata, RegistryError> {
		self.entry(id).await.map(|e| e.metadata)
	}

	/// Applies `f` to the oracle's bookkeeping and persists the result.
	///
	/// Callers must hold the oracle's lock.
	pub async fn update_metadata<F>(
		&self,
		id: &OracleId,
		f: F,
	) -> Result<OracleMetadata, RegistryError>
	where
		F: FnOnce(&mut OracleMetadata),
	{
		let mut table = self.table.write().await;
		let current = table
			.entries
			.get(id)
			.ok_or_else(|| RegistryError::NotFound(id.clone()))?;

		let mut entry = current.clone();
		f(&mut entry.metadata);
		if entry.metadata == current.metadata {
			return Ok(entry.metadata);
		}

		self.persist_entry(&entry).await?;
		let metadata = entry.metadata.clone();
		table.entries.insert(id.clone(), entry);
		Ok(metadata)
	}

	async fn persist_entry(&self, entry: &OracleEntry) -> Result<(), RegistryError> {
		self.storage
			.store(ENTRY_NAMESPACE, entry.config.id.as_str(), entry)
			.await?;
		Ok(())
	}
}
