//! Management operations on the registry.
//!
//! Mutations are checked against an [`AuthorizationInterface`] first and,
//! for oracles that already exist, wait for the oracle's lock so they never
//! interleave with a running cycle.

use crate::event_bus::EventBus;
use crate::pipeline::{OraclePipeline, PipelineState};
use crate::registry::Registry;
use crate::ServiceError;
use alloy::primitives::{keccak256, B256};
use oracle_publisher::{to_record, PublishService};
use oracle_types::{OracleConfig, OracleEvent, OracleId, OracleMetadata, RoundRecord};
use serde::Serialize;
use std::sync::Arc;

/// Identity presented by whoever calls a management operation.
#[derive(Debug, Clone, Default)]
pub struct Caller {
	pub token: Option<String>,
}

impl Caller {
	pub fn anonymous() -> Self {
		Self::default()
	}

	pub fn with_token(token: impl Into<String>) -> Self {
		Self {
			token: Some(token.into()),
		}
	}
}

/// Decides who may register, update, remove and resync oracles.
pub trait AuthorizationInterface: Send + Sync {
	fn is_authorized(&self, caller: &Caller) -> bool;
}

/// Only the holder of the owner token may manage oracles.
///
/// Only the keccak digest of the token is kept, and digests are compared in
/// constant time.
pub struct OwnerOnly {
	token_hash: B256,
}

impl OwnerOnly {
	pub fn new(token: impl AsRef<str>) -> Self {
		Self {
			token_hash: keccak256(token.as_ref().as_bytes()),
		}
	}
}

impl AuthorizationInterface for OwnerOnly {
	fn is_authorized(&self, caller: &Caller) -> bool {
		caller
			.token
			.as_deref()
			.is_some_and(|token| digests_match(&keccak256(token.as_bytes()), &self.token_hash))
	}
}

fn digests_match(a: &B256, b: &B256) -> bool {
	a.iter().zip(b.iter()).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

pub struct AllowAll;

impl AuthorizationInterface for AllowAll {
	fn is_authorized(&self, _caller: &Caller) -> bool {
		true
	}
}

/// An oracle as reported to operators.
#[derive(Debug, Clone, Serialize)]
pub struct OracleView {
	pub config: OracleConfig,
	pub metadata: OracleMetadata,
	pub state: PipelineState,
}

pub struct OracleService {
	registry: Arc<Registry>,
	pipeline: Arc<OraclePipeline>,
	publisher: Arc<PublishService>,
	events: EventBus,
	authorization: Box<dyn AuthorizationInterface>,
}

impl OracleService {
	pub fn new(
		registry: Arc<Registry>,
		pipeline: Arc<OraclePipeline>,
		publisher: Arc<PublishService>,
		events: EventBus,
		authorization: Box<dyn AuthorizationInterface>,
	) -> Self {
		Self {
			registry,
			pipeline,
			publisher,
			events,
			authorization,
		}
	}

	fn authorize(&self, caller: &Caller) -> Result<(), ServiceError> {
		if self.authorization.is_authorized(caller) {
			Ok(())
		} else {
			tracing::warn!("Rejected unauthorized management call");
			Err(ServiceError::Unauthorized)
		}
	}

	/// Registers a new oracle after checking the caller.
	pub async fn register(
		&self,
		caller: &Caller,
		config: OracleConfig,
	) -> Result<OracleId, ServiceError> {
		self.authorize(caller)?;
		let id = self.registry.register(config).await?;

		tracing::info!(oracle_id = %id, "Registered oracle");
		self.events
			.publish(OracleEvent::Registered {
				oracle_id: id.clone(),
			})
			.ok();
		Ok(id)
	}

	/// Replaces an oracle's configuration once no cycle is running for it.
	pub async fn update(&self, caller: &Caller, config: OracleConfig) -> Result<(), ServiceError> {
		self.authorize(caller)?;
		let id = config.id.clone();
		let _guard = self.pipeline.lock(&id).await;
		self.registry.update(config).await?;

		tracing::info!(oracle_id = %id, "Updated oracle");
		self.events
			.publish(OracleEvent::Updated { oracle_id: id })
			.ok();
		Ok(())
	}

	/// Removes an oracle once no cycle is running for it.
	pub async fn remove(&self, caller: &Caller, id: &OracleId) -> Result<(), ServiceError> {
		self.authorize(caller)?;
		{
			let _guard = self.pipeline.lock(id).await;
			self.registry.remove(id).await?;
		}
		self.pipeline.forget(id);

		tracing::info!(oracle_id = %id, "Removed oracle");
		self.events
			.publish(OracleEvent::Removed {
				oracle_id: id.clone(),
			})
			.ok();
		Ok(())
	}

	pub async fn get(&self, id: &OracleId) -> Result<OracleView, ServiceError> {
		let entry = self.registry.entry(id).await?;
		Ok(OracleView {
			state: self.pipeline.state(id),
			config: entry.config,
			metadata: entry.metadata,
		})
	}

	pub async fn list(&self) -> Vec<OracleView> {
		self.registry
			.entries()
			.await
			.into_iter()
			.map(|entry| OracleView {
				state: self.pipeline.state(&entry.config.id),
				config: entry.config,
				metadata: entry.metadata,
			})
			.collect()
	}

	/// Realigns an oracle's bookkeeping with its destination feed and lifts a halt.
	pub async fn resync(
		&self,
		caller: &Caller,
		id: &OracleId,
	) -> Result<OracleMetadata, ServiceError> {
		self.authorize(caller)?;
		let _guard = self.pipeline.lock(id).await;
		let config = self.registry.get(id).await?;

		let latest = self.publisher.latest_round(&config.destination).await?;
		let last_published_value = if latest.round_id == 0 {
			None
		} else {
			Some(to_record(&config.destination, &latest)?.answer)
		};
		let metadata = self
			.registry
			.update_metadata(id, |m| {
				*m = OracleMetadata {
					last_published_round: latest.round_id,
					last_published_value,
					..Default::default()
				};
			})
			.await?;

		tracing::info!(oracle_id = %id, round = latest.round_id, "Resynced oracle");
		self.events
			.publish(OracleEvent::Resynced {
				oracle_id: id.clone(),
				round_id: latest.round_id,
			})
			.ok();
		Ok(metadata)
	}

	/// Latest round on the oracle's destination; `None` before the first one.
	pub async fn latest_round(&self, id: &OracleId) -> Result<Option<RoundRecord>, ServiceError> {
		let config = self.registry.get(id).await?;
		Ok(self.publisher.latest_record(&config.destination).await?)
	}

	/// Registers configured oracles the registry does not know yet.
	///
	/// Persisted rows win over the configuration file; a differing entry is
	/// left as is.
	pub async fn seed(&self, configs: &[OracleConfig]) -> Result<usize, ServiceError> {
		let mut added = 0;
		for config in configs {
			match self.registry.entry(&config.id).await {
				Ok(entry) => {
					if entry.config != *config {
						tracing::warn!(
							oracle_id = %config.id,
							"Configured oracle differs from the registry; keeping the registry row"
						);
					}
				}
				Err(crate::RegistryError::NotFound(_)) => {
					self.registry.register(config.clone()).await?;
					self.events
						.publish(OracleEvent::Registered {
							oracle_id: config.id.clone(),
						})
						.ok();
					added += 1;
				}
				Err(e) => return Err(e.into()),
			}
		}
		if added > 0 {
			tracing::info!(added, "Seeded oracles from configuration");
		}
		Ok(added)
	}
}
