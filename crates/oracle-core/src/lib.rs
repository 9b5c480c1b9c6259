//! Oracle engine: registry, scheduling and the fetch-validate-publish pipeline.
//!
//! [`OracleBuilder`] wires the backends named in the configuration into an
//! [`OracleEngine`]. The engine ticks on a fixed interval and dispatches one
//! pipeline cycle per registered oracle; [`OracleService`] is the management
//! surface used to register, update, remove and resync oracles.

use oracle_publisher::PublishError;
use oracle_storage::StorageError;
use oracle_types::{OracleId, MAX_FEED_DECIMALS};
use thiserror::Error;

pub mod builder;
pub mod engine;
pub mod event_bus;
pub mod locks;
pub mod pipeline;
pub mod registry;
pub mod scheduler;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::OracleBuilder;
pub use engine::OracleEngine;
pub use event_bus::EventBus;
pub use pipeline::{CycleOutcome, OraclePipeline, PipelineState, RetryPolicy, ValidationPolicy};
pub use registry::{OracleEntry, Registry};
pub use scheduler::{PollingScheduler, Schedule};
pub use service::{AllowAll, AuthorizationInterface, Caller, OracleService, OracleView, OwnerOnly};

/// Errors raised by the oracle registry.
#[derive(Debug, Error)]
pub enum RegistryError {
	/// An oracle with this id already exists.
	#[error("Oracle {0} is already registered")]
	DuplicateId(OracleId),
	/// The threshold is zero.
	#[error("Oracle {0} has an invalid threshold; it must be at least 1")]
	InvalidThreshold(OracleId),
	/// The destination precision cannot be read back into a numeric value.
	#[error("Oracle {id} has {decimals} feed decimals; at most {max} are supported", max = MAX_FEED_DECIMALS)]
	InvalidDecimals { id: OracleId, decimals: u32 },
	#[error("Oracle {0} not found")]
	NotFound(OracleId),
	/// Another oracle already publishes to the same contract on the same chain.
	#[error("Destination {destination} is already published to by oracle {owner}")]
	DestinationInUse {
		/// `chain_id:contract` of the contested feed.
		destination: String,
		/// Oracle currently publishing there.
		owner: OracleId,
	},
	/// The row could not be written or read back.
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

/// Errors returned by management operations.
#[derive(Debug, Error)]
pub enum ServiceError {
	/// The caller did not present the owner token.
	#[error("Caller is not authorized to manage oracles")]
	Unauthorized,
	#[error(transparent)]
	Registry(#[from] RegistryError),
	/// Reading the destination feed failed, during resync or a round lookup.
	#[error("Publisher error: {0}")]
	Publish(#[from] PublishError),
}

/// Errors that stop the engine from being built or run.
#[derive(Debug, Error)]
pub enum EngineError {
	/// A backend is unknown or rejected its configuration section.
	#[error("Configuration error: {0}")]
	Config(String),
	/// Configured oracles could not be seeded into the registry.
	#[error("Service error: {0}")]
	Service(String),
	#[error(transparent)]
	Registry(#[from] RegistryError),
}
