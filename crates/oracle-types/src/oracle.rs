//! Oracle configuration and per-oracle scheduling bookkeeping.

use crate::{NumericValue, TransactionHash};
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default fixed-point precision of destination price feeds.
pub const DEFAULT_FEED_DECIMALS: u32 = 8;

/// Highest feed precision a [`NumericValue`] can be read back from.
pub const MAX_FEED_DECIMALS: u32 = rust_decimal::Decimal::MAX_SCALE;

/// Opaque identifier naming one oracle configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OracleId(pub String);

impl OracleId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for OracleId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for OracleId {
	fn from(id: &str) -> Self {
		Self(id.to_string())
	}
}

/// Remote chain endpoint used to read from or publish to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RpcProvider {
	/// Chain id the endpoint is expected to serve.
	pub chain_id: u64,
	/// Full JSON-RPC URL of the endpoint.
	pub hostname: String,
	/// Path to a file holding the hex private key that signs on this provider.
	///
	/// Only meaningful for destinations; read-only calls ignore it.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub credential_path: Option<String>,
}

/// Where an observed value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSource {
	/// JSON document fetched with an HTTP GET; the value sits at `json_path`.
	Http { url: String, json_path: String },
	/// Read-only contract call returning an integer.
	Evm {
		provider: RpcProvider,
		target_address: Address,
		/// Either a bare method name (`latestPrice`) or a full signature (`price()`).
		method: String,
	},
}

impl DataSource {
	/// Short label used in logs and events.
	pub fn kind(&self) -> &'static str {
		match self {
			DataSource::Http { .. } => "http",
			DataSource::Evm { .. } => "evm",
		}
	}
}

/// Price feed contract that receives published rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
	pub contract: Address,
	pub provider: RpcProvider,
	/// Fixed-point decimals of the feed's integer answer.
	#[serde(default = "default_feed_decimals")]
	pub decimals: u32,
}

fn default_feed_decimals() -> u32 {
	DEFAULT_FEED_DECIMALS
}

impl Destination {
	/// Key identifying the contract across chains.
	pub fn key(&self) -> DestinationKey {
		DestinationKey {
			chain_id: self.provider.chain_id,
			contract: self.contract,
		}
	}
}

/// `(chain_id, contract)` pair; two oracles never share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DestinationKey {
	pub chain_id: u64,
	pub contract: Address,
}

impl fmt::Display for DestinationKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}@{}", self.contract, self.chain_id)
	}
}

/// A registered oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
	pub id: OracleId,
	pub source: DataSource,
	/// Minimum number of polling cycles between two publications.
	pub threshold: u64,
	pub destination: Destination,
}

/// A submission whose on-chain outcome has not been observed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPublish {
	pub tx_hash: TransactionHash,
	pub round_hint: u64,
	pub answer: NumericValue,
}

/// Scheduling bookkeeping kept next to each oracle's configuration.
///
/// Only the pipeline instance holding the oracle's lock mutates these fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleMetadata {
	/// Unix seconds of the last fetch/publish attempt.
	pub last_attempt_time: Option<u64>,
	/// Round id of the last confirmed publication, `0` before the first one.
	pub last_published_round: u64,
	pub last_published_value: Option<NumericValue>,
	pub consecutive_failures: u32,
	pub cycles_since_last_publish: u64,
	/// Set by a fatal publish error; cleared only by a resync.
	pub halted: Option<String>,
	pub pending: Option<PendingPublish>,
}

impl OracleMetadata {
	pub fn is_halted(&self) -> bool {
		self.halted.is_some()
	}

	/// Round id the next publication must carry.
	pub fn next_round(&self) -> u64 {
		self.last_published_round + 1
	}
}
