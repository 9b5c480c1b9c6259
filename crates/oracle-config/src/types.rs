//! Configuration types for the oracle service.

use oracle_types::OracleConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Complete service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	#[serde(default)]
	pub oracle: OracleSettings,
	pub storage: BackendConfig,
	/// Default publishing identity. Destinations with a `credential_path`
	/// sign with their own key.
	#[serde(default)]
	pub account: Option<BackendConfig>,
	#[serde(default)]
	pub fetcher: SectionConfig,
	#[serde(default)]
	pub publisher: PublisherConfig,
	#[serde(default)]
	pub validation: ValidationConfig,
	#[serde(default)]
	pub api: Option<ApiConfig>,
	/// Oracles registered at start-up when the registry does not know them yet.
	#[serde(default)]
	pub oracles: Vec<OracleConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OracleSettings {
	/// Name used in logs.
	#[serde(default = "default_name")]
	pub name: String,
	/// Seconds between two scheduler ticks.
	#[serde(default = "default_tick_interval")]
	pub tick_interval_secs: u64,
	/// Budget for one tick; defaults to the tick interval.
	#[serde(default)]
	pub tick_deadline_secs: Option<u64>,
}

fn default_name() -> String {
	"oracle".to_string()
}

fn default_tick_interval() -> u64 {
	60
}

impl Default for OracleSettings {
	fn default() -> Self {
		Self {
			name: default_name(),
			tick_interval_secs: default_tick_interval(),
			tick_deadline_secs: None,
		}
	}
}

impl OracleSettings {
	pub fn tick_deadline_secs(&self) -> u64 {
		self.tick_deadline_secs.unwrap_or(self.tick_interval_secs)
	}
}

/// A pluggable backend: its name plus its own settings table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
	pub backend: String,
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

/// A settings table handed to a backend factory as-is.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SectionConfig {
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

impl Default for SectionConfig {
	fn default() -> Self {
		Self {
			config: empty_table(),
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublisherConfig {
	/// Retries of one round after a retryable failure.
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	#[serde(default = "default_initial_backoff_ms")]
	pub initial_backoff_ms: u64,
	#[serde(default = "default_max_backoff_ms")]
	pub max_backoff_ms: u64,
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

fn default_max_retries() -> u32 {
	3
}

fn default_initial_backoff_ms() -> u64 {
	500
}

fn default_max_backoff_ms() -> u64 {
	10_000
}

impl Default for PublisherConfig {
	fn default() -> Self {
		Self {
			max_retries: default_max_retries(),
			initial_backoff_ms: default_initial_backoff_ms(),
			max_backoff_ms: default_max_backoff_ms(),
			config: empty_table(),
		}
	}
}

/// Which fetched values may be published.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ValidationConfig {
	#[serde(default)]
	pub allow_zero: bool,
	#[serde(default)]
	pub allow_negative: bool,
	#[serde(default)]
	pub min: Option<Decimal>,
	#[serde(default)]
	pub max: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_api_host")]
	pub host: String,
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Bearer token of the owner allowed to manage oracles. Without one every
	/// caller may manage oracles.
	#[serde(default)]
	pub owner_token: Option<String>,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	8080
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self {
			enabled: false,
			host: default_api_host(),
			port: default_api_port(),
			owner_token: None,
		}
	}
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::map::Map::new())
}
