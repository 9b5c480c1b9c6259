//! Configuration loading for the oracle service.
//!
//! Files may be TOML, JSON or YAML, chosen by extension. `${VAR}` references
//! are replaced from the environment before parsing, and a handful of
//! `ORACLE_*` variables override individual settings afterwards.

use oracle_types::MAX_FEED_DECIMALS;
use std::collections::HashSet;
use std::env;
use std::path::Path;
use thiserror::Error;

mod types;

pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
	Toml,
	Json,
	Yaml,
}

impl ConfigFormat {
	pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
		match path.extension().and_then(|s| s.to_str()) {
			Some("toml") => Ok(ConfigFormat::Toml),
			Some("json") => Ok(ConfigFormat::Json),
			Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
			_ => Err(ConfigError::ParseError(format!(
				"Unsupported config format: {}",
				path.display()
			))),
		}
	}
}

pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "ORACLE_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<Config, ConfigError> {
		let file_path = self.file_path.as_ref().ok_or_else(|| {
			ConfigError::FileNotFound("No configuration file specified".to_string())
		})?;

		let path = Path::new(file_path);
		if !path.exists() {
			return Err(ConfigError::FileNotFound(file_path.clone()));
		}
		tracing::info!(path = %path.display(), "Loading configuration");

		let content = tokio::fs::read_to_string(path).await?;
		let mut config = self.parse(&content, ConfigFormat::from_path(path)?)?;

		self.apply_env_overrides(&mut config)?;
		validate_config(&config)?;

		Ok(config)
	}

	/// Substitutes environment references and parses `content`.
	pub fn parse(&self, content: &str, format: ConfigFormat) -> Result<Config, ConfigError> {
		let substituted = substitute_env_vars(content)?;
		match format {
			ConfigFormat::Toml => {
				toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))
			}
			ConfigFormat::Json => serde_json::from_str(&substituted)
				.map_err(|e| ConfigError::ParseError(e.to_string())),
			ConfigFormat::Yaml => serde_yaml::from_str(&substituted)
				.map_err(|e| ConfigError::ParseError(e.to_string())),
		}
	}

	fn env(&self, name: &str) -> Option<String> {
		env::var(format!("{}{}", self.env_prefix, name)).ok()
	}

	fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
		if let Some(interval) = self.env("TICK_INTERVAL_SECS") {
			config.oracle.tick_interval_secs = interval.parse().map_err(|e| {
				ConfigError::ValidationError(format!("Invalid tick interval: {}", e))
			})?;
		}

		if let Some(path) = self.env("STORAGE_PATH") {
			if let Some(table) = config.storage.config.as_table_mut() {
				table.insert("storage_path".to_string(), toml::Value::String(path));
			}
		}

		if let Some(port) = self.env("API_PORT") {
			let api = config.api.get_or_insert_with(ApiConfig::default);
			api.port = port
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid API port: {}", e)))?;
		}

		if let Some(token) = self.env("API_OWNER_TOKEN") {
			let api = config.api.get_or_insert_with(ApiConfig::default);
			api.owner_token = Some(token);
		}

		Ok(())
	}
}

fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
	let re = regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
		.map_err(|e| ConfigError::ParseError(e.to_string()))?;

	let mut result = content.to_string();
	for cap in re.captures_iter(content) {
		let full_match = &cap[0];
		let var_name = &cap[1];
		let value =
			env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
		result = result.replace(full_match, &value);
	}
	Ok(result)
}

/// Checks cross-field constraints serde cannot express.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
	if config.oracle.tick_interval_secs == 0 {
		return Err(ConfigError::ValidationError(
			"tick_interval_secs must be greater than zero".to_string(),
		));
	}
	if config.oracle.tick_deadline_secs() == 0 {
		return Err(ConfigError::ValidationError(
			"tick_deadline_secs must be greater than zero".to_string(),
		));
	}

	if config.publisher.initial_backoff_ms == 0
		|| config.publisher.initial_backoff_ms > config.publisher.max_backoff_ms
	{
		return Err(ConfigError::ValidationError(format!(
			"publisher backoff must satisfy 0 < initial ({}) <= max ({})",
			config.publisher.initial_backoff_ms, config.publisher.max_backoff_ms
		)));
	}

	if let (Some(min), Some(max)) = (config.validation.min, config.validation.max) {
		if min > max {
			return Err(ConfigError::ValidationError(format!(
				"validation.min {} exceeds validation.max {}",
				min, max
			)));
		}
	}

	let mut ids = HashSet::new();
	let mut destinations = HashSet::new();
	for oracle in &config.oracles {
		if oracle.threshold == 0 {
			return Err(ConfigError::ValidationError(format!(
				"oracle '{}' has a zero threshold",
				oracle.id
			)));
		}
		if oracle.destination.decimals > MAX_FEED_DECIMALS {
			return Err(ConfigError::ValidationError(format!(
				"oracle '{}' has {} feed decimals; at most {} are supported",
				oracle.id, oracle.destination.decimals, MAX_FEED_DECIMALS
			)));
		}
		if !ids.insert(oracle.id.clone()) {
			return Err(ConfigError::ValidationError(format!(
				"oracle '{}' is configured twice",
				oracle.id
			)));
		}
		if !destinations.insert(oracle.destination.key()) {
			return Err(ConfigError::ValidationError(format!(
				"oracle '{}' publishes to {} which another oracle already uses",
				oracle.id,
				oracle.destination.key()
			)));
		}
	}

	if let Some(api) = &config.api {
		if api.enabled && api.port == 0 {
			return Err(ConfigError::ValidationError(
				"api.port must be set when the API is enabled".to_string(),
			));
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use oracle_types::DataSource;
	use std::io::Write;

	const SAMPLE: &str = r#"
[oracle]
name = "test-oracle"
tick_interval_secs = 30

[storage]
backend = "file"
[storage.config]
storage_path = "./data/test"

[account]
backend = "local"
[account.config]
private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"

[fetcher.config]
timeout_ms = 5000

[publisher]
max_retries = 5
[publisher.config]
confirmations = 2

[validation]
max = 1000000

[api]
enabled = true
port = 9000

[[oracles]]
id = "eth-usd"
threshold = 10
[oracles.source]
type = "http"
url = "https://prices.example.org/eth"
json_path = "data.amount"
[oracles.destination]
contract = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
[oracles.destination.provider]
chain_id = 31337
hostname = "http://localhost:8545"

[[oracles]]
id = "btc-onchain"
threshold = 1
[oracles.source]
type = "evm"
target_address = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512"
method = "latestPrice"
[oracles.source.provider]
chain_id = 1
hostname = "https://eth.example.org"
[oracles.destination]
contract = "0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0"
decimals = 6
[oracles.destination.provider]
chain_id = 31337
hostname = "http://localhost:8545"
credential_path = "/run/secrets/feed-key"
"#;

	#[test]
	fn test_toml_parsing() {
		let config = ConfigLoader::new()
			.parse(SAMPLE, ConfigFormat::Toml)
			.unwrap();
		validate_config(&config).unwrap();

		assert_eq!(config.oracle.name, "test-oracle");
		assert_eq!(config.oracle.tick_deadline_secs(), 30);
		assert_eq!(config.storage.backend, "file");
		assert_eq!(config.publisher.max_retries, 5);
		assert_eq!(config.publisher.initial_backoff_ms, 500);
		assert_eq!(config.oracles.len(), 2);

		let first = &config.oracles[0];
		assert_eq!(first.destination.decimals, 8);
		assert!(matches!(first.source, DataSource::Http { .. }));

		let second = &config.oracles[1];
		assert_eq!(second.destination.decimals, 6);
		assert_eq!(
			second.destination.provider.credential_path.as_deref(),
			Some("/run/secrets/feed-key")
		);
		assert!(matches!(second.source, DataSource::Evm { .. }));
	}

	#[test]
	fn test_minimal_json_and_yaml() {
		let json = r#"{"storage": {"backend": "memory"}}"#;
		let config = ConfigLoader::new().parse(json, ConfigFormat::Json).unwrap();
		assert_eq!(config.oracle.tick_interval_secs, 60);
		assert!(config.oracles.is_empty());
		assert!(config.api.is_none());

		let yaml = "storage:\n  backend: memory\noracle:\n  tick_interval_secs: 5\n";
		let config = ConfigLoader::new().parse(yaml, ConfigFormat::Yaml).unwrap();
		assert_eq!(config.oracle.tick_interval_secs, 5);
	}

	#[test]
	fn test_env_substitution() {
		env::set_var("ORACLE_CFG_TEST_STORAGE_BACKEND", "memory");
		let content = r#"
[storage]
backend = "${ORACLE_CFG_TEST_STORAGE_BACKEND}"
"#;
		let config = ConfigLoader::new()
			.parse(content, ConfigFormat::Toml)
			.unwrap();
		assert_eq!(config.storage.backend, "memory");

		let missing = r#"
[storage]
backend = "${ORACLE_CFG_TEST_DEFINITELY_UNSET}"
"#;
		assert!(matches!(
			ConfigLoader::new().parse(missing, ConfigFormat::Toml),
			Err(ConfigError::EnvVarNotFound(_))
		));
	}

	#[test]
	fn test_validation_rejects_bad_oracles() {
		let mut config = ConfigLoader::new()
			.parse(SAMPLE, ConfigFormat::Toml)
			.unwrap();
		config.oracles[0].threshold = 0;
		assert!(validate_config(&config).is_err());

		let mut config = ConfigLoader::new()
			.parse(SAMPLE, ConfigFormat::Toml)
			.unwrap();
		config.oracles[1].id = config.oracles[0].id.clone();
		assert!(validate_config(&config).is_err());

		let mut config = ConfigLoader::new()
			.parse(SAMPLE, ConfigFormat::Toml)
			.unwrap();
		config.oracles[1].destination = config.oracles[0].destination.clone();
		assert!(validate_config(&config).is_err());

		let mut config = ConfigLoader::new()
			.parse(SAMPLE, ConfigFormat::Toml)
			.unwrap();
		config.oracle.tick_interval_secs = 0;
		assert!(validate_config(&config).is_err());

		let mut config = ConfigLoader::new()
			.parse(SAMPLE, ConfigFormat::Toml)
			.unwrap();
		config.oracles[0].destination.decimals = MAX_FEED_DECIMALS;
		assert!(validate_config(&config).is_ok());
		config.oracles[0].destination.decimals = MAX_FEED_DECIMALS + 1;
		match validate_config(&config) {
			Err(ConfigError::ValidationError(message)) => assert!(message.contains("decimals")),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_load_applies_env_overrides() {
		let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
		file.write_all(SAMPLE.as_bytes()).unwrap();

		env::set_var("ORACLE_LOADTEST_TICK_INTERVAL_SECS", "7");
		env::set_var("ORACLE_LOADTEST_STORAGE_PATH", "/tmp/oracle-store");
		let config = ConfigLoader::new()
			.with_file(file.path())
			.with_env_prefix("ORACLE_LOADTEST_")
			.load()
			.await
			.unwrap();

		assert_eq!(config.oracle.tick_interval_secs, 7);
		assert_eq!(
			config.storage.config.get("storage_path").and_then(|v| v.as_str()),
			Some("/tmp/oracle-store")
		);
	}

	#[tokio::test]
	async fn test_missing_file_and_unknown_extension() {
		let result = ConfigLoader::new()
			.with_file("/no/such/config.toml")
			.load()
			.await;
		assert!(matches!(result, Err(ConfigError::FileNotFound(_))));

		let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
		let result = ConfigLoader::new().with_file(file.path()).load().await;
		assert!(matches!(result, Err(ConfigError::ParseError(_))));
	}
}
