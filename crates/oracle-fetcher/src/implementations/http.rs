//! HTTP transport backed by reqwest.

use crate::{FetchError, HttpInterface, HttpResponse};
use async_trait::async_trait;
use oracle_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use std::time::Duration;

const USER_AGENT: &str = concat!("oracle-fetcher/", env!("CARGO_PKG_VERSION"));

/// Largest response body read from a source unless configured otherwise.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 8_000;

pub struct ReqwestHttp {
	client: reqwest::Client,
	max_response_bytes: usize,
}

impl ReqwestHttp {
	pub fn new(timeout: Duration, max_response_bytes: usize) -> Result<Self, FetchError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.user_agent(USER_AGENT)
			.build()
			.map_err(|e| FetchError::Transport(format!("Failed to create HTTP client: {}", e)))?;
		Ok(Self {
			client,
			max_response_bytes,
		})
	}

	fn too_large(&self, url: &str) -> FetchError {
		FetchError::Malformed(format!(
			"response from {} exceeds {} bytes",
			url, self.max_response_bytes
		))
	}
}

#[async_trait]
impl HttpInterface for ReqwestHttp {
	async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
		let mut response = self
			.client
			.get(url)
			.header(reqwest::header::ACCEPT, "application/json")
			.send()
			.await
			.map_err(|e| {
				if e.is_timeout() {
					FetchError::Transport(format!("request to {} timed out", url))
				} else {
					FetchError::Transport(format!("HTTP request failed: {}", e))
				}
			})?;

		let status = response.status().as_u16();
		if response
			.content_length()
			.is_some_and(|len| len > self.max_response_bytes as u64)
		{
			return Err(self.too_large(url));
		}

		// The cap also holds when Content-Length is missing or understated.
		let mut body = Vec::new();
		while let Some(chunk) = response
			.chunk()
			.await
			.map_err(|e| FetchError::Transport(format!("Failed to read body: {}", e)))?
		{
			if body.len() + chunk.len() > self.max_response_bytes {
				return Err(self.too_large(url));
			}
			body.extend_from_slice(&chunk);
		}

		Ok(HttpResponse { status, body })
	}
}

pub struct HttpFetcherSchema;

impl ConfigSchema for HttpFetcherSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![
				Field::new(
					"timeout_ms",
					FieldType::Integer {
						min: Some(1),
						max: Some(300_000),
					},
				),
				Field::new(
					"max_response_bytes",
					FieldType::Integer {
						min: Some(1),
						max: Some(10_000_000),
					},
				),
			],
		)
		.validate(config)
	}
}

/// Creates the HTTP transport from the `[fetcher]` section.
///
/// Configuration parameters:
/// - `timeout_ms`: per-request timeout
/// - `max_response_bytes`: body size cap (default: 8000)
pub fn create_http(config: &toml::Value) -> Result<Box<dyn HttpInterface>, FetchError> {
	HttpFetcherSchema
		.validate(config)
		.map_err(|e| FetchError::InvalidSource(e.to_string()))?;
	let max_response_bytes = config
		.get("max_response_bytes")
		.and_then(|v| v.as_integer())
		.map(|v| v as usize)
		.unwrap_or(DEFAULT_MAX_RESPONSE_BYTES);
	Ok(Box::new(ReqwestHttp::new(
		crate::fetch_timeout(config),
		max_response_bytes,
	)?))
}
