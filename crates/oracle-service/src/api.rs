//! Management HTTP API.
//!
//! Mutating routes take the caller's identity from an
//! `Authorization: Bearer <token>` header.

use axum::{
	extract::{Path, State},
	http::{header, HeaderMap, StatusCode},
	response::{IntoResponse, Json, Response},
	routing::{get, post},
	Router,
};
use oracle_config::ApiConfig;
use oracle_core::{Caller, OracleService, OracleView, RegistryError, ServiceError};
use oracle_types::{OracleConfig, OracleId, OracleMetadata, RoundRecord};
use std::future::Future;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, instrument};

pub struct ApiServer {
	host: String,
	port: u16,
	service: Arc<OracleService>,
}

impl ApiServer {
	pub fn new(config: &ApiConfig, service: Arc<OracleService>) -> Self {
		Self {
			host: config.host.clone(),
			port: config.port,
			service,
		}
	}

	#[instrument(skip_all)]
	pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
	where
		F: Future<Output = ()> + Send + 'static,
	{
		let app = router(self.service)
			.layer(TraceLayer::new_for_http())
			.layer(CorsLayer::permissive());

		let listener = tokio::net::TcpListener::bind((self.host.as_str(), self.port)).await?;
		info!("API server listening on {}:{}", self.host, self.port);

		axum::serve(listener, app)
			.with_graceful_shutdown(shutdown)
			.await?;
		Ok(())
	}
}

pub fn router(service: Arc<OracleService>) -> Router {
	Router::new()
		.route("/health", get(health_check))
		.route("/oracles", get(list_oracles).post(register_oracle))
		.route(
			"/oracles/{id}",
			get(get_oracle).put(update_oracle).delete(remove_oracle),
		)
		.route("/oracles/{id}/resync", post(resync_oracle))
		.route("/oracles/{id}/rounds/latest", get(latest_round))
		.with_state(service)
}

/// [`ServiceError`] rendered as a JSON error body.
pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
	fn from(error: ServiceError) -> Self {
		Self(error)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = match &self.0 {
			ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
			ServiceError::Registry(RegistryError::NotFound(_)) => StatusCode::NOT_FOUND,
			ServiceError::Registry(RegistryError::DuplicateId(_))
			| ServiceError::Registry(RegistryError::DestinationInUse { .. }) => StatusCode::CONFLICT,
			ServiceError::Registry(RegistryError::InvalidThreshold(_))
			| ServiceError::Registry(RegistryError::InvalidDecimals { .. }) => {
				StatusCode::UNPROCESSABLE_ENTITY
			}
			ServiceError::Registry(RegistryError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
			ServiceError::Publish(_) => StatusCode::BAD_GATEWAY,
		};
		error_response(status, self.0.to_string())
	}
}

fn error_response(status: StatusCode, message: String) -> Response {
	(status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn caller(headers: &HeaderMap) -> Caller {
	headers
		.get(header::AUTHORIZATION)
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.strip_prefix("Bearer "))
		.map(|token| Caller::with_token(token.trim()))
		.unwrap_or_else(Caller::anonymous)
}

type AppState = State<Arc<OracleService>>;

async fn health_check(State(service): AppState) -> Json<serde_json::Value> {
	let oracles = service.list().await;
	let halted = oracles.iter().filter(|o| o.metadata.is_halted()).count();
	Json(serde_json::json!({
		"status": "ok",
		"oracles": oracles.len(),
		"halted": halted,
		"timestamp": chrono::Utc::now().timestamp()
	}))
}

async fn list_oracles(State(service): AppState) -> Json<Vec<OracleView>> {
	Json(service.list().await)
}

async fn register_oracle(
	State(service): AppState,
	headers: HeaderMap,
	Json(config): Json<OracleConfig>,
) -> Result<(StatusCode, Json<OracleView>), ApiError> {
	let id = service.register(&caller(&headers), config).await?;
	Ok((StatusCode::CREATED, Json(service.get(&id).await?)))
}

async fn get_oracle(
	State(service): AppState,
	Path(id): Path<String>,
) -> Result<Json<OracleView>, ApiError> {
	Ok(Json(service.get(&OracleId::new(id)).await?))
}

async fn update_oracle(
	State(service): AppState,
	Path(id): Path<String>,
	headers: HeaderMap,
	Json(config): Json<OracleConfig>,
) -> Result<Json<OracleView>, Response> {
	if config.id.as_str() != id {
		return Err(error_response(
			StatusCode::BAD_REQUEST,
			format!("body id '{}' does not match path id '{}'", config.id, id),
		));
	}
	let id = config.id.clone();
	service
		.update(&caller(&headers), config)
		.await
		.map_err(|e| ApiError(e).into_response())?;
	service
		.get(&id)
		.await
		.map(Json)
		.map_err(|e| ApiError(e).into_response())
}

async fn remove_oracle(
	State(service): AppState,
	Path(id): Path<String>,
	headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
	service
		.remove(&caller(&headers), &OracleId::new(id))
		.await?;
	Ok(StatusCode::NO_CONTENT)
}

async fn resync_oracle(
	State(service): AppState,
	Path(id): Path<String>,
	headers: HeaderMap,
) -> Result<Json<OracleMetadata>, ApiError> {
	Ok(Json(
		service
			.resync(&caller(&headers), &OracleId::new(id))
			.await?,
	))
}

async fn latest_round(
	State(service): AppState,
	Path(id): Path<String>,
) -> Result<Json<RoundRecord>, Response> {
	match service.latest_round(&OracleId::new(id)).await {
		Ok(Some(record)) => Ok(Json(record)),
		Ok(None) => Err(error_response(
			StatusCode::NOT_FOUND,
			"no round published yet".to_string(),
		)),
		Err(e) => Err(ApiError(e).into_response()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations;
	use axum::body::{to_bytes, Body};
	use axum::http::Request;
	use oracle_config::Config;
	use tower::ServiceExt;

	const ORACLE: &str = r#"{
		"id": "eth-usd",
		"source": { "type": "http", "url": "https://prices.test/eth", "json_path": "data.price" },
		"threshold": 3,
		"destination": {
			"contract": "0x00000000000000000000000000000000000000e1",
			"provider": { "chain_id": 31337, "hostname": "http://localhost:8545" }
		}
	}"#;

	async fn app() -> Router {
		let config: Config = toml::from_str(
			r#"
[storage]
backend = "memory"

[api]
enabled = true
owner_token = "owner"
"#,
		)
		.unwrap();
		let engine = implementations::builder(config).build().await.unwrap();
		router(engine.service())
	}

	fn request(method: &str, uri: &str, token: Option<&str>, body: Option<&str>) -> Request<Body> {
		let mut builder = Request::builder().method(method).uri(uri);
		if let Some(token) = token {
			builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
		}
		match body {
			Some(body) => builder
				.header(header::CONTENT_TYPE, "application/json")
				.body(Body::from(body.to_string()))
				.unwrap(),
			None => builder.body(Body::empty()).unwrap(),
		}
	}

	async fn json(response: Response) -> serde_json::Value {
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		serde_json::from_slice(&bytes).unwrap()
	}

	#[tokio::test]
	async fn test_register_requires_owner_token() {
		let app = app().await;

		let response = app
			.clone()
			.oneshot(request("POST", "/oracles", None, Some(ORACLE)))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

		let response = app
			.clone()
			.oneshot(request("POST", "/oracles", Some("owner"), Some(ORACLE)))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::CREATED);
		let body = json(response).await;
		assert_eq!(body["config"]["id"], "eth-usd");
		assert_eq!(body["state"], "idle");

		let response = app
			.oneshot(request("POST", "/oracles", Some("owner"), Some(ORACLE)))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::CONFLICT);
	}

	#[tokio::test]
	async fn test_get_list_and_remove() {
		let app = app().await;
		app.clone()
			.oneshot(request("POST", "/oracles", Some("owner"), Some(ORACLE)))
			.await
			.unwrap();

		let response = app
			.clone()
			.oneshot(request("GET", "/oracles", None, None))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(json(response).await.as_array().unwrap().len(), 1);

		let response = app
			.clone()
			.oneshot(request("GET", "/oracles/eth-usd", None, None))
			.await
			.unwrap();
		assert_eq!(json(response).await["config"]["threshold"], 3);

		let response = app
			.clone()
			.oneshot(request("DELETE", "/oracles/eth-usd", Some("owner"), None))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::NO_CONTENT);

		let response = app
			.oneshot(request("GET", "/oracles/eth-usd", None, None))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn test_update_rejects_mismatched_id() {
		let app = app().await;
		app.clone()
			.oneshot(request("POST", "/oracles", Some("owner"), Some(ORACLE)))
			.await
			.unwrap();

		let response = app
			.clone()
			.oneshot(request("PUT", "/oracles/btc-usd", Some("owner"), Some(ORACLE)))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);

		let updated = ORACLE.replace("\"threshold\": 3", "\"threshold\": 0");
		let response = app
			.oneshot(request("PUT", "/oracles/eth-usd", Some("owner"), Some(&updated)))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
	}

	#[tokio::test]
	async fn test_health_reports_oracle_count() {
		let response = app()
			.await
			.oneshot(request("GET", "/health", None, None))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let body = json(response).await;
		assert_eq!(body["status"], "ok");
		assert_eq!(body["oracles"], 0);
	}
}
