//! In-memory backends shared by the unit tests of this crate.

use crate::event_bus::EventBus;
use crate::pipeline::{CycleOutcome, OraclePipeline, RetryPolicy, ValidationPolicy};
use crate::registry::Registry;
use crate::service::{AuthorizationInterface, OracleService};
use alloy::primitives::{keccak256, Bytes};
use async_trait::async_trait;
use oracle_fetcher::{EvmReadInterface, FetchError, FetchService, HttpInterface, HttpResponse};
use oracle_publisher::{PriceFeedInterface, PublishError, PublishService};
use oracle_storage::implementations::memory::MemoryStorage;
use oracle_storage::StorageService;
use oracle_types::{
	Address, DataSource, Destination, OnchainRound, OracleConfig, OracleId, RpcProvider,
	TransactionHash, TransactionReceipt, U256,
};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub fn dec(s: &str) -> Decimal {
	Decimal::from_str(s).unwrap()
}

pub fn memory_storage() -> Arc<StorageService> {
	Arc::new(StorageService::new(Box::new(MemoryStorage::new())))
}

/// HTTP-sourced oracle whose destination contract is derived from its id.
pub fn http_oracle(id: &str, threshold: u64) -> OracleConfig {
	OracleConfig {
		id: OracleId::from(id),
		source: DataSource::Http {
			url: format!("https://prices.test/{}", id),
			json_path: "data.price".to_string(),
		},
		threshold,
		destination: Destination {
			contract: Address::from_slice(&keccak256(id.as_bytes())[12..]),
			provider: RpcProvider {
				chain_id: 31337,
				hostname: "http://localhost:8545".to_string(),
				credential_path: None,
			},
			decimals: 8,
		},
	}
}

#[derive(Default)]
pub struct HttpScript {
	price: Option<String>,
	delay: Option<Duration>,
	calls: usize,
}

/// Serves `{"data": {"price": "<price>"}}`, or a 503 once told to fail.
#[derive(Clone, Default)]
pub struct ScriptedHttp(Arc<Mutex<HttpScript>>);

impl ScriptedHttp {
	pub fn serve(&self, price: &str) {
		self.0.lock().unwrap().price = Some(price.to_string());
	}

	pub fn fail(&self) {
		self.0.lock().unwrap().price = None;
	}

	pub fn set_delay(&self, delay: Duration) {
		self.0.lock().unwrap().delay = Some(delay);
	}

	pub fn calls(&self) -> usize {
		self.0.lock().unwrap().calls
	}
}

#[async_trait]
impl HttpInterface for ScriptedHttp {
	async fn get(&self, _url: &str) -> Result<HttpResponse, FetchError> {
		let (price, delay) = {
			let mut script = self.0.lock().unwrap();
			script.calls += 1;
			(script.price.clone(), script.delay)
		};
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}
		Ok(match price {
			Some(price) => HttpResponse {
				status: 200,
				body: format!(r#"{{"data": {{"price": "{}"}}}}"#, price).into_bytes(),
			},
			None => HttpResponse {
				status: 503,
				body: Vec::new(),
			},
		})
	}
}

pub struct NoEvm;

#[async_trait]
impl EvmReadInterface for NoEvm {
	async fn call(
		&self,
		_provider: &RpcProvider,
		_target: Address,
		_calldata: Bytes,
	) -> Result<Bytes, FetchError> {
		Err(FetchError::InvalidSource("no EVM reader in tests".into()))
	}
}

#[derive(Default)]
pub struct FeedState {
	rounds: Vec<OnchainRound>,
	receipts: Vec<TransactionReceipt>,
	mempool: Vec<(TransactionHash, U256)>,
	hold_receipts: bool,
	submit_errors: VecDeque<PublishError>,
	submissions: u64,
}

impl FeedState {
	fn append(&mut self, answer: U256) -> u64 {
		let round_id = self.rounds.len() as u64 + 1;
		self.rounds.push(OnchainRound {
			round_id,
			answer,
			started_at: 1_700_000_000 + round_id,
			updated_at: 1_700_000_000 + round_id,
			answered_in_round: round_id,
		});
		round_id
	}
}

/// Price feed that numbers rounds like the contract and can hold back receipts.
#[derive(Clone, Default)]
pub struct FakeFeed(Arc<Mutex<FeedState>>);

impl FakeFeed {
	pub fn rounds(&self) -> Vec<OnchainRound> {
		self.0.lock().unwrap().rounds.clone()
	}

	pub fn submissions(&self) -> u64 {
		self.0.lock().unwrap().submissions
	}

	/// A round written by someone else.
	pub fn push_external(&self, answer: U256) {
		self.0.lock().unwrap().append(answer);
	}

	pub fn fail_next_submit(&self, error: PublishError) {
		self.0.lock().unwrap().submit_errors.push_back(error);
	}

	pub fn hold_receipts(&self, hold: bool) {
		self.0.lock().unwrap().hold_receipts = hold;
	}

	/// Mines every held transaction.
	pub fn mine_pending(&self) {
		let mut state = self.0.lock().unwrap();
		let held = std::mem::take(&mut state.mempool);
		for (hash, answer) in held {
			let round_id = state.append(answer);
			state.receipts.push(TransactionReceipt {
				hash,
				block_number: 100 + round_id,
				success: true,
			});
		}
	}

	/// Forgets every held transaction, as a node evicting them would.
	pub fn drop_pending(&self) {
		self.0.lock().unwrap().mempool.clear();
	}
}

#[async_trait]
impl PriceFeedInterface for FakeFeed {
	async fn latest_round(&self, _destination: &Destination) -> Result<OnchainRound, PublishError> {
		let state = self.0.lock().unwrap();
		Ok(state.rounds.last().cloned().unwrap_or_else(OnchainRound::empty))
	}

	async fn round_data(
		&self,
		_destination: &Destination,
		round_id: u64,
	) -> Result<Option<OnchainRound>, PublishError> {
		let state = self.0.lock().unwrap();
		Ok(state.rounds.iter().find(|r| r.round_id == round_id).cloned())
	}

	async fn submit_update(
		&self,
		_destination: &Destination,
		answer: U256,
	) -> Result<TransactionHash, PublishError> {
		let mut state = self.0.lock().unwrap();
		if let Some(error) = state.submit_errors.pop_front() {
			return Err(error);
		}
		state.submissions += 1;
		let hash = TransactionHash(vec![state.submissions as u8; 32]);
		if state.hold_receipts {
			state.mempool.push((hash.clone(), answer));
		} else {
			let round_id = state.append(answer);
			state.receipts.push(TransactionReceipt {
				hash: hash.clone(),
				block_number: 100 + round_id,
				success: true,
			});
		}
		Ok(hash)
	}

	async fn get_receipt(
		&self,
		_destination: &Destination,
		hash: &TransactionHash,
	) -> Result<Option<TransactionReceipt>, PublishError> {
		let state = self.0.lock().unwrap();
		Ok(state.receipts.iter().find(|r| &r.hash == hash).cloned())
	}

	async fn transaction_known(
		&self,
		_destination: &Destination,
		hash: &TransactionHash,
	) -> Result<bool, PublishError> {
		let state = self.0.lock().unwrap();
		Ok(state.mempool.iter().any(|(h, _)| h == hash)
			|| state.receipts.iter().any(|r| &r.hash == hash))
	}

	async fn wait_for_confirmation(
		&self,
		destination: &Destination,
		hash: &TransactionHash,
		_confirmations: u64,
	) -> Result<TransactionReceipt, PublishError> {
		self.get_receipt(destination, hash)
			.await?
			.ok_or_else(|| PublishError::Unconfirmed {
				tx_hash: hash.to_string(),
				reason: "no receipt before timeout".to_string(),
			})
	}
}

/// A pipeline over in-memory storage, a scripted HTTP source and a fake feed.
pub struct Harness {
	pub registry: Arc<Registry>,
	pub pipeline: Arc<OraclePipeline>,
	pub publisher: Arc<PublishService>,
	pub events: EventBus,
	pub http: ScriptedHttp,
	pub feed: FakeFeed,
}

impl Harness {
	pub async fn new() -> Self {
		Self::with_retries(3).await
	}

	pub async fn with_retries(max_retries: u32) -> Self {
		let registry = Arc::new(Registry::load(memory_storage()).await.unwrap());
		let http = ScriptedHttp::default();
		let feed = FakeFeed::default();
		let fetcher = Arc::new(FetchService::new(
			Box::new(http.clone()),
			Box::new(NoEvm),
			Duration::from_secs(5),
		));
		let publisher = Arc::new(PublishService::new(Box::new(feed.clone()), 1));
		let events = EventBus::new(64);
		let pipeline = Arc::new(OraclePipeline::new(
			registry.clone(),
			fetcher,
			publisher.clone(),
			events.clone(),
			ValidationPolicy::default(),
			RetryPolicy {
				max_retries,
				initial_interval: Duration::from_millis(1),
				max_interval: Duration::from_millis(5),
			},
		));

		Self {
			registry,
			pipeline,
			publisher,
			events,
			http,
			feed,
		}
	}

	pub async fn register(&self, id: &str, threshold: u64) -> OracleId {
		self.registry
			.register(http_oracle(id, threshold))
			.await
			.unwrap()
	}

	pub fn service(&self, authorization: Box<dyn AuthorizationInterface>) -> OracleService {
		OracleService::new(
			self.registry.clone(),
			self.pipeline.clone(),
			self.publisher.clone(),
			self.events.clone(),
			authorization,
		)
	}

	pub async fn tick(&self, id: &OracleId) -> CycleOutcome {
		self.pipeline
			.run_cycle(id, Instant::now() + Duration::from_secs(60))
			.await
			.unwrap()
	}
}
