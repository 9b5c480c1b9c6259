//! One fetch-validate-publish cycle per oracle and tick.
//!
//! A cycle runs `Idle -> Fetching -> Validating -> Publishing -> Recorded`.
//! It only starts when the oracle's lock is free, and every change to the
//! oracle's bookkeeping is persisted through the registry before the next
//! external call. A submission is recorded as pending before waiting for its
//! receipt; a later cycle settles it by reading chain state instead of
//! guessing.

use crate::event_bus::EventBus;
use crate::locks::LockTable;
use crate::registry::{OracleEntry, Registry};
use crate::scheduler::{PollingScheduler, Schedule};
use crate::RegistryError;
use backoff::{backoff::Backoff, ExponentialBackoff};
use dashmap::DashMap;
use oracle_config::{PublisherConfig, ValidationConfig};
use oracle_fetcher::FetchService;
use oracle_publisher::{PublishError, PublishService};
use oracle_types::{
	NumericValue, OracleConfig, OracleEvent, OracleId, PendingPublish, RoundRecord,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tracing::instrument;

/// Where an oracle's current cycle is, as shown to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
	/// No cycle is running.
	Idle,
	/// Reading the data source.
	Fetching,
	/// Checking the fetched value against the validation policy.
	Validating,
	/// Settling a pending submission or writing a new round.
	Publishing,
	/// The round is confirmed and the bookkeeping is being saved.
	Recorded,
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
	/// Another cycle or a management call holds the oracle.
	Busy,
	/// The oracle is halted until a resync; carries the halt reason.
	Halted(String),
	/// Not due yet.
	Waiting {
		/// Ticks left before the threshold is reached.
		remaining: u64,
	},
	/// The source could not be read. No round was consumed.
	FetchFailed(String),
	/// The value failed validation. No round was consumed.
	Rejected(String),
	/// A round was confirmed on the destination.
	Published(RoundRecord),
	/// Publishing gave up for this tick.
	PublishFailed {
		/// Round that was being written. A later attempt reuses it.
		round_hint: u64,
		reason: String,
		/// False when the failure halted the oracle.
		retryable: bool,
	},
	/// The tick deadline passed before the next external call.
	DeadlineExceeded,
}

/// Which fetched values may be published.
#[derive(Debug, Clone, Default)]
pub struct ValidationPolicy {
	pub allow_zero: bool,
	pub allow_negative: bool,
	pub min: Option<NumericValue>,
	pub max: Option<NumericValue>,
}

impl From<&ValidationConfig> for ValidationPolicy {
	fn from(config: &ValidationConfig) -> Self {
		Self {
			allow_zero: config.allow_zero,
			allow_negative: config.allow_negative,
			min: config.min,
			max: config.max,
		}
	}
}

impl ValidationPolicy {
	/// Returns the rejection reason when `value` may not be published.
	pub fn check(&self, value: NumericValue) -> Result<(), String> {
		if value.is_zero() {
			if !self.allow_zero {
				return Err("value is zero".to_string());
			}
		} else if value.is_sign_negative() && !self.allow_negative {
			return Err(format!("value {} is negative", value));
		}
		if let Some(min) = self.min {
			if value < min {
				return Err(format!("value {} is below the minimum {}", value, min));
			}
		}
		if let Some(max) = self.max {
			if value > max {
				return Err(format!("value {} is above the maximum {}", value, max));
			}
		}
		Ok(())
	}
}

/// Bounded exponential backoff for retryable publish errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
	/// Attempts after the first one, within a single tick.
	pub max_retries: u32,
	pub initial_interval: Duration,
	pub max_interval: Duration,
}

impl From<&PublisherConfig> for RetryPolicy {
	fn from(config: &PublisherConfig) -> Self {
		Self {
			max_retries: config.max_retries,
			initial_interval: Duration::from_millis(config.initial_backoff_ms),
			max_interval: Duration::from_millis(config.max_backoff_ms),
		}
	}
}

impl RetryPolicy {
	fn backoff(&self) -> ExponentialBackoff {
		ExponentialBackoff {
			initial_interval: self.initial_interval,
			current_interval: self.initial_interval,
			max_interval: self.max_interval,
			max_elapsed_time: None,
			..Default::default()
		}
	}
}

type PublishAttempt = Result<RoundRecord, PublishError>;

/// Runs cycles for every oracle, at most one per oracle at a time.
pub struct OraclePipeline {
	registry: Arc<Registry>,
	fetcher: Arc<FetchService>,
	publisher: Arc<PublishService>,
	events: EventBus,
	validation: ValidationPolicy,
	retry: RetryPolicy,
	locks: LockTable,
	states: DashMap<OracleId, PipelineState>,
}

impl OraclePipeline {
	pub fn new(
		registry: Arc<Registry>,
		fetcher: Arc<FetchService>,
		publisher: Arc<PublishService>,
		events: EventBus,
		validation: ValidationPolicy,
		retry: RetryPolicy,
	) -> Self {
		Self {
			registry,
			fetcher,
			publisher,
			events,
			validation,
			retry,
			locks: LockTable::new(),
			states: DashMap::new(),
		}
	}

	/// Current state of `id`; oracles that never ran are idle.
	pub fn state(&self, id: &OracleId) -> PipelineState {
		self.states
			.get(id)
			.map(|s| *s)
			.unwrap_or(PipelineState::Idle)
	}

	/// Waits until no cycle runs for `id` and keeps others out while held.
	pub async fn lock(&self, id: &OracleId) -> OwnedMutexGuard<()> {
		self.locks.acquire(id).await
	}

	/// Drops the lock and state of a removed oracle.
	pub fn forget(&self, id: &OracleId) {
		self.locks.forget(id);
		self.states.remove(id);
	}

	fn enter(&self, id: &OracleId, state: PipelineState) {
		tracing::trace!(state = ?state, "Pipeline state");
		self.states.insert(id.clone(), state);
	}

	/// Runs one cycle unless another one already holds the oracle.
	#[instrument(
		name = "cycle",
		skip_all,
		fields(oracle_id = %id, cycle_id = %uuid::Uuid::new_v4())
	)]
	pub async fn run_cycle(
		&self,
		id: &OracleId,
		deadline: Instant,
	) -> Result<CycleOutcome, RegistryError> {
		let Some(_guard) = self.locks.try_acquire(id) else {
			tracing::debug!("Previous cycle still running, skipping tick");
			return Ok(CycleOutcome::Busy);
		};

		let outcome = self.run_locked(id, deadline).await;
		self.enter(id, PipelineState::Idle);
		outcome
	}

	async fn run_locked(
		&self,
		id: &OracleId,
		deadline: Instant,
	) -> Result<CycleOutcome, RegistryError> {
		let OracleEntry { config, metadata } = self.registry.entry(id).await?;
		if let Some(reason) = metadata.halted {
			tracing::debug!(reason = %reason, "Oracle is halted");
			return Ok(CycleOutcome::Halted(reason));
		}

		if let Some(pending) = metadata.pending {
			if Instant::now() >= deadline {
				return Ok(CycleOutcome::DeadlineExceeded);
			}
			self.enter(id, PipelineState::Publishing);
			match self
				.publisher
				.resolve_pending(&config.destination, &pending)
				.await
			{
				Ok(Some(record)) => return self.record(id, record).await,
				Ok(None) => {
					self.registry
						.update_metadata(id, |m| m.pending = None)
						.await?;
				}
				Err(e) => return self.fail_publish(id, pending.round_hint, e).await,
			}
		}

		let metadata = self
			.registry
			.update_metadata(id, |m| m.cycles_since_last_publish += 1)
			.await?;
		match PollingScheduler::decide(&config, &metadata) {
			Schedule::Due => {}
			Schedule::NotDue { remaining } => return Ok(CycleOutcome::Waiting { remaining }),
			Schedule::Halted => {
				return Ok(CycleOutcome::Halted(
					metadata.halted.unwrap_or_default(),
				))
			}
		}

		if Instant::now() >= deadline {
			tracing::warn!("Tick deadline passed before fetching");
			return Ok(CycleOutcome::DeadlineExceeded);
		}
		self.enter(id, PipelineState::Fetching);
		let value = match self.fetcher.fetch(&config.source).await {
			Ok(value) => value,
			Err(e) => return self.fail_fetch(id, e.to_string()).await,
		};

		self.enter(id, PipelineState::Validating);
		if let Err(reason) = self.validation.check(value) {
			return self.reject(id, value, reason).await;
		}

		if Instant::now() >= deadline {
			tracing::warn!("Tick deadline passed before publishing");
			return Ok(CycleOutcome::DeadlineExceeded);
		}
		self.enter(id, PipelineState::Publishing);
		let round_hint = metadata.next_round();
		match self
			.publish_with_retry(&config, value, round_hint, deadline)
			.await?
		{
			Ok(record) => self.record(id, record).await,
			Err(e) => self.fail_publish(id, round_hint, e).await,
		}
	}

	/// Publishes `value` as round `round_hint`, retrying retryable errors with
	/// the same hint.
	async fn publish_with_retry(
		&self,
		config: &OracleConfig,
		value: NumericValue,
		round_hint: u64,
		deadline: Instant,
	) -> Result<PublishAttempt, RegistryError> {
		let mut backoff = self.retry.backoff();
		let mut attempts = 0;

		loop {
			let error = match self.publish_once(config, value, round_hint).await? {
				Ok(record) => return Ok(Ok(record)),
				Err(e) => e,
			};
			if !error.is_retryable() {
				return Ok(Err(error));
			}

			attempts += 1;
			if attempts > self.retry.max_retries {
				tracing::warn!(
					round = round_hint,
					"Publish failed after {} retries, giving up: {}",
					self.retry.max_retries,
					error
				);
				return Ok(Err(error));
			}
			let Some(delay) = backoff.next_backoff() else {
				return Ok(Err(error));
			};
			if Instant::now() + delay >= deadline {
				tracing::warn!(round = round_hint, "No time left in this tick to retry: {}", error);
				return Ok(Err(error));
			}

			tracing::warn!(
				round = round_hint,
				"Publish failed, attempt {}/{}, retrying in {:?}: {}",
				attempts,
				self.retry.max_retries,
				delay,
				error
			);
			tokio::time::sleep(delay).await;
		}
	}

	async fn publish_once(
		&self,
		config: &OracleConfig,
		value: NumericValue,
		round_hint: u64,
	) -> Result<PublishAttempt, RegistryError> {
		let id = &config.id;
		let destination = &config.destination;

		// An earlier attempt may have landed after all.
		if let Some(pending) = self.registry.metadata(id).await?.pending {
			match self.publisher.resolve_pending(destination, &pending).await {
				Ok(Some(record)) => return Ok(Ok(record)),
				Ok(None) => {
					self.registry
						.update_metadata(id, |m| m.pending = None)
						.await?;
				}
				Err(e) => return Ok(Err(e)),
			}
		}

		let submission = match self
			.publisher
			.submit_round(destination, value, round_hint)
			.await
		{
			Ok(submission) => submission,
			Err(e) => return Ok(Err(e)),
		};
		let pending = PendingPublish::from(&submission);
		self.registry
			.update_metadata(id, |m| m.pending = Some(pending))
			.await?;
		self.events
			.publish(OracleEvent::PublishSubmitted {
				oracle_id: id.clone(),
				round_hint,
				tx_hash: submission.tx_hash.clone(),
			})
			.ok();

		Ok(self.publisher.confirm_round(destination, &submission).await)
	}

	async fn record(
		&self,
		id: &OracleId,
		record: RoundRecord,
	) -> Result<CycleOutcome, RegistryError> {
		self.enter(id, PipelineState::Recorded);
		let now = unix_now();
		self.registry
			.update_metadata(id, |m| {
				m.last_attempt_time = Some(now);
				m.last_published_round = record.round_id;
				m.last_published_value = Some(record.answer);
				m.cycles_since_last_publish = 0;
				m.consecutive_failures = 0;
				m.pending = None;
			})
			.await?;

		tracing::info!(round = record.round_id, answer = %record.answer, "Published round");
		self.events
			.publish(OracleEvent::RoundPublished {
				oracle_id: id.clone(),
				record: record.clone(),
			})
			.ok();
		Ok(CycleOutcome::Published(record))
	}

	async fn fail_fetch(
		&self,
		id: &OracleId,
		reason: String,
	) -> Result<CycleOutcome, RegistryError> {
		let metadata = self.count_failure(id).await?;
		tracing::warn!(
			failures = metadata.consecutive_failures,
			"Fetch failed: {}",
			reason
		);
		self.events
			.publish(OracleEvent::FetchFailed {
				oracle_id: id.clone(),
				reason: reason.clone(),
				consecutive_failures: metadata.consecutive_failures,
			})
			.ok();
		Ok(CycleOutcome::FetchFailed(reason))
	}

	async fn reject(
		&self,
		id: &OracleId,
		value: NumericValue,
		reason: String,
	) -> Result<CycleOutcome, RegistryError> {
		let metadata = self.count_failure(id).await?;
		tracing::warn!(
			value = %value,
			failures = metadata.consecutive_failures,
			"Rejected fetched value: {}",
			reason
		);
		self.events
			.publish(OracleEvent::ValueRejected {
				oracle_id: id.clone(),
				value,
				reason: reason.clone(),
			})
			.ok();
		Ok(CycleOutcome::Rejected(reason))
	}

	async fn fail_publish(
		&self,
		id: &OracleId,
		round_hint: u64,
		error: PublishError,
	) -> Result<CycleOutcome, RegistryError> {
		let retryable = error.is_retryable();
		let reason = error.to_string();
		let now = unix_now();
		let halt = (!retryable).then(|| reason.clone());
		let metadata = self
			.registry
			.update_metadata(id, |m| {
				m.last_attempt_time = Some(now);
				m.consecutive_failures += 1;
				if halt.is_some() {
					m.halted = halt;
				}
			})
			.await?;

		self.events
			.publish(OracleEvent::PublishFailed {
				oracle_id: id.clone(),
				round_hint,
				reason: reason.clone(),
				retryable,
			})
			.ok();
		if retryable {
			tracing::warn!(
				round = round_hint,
				failures = metadata.consecutive_failures,
				"Publish failed, will retry next cycle: {}",
				reason
			);
		} else {
			tracing::error!(
				round = round_hint,
				"Publishing halted until resync: {}",
				reason
			);
			self.events
				.publish(OracleEvent::Halted {
					oracle_id: id.clone(),
					reason: reason.clone(),
				})
				.ok();
		}

		Ok(CycleOutcome::PublishFailed {
			round_hint,
			reason,
			retryable,
		})
	}

	async fn count_failure(
		&self,
		id: &OracleId,
	) -> Result<oracle_types::OracleMetadata, RegistryError> {
		let now = unix_now();
		self.registry
			.update_metadata(id, |m| {
				m.last_attempt_time = Some(now);
				m.consecutive_failures += 1;
			})
			.await
	}
}

pub(crate) fn unix_now() -> u64 {
	chrono::Utc::now().timestamp().max(0) as u64
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{dec, Harness};
	use oracle_types::U256;
	use std::time::Duration;

	#[tokio::test]
	async fn test_threshold_ten_publishes_on_tenth_tick() {
		let harness = Harness::new().await;
		let id = harness.register("eth-usd", 10).await;
		harness.http.serve("2000.5");

		for tick in 1..=9u64 {
			assert_eq!(
				harness.tick(&id).await,
				CycleOutcome::Waiting {
					remaining: 10 - tick
				}
			);
			assert_eq!(harness.pipeline.state(&id), PipelineState::Idle);
		}
		assert_eq!(harness.http.calls(), 0);
		assert!(harness.feed.rounds().is_empty());

		let CycleOutcome::Published(record) = harness.tick(&id).await else {
			panic!("tenth tick should publish");
		};
		assert_eq!(record.round_id, 1);
		assert_eq!(record.answer, dec("2000.5"));
		assert_eq!(
			harness.registry.metadata(&id).await.unwrap().cycles_since_last_publish,
			0
		);
	}

	#[tokio::test]
	async fn test_successive_publishes_are_contiguous() {
		let harness = Harness::new().await;
		let id = harness.register("eth-usd", 1).await;

		for (round, value) in [(1u64, "10.5"), (2, "11"), (3, "9.25")] {
			harness.http.serve(value);
			match harness.tick(&id).await {
				CycleOutcome::Published(record) => {
					assert_eq!(record.round_id, round);
					assert_eq!(record.answer, dec(value));
				}
				other => panic!("unexpected outcome {:?}", other),
			}
		}

		let ids: Vec<u64> = harness.feed.rounds().iter().map(|r| r.round_id).collect();
		assert_eq!(ids, vec![1, 2, 3]);
		assert_eq!(harness.feed.rounds()[0].answer, U256::from(1_050_000_000u64));

		let metadata = harness.registry.metadata(&id).await.unwrap();
		assert_eq!(metadata.last_published_round, 3);
		assert_eq!(metadata.last_published_value, Some(dec("9.25")));
		assert!(metadata.pending.is_none());
	}

	#[tokio::test]
	async fn test_fetch_failure_consumes_no_round() {
		let harness = Harness::new().await;
		let id = harness.register("eth-usd", 1).await;
		let mut events = harness.events.subscribe();

		harness.http.fail();
		assert!(matches!(
			harness.tick(&id).await,
			CycleOutcome::FetchFailed(_)
		));
		assert!(harness.feed.rounds().is_empty());
		let metadata = harness.registry.metadata(&id).await.unwrap();
		assert_eq!(metadata.consecutive_failures, 1);
		assert_eq!(metadata.last_published_round, 0);
		assert!(metadata.last_attempt_time.is_some());
		assert!(matches!(
			events.try_recv().unwrap(),
			OracleEvent::FetchFailed {
				consecutive_failures: 1,
				..
			}
		));

		harness.http.serve("42");
		match harness.tick(&id).await {
			CycleOutcome::Published(record) => assert_eq!(record.round_id, 1),
			other => panic!("unexpected outcome {:?}", other),
		}
		assert_eq!(
			harness.registry.metadata(&id).await.unwrap().consecutive_failures,
			0
		);
	}

	#[tokio::test]
	async fn test_rejected_value_consumes_no_round() {
		let harness = Harness::new().await;
		let id = harness.register("eth-usd", 1).await;

		harness.http.serve("0");
		assert!(matches!(harness.tick(&id).await, CycleOutcome::Rejected(_)));
		harness.http.serve("-3");
		assert!(matches!(harness.tick(&id).await, CycleOutcome::Rejected(_)));
		assert!(harness.feed.rounds().is_empty());
		assert_eq!(
			harness.registry.metadata(&id).await.unwrap().consecutive_failures,
			2
		);

		harness.http.serve("7");
		match harness.tick(&id).await {
			CycleOutcome::Published(record) => assert_eq!(record.round_id, 1),
			other => panic!("unexpected outcome {:?}", other),
		}
	}

	#[test]
	fn test_validation_policy_bounds() {
		let policy = ValidationPolicy {
			min: Some(dec("1")),
			max: Some(dec("100")),
			..Default::default()
		};
		assert!(policy.check(dec("50")).is_ok());
		assert!(policy.check(dec("0.5")).is_err());
		assert!(policy.check(dec("100.01")).is_err());
		assert!(policy.check(dec("0")).is_err());

		let permissive = ValidationPolicy {
			allow_zero: true,
			allow_negative: true,
			..Default::default()
		};
		assert!(permissive.check(dec("0")).is_ok());
		assert!(permissive.check(dec("-1")).is_ok());
	}

	#[tokio::test]
	async fn test_concurrent_dispatch_runs_one_cycle() {
		let harness = Harness::new().await;
		let id = harness.register("eth-usd", 1).await;
		harness.http.serve("5");
		harness.http.set_delay(Duration::from_millis(50));

		let cycles = (0..8).map(|_| harness.tick(&id));
		let outcomes = futures::future::join_all(cycles).await;

		let published = outcomes
			.iter()
			.filter(|o| matches!(o, CycleOutcome::Published(_)))
			.count();
		let busy = outcomes
			.iter()
			.filter(|o| matches!(o, CycleOutcome::Busy))
			.count();
		assert_eq!(published, 1);
		assert_eq!(busy, 7);
		assert_eq!(harness.feed.rounds().len(), 1);
		assert_eq!(harness.http.calls(), 1);
	}

	#[tokio::test]
	async fn test_external_advance_halts_oracle() {
		let harness = Harness::new().await;
		let id = harness.register("eth-usd", 1).await;
		harness.feed.push_external(U256::from(1u8));
		harness.http.serve("5");

		match harness.tick(&id).await {
			CycleOutcome::PublishFailed {
				round_hint,
				retryable,
				..
			} => {
				assert_eq!(round_hint, 1);
				assert!(!retryable);
			}
			other => panic!("unexpected outcome {:?}", other),
		}
		assert!(harness.registry.metadata(&id).await.unwrap().is_halted());
		assert_eq!(harness.feed.submissions(), 0);

		assert!(matches!(harness.tick(&id).await, CycleOutcome::Halted(_)));
		assert_eq!(harness.http.calls(), 1);
		assert_eq!(harness.feed.rounds().len(), 1);
	}

	#[tokio::test]
	async fn test_feed_two_rounds_ahead_is_a_conflict() {
		let harness = Harness::new().await;
		let id = harness.register("eth-usd", 1).await;
		harness.http.serve("5");
		assert!(matches!(
			harness.tick(&id).await,
			CycleOutcome::Published(ref r) if r.round_id == 1
		));

		harness.feed.push_external(U256::from(6u8));
		harness.feed.push_external(U256::from(7u8));
		harness.http.serve("8");

		match harness.tick(&id).await {
			CycleOutcome::PublishFailed {
				round_hint,
				reason,
				retryable,
			} => {
				assert_eq!(round_hint, 2);
				assert!(!retryable);
				assert!(reason.contains("Round conflict"), "{}", reason);
				assert!(reason.contains("feed is at 3"), "{}", reason);
			}
			other => panic!("unexpected outcome {:?}", other),
		}
		assert_eq!(harness.feed.submissions(), 1);
		assert_eq!(harness.feed.rounds().len(), 3);
		let metadata = harness.registry.metadata(&id).await.unwrap();
		assert_eq!(metadata.last_published_round, 1);
		assert!(metadata.is_halted());
	}

	#[tokio::test]
	async fn test_retryable_error_reuses_round_hint() {
		let harness = Harness::new().await;
		let id = harness.register("eth-usd", 1).await;
		harness.http.serve("5");
		harness
			.feed
			.fail_next_submit(PublishError::Network("connection reset".into()));

		match harness.tick(&id).await {
			CycleOutcome::Published(record) => assert_eq!(record.round_id, 1),
			other => panic!("unexpected outcome {:?}", other),
		}
		assert_eq!(harness.feed.rounds().len(), 1);
		assert_eq!(harness.http.calls(), 1);
	}

	#[tokio::test]
	async fn test_unconfirmed_submission_is_settled_before_resubmitting() {
		let harness = Harness::with_retries(0).await;
		let id = harness.register("eth-usd", 1).await;
		harness.http.serve("5");
		harness.feed.hold_receipts(true);

		match harness.tick(&id).await {
			CycleOutcome::PublishFailed { retryable, .. } => assert!(retryable),
			other => panic!("unexpected outcome {:?}", other),
		}
		let pending = harness.registry.metadata(&id).await.unwrap().pending;
		assert_eq!(pending.map(|p| p.round_hint), Some(1));

		harness.feed.mine_pending();
		match harness.tick(&id).await {
			CycleOutcome::Published(record) => {
				assert_eq!(record.round_id, 1);
				assert_eq!(record.answer, dec("5"));
			}
			other => panic!("unexpected outcome {:?}", other),
		}
		assert_eq!(harness.feed.submissions(), 1);
		assert_eq!(harness.http.calls(), 1);
		assert!(harness.registry.metadata(&id).await.unwrap().pending.is_none());
	}

	#[tokio::test]
	async fn test_dropped_submission_is_sent_again_with_same_round() {
		let harness = Harness::with_retries(0).await;
		let id = harness.register("eth-usd", 1).await;
		harness.http.serve("5");
		harness.feed.hold_receipts(true);
		assert!(matches!(
			harness.tick(&id).await,
			CycleOutcome::PublishFailed {
				retryable: true,
				..
			}
		));

		harness.feed.drop_pending();
		harness.feed.hold_receipts(false);
		match harness.tick(&id).await {
			CycleOutcome::Published(record) => assert_eq!(record.round_id, 1),
			other => panic!("unexpected outcome {:?}", other),
		}
		assert_eq!(harness.feed.submissions(), 2);
		assert_eq!(harness.feed.rounds().len(), 1);
	}

	#[tokio::test]
	async fn test_deadline_stops_cycle_before_fetch() {
		let harness = Harness::new().await;
		let id = harness.register("eth-usd", 1).await;
		harness.http.serve("5");

		let outcome = harness
			.pipeline
			.run_cycle(&id, Instant::now())
			.await
			.unwrap();
		assert_eq!(outcome, CycleOutcome::DeadlineExceeded);
		assert_eq!(harness.http.calls(), 0);
		assert_eq!(
			harness.registry.metadata(&id).await.unwrap().cycles_since_last_publish,
			1
		);
	}
}
