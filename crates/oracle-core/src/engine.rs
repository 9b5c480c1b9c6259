//! Tick loop driving the pipeline.

use crate::event_bus::EventBus;
use crate::pipeline::{CycleOutcome, OraclePipeline};
use crate::registry::Registry;
use crate::service::OracleService;
use crate::EngineError;
use oracle_config::Config;
use oracle_types::OracleId;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

type CycleTasks = JoinSet<Option<(OracleId, CycleOutcome)>>;

pub struct OracleEngine {
	config: Config,
	registry: Arc<Registry>,
	pipeline: Arc<OraclePipeline>,
	service: Arc<OracleService>,
	event_bus: EventBus,
}

impl OracleEngine {
	pub(crate) fn new(
		config: Config,
		registry: Arc<Registry>,
		pipeline: Arc<OraclePipeline>,
		service: Arc<OracleService>,
		event_bus: EventBus,
	) -> Self {
		Self {
			config,
			registry,
			pipeline,
			service,
			event_bus,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn service(&self) -> Arc<OracleService> {
		self.service.clone()
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	fn tick_deadline(&self) -> Duration {
		Duration::from_secs(self.config.oracle.tick_deadline_secs())
	}

	/// Ticks until `shutdown` resolves, then waits up to one tick deadline for
	/// running cycles to finish their external calls.
	pub async fn run<F>(&self, shutdown: F) -> Result<(), EngineError>
	where
		F: Future<Output = ()>,
	{
		let period = Duration::from_secs(self.config.oracle.tick_interval_secs);
		if period.is_zero() {
			return Err(EngineError::Config("tick interval must be positive".into()));
		}
		let mut interval = tokio::time::interval(period);
		interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
		let mut tasks = CycleTasks::new();
		tokio::pin!(shutdown);

		tracing::info!(
			name = %self.config.oracle.name,
			tick_interval_secs = self.config.oracle.tick_interval_secs,
			"Oracle engine started"
		);

		loop {
			tokio::select! {
				_ = interval.tick() => {
					while let Some(finished) = tasks.try_join_next() {
						report_join(finished);
					}
					self.spawn_cycles(&mut tasks).await;
				}
				_ = &mut shutdown => {
					tracing::info!("Shutting down oracle engine");
					break;
				}
			}
		}

		let drain = async {
			while let Some(finished) = tasks.join_next().await {
				report_join(finished);
			}
		};
		if tokio::time::timeout(self.tick_deadline(), drain).await.is_err() {
			tracing::warn!("Abandoning cycles still running at shutdown");
		}
		Ok(())
	}

	/// Runs one tick to completion and returns each oracle's outcome.
	pub async fn tick(&self) -> Vec<(OracleId, CycleOutcome)> {
		let mut tasks = CycleTasks::new();
		self.spawn_cycles(&mut tasks).await;

		let mut outcomes = Vec::new();
		while let Some(finished) = tasks.join_next().await {
			if let Some(outcome) = report_join(finished) {
				outcomes.push(outcome);
			}
		}
		outcomes
	}

	async fn spawn_cycles(&self, tasks: &mut CycleTasks) {
		let deadline = Instant::now() + self.tick_deadline();
		for id in self.registry.ids().await {
			let pipeline = self.pipeline.clone();
			tasks.spawn(async move {
				match pipeline.run_cycle(&id, deadline).await {
					Ok(outcome) => {
						tracing::debug!(oracle_id = %id, outcome = ?outcome, "Cycle finished");
						Some((id, outcome))
					}
					Err(e) => {
						tracing::error!(oracle_id = %id, "Cycle failed: {}", e);
						None
					}
				}
			});
		}
	}
}

fn report_join(
	finished: Result<Option<(OracleId, CycleOutcome)>, tokio::task::JoinError>,
) -> Option<(OracleId, CycleOutcome)> {
	match finished {
		Ok(outcome) => outcome,
		Err(e) => {
			tracing::error!("Cycle task panicked: {}", e);
			None
		}
	}
}
