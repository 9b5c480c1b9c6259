//! Per-oracle publication gating.

use oracle_types::{OracleConfig, OracleMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
	/// Enough cycles elapsed; the observed value should be published.
	Due,
	/// `remaining` more observed cycles are needed.
	NotDue { remaining: u64 },
	/// A fatal publish error stopped this oracle.
	Halted,
}

/// Cycle-count policy: an oracle is due once `threshold` observation cycles
/// have elapsed since its last publication.
///
/// The decision depends only on the threshold and the registry's bookkeeping.
pub struct PollingScheduler;

impl PollingScheduler {
	/// A zero threshold is never due.
	pub fn is_due(threshold: u64, cycles_since_last_publish: u64) -> bool {
		threshold > 0 && cycles_since_last_publish >= threshold
	}

	pub fn decide(config: &OracleConfig, metadata: &OracleMetadata) -> Schedule {
		if metadata.is_halted() {
			return Schedule::Halted;
		}
		if Self::is_due(config.threshold, metadata.cycles_since_last_publish) {
			Schedule::Due
		} else {
			Schedule::NotDue {
				remaining: config
					.threshold
					.saturating_sub(metadata.cycles_since_last_publish),
			}
		}
	}
}
