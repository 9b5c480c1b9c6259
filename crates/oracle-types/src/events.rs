use serde::{Deserialize, Serialize};

use crate::{NumericValue, OracleId, RoundRecord, TransactionHash};

/// Everything the pipeline and the management API report about an oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OracleEvent {
	Registered {
		oracle_id: OracleId,
	},
	Updated {
		oracle_id: OracleId,
	},
	Removed {
		oracle_id: OracleId,
	},
	FetchFailed {
		oracle_id: OracleId,
		reason: String,
		consecutive_failures: u32,
	},
	ValueRejected {
		oracle_id: OracleId,
		value: NumericValue,
		reason: String,
	},
	PublishSubmitted {
		oracle_id: OracleId,
		round_hint: u64,
		tx_hash: TransactionHash,
	},
	RoundPublished {
		oracle_id: OracleId,
		record: RoundRecord,
	},
	PublishFailed {
		oracle_id: OracleId,
		round_hint: u64,
		reason: String,
		retryable: bool,
	},
	Halted {
		oracle_id: OracleId,
		reason: String,
	},
	Resynced {
		oracle_id: OracleId,
		round_id: u64,
	},
}

impl OracleEvent {
	pub fn oracle_id(&self) -> &OracleId {
		match self {
			OracleEvent::Registered { oracle_id }
			| OracleEvent::Updated { oracle_id }
			| OracleEvent::Removed { oracle_id }
			| OracleEvent::FetchFailed { oracle_id, .. }
			| OracleEvent::ValueRejected { oracle_id, .. }
			| OracleEvent::PublishSubmitted { oracle_id, .. }
			| OracleEvent::RoundPublished { oracle_id, .. }
			| OracleEvent::PublishFailed { oracle_id, .. }
			| OracleEvent::Halted { oracle_id, .. }
			| OracleEvent::Resynced { oracle_id, .. } => oracle_id,
		}
	}
}
