//! Round ledger types.

use crate::NumericValue;
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// A confirmed publication on a destination feed.
///
/// Round ids start at 1 for the first publication and grow by exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
	pub round_id: u64,
	pub answer: NumericValue,
	/// Unix seconds at which the round was confirmed.
	pub timestamp: u64,
}

/// Raw `latestRoundData()` / `getRoundData()` tuple as read from a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnchainRound {
	pub round_id: u64,
	pub answer: U256,
	pub started_at: u64,
	pub updated_at: u64,
	pub answered_in_round: u64,
}

impl OnchainRound {
	/// The state of a feed nothing has been published to.
	pub fn empty() -> Self {
		Self {
			round_id: 0,
			answer: U256::ZERO,
			started_at: 0,
			updated_at: 0,
			answered_in_round: 0,
		}
	}
}
