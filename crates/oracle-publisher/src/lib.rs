//! Cross-chain publication of oracle rounds.
//!
//! The publisher turns an observed value into a round update on the
//! destination price feed. A publication is split in two halves so the caller
//! can durably record the transaction hash in between:
//!
//! 1. [`PublishService::submit_round`] checks that the feed sits exactly one
//!    round behind the hint and sends `updatePrice`.
//! 2. [`PublishService::confirm_round`] waits for the receipt and reads the
//!    round back.
//!
//! A submission whose outcome is unknown (the process died, the receipt never
//! arrived) is settled later with [`PublishService::resolve_pending`].

use alloy::primitives::U256;
use async_trait::async_trait;
use oracle_types::{
	numeric, Destination, NumericValue, OnchainRound, PendingPublish, RoundRecord,
	TransactionHash, TransactionReceipt,
};
use thiserror::Error;

pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
}

pub use implementations::evm::alloy::confirmations;

/// Errors that can occur while publishing a round.
///
/// See [`PublishError::is_retryable`] for how they split between a retry with
/// the same round and a halt.
#[derive(Debug, Error)]
pub enum PublishError {
	/// The feed is not at the round preceding the one about to be written.
	#[error("Round conflict: expected next round {expected}, feed is at {actual}")]
	RoundConflict {
		/// Round this publisher was about to write.
		expected: u64,
		/// Latest round the feed reports.
		actual: u64,
	},
	/// The signing key may not write to the feed.
	#[error("Publisher is not authorized: {0}")]
	Unauthorized(String),
	/// The destination contract or endpoint cannot be used.
	#[error("Invalid destination: {0}")]
	InvalidDestination(String),
	/// The update transaction was mined and reverted.
	#[error("Transaction reverted: {0}")]
	Reverted(String),
	/// The value cannot be encoded as the feed's fixed-point answer.
	#[error("Value out of range: {0}")]
	ValueOutOfRange(String),
	/// The RPC endpoint could not be reached.
	#[error("Network error: {0}")]
	Network(String),
	#[error("Timed out: {0}")]
	Timeout(String),
	/// Nonce, fee or mempool trouble that a resend may clear.
	#[error("Transient submission failure: {0}")]
	Transient(String),
	/// A transaction was sent but its outcome is not known yet.
	#[error("Submission {tx_hash} unconfirmed: {reason}")]
	Unconfirmed { tx_hash: String, reason: String },
}

impl PublishError {
	/// Whether retrying the same round can succeed.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			PublishError::Network(_)
				| PublishError::Timeout(_)
				| PublishError::Transient(_)
				| PublishError::Unconfirmed { .. }
		)
	}
}

/// Sorts a backend error message into a [`PublishError`].
pub fn classify_rpc_error(message: &str) -> PublishError {
	let lower = message.to_lowercase();
	if lower.contains("unauthorized")
		|| lower.contains("not owner")
		|| lower.contains("caller is not the owner")
		|| lower.contains("ownableunauthorizedaccount")
	{
		PublishError::Unauthorized(message.to_string())
	} else if lower.contains("revert") {
		PublishError::Reverted(message.to_string())
	} else if lower.contains("nonce too low")
		|| lower.contains("replacement transaction underpriced")
		|| lower.contains("already known")
		|| lower.contains("fee too low")
		|| lower.contains("max fee per gas less than block base fee")
	{
		PublishError::Transient(message.to_string())
	} else if lower.contains("timed out") || lower.contains("timeout") {
		PublishError::Timeout(message.to_string())
	} else {
		PublishError::Network(message.to_string())
	}
}

/// Destination price feed backend.
#[async_trait]
pub trait PriceFeedInterface: Send + Sync {
	/// Reads `latestRoundData()`. An empty feed reports round 0.
	async fn latest_round(&self, destination: &Destination) -> Result<OnchainRound, PublishError>;

	/// Reads a historical round. `None` when the feed has no such round.
	async fn round_data(
		&self,
		destination: &Destination,
		round_id: u64,
	) -> Result<Option<OnchainRound>, PublishError>;

	/// Sends `updatePrice(answer)` and returns once the node accepted it.
	async fn submit_update(
		&self,
		destination: &Destination,
		answer: U256,
	) -> Result<TransactionHash, PublishError>;

	/// Receipt of a mined transaction; `None` while it is unmined or unknown.
	async fn get_receipt(
		&self,
		destination: &Destination,
		hash: &TransactionHash,
	) -> Result<Option<TransactionReceipt>, PublishError>;

	/// Whether the node still knows the transaction (mined or in the mempool).
	async fn transaction_known(
		&self,
		destination: &Destination,
		hash: &TransactionHash,
	) -> Result<bool, PublishError>;

	/// Polls for the receipt until it is buried under `confirmations` blocks.
	async fn wait_for_confirmation(
		&self,
		destination: &Destination,
		hash: &TransactionHash,
		confirmations: u64,
	) -> Result<TransactionReceipt, PublishError>;
}

/// A submitted update awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
	pub tx_hash: TransactionHash,
	/// Round the feed should assign once the transaction is mined.
	pub round_hint: u64,
	/// Value as fetched.
	pub value: NumericValue,
	/// Value as encoded for the feed.
	pub answer: U256,
}

impl From<&Submission> for PendingPublish {
	fn from(submission: &Submission) -> Self {
		PendingPublish {
			tx_hash: submission.tx_hash.clone(),
			round_hint: submission.round_hint,
			answer: submission.value,
		}
	}
}

/// Writes rounds to destination feeds through a [`PriceFeedInterface`].
pub struct PublishService {
	backend: Box<dyn PriceFeedInterface>,
	confirmations: u64,
}

impl PublishService {
	pub fn new(backend: Box<dyn PriceFeedInterface>, confirmations: u64) -> Self {
		Self {
			backend,
			confirmations,
		}
	}

	/// Encodes `value` into the feed's fixed-point answer.
	pub fn encode(destination: &Destination, value: NumericValue) -> Result<U256, PublishError> {
		numeric::to_fixed_point(value, destination.decimals)
			.map_err(|e| PublishError::ValueOutOfRange(e.to_string()))
	}

	/// Checks the feed is at `round_hint - 1` and sends the update.
	pub async fn submit_round(
		&self,
		destination: &Destination,
		value: NumericValue,
		round_hint: u64,
	) -> Result<Submission, PublishError> {
		let answer = Self::encode(destination, value)?;

		let current = self.backend.latest_round(destination).await?;
		if current.round_id + 1 != round_hint {
			return Err(PublishError::RoundConflict {
				expected: round_hint,
				actual: current.round_id,
			});
		}

		let tx_hash = self.backend.submit_update(destination, answer).await?;
		tracing::info!(
			contract = %destination.contract,
			chain_id = destination.provider.chain_id,
			round = round_hint,
			tx_hash = %tx_hash.short(),
			"Submitted round update"
		);

		Ok(Submission {
			tx_hash,
			round_hint,
			value,
			answer,
		})
	}

	/// Waits for a submission to be mined and reads the round it produced.
	pub async fn confirm_round(
		&self,
		destination: &Destination,
		submission: &Submission,
	) -> Result<RoundRecord, PublishError> {
		let receipt = self
			.backend
			.wait_for_confirmation(destination, &submission.tx_hash, self.confirmations)
			.await?;
		if !receipt.success {
			return Err(PublishError::Reverted(format!(
				"updatePrice transaction {} reverted in block {}",
				submission.tx_hash, receipt.block_number
			)));
		}
		self.read_back(destination, submission).await
	}

	/// Submits and confirms in one step.
	pub async fn publish(
		&self,
		destination: &Destination,
		value: NumericValue,
		round_hint: u64,
	) -> Result<RoundRecord, PublishError> {
		let submission = self.submit_round(destination, value, round_hint).await?;
		self.confirm_round(destination, &submission).await
	}

	/// Settles a submission whose outcome was never observed.
	///
	/// Returns the confirmed round, `None` when the submission was reverted or
	/// dropped and nothing was applied, or an error when the chain still does
	/// not tell.
	pub async fn resolve_pending(
		&self,
		destination: &Destination,
		pending: &PendingPublish,
	) -> Result<Option<RoundRecord>, PublishError> {
		let submission = Submission {
			tx_hash: pending.tx_hash.clone(),
			round_hint: pending.round_hint,
			value: pending.answer,
			answer: Self::encode(destination, pending.answer)?,
		};

		match self.backend.get_receipt(destination, &pending.tx_hash).await? {
			Some(receipt) if receipt.success => {
				tracing::info!(
					tx_hash = %pending.tx_hash.short(),
					round = pending.round_hint,
					"Pending submission was confirmed"
				);
				self.read_back(destination, &submission).await.map(Some)
			}
			Some(_) => {
				tracing::warn!(
					tx_hash = %pending.tx_hash.short(),
					round = pending.round_hint,
					"Pending submission reverted"
				);
				Ok(None)
			}
			None => {
				let current = self.backend.latest_round(destination).await?;
				if current.round_id >= pending.round_hint {
					return Err(PublishError::RoundConflict {
						expected: pending.round_hint,
						actual: current.round_id,
					});
				}
				if self
					.backend
					.transaction_known(destination, &pending.tx_hash)
					.await?
				{
					Err(PublishError::Unconfirmed {
						tx_hash: pending.tx_hash.to_string(),
						reason: "still pending".to_string(),
					})
				} else {
					tracing::warn!(
						tx_hash = %pending.tx_hash.short(),
						"Pending submission was dropped by the node"
					);
					Ok(None)
				}
			}
		}
	}

	/// Raw latest round of the feed.
	pub async fn latest_round(&self, destination: &Destination) -> Result<OnchainRound, PublishError> {
		self.backend.latest_round(destination).await
	}

	pub async fn round_data(
		&self,
		destination: &Destination,
		round_id: u64,
	) -> Result<Option<OnchainRound>, PublishError> {
		self.backend.round_data(destination, round_id).await
	}

	/// Latest round decoded with the destination's decimals; `None` on an empty feed.
	pub async fn latest_record(
		&self,
		destination: &Destination,
	) -> Result<Option<RoundRecord>, PublishError> {
		let round = self.backend.latest_round(destination).await?;
		if round.round_id == 0 {
			return Ok(None);
		}
		to_record(destination, &round).map(Some)
	}

	async fn read_back(
		&self,
		destination: &Destination,
		submission: &Submission,
	) -> Result<RoundRecord, PublishError> {
		let round = self
			.backend
			.round_data(destination, submission.round_hint)
			.await?
			.ok_or_else(|| PublishError::Unconfirmed {
				tx_hash: submission.tx_hash.to_string(),
				reason: format!("round {} not readable yet", submission.round_hint),
			})?;

		if round.answer != submission.answer {
			let latest = self.backend.latest_round(destination).await?;
			return Err(PublishError::RoundConflict {
				expected: submission.round_hint,
				actual: latest.round_id,
			});
		}

		Ok(RoundRecord {
			round_id: submission.round_hint,
			answer: submission.value,
			timestamp: round.updated_at,
		})
	}
}

/// Decodes an on-chain round with the destination's decimals.
pub fn to_record(destination: &Destination, round: &OnchainRound) -> Result<RoundRecord, PublishError> {
	let answer = numeric::from_fixed_point(round.answer, destination.decimals)
		.map_err(|e| PublishError::ValueOutOfRange(e.to_string()))?;
	Ok(RoundRecord {
		round_id: round.round_id,
		answer,
		timestamp: round.updated_at,
	})
}
