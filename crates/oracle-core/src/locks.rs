use dashmap::DashMap;
use oracle_types::OracleId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One mutex per oracle. Whoever holds it is the only writer of that
/// oracle's bookkeeping and the only publisher to its destination.
#[derive(Default)]
pub struct LockTable {
	locks: DashMap<OracleId, Arc<Mutex<()>>>,
}

impl LockTable {
	pub fn new() -> Self {
		Self::default()
	}

	fn slot(&self, id: &OracleId) -> Arc<Mutex<()>> {
		self.locks.entry(id.clone()).or_default().clone()
	}

	/// Returns `None` when a pipeline or management call already holds the oracle.
	pub fn try_acquire(&self, id: &OracleId) -> Option<OwnedMutexGuard<()>> {
		self.slot(id).try_lock_owned().ok()
	}

	/// Waits for any running cycle of `id` to finish.
	pub async fn acquire(&self, id: &OracleId) -> OwnedMutexGuard<()> {
		self.slot(id).lock_owned().await
	}

	pub fn forget(&self, id: &OracleId) {
		self.locks.remove(id);
	}
}
