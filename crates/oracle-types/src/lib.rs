//! Shared types for the oracle pipeline.
//!
//! This crate holds the data model every other crate agrees on: oracle
//! configurations and their scheduling bookkeeping, round records, transaction
//! receipts, pipeline events and the configuration schema helpers used to
//! validate backend settings.

pub mod delivery;
pub mod events;
pub mod numeric;
pub mod oracle;
pub mod round;
pub mod validation;

pub use delivery::*;
pub use events::*;
pub use numeric::*;
pub use oracle::*;
pub use round::*;
pub use validation::*;

/// Re-exported so downstream crates name addresses consistently.
pub use alloy::primitives::{Address, U256};
