//! Oracle service: command-line entry point, backend wiring and the
//! management HTTP API.

pub mod api;
pub mod implementations;
