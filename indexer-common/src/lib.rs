//! Shared types and infrastructure used across the Btc Indexer workspace:
//! the domain model described by the persistence contract, the crate-wide
//! sentinel error type, structured logging setup, and config-loading
//! helpers built on `figment`.

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
