//! Core of the roster watch bot: membership audits against an allow-list.
//!
//! This crate is framework-agnostic. Telegram and PostgreSQL live behind ports
//! (traits) implemented in adapter crates.

pub mod allowlist;
pub mod authz;
pub mod config;
pub mod differ;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod monitor;
pub mod ports;
pub mod registry;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
