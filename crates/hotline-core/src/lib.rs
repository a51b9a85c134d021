//! Core domain + application logic for the support hotline bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and MongoDB live
//! behind ports (traits) implemented in adapter crates; every conversational
//! flow in here runs against those ports, which is also what makes the flows
//! testable without a network.

pub mod config;
pub mod domain;
pub mod errors;
pub mod filters;
pub mod flows;
pub mod formatting;
pub mod keepalive;
pub mod listen;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod oplog;
pub mod store;
pub mod testing;

pub use errors::{Error, Result};
