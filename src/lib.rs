//! adpulse - platform ads and sales spreadsheets into daily marketing metrics
//!
//! This crate provides:
//! - Column and date normalization for heterogeneous platform spreadsheets
//! - Daily aggregation and idempotent upserts into a local SQLite store
//! - A sync orchestrator over CSV exports and server-side sheet queries
//! - Read-side summaries, platform breakdowns and trends for reporting

pub mod aggregate;
pub mod commands;
pub mod config;
pub mod error;
pub mod meta;
pub mod metrics;
pub mod normalize;
pub mod progress;
pub mod sheets;
pub mod sync;

pub use config::Config;
pub use error::{Error, Result};
