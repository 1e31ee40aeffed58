//! Volume change monitor with rate-limited chat alerts.
//!
//! Polls consecutive candles for a set of trading pairs, detects volume
//! changes past per-timeframe thresholds, admits them through a
//! dedup/cooldown/cap limiter, and delivers them one at a time through a
//! globally spaced queue.

pub mod commands;
pub mod config;
pub mod credentials;
pub mod detector;
pub mod error;
pub mod limiter;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod queue;
pub mod retry;
pub mod source;
pub mod state;

pub use error::{Result, VolwatchError};
