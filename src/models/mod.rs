//! Shared data models.
//!
//! Market-data readings, detected alert candidates, and the chat-platform
//! wire types consumed and produced by the monitor.

pub mod alert;
pub mod candle;
pub mod telegram;

pub use alert::{AlertCandidate, Direction};
pub use candle::{CandlePair, CandleReading, Timeframe};
