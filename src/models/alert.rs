//! Detected volume-change events.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::candle::Timeframe;

/// Sign of a volume change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    /// Arrow shown next to the asset in rendered alerts.
    pub fn arrow(self) -> &'static str {
        match self {
            Self::Increase => "📈",
            Self::Decrease => "📉",
        }
    }

    /// Upper-case label used in the alert headline.
    pub fn label(self) -> &'static str {
        match self {
            Self::Increase => "INCREASE",
            Self::Decrease => "DECREASE",
        }
    }
}

/// A threshold-crossing volume change for one asset and timeframe.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertCandidate {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Signed percentage change of current volume against previous volume.
    pub change_pct: Decimal,
    pub direction: Direction,
    pub current_price: Decimal,
    pub current_volume: Decimal,
    pub previous_volume: Decimal,
    /// Opening timestamp of the current candle; the dedup key.
    pub open_time: i64,
    /// Wall-clock detection time, seconds since the Unix epoch.
    pub detected_at: i64,
}
