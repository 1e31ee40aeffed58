//! Candle readings and timeframes.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::VolwatchError;

/// A monitored period length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Timeframe {
    /// Current hour against the previous hour.
    OneHour,
    /// Rolling 24h window, backed by daily klines upstream.
    TwentyFourHour,
}

impl Timeframe {
    /// All supported timeframes in display order.
    pub const ALL: [Timeframe; 2] = [Self::OneHour, Self::TwentyFourHour];

    /// Returns the identifier used in configuration, snapshots and messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneHour => "1h",
            Self::TwentyFourHour => "24h",
        }
    }

    /// Returns the kline interval requested from the market-data API.
    pub fn upstream_interval(self) -> &'static str {
        match self {
            Self::OneHour => "1h",
            Self::TwentyFourHour => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = VolwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" => Ok(Self::OneHour),
            "24h" | "1d" => Ok(Self::TwentyFourHour),
            other => Err(VolwatchError::Config(format!("unknown timeframe: {other}"))),
        }
    }
}

impl Serialize for Timeframe {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Timeframe {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One observed period for one asset and timeframe.
///
/// `(symbol, timeframe, open_time)` identifies the period: two readings
/// with the same triple describe the same candle.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleReading {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Period start in milliseconds since the Unix epoch.
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Volume in quote-asset units.
    pub volume: Decimal,
    pub trades: u64,
}

/// The closed previous period and the current, possibly still forming, one.
#[derive(Debug, Clone, PartialEq)]
pub struct CandlePair {
    pub previous: CandleReading,
    pub current: CandleReading,
}

/// Quote-asset volume column of a kline row.
const QUOTE_VOLUME_INDEX: usize = 7;

/// Trade count column of a kline row.
const TRADES_INDEX: usize = 8;

impl CandleReading {
    /// Parses one kline row of the form
    /// `[open_time, open, high, low, close, volume, close_time, quote_volume, trades, ...]`.
    ///
    /// # Errors
    ///
    /// Returns [`VolwatchError::MalformedMessage`] if the row is too short or
    /// a column has the wrong type.
    pub fn from_kline_row(
        row: &serde_json::Value,
        symbol: &str,
        timeframe: Timeframe,
    ) -> crate::Result<Self> {
        let columns = row
            .as_array()
            .ok_or_else(|| VolwatchError::MalformedMessage("kline row is not an array".into()))?;
        if columns.len() <= TRADES_INDEX {
            return Err(VolwatchError::MalformedMessage(format!(
                "kline row has {} columns, expected at least {}",
                columns.len(),
                TRADES_INDEX + 1
            )));
        }

        let open_time = columns[0].as_i64().ok_or_else(|| {
            VolwatchError::MalformedMessage("kline open time is not an integer".into())
        })?;
        let trades = columns[TRADES_INDEX].as_u64().ok_or_else(|| {
            VolwatchError::MalformedMessage("kline trade count is not an integer".into())
        })?;

        Ok(Self {
            symbol: symbol.to_string(),
            timeframe,
            open_time,
            open: decimal_column(columns, 1, "open")?,
            high: decimal_column(columns, 2, "high")?,
            low: decimal_column(columns, 3, "low")?,
            close: decimal_column(columns, 4, "close")?,
            volume: decimal_column(columns, QUOTE_VOLUME_INDEX, "quote volume")?,
            trades,
        })
    }
}

impl CandlePair {
    /// Builds a pair from a klines response ordered oldest first.
    ///
    /// Uses the last two rows, so a longer response still compares the
    /// latest period against the one before it.
    ///
    /// # Errors
    ///
    /// Returns [`VolwatchError::MalformedMessage`] if fewer than two rows are
    /// present or a row cannot be parsed.
    pub fn from_klines(
        rows: &[serde_json::Value],
        symbol: &str,
        timeframe: Timeframe,
    ) -> crate::Result<Self> {
        let [.., previous, current] = rows else {
            return Err(VolwatchError::MalformedMessage(format!(
                "insufficient candle data for {symbol} {timeframe}: {} rows",
                rows.len()
            )));
        };

        Ok(Self {
            previous: CandleReading::from_kline_row(previous, symbol, timeframe)?,
            current: CandleReading::from_kline_row(current, symbol, timeframe)?,
        })
    }
}

/// Reads a decimal column that the API encodes as a numeric string.
fn decimal_column(
    columns: &[serde_json::Value],
    index: usize,
    name: &str,
) -> crate::Result<Decimal> {
    let raw = columns[index]
        .as_str()
        .ok_or_else(|| VolwatchError::MalformedMessage(format!("kline {name} is not a string")))?;
    Decimal::from_str(raw)
        .map_err(|e| VolwatchError::MalformedMessage(format!("kline {name} {raw:?}: {e}")))
}
