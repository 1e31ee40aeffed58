//! Monitoring rules and loading.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::models::Timeframe;
use crate::notify::format::escape;
use crate::retry::RetryPolicy;

/// Monitoring rules loaded from an optional JSON file.
///
/// Every field has a default, so an empty object `{}` is a valid file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Trading pairs to scan, in upstream notation (`BTCUSDT`).
    pub symbols: Vec<String>,
    /// Per-timeframe alert rules. Only listed timeframes are scanned.
    pub timeframes: BTreeMap<Timeframe, TimeframeRules>,
    /// Minimum gap between any two delivered alerts.
    pub global_gap_secs: u64,
    /// Sleep between scan ticks.
    pub check_interval_secs: u64,
    /// Cadence of the alert queue drain loop.
    pub drain_tick_secs: u64,
    /// Retry policy shared by candle fetches, delivery and the command poll.
    pub retry: RetryPolicy,
}

/// Alert behaviour for one timeframe.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimeframeRules {
    /// Minimum percentage change that produces a candidate.
    pub threshold_pct: Decimal,
    /// Maximum admitted alerts per asset within one period key.
    pub daily_cap: u32,
    /// Minimum seconds between two admitted alerts for the same asset.
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
    #[serde(default)]
    pub direction: DirectionPolicy,
    #[serde(default)]
    pub reset: ResetRule,
}

/// Which volume changes qualify.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionPolicy {
    /// Only increases of at least the threshold.
    #[default]
    Increase,
    /// Increases or decreases whose magnitude reaches the threshold.
    Both,
}

/// Boundary at which alert counters reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetRule {
    /// UTC calendar day, key `YYYY-MM-DD`.
    #[default]
    Daily,
    /// UTC hour, key `YYYY-MM-DDTHH`.
    Hourly,
}

impl ResetRule {
    /// Returns the period key for the given Unix time in seconds.
    pub fn period_key(self, now: i64) -> String {
        let at = DateTime::<Utc>::from_timestamp(now, 0).unwrap_or_default();
        match self {
            Self::Daily => at.format("%Y-%m-%d").to_string(),
            Self::Hourly => at.format("%Y-%m-%dT%H").to_string(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let mut timeframes = BTreeMap::new();
        timeframes.insert(
            Timeframe::OneHour,
            TimeframeRules {
                threshold_pct: Decimal::from(30),
                daily_cap: 3,
                cooldown_secs: Some(3600),
                direction: DirectionPolicy::Increase,
                reset: ResetRule::Daily,
            },
        );
        timeframes.insert(
            Timeframe::TwentyFourHour,
            TimeframeRules {
                threshold_pct: Decimal::from(50),
                daily_cap: 3,
                cooldown_secs: None,
                direction: DirectionPolicy::Increase,
                reset: ResetRule::Daily,
            },
        );

        Self {
            symbols: vec![
                "BTCUSDT".to_string(),
                "ETHUSDT".to_string(),
                "SOLUSDT".to_string(),
            ],
            timeframes,
            global_gap_secs: 600,
            check_interval_secs: 300,
            drain_tick_secs: 10,
            retry: RetryPolicy::default(),
        }
    }
}

impl MonitorConfig {
    /// Loads monitoring rules from a JSON file and validates them.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// [`validate`](Self::validate).
    pub fn load(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            crate::VolwatchError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects rule sets the monitor cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`VolwatchError::Config`](crate::VolwatchError::Config)
    /// describing the first violated constraint.
    pub fn validate(&self) -> crate::Result<()> {
        if self.symbols.is_empty() {
            return Err(crate::VolwatchError::Config("no symbols configured".into()));
        }
        if self.timeframes.is_empty() {
            return Err(crate::VolwatchError::Config("no timeframes configured".into()));
        }
        if self.check_interval_secs == 0 || self.drain_tick_secs == 0 {
            return Err(crate::VolwatchError::Config(
                "check_interval_secs and drain_tick_secs must be positive".into(),
            ));
        }
        for (timeframe, rules) in &self.timeframes {
            if rules.threshold_pct.is_sign_negative() {
                return Err(crate::VolwatchError::Config(format!(
                    "{timeframe}: threshold_pct must not be negative"
                )));
            }
        }
        Ok(())
    }

    /// Returns the rules for a timeframe, if it is monitored.
    pub fn rules_for(&self, timeframe: Timeframe) -> Option<&TimeframeRules> {
        self.timeframes.get(&timeframe)
    }

    /// Every `(symbol, timeframe)` pair the scan loop checks.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, Timeframe)> + '_ {
        self.symbols.iter().flat_map(move |symbol| {
            self.timeframes
                .keys()
                .map(move |timeframe| (symbol.as_str(), *timeframe))
        })
    }

    /// Returns an HTML description of the rules for the `/status` reply.
    pub fn describe(&self) -> String {
        let mut out = String::from("<b>Current Configuration:</b>\n");

        let _ = writeln!(out, "• Monitoring: {}", escape(&self.symbols.join(", ")));
        for (timeframe, rules) in &self.timeframes {
            let sign = match rules.direction {
                DirectionPolicy::Increase => "+",
                DirectionPolicy::Both => "±",
            };
            let _ = write!(
                out,
                "• {timeframe} Threshold: {sign}{}% volume change, max {} alerts/{}",
                rules.threshold_pct,
                rules.daily_cap,
                match rules.reset {
                    ResetRule::Daily => "day",
                    ResetRule::Hourly => "hour",
                }
            );
            if let Some(cooldown) = rules.cooldown_secs {
                let _ = write!(out, ", cooldown {}", human_duration(cooldown));
            }
            out.push('\n');
        }
        let _ = writeln!(
            out,
            "• Check Interval: {}",
            human_duration(self.check_interval_secs)
        );
        let _ = writeln!(
            out,
            "• Alert Gap: {}",
            human_duration(self.global_gap_secs)
        );

        out
    }
}

/// Formats whole seconds as `"5 minutes"`, `"1 hour"`, or `"45s"`.
pub(crate) fn human_duration(secs: u64) -> String {
    match secs {
        s if s >= 3600 && s % 3600 == 0 => plural(s / 3600, "hour"),
        s if s >= 60 && s % 60 == 0 => plural(s / 60, "minute"),
        s => format!("{s}s"),
    }
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}
