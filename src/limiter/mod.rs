//! Per-asset, per-timeframe admission control for alert candidates.
//!
//! Enforces exactly-once-per-candle dedup, an optional cooldown, and a
//! per-period cap. The full table is written to the snapshot file after
//! every mutation so restarts within a period keep their counters.

pub mod store;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::{AlertCandidate, Timeframe};
use crate::monitor::config::{MonitorConfig, TimeframeRules};
use store::{Snapshot, SnapshotStore};

/// Persisted counters for one `(symbol, timeframe)` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitEntry {
    /// Alerts admitted within the current period.
    pub count: u32,
    /// Period key the count belongs to.
    pub last_reset: String,
    /// Open time of the most recently admitted candle. Never reset.
    pub last_alerted_open_time: Option<i64>,
    /// Unix seconds of the last admission or delivery; cooldown base.
    pub last_alert_timestamp: Option<i64>,
    pub cooldown_seconds: Option<u64>,
}

/// `symbol -> timeframe -> entry`, the persisted layout.
pub type RateLimitTable = BTreeMap<String, BTreeMap<Timeframe, RateLimitEntry>>;

/// Reason a candidate was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The candle was already alerted.
    DuplicateCandle {
        symbol: String,
        timeframe: Timeframe,
        open_time: i64,
    },
    /// The previous alert is too recent.
    CooldownActive {
        symbol: String,
        timeframe: Timeframe,
        remaining_secs: i64,
    },
    /// The period's cap is used up.
    CapReached {
        symbol: String,
        timeframe: Timeframe,
        count: u32,
        cap: u32,
    },
    /// The pair is not part of the monitored configuration.
    Untracked {
        symbol: String,
        timeframe: Timeframe,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateCandle {
                symbol,
                timeframe,
                open_time,
            } => write!(f, "{symbol} {timeframe}: duplicate candle {open_time}"),
            Self::CooldownActive {
                symbol,
                timeframe,
                remaining_secs,
            } => write!(
                f,
                "{symbol} {timeframe}: cooldown active for another {remaining_secs}s"
            ),
            Self::CapReached {
                symbol,
                timeframe,
                count,
                cap,
            } => write!(
                f,
                "{symbol} {timeframe}: {count} alerts reached cap of {cap}"
            ),
            Self::Untracked { symbol, timeframe } => {
                write!(f, "{symbol} {timeframe}: pair is not tracked")
            }
        }
    }
}

impl std::error::Error for Rejection {}

/// Bookkeeping handed to the alert queue with an admitted candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmitTicket {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub cap: u32,
    /// Dedup key recorded at admission.
    pub open_time: i64,
}

/// Admission control over the rate-limit table.
#[derive(Debug)]
pub struct RateLimiter {
    rules: BTreeMap<Timeframe, TimeframeRules>,
    table: RateLimitTable,
    store: Option<SnapshotStore>,
}

impl RateLimiter {
    /// Builds a zeroed table for every configured pair without persistence.
    pub fn new(config: &MonitorConfig, now: i64) -> Self {
        let mut table = RateLimitTable::new();
        for (symbol, timeframe) in config.pairs() {
            let Some(rules) = config.rules_for(timeframe) else {
                continue;
            };
            let entry = RateLimitEntry {
                count: 0,
                last_reset: rules.reset.period_key(now),
                last_alerted_open_time: None,
                last_alert_timestamp: None,
                cooldown_seconds: rules.cooldown_secs,
            };
            table
                .entry(symbol.to_string())
                .or_default()
                .insert(timeframe, entry);
        }

        Self {
            rules: config.timeframes.clone(),
            table,
            store: None,
        }
    }

    /// Builds the table and restores it from `store`.
    ///
    /// Entries whose period key still matches the current period keep their
    /// count. Stale entries start at zero but keep their dedup key and
    /// cooldown base. A read failure is logged and leaves the fresh table.
    pub fn with_store(config: &MonitorConfig, store: SnapshotStore, now: i64) -> Self {
        let mut limiter = Self::new(config, now);

        match store.load() {
            Ok(Some(snapshot)) => limiter.restore(snapshot),
            Ok(None) => {}
            Err(e) => warn!(
                path = %store.path().display(),
                "ignoring unreadable snapshot: {e}"
            ),
        }

        limiter.store = Some(store);
        limiter
    }

    fn restore(&mut self, snapshot: Snapshot) {
        match snapshot {
            Snapshot::Table(stored) => {
                for (symbol, timeframes) in &mut self.table {
                    for (timeframe, entry) in timeframes.iter_mut() {
                        let Some(saved) = store::lookup(&stored, symbol, *timeframe) else {
                            continue;
                        };
                        entry.last_alerted_open_time = saved.last_alerted_open_time;
                        entry.last_alert_timestamp = saved.last_alert_timestamp;
                        if saved.last_reset == entry.last_reset {
                            entry.count = saved.count;
                        }
                        info!(
                            %symbol,
                            %timeframe,
                            count = entry.count,
                            "restored rate-limit entry"
                        );
                    }
                }
            }
            Snapshot::Legacy(entries) => {
                for ((symbol, timeframe), legacy) in entries {
                    if let Some(entry) = self.entry_mut(&symbol, timeframe) {
                        entry.last_alerted_open_time = Some(legacy.open_time);
                    }
                }
                info!("imported dedup keys from legacy snapshot");
            }
        }
    }

    /// Resets counters whose period key no longer matches `now`.
    ///
    /// Returns the number of entries reset. Calling it again within the
    /// same period is a no-op.
    pub fn roll_over(&mut self, now: i64) -> usize {
        let mut reset = 0;
        for (symbol, timeframes) in &mut self.table {
            for (timeframe, entry) in timeframes.iter_mut() {
                let Some(rules) = self.rules.get(timeframe) else {
                    continue;
                };
                let key = rules.reset.period_key(now);
                if entry.last_reset != key {
                    debug!(
                        %symbol,
                        %timeframe,
                        from = %entry.last_reset,
                        to = %key,
                        "period rollover"
                    );
                    entry.count = 0;
                    entry.last_reset = key;
                    reset += 1;
                }
            }
        }

        if reset > 0 {
            self.persist();
        }
        reset
    }

    /// Checks a candidate against dedup, cooldown, and cap, in that order,
    /// and records it on success.
    ///
    /// # Errors
    ///
    /// Returns the first [`Rejection`] that applies. Rejections leave the
    /// table untouched.
    pub fn admit(
        &mut self,
        candidate: &AlertCandidate,
        now: i64,
    ) -> Result<AdmitTicket, Rejection> {
        let symbol = &candidate.symbol;
        let timeframe = candidate.timeframe;
        let cap = match self.rules.get(&timeframe) {
            Some(rules) => rules.daily_cap,
            None => return Err(untracked(candidate)),
        };
        let entry = self
            .entry_mut(symbol, timeframe)
            .ok_or_else(|| untracked(candidate))?;

        if entry.last_alerted_open_time == Some(candidate.open_time) {
            return Err(Rejection::DuplicateCandle {
                symbol: symbol.clone(),
                timeframe,
                open_time: candidate.open_time,
            });
        }

        if let (Some(cooldown), Some(last)) = (entry.cooldown_seconds, entry.last_alert_timestamp) {
            let elapsed = now - last;
            let cooldown = i64::try_from(cooldown).unwrap_or(i64::MAX);
            if elapsed < cooldown {
                return Err(Rejection::CooldownActive {
                    symbol: symbol.clone(),
                    timeframe,
                    remaining_secs: cooldown - elapsed,
                });
            }
        }

        if entry.count >= cap {
            return Err(Rejection::CapReached {
                symbol: symbol.clone(),
                timeframe,
                count: entry.count,
                cap,
            });
        }

        entry.count += 1;
        entry.last_alerted_open_time = Some(candidate.open_time);
        entry.last_alert_timestamp = Some(now);
        info!(
            %symbol,
            %timeframe,
            count = entry.count,
            cap,
            "alert admitted"
        );

        self.persist();

        Ok(AdmitTicket {
            symbol: symbol.clone(),
            timeframe,
            cap,
            open_time: candidate.open_time,
        })
    }

    /// Re-stamps the cooldown base with the actual delivery time.
    pub fn record_delivery(&mut self, ticket: &AdmitTicket, delivered_at: i64) {
        if let Some(entry) = self.entry_mut(&ticket.symbol, ticket.timeframe) {
            entry.last_alert_timestamp = Some(delivered_at);
            self.persist();
        }
    }

    /// Returns `true` when the pair's count has gone past the ticket's cap.
    pub fn exceeds_cap(&self, ticket: &AdmitTicket) -> bool {
        self.entry(&ticket.symbol, ticket.timeframe)
            .is_some_and(|entry| entry.count > ticket.cap)
    }

    pub fn entry(&self, symbol: &str, timeframe: Timeframe) -> Option<&RateLimitEntry> {
        store::lookup(&self.table, symbol, timeframe)
    }

    fn entry_mut(&mut self, symbol: &str, timeframe: Timeframe) -> Option<&mut RateLimitEntry> {
        self.table.get_mut(symbol)?.get_mut(&timeframe)
    }

    /// Cap configured for a timeframe.
    pub fn cap_for(&self, timeframe: Timeframe) -> Option<u32> {
        self.rules.get(&timeframe).map(|rules| rules.daily_cap)
    }

    /// Current in-memory table.
    pub fn table(&self) -> &RateLimitTable {
        &self.table
    }

    /// Writes the table; failures are logged and in-memory state stays
    /// authoritative.
    fn persist(&self) {
        if let Some(store) = &self.store
            && let Err(e) = store.save(&self.table)
        {
            warn!(path = %store.path().display(), "failed to persist rate limits: {e}");
        }
    }
}

fn untracked(candidate: &AlertCandidate) -> Rejection {
    Rejection::Untracked {
        symbol: candidate.symbol.clone(),
        timeframe: candidate.timeframe,
    }
}
