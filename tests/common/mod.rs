//! Shared test utilities: in-memory candle source and notifier.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use rust_decimal::Decimal;
use volwatch::VolwatchError;
use volwatch::limiter::RateLimiter;
use volwatch::models::{CandlePair, CandleReading, Timeframe};
use volwatch::monitor::config::MonitorConfig;
use volwatch::monitor::{AlertDesk, Monitor, SharedDesk};
use volwatch::notify::Notifier;
use volwatch::queue::AlertQueue;
use volwatch::retry::RetryPolicy;
use volwatch::source::CandleSource;
use volwatch::state::BotRunState;

/// 2024-03-09 12:00:00 UTC
pub const NOON: i64 = 1_709_985_600;

/// Candle pairs keyed by `(symbol, timeframe)`; anything missing is an error.
#[derive(Default)]
pub struct FakeSource {
    pairs: Mutex<HashMap<(String, Timeframe), CandlePair>>,
    failing: Mutex<HashSet<(String, Timeframe)>>,
}

impl FakeSource {
    /// Sets the quote volumes for a pair whose current candle opens at noon.
    pub fn set(&self, symbol: &str, timeframe: Timeframe, previous: i64, current: i64) {
        self.set_at(symbol, timeframe, previous, current, NOON * 1000);
    }

    /// Like [`set`](Self::set) with the current candle opening at
    /// `open_time` milliseconds.
    pub fn set_at(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        previous: i64,
        current: i64,
        open_time: i64,
    ) {
        let reading = |open_time: i64, volume: i64| CandleReading {
            symbol: symbol.to_string(),
            timeframe,
            open_time,
            open: Decimal::from(100),
            high: Decimal::from(110),
            low: Decimal::from(90),
            close: Decimal::new(4_325_050, 2),
            volume: Decimal::from(volume),
            trades: 1_000,
        };
        let pair = CandlePair {
            previous: reading(open_time - 3_600_000, previous),
            current: reading(open_time, current),
        };
        self.pairs
            .lock()
            .unwrap()
            .insert((symbol.to_string(), timeframe), pair);
    }

    /// Makes every fetch for the pair fail.
    pub fn fail(&self, symbol: &str, timeframe: Timeframe) {
        self.failing
            .lock()
            .unwrap()
            .insert((symbol.to_string(), timeframe));
    }
}

impl CandleSource for FakeSource {
    async fn fetch(&self, symbol: &str, timeframe: Timeframe) -> volwatch::Result<CandlePair> {
        let key = (symbol.to_string(), timeframe);
        if self.failing.lock().unwrap().contains(&key) {
            return Err(VolwatchError::MalformedMessage("upstream unavailable".into()));
        }
        match self.pairs.lock().unwrap().get(&key) {
            Some(pair) => Ok(pair.clone()),
            None => Err(VolwatchError::MalformedMessage(format!(
                "insufficient candle data for {symbol}"
            ))),
        }
    }
}

/// Records delivered texts; the first `failures` deliveries fail.
#[derive(Default)]
pub struct FakeNotifier {
    pub sent: Mutex<Vec<String>>,
    failures: Mutex<u32>,
    latency: Duration,
}

impl FakeNotifier {
    pub fn failing(times: u32) -> Self {
        Self {
            failures: Mutex::new(times),
            ..Self::default()
        }
    }

    /// Every delivery takes `latency` before it succeeds.
    pub fn slow(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for FakeNotifier {
    async fn deliver(&self, text: &str) -> volwatch::Result<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(VolwatchError::Telegram("Too Many Requests".into()));
            }
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Default rules with a single fetch attempt, so failing pairs never sleep.
pub fn test_config() -> MonitorConfig {
    MonitorConfig {
        retry: RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        },
        ..MonitorConfig::default()
    }
}

pub struct Harness {
    pub source: Arc<FakeSource>,
    pub notifier: Arc<FakeNotifier>,
    pub state: Arc<BotRunState>,
    pub desk: SharedDesk,
    pub monitor: Monitor<FakeSource, FakeNotifier>,
}

pub fn harness(config: MonitorConfig, notifier: FakeNotifier) -> Harness {
    let config = Arc::new(config);
    let source = Arc::new(FakeSource::default());
    let notifier = Arc::new(notifier);
    let state = Arc::new(BotRunState::new(Some(42)));
    let desk = AlertDesk::new(
        RateLimiter::new(&config, NOON),
        AlertQueue::new(config.global_gap_secs),
    )
    .shared();
    let monitor = Monitor::new(
        Arc::clone(&config),
        Arc::clone(&source),
        Arc::clone(&notifier),
        Arc::clone(&desk),
        Arc::clone(&state),
    );
    Harness {
        source,
        notifier,
        state,
        desk,
        monitor,
    }
}
