//! Orchestrator: the scan loop, the drain loop, and the state they share.
//!
//! The rate-limit table and the pending queue live together in one
//! [`AlertDesk`] behind a single mutex, so admission plus enqueue, and
//! pop plus cap re-check, each happen under one lock.

pub mod config;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::detector::detect;
use crate::limiter::{RateLimiter, Rejection};
use crate::models::{AlertCandidate, Timeframe};
use crate::notify::Notifier;
use crate::notify::format::render_alert;
use crate::queue::AlertQueue;
use crate::source::CandleSource;
use crate::state::BotRunState;
use config::MonitorConfig;

/// Mutable state written by both the scan loop and the drain loop.
#[derive(Debug)]
pub struct AlertDesk {
    pub limiter: RateLimiter,
    pub queue: AlertQueue,
}

/// Handle to the desk shared between loops and the command listener.
pub type SharedDesk = Arc<Mutex<AlertDesk>>;

impl AlertDesk {
    pub fn new(limiter: RateLimiter, queue: AlertQueue) -> Self {
        Self { limiter, queue }
    }

    pub fn shared(self) -> SharedDesk {
        Arc::new(Mutex::new(self))
    }

    /// Runs admission and, on success, enqueues the candidate.
    ///
    /// # Errors
    ///
    /// Returns the limiter's [`Rejection`]; nothing is enqueued then.
    pub fn offer(&mut self, candidate: AlertCandidate, now: i64) -> Result<(), Rejection> {
        let ticket = self.limiter.admit(&candidate, now)?;
        self.queue.enqueue(candidate, ticket, now);
        Ok(())
    }
}

/// Counts from one scan tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Pairs whose candles were fetched.
    pub checked: usize,
    /// Pairs skipped because the fetch failed.
    pub failed: usize,
    /// Candidates produced by the detector.
    pub candidates: usize,
    /// Candidates admitted and enqueued.
    pub admitted: usize,
}

/// Result of one drain step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Nothing queued.
    Idle,
    /// Alerts queued but the global gap has not elapsed.
    Waiting,
    Delivered,
    /// The pair's count went past its cap after admission.
    Dropped,
    /// Delivery failed; the alert is back at the head.
    Requeued,
    /// Delivery failed on the last allowed attempt.
    Abandoned,
}

enum PairOutcome {
    Failed,
    Quiet,
    Rejected,
    Admitted,
}

/// Scans every configured pair and delivers admitted alerts.
pub struct Monitor<S, N> {
    config: Arc<MonitorConfig>,
    source: Arc<S>,
    notifier: Arc<N>,
    desk: SharedDesk,
    state: Arc<BotRunState>,
}

impl<S: CandleSource, N: Notifier> Monitor<S, N> {
    pub fn new(
        config: Arc<MonitorConfig>,
        source: Arc<S>,
        notifier: Arc<N>,
        desk: SharedDesk,
        state: Arc<BotRunState>,
    ) -> Self {
        Self {
            config,
            source,
            notifier,
            desk,
            state,
        }
    }

    /// Runs one scan across every `(symbol, timeframe)` pair.
    ///
    /// Counters roll over first. Pairs are checked concurrently and a
    /// failed fetch skips only that pair. A paused bot returns an empty
    /// report without touching anything.
    pub async fn tick(&self, now: i64) -> TickReport {
        let mut report = TickReport::default();
        if !self.state.is_running() {
            debug!("monitoring paused, skipping tick");
            return report;
        }

        let reset = self.desk.lock().await.limiter.roll_over(now);
        if reset > 0 {
            info!(reset, "alert counters rolled over");
        }

        let checks = self
            .config
            .pairs()
            .map(|(symbol, timeframe)| self.check_pair(symbol, timeframe, now));

        for outcome in join_all(checks).await {
            match outcome {
                PairOutcome::Failed => report.failed += 1,
                PairOutcome::Quiet => report.checked += 1,
                PairOutcome::Rejected => {
                    report.checked += 1;
                    report.candidates += 1;
                }
                PairOutcome::Admitted => {
                    report.checked += 1;
                    report.candidates += 1;
                    report.admitted += 1;
                }
            }
        }
        report
    }

    async fn check_pair(&self, symbol: &str, timeframe: Timeframe, now: i64) -> PairOutcome {
        let Some(rules) = self.config.rules_for(timeframe) else {
            return PairOutcome::Quiet;
        };

        let what = format!("fetch {symbol} {timeframe}");
        let pair = match self
            .config
            .retry
            .run(&what, || self.source.fetch(symbol, timeframe))
            .await
        {
            Ok(pair) => pair,
            Err(e) => {
                warn!(%symbol, %timeframe, "skipping pair this tick: {e}");
                return PairOutcome::Failed;
            }
        };

        let Some(candidate) = detect(&pair.current, &pair.previous, rules, now) else {
            return PairOutcome::Quiet;
        };
        let change_pct = candidate.change_pct;

        match self.desk.lock().await.offer(candidate, now) {
            Ok(()) => {
                info!(%symbol, %timeframe, %change_pct, "alert queued");
                PairOutcome::Admitted
            }
            Err(rejection) => {
                debug!(%rejection, "candidate rejected");
                PairOutcome::Rejected
            }
        }
    }

    /// Delivers the queue head if the global gap allows it.
    ///
    /// The gap and the cooldown base are stamped when the send completes,
    /// `now` plus however long the notifier took.
    pub async fn drain_once(&self, now: i64) -> DrainOutcome {
        let alert = {
            let mut desk = self.desk.lock().await;
            if desk.queue.is_empty() {
                return DrainOutcome::Idle;
            }
            let Some(alert) = desk.queue.pop_ready(now) else {
                let wait_secs = desk.queue.wait_secs(now);
                debug!(wait_secs, "global gap not elapsed");
                return DrainOutcome::Waiting;
            };
            if desk.limiter.exceeds_cap(&alert.ticket) {
                info!(
                    symbol = %alert.ticket.symbol,
                    timeframe = %alert.ticket.timeframe,
                    "dropping queued alert past its cap"
                );
                return DrainOutcome::Dropped;
            }
            alert
        };

        let text = render_alert(&alert.candidate);
        let started = Instant::now();
        let result = self.notifier.deliver(&text).await;
        let finished = now.saturating_add(whole_secs(started.elapsed()));

        let mut desk = self.desk.lock().await;
        match result {
            Ok(()) => {
                desk.queue.mark_sent(finished);
                desk.limiter.record_delivery(&alert.ticket, finished);
                info!(
                    symbol = %alert.candidate.symbol,
                    timeframe = %alert.candidate.timeframe,
                    change_pct = %alert.candidate.change_pct,
                    waited_secs = finished - alert.enqueued_at,
                    "alert delivered"
                );
                DrainOutcome::Delivered
            }
            Err(e) if alert.attempts + 1 >= self.config.retry.attempts() => {
                warn!(
                    symbol = %alert.candidate.symbol,
                    timeframe = %alert.candidate.timeframe,
                    attempts = alert.attempts + 1,
                    "giving up on alert: {e}"
                );
                DrainOutcome::Abandoned
            }
            Err(e) => {
                warn!(
                    symbol = %alert.candidate.symbol,
                    timeframe = %alert.candidate.timeframe,
                    attempt = alert.attempts + 1,
                    "delivery failed, retrying next tick: {e}"
                );
                desk.queue.retry_front(alert);
                DrainOutcome::Requeued
            }
        }
    }

    /// Scans every `check_interval_secs` until shutdown.
    pub async fn run_scan_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.config.check_interval_secs);
        info!(interval_secs = interval.as_secs(), "scan loop started");

        while !*shutdown.borrow() {
            let report = tokio::select! {
                report = self.tick(unix_now()) => report,
                _ = shutdown.changed() => break,
            };
            debug!(?report, "scan tick finished");

            if wait_or_shutdown(&mut shutdown, interval).await {
                break;
            }
        }
        info!("scan loop stopped");
    }

    /// Drains the queue every `drain_tick_secs` until shutdown.
    pub async fn run_drain_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let tick_secs = self.config.drain_tick_secs;
        let mut ticker = tokio::time::interval(Duration::from_secs(tick_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(tick_secs, "drain loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
            let outcome = self.drain_once(unix_now()).await;
            if outcome != DrainOutcome::Idle {
                debug!(?outcome, "drain tick finished");
            }
        }
        info!("drain loop stopped");
    }
}

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn whole_secs(elapsed: Duration) -> i64 {
    i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX)
}

/// Sleeps for `duration` unless shutdown is signalled first.
///
/// Returns `true` when the caller should stop.
pub(crate) async fn wait_or_shutdown(
    shutdown: &mut watch::Receiver<bool>,
    duration: Duration,
) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use rust_decimal_macros::dec;

    const NOON: i64 = 1_709_985_600;

    fn candidate(symbol: &str, open_time: i64) -> AlertCandidate {
        AlertCandidate {
            symbol: symbol.to_string(),
            timeframe: Timeframe::TwentyFourHour,
            change_pct: dec!(60),
            direction: Direction::Increase,
            current_price: dec!(1),
            current_volume: dec!(1600),
            previous_volume: dec!(1000),
            open_time,
            detected_at: NOON,
        }
    }

    #[test]
    fn offer_enqueues_only_admitted() {
        let config = MonitorConfig::default();
        let mut desk = AlertDesk::new(RateLimiter::new(&config, NOON), AlertQueue::new(600));

        assert!(desk.offer(candidate("BTCUSDT", 1), NOON).is_ok());
        assert!(desk.offer(candidate("BTCUSDT", 1), NOON).is_err());
        assert_eq!(desk.queue.len(), 1);
    }

    #[tokio::test]
    async fn wait_returns_early_on_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move {
            wait_or_shutdown(&mut rx, Duration::from_secs(3600)).await
        });
        tx.send(true).unwrap();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn wait_elapses_without_shutdown() {
        let (_tx, mut rx) = watch::channel(false);
        assert!(!wait_or_shutdown(&mut rx, Duration::from_millis(5)).await);
    }
}
