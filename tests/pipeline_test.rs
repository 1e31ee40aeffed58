//! Scan, admission, and delivery through in-memory collaborators.

mod common;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use tokio::sync::watch;
use tokio_test::assert_ok;

use volwatch::limiter::store::SnapshotStore;
use volwatch::limiter::{AdmitTicket, RateLimiter};
use volwatch::models::{AlertCandidate, Direction, Timeframe};
use volwatch::monitor::config::MonitorConfig;
use volwatch::monitor::{AlertDesk, DrainOutcome, Monitor, TickReport};
use volwatch::queue::AlertQueue;
use volwatch::retry::RetryPolicy;
use volwatch::state::BotRunState;

use common::{FakeNotifier, FakeSource, Harness, NOON, harness, test_config};

const HOUR_MS: i64 = 3_600_000;
const DAY: i64 = 86_400;

/// Flat volume on every configured pair.
fn quiet_all(source: &FakeSource) {
    for symbol in ["BTCUSDT", "ETHUSDT", "SOLUSDT"] {
        for timeframe in Timeframe::ALL {
            source.set(symbol, timeframe, 1000, 1000);
        }
    }
}

fn quiet_harness() -> Harness {
    let h = harness(test_config(), FakeNotifier::default());
    quiet_all(&h.source);
    h
}

/// Rules that allow two delivery attempts per alert.
fn two_attempts() -> MonitorConfig {
    MonitorConfig {
        retry: RetryPolicy {
            max_attempts: 2,
            ..RetryPolicy::default()
        },
        ..test_config()
    }
}

#[tokio::test]
async fn spike_is_admitted_and_delivered() {
    let h = quiet_harness();
    h.source.set("BTCUSDT", Timeframe::OneHour, 1000, 1350);

    let report = h.monitor.tick(NOON).await;
    assert_eq!(
        report,
        TickReport {
            checked: 6,
            failed: 0,
            candidates: 1,
            admitted: 1,
        }
    );

    assert_eq!(h.monitor.drain_once(NOON).await, DrainOutcome::Delivered);
    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("BTCUSDT VOLUME ALERT 📈"));
    assert!(sent[0].contains("<code>+35.00%</code>"));
    assert!(sent[0].contains("$43,250.50"));
    assert!(sent[0].contains("Timeframe:</b> 1h"));

    assert_eq!(h.monitor.drain_once(NOON + 700).await, DrainOutcome::Idle);
}

#[tokio::test]
async fn change_below_threshold_is_not_queued() {
    let h = quiet_harness();
    h.source.set("BTCUSDT", Timeframe::OneHour, 1000, 1200);

    let report = h.monitor.tick(NOON).await;
    assert_eq!(report.candidates, 0);
    assert!(h.desk.lock().await.queue.is_empty());
}

#[tokio::test]
async fn zero_previous_volume_is_skipped() {
    let h = quiet_harness();
    h.source.set("ETHUSDT", Timeframe::TwentyFourHour, 0, 5000);

    let report = h.monitor.tick(NOON).await;
    assert_eq!(report.checked, 6);
    assert_eq!(report.candidates, 0);
}

#[tokio::test]
async fn same_candle_alerts_once_across_ticks() {
    let h = quiet_harness();
    h.source
        .set("SOLUSDT", Timeframe::TwentyFourHour, 1000, 2000);

    assert_eq!(h.monitor.tick(NOON).await.admitted, 1);
    let second = h.monitor.tick(NOON + 300).await;
    assert_eq!(second.candidates, 1);
    assert_eq!(second.admitted, 0);

    let desk = h.desk.lock().await;
    assert_eq!(desk.queue.len(), 1);
    assert_eq!(
        desk.limiter
            .entry("SOLUSDT", Timeframe::TwentyFourHour)
            .unwrap()
            .count,
        1
    );
}

#[tokio::test]
async fn global_gap_spaces_deliveries_in_admission_order() {
    let h = quiet_harness();
    for symbol in ["BTCUSDT", "ETHUSDT", "SOLUSDT"] {
        h.source.set(symbol, Timeframe::TwentyFourHour, 1000, 1600);
    }
    assert_eq!(h.monitor.tick(NOON).await.admitted, 3);

    let mut delivered_at = Vec::new();
    for now in (NOON..NOON + 1_300).step_by(10) {
        if h.monitor.drain_once(now).await == DrainOutcome::Delivered {
            delivered_at.push(now);
        }
    }

    assert_eq!(delivered_at, vec![NOON, NOON + 600, NOON + 1_200]);
    let sent = h.notifier.sent();
    assert!(sent[0].contains("BTCUSDT"));
    assert!(sent[1].contains("ETHUSDT"));
    assert!(sent[2].contains("SOLUSDT"));
}

#[tokio::test]
async fn gap_runs_from_delivery_completion() {
    let slow = FakeNotifier::slow(Duration::from_millis(1_100));
    let h = harness(test_config(), slow);
    quiet_all(&h.source);
    for symbol in ["BTCUSDT", "ETHUSDT"] {
        h.source.set(symbol, Timeframe::TwentyFourHour, 1000, 1600);
    }
    assert_eq!(h.monitor.tick(NOON).await.admitted, 2);

    // the first send takes over a second, so the gap starts at NOON + 1
    assert_eq!(h.monitor.drain_once(NOON).await, DrainOutcome::Delivered);
    assert_eq!(
        h.monitor.drain_once(NOON + 600).await,
        DrainOutcome::Waiting
    );
    assert_eq!(
        h.monitor.drain_once(NOON + 601).await,
        DrainOutcome::Delivered
    );
}

#[tokio::test]
async fn paused_tick_is_a_no_op() {
    let h = quiet_harness();
    h.source.set("BTCUSDT", Timeframe::OneHour, 1000, 5000);
    h.state.set_running(false);

    assert_eq!(h.monitor.tick(NOON).await, TickReport::default());
    assert!(h.desk.lock().await.queue.is_empty());

    h.state.set_running(true);
    assert_eq!(h.monitor.tick(NOON + 300).await.admitted, 1);
}

#[tokio::test]
async fn failed_fetch_skips_only_that_pair() {
    let h = quiet_harness();
    h.source.fail("BTCUSDT", Timeframe::OneHour);
    h.source.set("ETHUSDT", Timeframe::OneHour, 1000, 1400);

    let report = h.monitor.tick(NOON).await;
    assert_eq!(report.failed, 1);
    assert_eq!(report.checked, 5);
    assert_eq!(report.admitted, 1);
}

#[tokio::test]
async fn daily_cap_holds_until_rollover() {
    let h = quiet_harness();
    let mut open_time = NOON * 1000;
    let mut admitted = 0;
    for tick in 0..4 {
        open_time += HOUR_MS;
        h.source
            .set_at("BTCUSDT", Timeframe::TwentyFourHour, 1000, 1500, open_time);
        admitted += h.monitor.tick(NOON + tick * 300).await.admitted;
    }
    assert_eq!(admitted, 3);

    open_time += HOUR_MS;
    h.source
        .set_at("BTCUSDT", Timeframe::TwentyFourHour, 1000, 1500, open_time);
    assert_eq!(h.monitor.tick(NOON + DAY).await.admitted, 1);
}

#[tokio::test]
async fn cooldown_runs_from_actual_delivery() {
    let h = quiet_harness();
    h.source.set("BTCUSDT", Timeframe::OneHour, 1000, 1400);
    assert_eq!(h.monitor.tick(NOON).await.admitted, 1);

    // another alert holds the gap, so BTC goes out ten minutes late
    h.desk.lock().await.queue.mark_sent(NOON - 10);
    assert_eq!(h.monitor.drain_once(NOON).await, DrainOutcome::Waiting);
    assert_eq!(
        h.monitor.drain_once(NOON + 590).await,
        DrainOutcome::Delivered
    );

    let next_hour = NOON * 1000 + HOUR_MS;
    h.source
        .set_at("BTCUSDT", Timeframe::OneHour, 1000, 1400, next_hour);
    assert_eq!(h.monitor.tick(NOON + 3_600).await.admitted, 0);
    assert_eq!(h.monitor.tick(NOON + 4_190).await.admitted, 1);
}

#[tokio::test]
async fn failed_delivery_is_retried_at_the_head() {
    let h = harness(two_attempts(), FakeNotifier::failing(1));
    quiet_all(&h.source);
    h.source
        .set("BTCUSDT", Timeframe::TwentyFourHour, 1000, 1600);
    h.source
        .set("ETHUSDT", Timeframe::TwentyFourHour, 1000, 1600);
    h.monitor.tick(NOON).await;

    assert_eq!(h.monitor.drain_once(NOON).await, DrainOutcome::Requeued);
    assert_eq!(
        h.monitor.drain_once(NOON + 10).await,
        DrainOutcome::Delivered
    );
    assert!(h.notifier.sent()[0].contains("BTCUSDT"));
}

#[tokio::test]
async fn delivery_abandoned_after_last_attempt() {
    let h = harness(two_attempts(), FakeNotifier::failing(10));
    quiet_all(&h.source);
    h.source
        .set("BTCUSDT", Timeframe::TwentyFourHour, 1000, 1600);
    h.monitor.tick(NOON).await;

    assert_eq!(h.monitor.drain_once(NOON).await, DrainOutcome::Requeued);
    assert_eq!(
        h.monitor.drain_once(NOON + 10).await,
        DrainOutcome::Abandoned
    );
    assert_eq!(h.monitor.drain_once(NOON + 20).await, DrainOutcome::Idle);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn drain_drops_alert_once_count_passes_cap() {
    let h = quiet_harness();
    let candidate = AlertCandidate {
        symbol: "BTCUSDT".to_string(),
        timeframe: Timeframe::TwentyFourHour,
        change_pct: dec!(80),
        direction: Direction::Increase,
        current_price: dec!(43000),
        current_volume: dec!(1800),
        previous_volume: dec!(1000),
        open_time: 1,
        detected_at: NOON,
    };
    {
        let mut desk = h.desk.lock().await;
        desk.offer(candidate.clone(), NOON).unwrap();
        // a second path that was admitted under a tighter cap
        let stale = AdmitTicket {
            symbol: "BTCUSDT".to_string(),
            timeframe: Timeframe::TwentyFourHour,
            cap: 0,
            open_time: 0,
        };
        desk.queue.enqueue(candidate, stale, NOON);
    }

    assert_eq!(h.monitor.drain_once(NOON).await, DrainOutcome::Delivered);
    assert_eq!(
        h.monitor.drain_once(NOON + 600).await,
        DrainOutcome::Dropped
    );
    assert_eq!(h.monitor.drain_once(NOON + 900).await, DrainOutcome::Idle);
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn restart_continues_counting_from_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rate_limits.json");
    let config = Arc::new(test_config());

    let build = |now: i64| {
        let limiter = RateLimiter::with_store(&config, SnapshotStore::new(&path), now);
        let queue = AlertQueue::new(config.global_gap_secs);
        AlertDesk::new(limiter, queue).shared()
    };

    let source = Arc::new(FakeSource::default());
    quiet_all(&source);
    source.set("ETHUSDT", Timeframe::TwentyFourHour, 1000, 2000);

    let first = Monitor::new(
        Arc::clone(&config),
        Arc::clone(&source),
        Arc::new(FakeNotifier::default()),
        build(NOON),
        Arc::new(BotRunState::new(None)),
    );
    assert_eq!(first.tick(NOON).await.admitted, 1);
    drop(first);

    let desk = build(NOON + 600);
    let restored = desk.lock().await;
    let entry = restored
        .limiter
        .entry("ETHUSDT", Timeframe::TwentyFourHour)
        .unwrap();
    assert_eq!(entry.count, 1);
    assert_eq!(entry.last_alerted_open_time, Some(NOON * 1000));
}

#[tokio::test]
async fn loops_exit_promptly_on_shutdown() {
    let h = quiet_harness();
    let monitor = Arc::new(h.monitor);
    let (tx, rx) = watch::channel(false);

    let scan = tokio::spawn({
        let monitor = Arc::clone(&monitor);
        let rx = rx.clone();
        async move { monitor.run_scan_loop(rx).await }
    });
    let drain = tokio::spawn({
        let monitor = Arc::clone(&monitor);
        async move { monitor.run_drain_loop(rx).await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();

    let scan = assert_ok!(tokio::time::timeout(Duration::from_secs(5), scan).await);
    assert_ok!(scan);
    let drain = assert_ok!(tokio::time::timeout(Duration::from_secs(5), drain).await);
    assert_ok!(drain);
}
