use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use volwatch::VolwatchError;
use volwatch::commands::{CommandContext, run_command_listener, skip_pending_updates};
use volwatch::config::fetch_config;
use volwatch::credentials::{self, CredentialKey};
use volwatch::limiter::RateLimiter;
use volwatch::limiter::store::SnapshotStore;
use volwatch::monitor::{AlertDesk, Monitor, unix_now};
use volwatch::notify::TelegramClient;
use volwatch::queue::AlertQueue;
use volwatch::source::BinanceClient;
use volwatch::state::BotRunState;

#[tokio::main]
async fn main() -> Result<(), VolwatchError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if std::env::args().any(|arg| arg == "--save-credentials") {
        return save_credentials();
    }

    credentials::populate_env_from_keychain();
    let app_config = fetch_config()?;
    let monitor_config = Arc::new(app_config.monitor_config()?);

    let now = unix_now();
    let store = SnapshotStore::new(app_config.state_file())
        .with_fallback(app_config.legacy_state_file());
    let limiter = RateLimiter::with_store(&monitor_config, store, now);
    let queue = AlertQueue::new(monitor_config.global_gap_secs);
    let desk = AlertDesk::new(limiter, queue).shared();
    let state = Arc::new(BotRunState::new(app_config.telegram.owner_id));

    let source = Arc::new(BinanceClient::new(&app_config.binance_url)?);
    let telegram = Arc::new(TelegramClient::new(
        app_config.telegram.bot_token.clone(),
        app_config.telegram.chat_id.clone(),
        app_config.telegram.topic_id,
    )?);

    match skip_pending_updates(&telegram, &state).await {
        Ok(0) => {}
        Ok(skipped) => info!(skipped, "skipped pending updates"),
        Err(e) => warn!("could not clear pending updates: {e}"),
    }

    info!(
        symbols = ?monitor_config.symbols,
        gap_secs = monitor_config.global_gap_secs,
        interval_secs = monitor_config.check_interval_secs,
        "volwatch starting"
    );

    let monitor = Arc::new(Monitor::new(
        Arc::clone(&monitor_config),
        source,
        Arc::clone(&telegram),
        Arc::clone(&desk),
        Arc::clone(&state),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scan = tokio::spawn({
        let monitor = Arc::clone(&monitor);
        let shutdown = shutdown_rx.clone();
        async move { monitor.run_scan_loop(shutdown).await }
    });
    let drain = tokio::spawn({
        let monitor = Arc::clone(&monitor);
        let shutdown = shutdown_rx.clone();
        async move { monitor.run_drain_loop(shutdown).await }
    });
    let listener = tokio::spawn(run_command_listener(
        telegram,
        CommandContext {
            state,
            desk,
            config: Arc::clone(&monitor_config),
            bot_username: app_config.telegram.bot_username.clone(),
        },
        monitor_config.retry,
        shutdown_rx,
    ));

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {e}");
    }
    info!("shutting down");
    let _ = shutdown_tx.send(true);

    for (name, task) in [("scan", scan), ("drain", drain), ("commands", listener)] {
        if let Err(e) = task.await {
            warn!(task = name, "task ended abnormally: {e}");
        }
    }

    Ok(())
}

/// Stores the chat credentials currently in the environment in the OS
/// keychain.
fn save_credentials() -> Result<(), VolwatchError> {
    for key in CredentialKey::ALL {
        match std::env::var(key.env_var()) {
            Ok(value) if !value.is_empty() => {
                credentials::save(key, &value)?;
                info!(key = key.env_var(), "saved credential to keychain");
            }
            _ => warn!(key = key.env_var(), "not set, skipping"),
        }
    }
    Ok(())
}
