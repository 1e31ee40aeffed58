//! Application configuration loaded from environment variables.
//!
//! Credentials **must** be provided via environment variables (or the
//! keychain, see [`crate::credentials`]):
//! - `TELEGRAM_BOT_TOKEN`: bot token issued by BotFather
//! - `TELEGRAM_CHAT_ID`: destination chat, numeric id or `@channel`
//!
//! Optional:
//! - `TELEGRAM_TOPIC_ID`: forum topic inside the destination chat
//! - `TELEGRAM_OWNER_ID`: user allowed to `/start` and `/stop`
//! - `TELEGRAM_BOT_USERNAME`: commands addressed to other bots are ignored
//! - `BINANCE_BASE_URL`: overrides the public market-data endpoint
//! - `VOLWATCH_MONITOR_CONFIG`: path to a JSON rules file
//! - `VOLWATCH_DATA_DIR`: directory holding the tracking snapshot

use std::path::PathBuf;

use crate::credentials::RedactedToken;
use crate::models::telegram::ChatId;
use crate::monitor::config::MonitorConfig;
use crate::source::DEFAULT_BINANCE_URL;

/// Default directory for the tracking snapshot.
const DEFAULT_DATA_DIR: &str = "data";

/// File name of the tracking snapshot inside the data directory.
const STATE_FILE_NAME: &str = "rate_limits.json";

/// Dedup-only snapshot left by earlier releases, read while the tracking
/// snapshot does not exist yet.
const LEGACY_STATE_FILE_NAME: &str = "candle_state.json";

/// Top-level application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    pub binance_url: String,
    pub monitor_config_path: Option<PathBuf>,
    pub data_dir: PathBuf,
}

/// Chat platform configuration values.
#[derive(Debug)]
pub struct TelegramConfig {
    pub bot_token: RedactedToken,
    pub chat_id: ChatId,
    pub topic_id: Option<i64>,
    pub owner_id: Option<i64>,
    pub bot_username: Option<String>,
}

impl AppConfig {
    /// Path of the rate-limit snapshot file.
    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join(STATE_FILE_NAME)
    }

    pub fn legacy_state_file(&self) -> PathBuf {
        self.data_dir.join(LEGACY_STATE_FILE_NAME)
    }

    /// Loads the monitoring rules file if one is configured, otherwise
    /// returns the built-in defaults.
    ///
    /// # Errors
    ///
    /// Propagates [`MonitorConfig::load`] errors.
    pub fn monitor_config(&self) -> crate::Result<MonitorConfig> {
        match &self.monitor_config_path {
            Some(path) => MonitorConfig::load(path),
            None => Ok(MonitorConfig::default()),
        }
    }
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`VolwatchError::Config`](crate::VolwatchError::Config) if a
/// required credential is missing or an optional id is not an integer.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let bot_token = non_empty_var("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
        crate::VolwatchError::Config("TELEGRAM_BOT_TOKEN is not set".to_string())
    })?;
    let chat_id = non_empty_var("TELEGRAM_CHAT_ID")
        .ok_or_else(|| crate::VolwatchError::Config("TELEGRAM_CHAT_ID is not set".to_string()))?;
    let chat_id: ChatId = match chat_id.parse() {
        Ok(id) => id,
        Err(never) => match never {},
    };

    let telegram = TelegramConfig {
        bot_token: RedactedToken::new(bot_token),
        chat_id,
        topic_id: int_var("TELEGRAM_TOPIC_ID")?,
        owner_id: int_var("TELEGRAM_OWNER_ID")?,
        bot_username: non_empty_var("TELEGRAM_BOT_USERNAME")
            .map(|name| name.trim_start_matches('@').to_string()),
    };

    Ok(AppConfig {
        telegram,
        binance_url: non_empty_var("BINANCE_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BINANCE_URL.to_string()),
        monitor_config_path: non_empty_var("VOLWATCH_MONITOR_CONFIG").map(PathBuf::from),
        data_dir: non_empty_var("VOLWATCH_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
    })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Parses an optional integer environment variable.
fn int_var(name: &str) -> crate::Result<Option<i64>> {
    let Some(raw) = non_empty_var(name) else {
        return Ok(None);
    };
    match raw.trim().parse::<i64>() {
        Ok(value) => Ok(Some(value)),
        Err(e) => Err(crate::VolwatchError::Config(format!(
            "{name} must be an integer, got {raw:?}: {e}"
        ))),
    }
}
