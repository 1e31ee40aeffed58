//! Secret handling for the chat bot token.
//!
//! Provides functions to load, save, and check secrets stored in the
//! system keychain. At startup, [`populate_env_from_keychain`] copies any
//! stored secrets into environment variables so the config flow picks
//! them up transparently. [`RedactedToken`] keeps the token out of logs.

use std::fmt;

use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Keychain service name used for all stored credentials.
const SERVICE: &str = "volwatch";

/// Known secrets managed by this module.
#[derive(Clone, Copy, Debug)]
pub enum CredentialKey {
    TelegramBotToken,
    TelegramChatId,
}

impl CredentialKey {
    /// Returns the keychain entry identifier.
    pub fn keyring_id(self) -> &'static str {
        match self {
            Self::TelegramBotToken => "telegram_bot_token",
            Self::TelegramChatId => "telegram_chat_id",
        }
    }

    /// Returns the environment variable name for this credential.
    pub fn env_var(self) -> &'static str {
        match self {
            Self::TelegramBotToken => "TELEGRAM_BOT_TOKEN",
            Self::TelegramChatId => "TELEGRAM_CHAT_ID",
        }
    }

    /// All credential keys.
    pub const ALL: [CredentialKey; 2] = [Self::TelegramBotToken, Self::TelegramChatId];
}

/// A secret string that is zeroed on drop and never printed.
#[derive(Clone)]
pub struct RedactedToken(Zeroizing<String>);

impl RedactedToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Returns the secret for building request URLs.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for RedactedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RedactedToken(***)")
    }
}

/// Loads a credential from the keychain, returning `None` if not set.
pub fn load(key: CredentialKey) -> Option<Zeroizing<String>> {
    let entry = keyring::Entry::new(SERVICE, key.keyring_id()).ok()?;
    match entry.get_password() {
        Ok(password) => Some(Zeroizing::new(password)),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key = key.keyring_id(), error = %e, "failed to read keychain entry");
            None
        }
    }
}

/// Saves a credential to the keychain.
pub fn save(key: CredentialKey, value: &str) -> crate::Result<()> {
    let entry = keyring::Entry::new(SERVICE, key.keyring_id())
        .map_err(|e| crate::VolwatchError::Config(format!("keyring entry error: {e}")))?;
    entry
        .set_password(value)
        .map_err(|e| crate::VolwatchError::Config(format!("failed to save to keychain: {e}")))
}

/// Populates environment variables from the keychain for any
/// credentials not already set in the environment.
///
/// Call this at startup before [`crate::config::fetch_config`].
pub fn populate_env_from_keychain() {
    for key in CredentialKey::ALL {
        if std::env::var(key.env_var()).is_err()
            && let Some(value) = load(key)
        {
            debug!(key = key.env_var(), "loaded credential from keychain");
            // SAFETY: single-threaded at this point (before any tasks are spawned)
            unsafe {
                std::env::set_var(key.env_var(), value.as_str());
            }
        }
    }
}
