//! Outbound delivery of rendered alerts.
//!
//! [`Notifier`] is the seam the drain loop delivers through; the
//! production implementation is [`TelegramClient`].

pub mod format;
pub mod telegram;

use std::future::Future;

pub use telegram::TelegramClient;

/// Delivers one rendered (HTML) message to the alert destination.
pub trait Notifier: Send + Sync {
    /// # Errors
    ///
    /// Any error leaves the alert at the head of the queue for the next
    /// drain tick.
    fn deliver(&self, text: &str) -> impl Future<Output = crate::Result<()>> + Send;
}
