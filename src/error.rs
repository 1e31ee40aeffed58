//! Crate-level error types.
//!
//! [`VolwatchError`] unifies every error source (configuration, HTTP,
//! JSON, snapshot I/O, chat API) behind a single enum so callers can match
//! on the variant they care about while still using the `?` operator.
//!
//! Admission-control rejections are not errors; see
//! [`Rejection`](crate::limiter::Rejection).

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VolwatchError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum VolwatchError {
    /// Configuration could not be found, read, or validated.
    #[error("configuration error: {0}")]
    Config(String),

    /// An HTTP request to the market-data or chat API failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing the tracking snapshot failed.
    #[error("io error: {0}")]
    Io(String),

    /// An upstream payload did not have the expected shape.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The chat API answered with `ok: false`.
    #[error("telegram error: {0}")]
    Telegram(String),
}
