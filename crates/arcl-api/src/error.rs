use std::time::Duration;

use thiserror::Error;

use crate::dispatch::Category;

/// Top-level error type for the `arcl-api` crate.
///
/// Covers settings validation, the TCP transport, the login handshake,
/// and writes against a connection that is not logged in. Grammar failures
/// are reported separately through [`ParseError`] so a malformed line never
/// surfaces as an `Error`.
#[derive(Debug, Error)]
pub enum Error {
    // ── Settings ────────────────────────────────────────────────────
    /// Connection string failed validation.
    #[error("invalid connection {field}: {reason}")]
    InvalidSettings { field: &'static str, reason: String },

    /// Connection string has no password segment, or the segment is empty.
    #[error("connection string has no password")]
    MissingPassword,

    // ── Transport ───────────────────────────────────────────────────
    /// Socket level failure (refused, reset, broken pipe).
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// TCP connect did not complete in time.
    #[error("connect timed out after {}ms", .0.as_millis())]
    ConnectTimeout(Duration),

    /// The server closed the stream.
    #[error("connection closed by server")]
    ConnectionClosed,

    // ── Handshake ───────────────────────────────────────────────────
    /// A handshake step did not complete before the deadline.
    #[error("login timed out while {stage}")]
    LoginTimeout { stage: &'static str },

    /// The server answered the password with something other than the command list.
    #[error("login rejected: {message}")]
    LoginRejected { message: String },

    // ── Session ─────────────────────────────────────────────────────
    /// A write was attempted on a connection that is not logged in.
    #[error("connection is not logged in")]
    NotLoggedIn,
}

impl Error {
    /// Returns `true` if retrying the connect might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::ConnectTimeout(_) | Self::ConnectionClosed | Self::LoginTimeout { .. }
        )
    }
}

// ── ParseError ──────────────────────────────────────────────────────

/// A line matched a category but its fields could not be parsed.
///
/// Carried inside the published event rather than returned, so one bad
/// line never stops the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{category} line rejected: {reason} (line: {line:?})")]
pub struct ParseError {
    pub category: Category,
    pub reason: String,
    pub line: String,
}

impl ParseError {
    pub fn new(category: Category, line: &str, reason: impl Into<String>) -> Self {
        Self {
            category,
            reason: reason.into(),
            line: line.to_owned(),
        }
    }
}
