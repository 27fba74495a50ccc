// ── Core error types ──
//
// Manager-level failures. Timeouts on bounded waits are not errors here:
// those operations return `bool`. The `From<arcl_api::Error>` impl keeps
// transport and handshake detail readable without leaking codec types.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach ARCL server: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Login failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Connection timed out: {stage}")]
    Timeout { stage: String },

    #[error("Not connected to an ARCL server")]
    NotConnected,

    // ── Manager state ────────────────────────────────────────────────
    #[error("{manager} manager is not running")]
    NotRunning { manager: &'static str },

    #[error("{manager} manager is already running")]
    AlreadyRunning { manager: &'static str },

    #[error("{manager} mirror is not in sync")]
    NotInSync { manager: &'static str },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Operation rejected: {reason}")]
    Rejected { reason: String },

    #[error("Unknown config section: {name}")]
    UnknownSection { name: String },

    #[error("Write failed for {command}: {reason}")]
    Write { command: String, reason: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<arcl_api::Error> for CoreError {
    fn from(err: arcl_api::Error) -> Self {
        match err {
            arcl_api::Error::InvalidSettings { field, reason } => CoreError::Config {
                message: format!("invalid {field}: {reason}"),
            },
            arcl_api::Error::MissingPassword => CoreError::Config {
                message: "connection string has no password".into(),
            },
            arcl_api::Error::Io(e) => CoreError::ConnectionFailed {
                reason: e.to_string(),
            },
            arcl_api::Error::ConnectTimeout(after) => CoreError::Timeout {
                stage: format!("TCP connect after {}ms", after.as_millis()),
            },
            arcl_api::Error::ConnectionClosed => CoreError::ConnectionFailed {
                reason: "connection closed by server".into(),
            },
            arcl_api::Error::LoginTimeout { stage } => CoreError::Timeout {
                stage: stage.into(),
            },
            arcl_api::Error::LoginRejected { message } => {
                CoreError::AuthenticationFailed { message }
            }
            arcl_api::Error::NotLoggedIn => CoreError::NotConnected,
        }
    }
}
