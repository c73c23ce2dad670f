// ── Core error types ──
//
// Domain errors from cloudmon-core. Consumers see what went wrong with a
// monitor or transfer, not HTTP plumbing. The `From<cloudmon_api::Error>`
// impl folds transport failures into these variants and keeps the text of
// any `<error>` element the device cloud embedded in its answer.

use thiserror::Error;

use cloudmon_api::DeviceCloudError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to device cloud at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Device cloud request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Device cloud session not ready")]
    NotReady,

    #[error("Push connection closed")]
    PushClosed,

    // ── Device cloud answers ─────────────────────────────────────────
    /// The device cloud refused the request and said why.
    #[error("{message}")]
    Rejected { message: String },

    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    #[error("Malformed device cloud answer: {message}")]
    MalformedResponse { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Text suitable for an error frame.
    ///
    /// Device-reported errors give their own message; everything else uses
    /// the display string.
    pub fn reason(&self) -> String {
        match self {
            Self::Rejected { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<cloudmon_api::Error> for CoreError {
    fn from(err: cloudmon_api::Error) -> Self {
        match err {
            cloudmon_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            cloudmon_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            cloudmon_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            cloudmon_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            cloudmon_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            cloudmon_api::Error::Http { status, body } => match DeviceCloudError::from_body(&body) {
                Some(embedded) => CoreError::Rejected {
                    message: embedded.message().to_owned(),
                },
                None => CoreError::Api {
                    message: format!("Device cloud returned HTTP {status}: {body}"),
                    status: Some(status),
                },
            },
            cloudmon_api::Error::DeviceCloud(embedded) => CoreError::Rejected {
                message: embedded.message().to_owned(),
            },
            cloudmon_api::Error::MalformedResponse { message, body: _ } => {
                CoreError::MalformedResponse { message }
            }
            cloudmon_api::Error::Encoding { message } => {
                CoreError::Internal(format!("Request encoding failed: {message}"))
            }
            cloudmon_api::Error::Deserialization { message, body: _ } => {
                CoreError::MalformedResponse { message }
            }
            cloudmon_api::Error::PushClosed => CoreError::PushClosed,
        }
    }
}
