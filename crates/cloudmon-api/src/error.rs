use thiserror::Error;

use crate::xml::DeviceCloudError;

/// Top-level error type for the `cloudmon-api` crate.
///
/// Covers every failure mode of the device-cloud surface: authentication,
/// transport, non-success HTTP answers, device-reported errors embedded in
/// response bodies, and the push channel. `cloudmon-core` maps these into
/// domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Credentials rejected by the device cloud (HTTP 401).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Device cloud answers ────────────────────────────────────────
    /// Non-success HTTP status. Carries the raw response body.
    #[error("Device cloud returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// An error document reported by the device cloud or the device.
    #[error("Device cloud error: {0}")]
    DeviceCloud(DeviceCloudError),

    /// A success response whose body did not have the expected shape.
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String, body: String },

    // ── Data ────────────────────────────────────────────────────────
    /// A request document could not be encoded.
    #[error("Request encoding failed: {message}")]
    Encoding { message: String },

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Push ────────────────────────────────────────────────────────
    /// The push connection was closed before the batch could be delivered.
    #[error("Push connection closed")]
    PushClosed,
}

impl Error {
    /// Returns `true` if the credentials were rejected.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Http { status: 404, .. } => true,
            _ => false,
        }
    }

    /// The raw response body attached to this error, if any.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Http { body, .. }
            | Self::MalformedResponse { body, .. }
            | Self::Deserialization { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Best human-readable reason for this failure.
    ///
    /// When the response body embeds an `<error>` document its text wins
    /// over the generic display string.
    pub fn reason(&self) -> String {
        if let Self::DeviceCloud(err) = self {
            return err.message().to_owned();
        }
        self.body()
            .and_then(DeviceCloudError::from_body)
            .map_or_else(|| self.to_string(), |err| err.message().to_owned())
    }
}
