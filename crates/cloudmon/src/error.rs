//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use cloudmon_config::ConfigError;
use cloudmon_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const CANCELED: i32 = 130;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to device cloud at {url}")]
    #[diagnostic(
        code(cloudmon::connection_failed),
        help(
            "Check the URL and your network connection.\n\
             URL: {url}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed")]
    #[diagnostic(
        code(cloudmon::auth_failed),
        help(
            "Verify your username and password.\n\
             Run: cloudmon config set-password --profile {profile}"
        )
    )]
    AuthFailed { profile: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(cloudmon::no_credentials),
        help(
            "Store a password with: cloudmon config set-password\n\
             Or set CLOUDMON_USERNAME and CLOUDMON_PASSWORD."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(cloudmon::not_found),
        help("Run: cloudmon {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Device cloud ─────────────────────────────────────────────────

    #[error("Device cloud refused the request: {message}")]
    #[diagnostic(code(cloudmon::rejected))]
    Rejected { message: String },

    #[error("API error: {message}")]
    #[diagnostic(code(cloudmon::api_error))]
    ApiError { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(cloudmon::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(cloudmon::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: cloudmon config add-profile"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file not found")]
    #[diagnostic(
        code(cloudmon::no_config),
        help(
            "Create a profile with: cloudmon config add-profile <name> --username <user>\n\
             Or pass --url, --username and --password.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(cloudmon::config))]
    Config(Box<ConfigError>),

    // ── Interactive ──────────────────────────────────────────────────

    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(cloudmon::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Transfers ────────────────────────────────────────────────────

    #[error("Upload of '{transfer}' canceled")]
    #[diagnostic(code(cloudmon::canceled))]
    Canceled { transfer: String },

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Request timed out")]
    #[diagnostic(
        code(cloudmon::timeout),
        help("Increase timeout with --timeout or try again later.")
    )]
    Timeout,

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            Self::Canceled { .. } => exit_code::CANCELED,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => Self::ConnectionFailed { url, reason },
            CoreError::AuthenticationFailed { .. } => Self::AuthFailed {
                profile: "current".into(),
            },
            CoreError::Timeout { .. } => Self::Timeout,
            CoreError::Rejected { message } => Self::Rejected { message },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            other => Self::ApiError {
                message: other.to_string(),
            },
        }
    }
}

impl From<cloudmon_api::Error> for CliError {
    fn from(err: cloudmon_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::UnknownProfile(name) => Self::ProfileNotFound {
                name,
                available: "(none)".into(),
            },
            other => Self::Config(Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_class() {
        let auth: CliError = CoreError::AuthenticationFailed {
            message: "bad".into(),
        }
        .into();
        assert_eq!(auth.exit_code(), exit_code::AUTH);

        let rejected: CliError = CoreError::Rejected {
            message: "Invalid topic".into(),
        }
        .into();
        assert_eq!(rejected.exit_code(), exit_code::GENERAL);
        assert_eq!(rejected.to_string(), "Device cloud refused the request: Invalid topic");

        let missing: CliError = ConfigError::NoCredentials {
            profile: "lab".into(),
        }
        .into();
        assert_eq!(missing.exit_code(), exit_code::AUTH);

        let canceled = CliError::Canceled {
            transfer: "image.swu".into(),
        };
        assert_eq!(canceled.exit_code(), exit_code::CANCELED);
    }
}
