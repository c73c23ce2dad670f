// ── Runtime configuration ──
//
// These types describe how to reach a device-cloud account and how the
// monitor machinery behaves. They carry credential data and tuning, but
// never touch disk. The CLI constructs a `CloudConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use cloudmon_api::transport::{TlsMode, TransportConfig};
use cloudmon_api::{Credentials, DeviceCloudClient};

use crate::error::CoreError;
use crate::sink::OverflowPolicy;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict). Default for the hosted device cloud.
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (lab deployments with self-signed certs).
    DangerAcceptInvalid,
}

/// Tuning for subscriptions, registration retry, and notification sinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Extra registration attempts after the first one reports "not ready".
    pub registration_retries: u32,
    /// Pause between registration attempts.
    pub registration_delay: Duration,
    /// Notifications a sink holds before its overflow policy kicks in.
    pub sink_capacity: usize,
    pub overflow: OverflowPolicy,
    /// Undelivered push batches buffered per connection.
    pub push_capacity: usize,
    /// Data-point batch size is this many records per monitored stream.
    pub records_per_stream: u32,
    /// How long the device cloud waits before pushing a partial batch.
    pub batch_duration: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            registration_retries: 5,
            registration_delay: Duration::from_millis(200),
            sink_capacity: 256,
            overflow: OverflowPolicy::default(),
            push_capacity: 64,
            records_per_stream: 10,
            batch_duration: Duration::from_secs(5),
        }
    }
}

/// Configuration for one device-cloud account.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// Device-cloud URL (e.g., `https://remotemanager.digi.com`).
    pub url: Url,
    pub username: String,
    pub password: SecretString,
    pub tls: TlsVerification,
    /// Request timeout.
    pub timeout: Duration,
    pub monitor: MonitorSettings,
}

impl CloudConfig {
    pub fn new(url: Url, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            url,
            username: username.into(),
            password,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            monitor: MonitorSettings::default(),
        }
    }

    pub fn transport(&self) -> TransportConfig {
        let tls = match &self.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        };
        TransportConfig {
            tls,
            timeout: self.timeout,
        }
    }

    /// Build an HTTP client for this account.
    pub fn client(&self) -> Result<DeviceCloudClient, CoreError> {
        let credentials = Credentials::new(self.username.clone(), self.password.clone());
        Ok(DeviceCloudClient::new(
            self.url.clone(),
            credentials,
            &self.transport(),
        )?)
    }
}
