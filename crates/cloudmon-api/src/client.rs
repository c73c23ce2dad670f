// Device-cloud HTTP client
//
// Wraps `reqwest::Client` with base-URL joining, per-request basic auth,
// and status/body handling. Endpoint groups (monitors, alerts, files) are
// implemented as inherent methods in separate files to keep this module
// focused on transport mechanics.

use reqwest::{Method, StatusCode};
use tracing::debug;
use url::Url;

use crate::auth::Credentials;
use crate::error::Error;
use crate::transport::TransportConfig;
use crate::xml::DeviceCloudError;

/// Default device-cloud endpoint.
pub const DEFAULT_BASE_URL: &str = "https://remotemanager.digi.com";

/// Raw HTTP client for the device cloud's web services.
///
/// Every request carries the account's basic-auth credentials. Methods
/// return the response body as text once the status has been checked;
/// parsing is left to the endpoint modules.
#[derive(Debug, Clone)]
pub struct DeviceCloudClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
}

impl DeviceCloudClient {
    /// Create a client from a `TransportConfig`.
    pub fn new(
        base_url: Url,
        credentials: Credentials,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            credentials,
        })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, credentials: Credentials) -> Self {
        Self {
            http,
            base_url,
            credentials,
        }
    }

    /// The device-cloud base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The account these requests are made on behalf of.
    pub fn username(&self) -> &str {
        self.credentials.username()
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build a full URL for a web-service path such as `/ws/Monitor`.
    pub(crate) fn ws_url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    pub(crate) fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        debug!("{} {}", method, url);
        self.credentials.apply(self.http.request(method, url))
    }

    /// Send a request and return the body of a successful response.
    ///
    /// 401 maps to [`Error::Authentication`]; any other non-2xx status maps
    /// to [`Error::Http`] with the raw body attached.
    pub(crate) async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, Error> {
        let resp = request.send().await.map_err(Error::Transport)?;
        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                message: "device cloud rejected the account credentials".into(),
            });
        }
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    /// Like [`send`](Self::send), but keeps the body as raw bytes.
    pub(crate) async fn send_bytes(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<bytes::Bytes, Error> {
        let resp = request.send().await.map_err(Error::Transport)?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                message: "device cloud rejected the account credentials".into(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.map_err(Error::Transport)?;
            return Err(Error::Http {
                status: status.as_u16(),
                body,
            });
        }
        resp.bytes().await.map_err(Error::Transport)
    }

    /// Like [`send`](Self::send), but also rejects 2xx answers that embed a
    /// device-reported error document.
    pub(crate) async fn send_checked(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<String, Error> {
        let body = self.send(request).await?;
        if let Some(err) = DeviceCloudError::from_body(&body) {
            return Err(Error::DeviceCloud(err));
        }
        Ok(body)
    }
}
