// File inventory endpoints
//
// Firmware images and other artifacts are stored under
// `/ws/v1/files/inventory/{path}`. A directory path answers a JSON
// listing, a file path answers the file's bytes. Uploads take a
// `reqwest::Body` so a streaming, cancelable reader can feed the request.

use bytes::Bytes;
use futures_util::TryStream;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::debug;

use crate::client::DeviceCloudClient;
use crate::error::Error;
use crate::xml::DeviceCloudError;

const FILES_INVENTORY_PATH: &str = "/ws/v1/files/inventory";

#[derive(Debug, Deserialize)]
struct FileErrorBody {
    error_message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Directory,
    File,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    /// Absent for directories.
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub last_modified: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListingPage {
    #[serde(default)]
    list: Vec<FileEntry>,
}

impl DeviceCloudClient {
    fn file_url(&self, remote_path: &str) -> Result<url::Url, Error> {
        let path = remote_path.trim_start_matches('/');
        self.ws_url(&format!("{FILES_INVENTORY_PATH}/{path}"))
    }

    /// Whether a file exists at `remote_path`.
    ///
    /// `GET /ws/v1/files/inventory/{path}`
    pub async fn file_exists(&self, remote_path: &str) -> Result<bool, Error> {
        let url = self.file_url(remote_path)?;
        match self.send(self.request(Method::GET, url)).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Contents of the directory at `remote_path`, directories first and
    /// each group sorted by name.
    ///
    /// `GET /ws/v1/files/inventory/{path}/`
    pub async fn list_files(&self, remote_path: &str) -> Result<Vec<FileEntry>, Error> {
        let dir = remote_path.trim_matches('/');
        let url = if dir.is_empty() {
            self.ws_url(&format!("{FILES_INVENTORY_PATH}/"))?
        } else {
            self.file_url(&format!("{dir}/"))?
        };
        debug!(remote_path, "listing files");

        let body = self.send(self.request(Method::GET, url)).await?;
        let page: ListingPage =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: body.clone(),
            })?;
        let mut entries = page.list;
        entries.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
        Ok(entries)
    }

    /// Contents of the file at `remote_path`.
    ///
    /// `GET /ws/v1/files/inventory/{path}`
    pub async fn get_file(&self, remote_path: &str) -> Result<Bytes, Error> {
        let url = self.file_url(remote_path)?;
        debug!(remote_path, "downloading file");
        self.send_bytes(self.request(Method::GET, url)).await
    }

    /// Delete the file at `remote_path`.
    ///
    /// `DELETE /ws/v1/files/inventory/{path}`
    pub async fn delete_file(&self, remote_path: &str) -> Result<(), Error> {
        let url = self.file_url(remote_path)?;
        debug!(remote_path, "deleting file");
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    /// Upload `body` to `remote_path`.
    ///
    /// `POST /ws/v1/files/inventory/{path}`. A JSON `error_message` in a
    /// failed answer is surfaced as a [`DeviceCloudError`].
    pub async fn upload_file(
        &self,
        remote_path: &str,
        body: impl Into<reqwest::Body>,
    ) -> Result<(), Error> {
        let url = self.file_url(remote_path)?;
        debug!(remote_path, "uploading file");

        let request = self
            .request(Method::POST, url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body);

        match self.send(request).await {
            Ok(_) => Ok(()),
            Err(Error::Http { status, body }) => {
                match serde_json::from_str::<FileErrorBody>(&body) {
                    Ok(parsed) => Err(Error::DeviceCloud(DeviceCloudError::Raw(
                        parsed.error_message,
                    ))),
                    Err(_) => Err(Error::Http { status, body }),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Upload a chunk stream to `remote_path`. An error item aborts the
    /// request before the device cloud commits the file.
    pub async fn upload_stream<S>(&self, remote_path: &str, chunks: S) -> Result<(), Error>
    where
        S: TryStream + Send + 'static,
        S::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
        Bytes: From<S::Ok>,
    {
        self.upload_file(remote_path, reqwest::Body::wrap_stream(chunks))
            .await
    }
}
