// Alert summary endpoints
//
// `GET /ws/v1/alerts/summary` answers JSON, unlike the XML monitor
// endpoints: `{"count": n, "list": [ … ]}`.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::DeviceCloudClient;
use crate::error::Error;

const ALERTS_SUMMARY_PATH: &str = "/ws/v1/alerts/summary";

/// One fired or reset alert as summarised by the device cloud.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub id: u64,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub last_update: Option<String>,
}

impl AlertSummary {
    pub fn is_fired(&self) -> bool {
        self.status.eq_ignore_ascii_case("fired")
    }
}

#[derive(Debug, Deserialize)]
struct SummaryPage {
    #[serde(default)]
    count: u64,
    #[serde(default)]
    list: Vec<AlertSummary>,
}

impl DeviceCloudClient {
    /// Summaries matching a device-cloud query expression such as
    /// `id=12` or `name='tank_level_north'`, or all of them.
    ///
    /// `GET /ws/v1/alerts/summary[?query=…]`
    pub async fn alert_summaries(&self, query: Option<&str>) -> Result<Vec<AlertSummary>, Error> {
        let mut url = self.ws_url(ALERTS_SUMMARY_PATH)?;
        if let Some(query) = query {
            url.query_pairs_mut().append_pair("query", query);
        }
        debug!(?query, "querying alert summaries");

        let body = self.send(self.request(Method::GET, url)).await?;
        let page: SummaryPage =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: body.clone(),
            })?;
        if page.count == 0 {
            return Ok(Vec::new());
        }
        Ok(page.list)
    }

    /// Details of alert `alert_id` as fired for `device_id`.
    ///
    /// Returns `None` when the alert no longer exists or has no entry for
    /// that device.
    pub async fn alert_details(
        &self,
        alert_id: u64,
        device_id: &str,
    ) -> Result<Option<AlertSummary>, Error> {
        let summaries = self.alert_summaries(Some(&format!("id={alert_id}"))).await?;
        Ok(summaries
            .into_iter()
            .find(|alert| alert.device_id.as_deref() == Some(device_id)))
    }
}
