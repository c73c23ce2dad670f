// ── Device-cloud service seam ──
//
// The multiplexer and bridges only need four device-cloud operations.
// `MonitorService` names them so a session can be backed by the HTTP
// client in production and by an in-memory fake in tests.

use futures_util::future::BoxFuture;

use cloudmon_api::{
    AlertSummary, DeviceCloudClient, MonitorId, MonitorMetadata, MonitorQuery, MonitorRequest,
};

use crate::error::CoreError;

/// Device-cloud operations used by the monitor machinery.
pub trait MonitorService: Send + Sync {
    fn create_monitor<'a>(
        &'a self,
        request: &'a MonitorRequest,
    ) -> BoxFuture<'a, Result<MonitorId, CoreError>>;

    fn delete_monitor(&self, id: MonitorId) -> BoxFuture<'_, Result<(), CoreError>>;

    fn list_monitors<'a>(
        &'a self,
        query: &'a MonitorQuery,
    ) -> BoxFuture<'a, Result<Vec<MonitorMetadata>, CoreError>>;

    fn alert_details<'a>(
        &'a self,
        alert_id: u64,
        device_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<AlertSummary>, CoreError>>;
}

impl MonitorService for DeviceCloudClient {
    fn create_monitor<'a>(
        &'a self,
        request: &'a MonitorRequest,
    ) -> BoxFuture<'a, Result<MonitorId, CoreError>> {
        Box::pin(async move { Ok(DeviceCloudClient::create_monitor(self, request).await?) })
    }

    fn delete_monitor(&self, id: MonitorId) -> BoxFuture<'_, Result<(), CoreError>> {
        Box::pin(async move { Ok(DeviceCloudClient::delete_monitor(self, id).await?) })
    }

    fn list_monitors<'a>(
        &'a self,
        query: &'a MonitorQuery,
    ) -> BoxFuture<'a, Result<Vec<MonitorMetadata>, CoreError>> {
        Box::pin(async move { Ok(DeviceCloudClient::list_monitors(self, query).await?) })
    }

    fn alert_details<'a>(
        &'a self,
        alert_id: u64,
        device_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<AlertSummary>, CoreError>> {
        Box::pin(async move { Ok(DeviceCloudClient::alert_details(self, alert_id, device_id).await?) })
    }
}
