// ── Inactive monitor sweep ──
//
// Monitors whose push connection went away stay registered on the device
// cloud as INACTIVE. Before subscribing again, stale monitors of the same
// kind are deleted so an account does not accumulate them.

use tracing::{debug, info, warn};

use cloudmon_api::{MonitorId, MonitorQuery, MonitorStatus};

use crate::error::CoreError;
use crate::service::MonitorService;

/// Delete inactive TCP monitors whose topic contains `topic_hint` (and
/// `device_id`, when given), except those `skip` claims.
///
/// Only a failed listing is an error. Individual delete failures are
/// logged and left for the next sweep. Returns the ids actually deleted.
pub async fn sweep_inactive(
    service: &dyn MonitorService,
    topic_hint: &str,
    device_id: Option<&str>,
    skip: impl Fn(MonitorId) -> bool,
) -> Result<Vec<MonitorId>, CoreError> {
    let monitors = service.list_monitors(&MonitorQuery::inactive_tcp()).await?;

    let mut removed = Vec::new();
    for monitor in monitors {
        if !(monitor.is_tcp()
            && monitor.status() == MonitorStatus::Inactive
            && monitor.topic_matches(topic_hint, device_id))
        {
            continue;
        }
        let Some(id) = monitor.monitor_id() else {
            continue;
        };
        if skip(id) {
            debug!(monitor_id = %id, "inactive monitor still tracked, keeping");
            continue;
        }
        match service.delete_monitor(id).await {
            Ok(()) => {
                info!(monitor_id = %id, topic = %monitor.topic, "deleted inactive monitor");
                removed.push(id);
            }
            Err(e) => warn!(monitor_id = %id, error = %e, "failed to delete inactive monitor"),
        }
    }
    Ok(removed)
}
