use serde_json::Value;
use tracing::info;

use crate::cache::{QueryCache, QueryKey};
use crate::websocket::connection::ConnectionScope;
use crate::websocket::router::RouterCallbacks;

/// Handle an activity channel message.
///
/// Something happened in the organization's activity stream, so the
/// cached feed is stale. The payload itself is opaque to the router and
/// goes to the embedding application as-is.
pub(crate) async fn handle_activity_message(
    payload: Value,
    cache: &QueryCache,
    scope: &ConnectionScope,
    callbacks: &RouterCallbacks,
) {
    info!("Activity message received for user {}", scope.user_id);

    cache
        .invalidate(&QueryKey::ActivityFeed {
            organization_id: scope.organization_id.clone(),
        })
        .await;

    if let Some(on_activity) = &callbacks.on_activity {
        on_activity(payload);
    }
}
