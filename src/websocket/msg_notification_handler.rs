use serde_json::Value;
use tracing::info;

use crate::cache::{QueryCache, QueryKey};
use crate::websocket::connection::ConnectionScope;
use crate::websocket::router::RouterCallbacks;

/// Handle a notification channel message.
///
/// Invalidates the user's notification list so the next read refetches,
/// and forwards the payload for immediate display (toast, badge count).
pub(crate) async fn handle_notification_message(
    payload: Value,
    cache: &QueryCache,
    scope: &ConnectionScope,
    callbacks: &RouterCallbacks,
) {
    info!("Notification received for user {}", scope.user_id);

    cache
        .invalidate(&QueryKey::Notifications {
            user_id: scope.user_id.clone(),
        })
        .await;

    if let Some(on_notification) = &callbacks.on_notification {
        on_notification(payload);
    }
}
