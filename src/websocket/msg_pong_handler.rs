use chrono::Utc;
use tracing::debug;

use crate::models::PongMessage;
use crate::websocket::router::RouterStats;

/// Handle a pong reply to our heartbeat.
///
/// Pure liveness signal; the receive time is kept for diagnostics.
pub(crate) fn handle_pong_message(msg: &PongMessage, stats: &RouterStats) {
    debug!("Pong received (server time {:?})", msg.date);
    if let Ok(mut last_pong_at) = stats.last_pong_at.lock() {
        *last_pong_at = Some(Utc::now());
    }
}
