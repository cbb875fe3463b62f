use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{QueryCache, QueryKey};
use crate::models::DocumentUpdateMessage;
use crate::websocket::connection::ConnectionScope;
use crate::websocket::router::RouterCallbacks;

/// Handle a document_update channel message.
///
/// The backend persisted a new state of the document, so the cached
/// document and its version list are stale. Falls back to the scope's
/// document when the payload does not name one.
pub(crate) async fn handle_document_update_message(
    msg: &DocumentUpdateMessage,
    cache: &QueryCache,
    scope: &ConnectionScope,
) {
    let document_id = match msg.document_id.clone().or_else(|| scope.document_id.clone()) {
        Some(document_id) => document_id,
        None => {
            warn!("Document update without a document id, dropping");
            return;
        }
    };

    info!("Document update received for document {}", document_id);
    for key in QueryKey::document_variants(&document_id) {
        cache.invalidate(&key).await;
    }
}

/// Handle a document_change channel message.
///
/// Another participant's live edit stream. The payload is opaque here;
/// the document editor consumes it through the callback.
pub(crate) fn handle_document_change_message(payload: Value, callbacks: &RouterCallbacks) {
    match &callbacks.on_document_change {
        Some(on_document_change) => on_document_change(payload),
        None => debug!("Document change received with no consumer registered"),
    }
}
