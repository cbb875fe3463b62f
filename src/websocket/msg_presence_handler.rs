use crate::models::{CursorMoveMessage, PresenceMessage};
use crate::presence::PresenceAggregator;

/// Handle a presence membership message
pub(crate) fn handle_presence_message(msg: &PresenceMessage, presence: &PresenceAggregator) {
    presence.apply_presence(msg);
}

/// Handle a participant cursor update
pub(crate) fn handle_cursor_message(msg: &CursorMoveMessage, presence: &PresenceAggregator) {
    presence.apply_cursor(msg);
}
