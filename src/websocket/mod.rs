pub mod connection;
pub mod router;

mod msg_activity_handler;
mod msg_document_handler;
mod msg_notification_handler;
mod msg_pong_handler;
mod msg_presence_handler;

pub use connection::{
    ConnectionDiagnostics, ConnectionScope, ConnectionState, RealtimeConnection,
};
pub use router::{ChannelRouter, EventCallback, OutboundSender, RouterCallbacks};
