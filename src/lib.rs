//! # scholia-client
//!
//! Realtime and collaboration core for the Scholia research workspace.
//! One multiplexed WebSocket per session feeds the typed channels
//! (activity, notifications, presence, document updates) while REST
//! services keep a shared query cache coherent with backend state.
//!
//! - [`websocket`]: connection supervisor, channel router, outbound senders
//! - [`presence`]: who is online and where their cursors are
//! - [`services`]: comment threads and comment read tracking over REST
//! - [`cache`]: typed query cache with invalidation broadcasts
//! - [`clients`]: REST client for the collaboration backend
//! - [`config`]: environment-driven configuration

pub mod cache;
pub mod clients;
pub mod config;
pub mod logging;
pub mod models;
pub mod presence;
pub mod services;
pub mod websocket;

pub use cache::{QueryCache, QueryKey};
pub use clients::ApiClient;
pub use config::{Config, ConfigError};
pub use models::*;
pub use presence::PresenceAggregator;
pub use services::{CommentService, ReadTracker};
pub use websocket::{
    ChannelRouter, ConnectionDiagnostics, ConnectionScope, ConnectionState, EventCallback,
    OutboundSender, RealtimeConnection, RouterCallbacks,
};
