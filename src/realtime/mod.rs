//! Realtime refresh bridge.
//!
//! A [`RealtimeBridge`] subscribes to one pub/sub topic, turns each pushed
//! [`EventEnvelope`] into a notification, and calls the owner back so it can
//! refresh whatever data it shows. Connections are retried after a fixed
//! delay until the returned [`BridgeHandle`] is torn down.

pub mod bridge;
pub mod envelope;
pub mod stomp;
pub mod transport;

pub use bridge::{
    BridgeConfig, BridgeError, BridgeHandle, BridgeStats, DEFAULT_RECONNECT_DELAY, EventCallback,
    MessageHandler, RealtimeBridge, SubscriptionStatus,
};
pub use envelope::{DecodeError, EventEnvelope, decode_envelope, style_for};
pub use stomp::{StompConnection, StompTransport};
pub use transport::{
    Connection, Endpoint, HeartbeatPolicy, Inbound, SubscriptionId, Transport, TransportError,
};
