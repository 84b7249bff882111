//! Pub/sub transport seam.

use std::time::Duration;

use thiserror::Error;

use crate::error::Transience;

use super::stomp::FrameError;

/// Where and how to connect. Reconnect and heartbeat timing are fixed for
/// the life of a bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// `host:port`, optionally prefixed with `stomp://` or `tcp://`.
    pub addr: String,
    /// Virtual host sent in the handshake; defaults to the address host.
    pub host: Option<String>,
    pub login: Option<String>,
    pub passcode: Option<String>,
    pub bearer_token: Option<String>,
    pub heartbeat: Duration,
    pub connect_timeout: Duration,
    pub max_frame_bytes: usize,
}

impl Endpoint {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            host: None,
            login: None,
            passcode: None,
            bearer_token: None,
            heartbeat: Duration::from_millis(4_000),
            connect_timeout: Duration::from_millis(5_000),
            max_frame_bytes: 1 << 20,
        }
    }

    /// The `host:port` part of `addr`.
    pub fn socket_addr(&self) -> &str {
        let addr = self.addr.trim();
        addr.strip_prefix("stomp://")
            .or_else(|| addr.strip_prefix("tcp://"))
            .unwrap_or(addr)
            .trim_end_matches('/')
    }

    pub fn virtual_host(&self) -> String {
        if let Some(host) = &self.host {
            return host.clone();
        }
        let addr = self.socket_addr();
        addr.rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or(addr)
            .to_string()
    }
}

/// Negotiated heartbeat timing for one connection. Zero disables a
/// direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatPolicy {
    /// Send a heartbeat after this long without writing.
    pub outgoing: Duration,
    /// Expect inbound traffic at least this often.
    pub incoming: Duration,
}

impl HeartbeatPolicy {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn symmetric(interval: Duration) -> Self {
        Self {
            outgoing: interval,
            incoming: interval,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Message {
        destination: String,
        subscription: Option<SubscriptionId>,
        body: Vec<u8>,
    },
    Heartbeat,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("invalid endpoint `{addr}`: {reason}")]
    InvalidEndpoint { addr: String, reason: String },
    #[error("broker rejected the connection: {message}")]
    Rejected { message: String },
    #[error("broker error: {message}")]
    Broker { message: String },
    #[error("unexpected {command} frame during {phase}")]
    UnexpectedFrame {
        command: String,
        phase: &'static str,
    },
    #[error("connection closed")]
    Closed,
}

impl TransportError {
    pub fn transience(&self) -> Transience {
        match self {
            TransportError::Io(_) | TransportError::Closed | TransportError::Broker { .. } => {
                Transience::Retryable
            }
            TransportError::Rejected { .. } => Transience::Unknown,
            TransportError::Frame(_)
            | TransportError::InvalidEndpoint { .. }
            | TransportError::UnexpectedFrame { .. } => Transience::Permanent,
        }
    }
}

/// Opens connections to a pub/sub broker.
pub trait Transport: Send + Sync + 'static {
    fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError>;
}

/// One live broker connection.
pub trait Connection: Send {
    fn subscribe(&mut self, topic: &str) -> Result<SubscriptionId, TransportError>;

    fn unsubscribe(&mut self, id: &SubscriptionId) -> Result<(), TransportError>;

    /// Wait up to `timeout` for the next inbound frame. `Ok(None)` on
    /// timeout, `Err(Closed)` once the peer has gone away.
    fn poll(&mut self, timeout: Duration) -> Result<Option<Inbound>, TransportError>;

    fn heartbeat(&mut self) -> Result<(), TransportError>;

    fn heartbeats(&self) -> HeartbeatPolicy;

    /// Close the connection. Calling it again is a no-op.
    fn disconnect(&mut self) -> Result<(), TransportError>;
}
