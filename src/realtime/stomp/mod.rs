//! STOMP 1.2 over TCP.

pub mod frame;

use std::io::BufReader;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use uuid::Uuid;

use super::transport::{
    Connection, Endpoint, HeartbeatPolicy, Inbound, SubscriptionId, Transport, TransportError,
};

pub use frame::{Frame, FrameError, FrameReader, FrameWriter, ReadItem, encode_frame};

pub const STOMP_VERSION: &str = "1.2";

/// Connects to a STOMP broker over plain TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct StompTransport;

impl StompTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for StompTransport {
    fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError> {
        let connection = StompConnection::open(endpoint)?;
        Ok(Box::new(connection))
    }
}

pub struct StompConnection {
    writer: FrameWriter<TcpStream>,
    stream: TcpStream,
    inbound_rx: Receiver<Result<Inbound, TransportError>>,
    reader_handle: Option<JoinHandle<()>>,
    heartbeats: HeartbeatPolicy,
    closed: bool,
}

impl StompConnection {
    pub fn open(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let addr = resolve(endpoint)?;
        let stream = TcpStream::connect_timeout(&addr, endpoint.connect_timeout)?;
        stream.set_nodelay(true)?;

        let mut writer = FrameWriter::new(stream.try_clone()?);
        let mut reader = FrameReader::new(
            BufReader::new(stream.try_clone()?),
            endpoint.max_frame_bytes,
        );

        stream.set_read_timeout(Some(endpoint.connect_timeout))?;
        writer.write_frame(&connect_frame(endpoint))?;
        let connected = loop {
            match reader.read_next()? {
                Some(ReadItem::Heartbeat) => continue,
                Some(ReadItem::Frame(frame)) if frame.command == "CONNECTED" => break frame,
                Some(ReadItem::Frame(frame)) if frame.command == "ERROR" => {
                    return Err(TransportError::Rejected {
                        message: error_message(&frame),
                    });
                }
                Some(ReadItem::Frame(frame)) => {
                    return Err(TransportError::UnexpectedFrame {
                        command: frame.command,
                        phase: "handshake",
                    });
                }
                None => return Err(TransportError::Closed),
            }
        };
        stream.set_read_timeout(None)?;

        let heartbeats = negotiate_heartbeats(endpoint.heartbeat, connected.get("heart-beat"));
        tracing::debug!(
            addr = %addr,
            server = connected.get("server").unwrap_or("unknown"),
            outgoing_ms = heartbeats.outgoing.as_millis() as u64,
            incoming_ms = heartbeats.incoming.as_millis() as u64,
            "stomp session established"
        );

        let (inbound_tx, inbound_rx) = crossbeam::channel::unbounded();
        let reader_handle = thread::Builder::new()
            .name("stomp-reader".to_string())
            .spawn(move || run_reader_loop(&mut reader, inbound_tx))?;

        Ok(Self {
            writer,
            stream,
            inbound_rx,
            reader_handle: Some(reader_handle),
            heartbeats,
            closed: false,
        })
    }

    fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.writer.write_frame(frame)?;
        Ok(())
    }
}

impl Connection for StompConnection {
    fn subscribe(&mut self, topic: &str) -> Result<SubscriptionId, TransportError> {
        let id = SubscriptionId(format!("sub-{}", Uuid::new_v4()));
        let frame = Frame::new("SUBSCRIBE")
            .header("id", id.as_str())
            .header("destination", topic)
            .header("ack", "auto");
        self.send(&frame)?;
        Ok(id)
    }

    fn unsubscribe(&mut self, id: &SubscriptionId) -> Result<(), TransportError> {
        self.send(&Frame::new("UNSUBSCRIBE").header("id", id.as_str()))
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<Inbound>, TransportError> {
        match self.inbound_rx.recv_timeout(timeout) {
            Ok(Ok(inbound)) => Ok(Some(inbound)),
            Ok(Err(err)) => Err(err),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn heartbeat(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.writer.write_heartbeat()?;
        Ok(())
    }

    fn heartbeats(&self) -> HeartbeatPolicy {
        self.heartbeats
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        let sent = self.send(&Frame::new("DISCONNECT"));
        self.closed = true;
        let _ = self.stream.shutdown(Shutdown::Both);
        if let Some(handle) = self.reader_handle.take() {
            let _ = handle.join();
        }
        sent
    }
}

impl Drop for StompConnection {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

fn resolve(endpoint: &Endpoint) -> Result<SocketAddr, TransportError> {
    let addr = endpoint.socket_addr();
    let invalid = |reason: String| TransportError::InvalidEndpoint {
        addr: endpoint.addr.clone(),
        reason,
    };
    addr.to_socket_addrs()
        .map_err(|err| invalid(err.to_string()))?
        .next()
        .ok_or_else(|| invalid("address resolved to nothing".to_string()))
}

fn connect_frame(endpoint: &Endpoint) -> Frame {
    let beat = endpoint.heartbeat.as_millis().to_string();
    let mut frame = Frame::new("CONNECT")
        .header("accept-version", STOMP_VERSION)
        .header("host", endpoint.virtual_host())
        .header("heart-beat", format!("{beat},{beat}"));
    if let Some(login) = &endpoint.login {
        frame = frame.header("login", login);
    }
    if let Some(passcode) = &endpoint.passcode {
        frame = frame.header("passcode", passcode);
    }
    if let Some(token) = &endpoint.bearer_token {
        frame = frame.header("Authorization", format!("Bearer {token}"));
    }
    frame
}

fn error_message(frame: &Frame) -> String {
    if let Some(message) = frame.get("message") {
        return message.to_string();
    }
    let body = String::from_utf8_lossy(&frame.body).trim().to_string();
    if body.is_empty() {
        "no reason given".to_string()
    } else {
        body
    }
}

/// Combine our `heart-beat` offer with the broker's answer (`sx,sy`).
///
/// We send every `max(ours, sy)` and expect traffic every `max(ours, sx)`;
/// a zero on either side disables that direction.
pub fn negotiate_heartbeats(ours: Duration, server: Option<&str>) -> HeartbeatPolicy {
    let (sx, sy) = server
        .and_then(|raw| raw.split_once(','))
        .and_then(|(sx, sy)| Some((sx.trim().parse::<u64>().ok()?, sy.trim().parse::<u64>().ok()?)))
        .unwrap_or((0, 0));
    let ours_ms = ours.as_millis() as u64;
    let pick = |theirs: u64| {
        if ours_ms == 0 || theirs == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(ours_ms.max(theirs))
        }
    };
    HeartbeatPolicy {
        outgoing: pick(sy),
        incoming: pick(sx),
    }
}

fn run_reader_loop(
    reader: &mut FrameReader<BufReader<TcpStream>>,
    inbound_tx: Sender<Result<Inbound, TransportError>>,
) {
    loop {
        let item = match reader.read_next() {
            Ok(Some(item)) => item,
            Ok(None) => {
                let _ = inbound_tx.send(Err(TransportError::Closed));
                break;
            }
            Err(err) => {
                let _ = inbound_tx.send(Err(err.into()));
                break;
            }
        };

        let inbound = match item {
            ReadItem::Heartbeat => Inbound::Heartbeat,
            ReadItem::Frame(frame) => match frame.command.as_str() {
                "MESSAGE" => Inbound::Message {
                    destination: frame.get("destination").unwrap_or_default().to_string(),
                    subscription: frame
                        .get("subscription")
                        .map(|id| SubscriptionId(id.to_string())),
                    body: frame.body,
                },
                "ERROR" => {
                    let _ = inbound_tx.send(Err(TransportError::Broker {
                        message: error_message(&frame),
                    }));
                    break;
                }
                other => {
                    tracing::debug!("ignoring stomp {other} frame");
                    continue;
                }
            },
        };
        if inbound_tx.send(Ok(inbound)).is_err() {
            break;
        }
    }
}
