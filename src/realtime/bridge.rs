//! Topic subscription that turns server pushes into notifications and
//! refresh callbacks.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use thiserror::Error;

use crate::error::Transience;
use crate::notify::{DEFAULT_TOAST_DURATION, Notification, NotificationSink};

use super::envelope::{EventEnvelope, decode_envelope, style_for};
use super::transport::{Connection, Endpoint, Inbound, Transport, TransportError};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5_000);

/// Longest a worker blocks before re-checking for teardown.
const POLL_SLICE: Duration = Duration::from_millis(100);

/// Missed incoming heartbeat intervals tolerated before a connection is
/// treated as silently dropped.
const HEARTBEAT_GRACE: u32 = 2;

pub type EventCallback = Box<dyn Fn(&EventEnvelope) + Send + 'static>;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub endpoint: Endpoint,
    pub topic: String,
    pub reconnect_delay: Duration,
    pub toast_duration: Duration,
}

impl BridgeConfig {
    pub fn new(endpoint: Endpoint, topic: impl Into<String>) -> Self {
        Self {
            endpoint,
            topic: topic.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            toast_duration: DEFAULT_TOAST_DURATION,
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("topic must not be empty")]
    EmptyTopic,
    #[error("failed to spawn bridge worker: {0}")]
    Spawn(std::io::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("no traffic from broker for {silent_ms}ms")]
    HeartbeatTimeout { silent_ms: u64 },
}

impl BridgeError {
    pub fn transience(&self) -> Transience {
        match self {
            BridgeError::EmptyTopic => Transience::Permanent,
            BridgeError::Spawn(_) | BridgeError::HeartbeatTimeout { .. } => Transience::Retryable,
            BridgeError::Transport(err) => err.transience(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionStatus {
    pub topic: String,
    pub is_connected: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub delivered: u64,
    pub malformed: u64,
    pub connect_attempts: u64,
    pub sessions: u64,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    malformed: AtomicU64,
    connect_attempts: AtomicU64,
    sessions: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> BridgeStats {
        BridgeStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            sessions: self.sessions.load(Ordering::Relaxed),
        }
    }
}

/// Decodes message bodies, raises a notification per event, and invokes
/// the owner's callback.
pub struct MessageHandler {
    sink: Arc<dyn NotificationSink>,
    on_event: Option<EventCallback>,
    toast_duration: Duration,
    counters: Arc<Counters>,
}

impl MessageHandler {
    pub fn new(
        sink: Arc<dyn NotificationSink>,
        on_event: Option<EventCallback>,
        toast_duration: Duration,
    ) -> Self {
        Self {
            sink,
            on_event,
            toast_duration,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn stats(&self) -> BridgeStats {
        self.counters.snapshot()
    }

    /// Handle one frame body. Malformed bodies are logged and dropped.
    pub fn handle(&self, body: &[u8]) -> Option<EventEnvelope> {
        let envelope = match decode_envelope(body) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(bytes = body.len(), "dropping malformed realtime message: {err}");
                return None;
            }
        };

        let (tone, icon) = style_for(&envelope.action);
        self.sink.notify(
            Notification::new(envelope.display_message(), tone, self.toast_duration)
                .with_icon(icon),
        );

        if let Some(on_event) = &self.on_event
            && catch_unwind(AssertUnwindSafe(|| on_event(&envelope))).is_err()
        {
            tracing::warn!(action = %envelope.action, "realtime event callback panicked");
        }

        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(action = %envelope.action, "realtime event delivered");
        Some(envelope)
    }
}

struct Shared {
    topic: String,
    connected: AtomicBool,
    shutdown: AtomicBool,
}

/// Owner-side handle of a running bridge. Dropping it tears the bridge down.
pub struct BridgeHandle {
    shared: Arc<Shared>,
    counters: Arc<Counters>,
    wake: Mutex<Option<Sender<()>>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

pub struct RealtimeBridge;

impl RealtimeBridge {
    /// Spawn the worker: connect, subscribe to `config.topic`, and keep the
    /// subscription alive until teardown.
    pub fn start<T: Transport>(
        config: BridgeConfig,
        transport: T,
        sink: Arc<dyn NotificationSink>,
        on_event: Option<EventCallback>,
    ) -> Result<BridgeHandle, BridgeError> {
        if config.topic.trim().is_empty() {
            return Err(BridgeError::EmptyTopic);
        }

        let handler = MessageHandler::new(sink, on_event, config.toast_duration);
        let counters = Arc::clone(&handler.counters);
        let shared = Arc::new(Shared {
            topic: config.topic.clone(),
            connected: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        });
        let (wake_tx, wake_rx) = crossbeam::channel::bounded(0);

        let runtime = BridgeRuntime {
            endpoint: config.endpoint,
            reconnect_delay: config.reconnect_delay,
            transport,
            handler,
            shared: Arc::clone(&shared),
            wake_rx,
        };
        let join = thread::Builder::new()
            .name(format!("realtime-{}", config.topic))
            .spawn(move || run_bridge_loop(runtime))
            .map_err(BridgeError::Spawn)?;

        Ok(BridgeHandle {
            shared,
            counters,
            wake: Mutex::new(Some(wake_tx)),
            join: Mutex::new(Some(join)),
        })
    }
}

impl BridgeHandle {
    pub fn topic(&self) -> &str {
        &self.shared.topic
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    pub fn subscription(&self) -> SubscriptionStatus {
        SubscriptionStatus {
            topic: self.shared.topic.clone(),
            is_connected: self.is_connected(),
        }
    }

    pub fn stats(&self) -> BridgeStats {
        self.counters.snapshot()
    }

    /// Block until subscribed or `timeout` elapses.
    pub fn wait_until_connected(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.is_connected() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        self.is_connected()
    }

    /// Stop the worker; it unsubscribes and disconnects on the way out.
    ///
    /// Idempotent. Called from inside the event callback it only signals and
    /// detaches the worker: the worker stops once the callback returns, and
    /// later calls (including the owner's, or `Drop`) return without joining
    /// it, so `is_connected` may stay true until the worker clears it.
    pub fn teardown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        drop(lock(&self.wake).take());

        let Some(join) = lock(&self.join).take() else {
            return;
        };
        if join.thread().id() == thread::current().id() {
            return;
        }
        if join.join().is_err() {
            tracing::warn!(topic = %self.shared.topic, "realtime worker panicked");
        }
        self.shared.connected.store(false, Ordering::Release);
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct BridgeRuntime<T> {
    endpoint: Endpoint,
    reconnect_delay: Duration,
    transport: T,
    handler: MessageHandler,
    shared: Arc<Shared>,
    wake_rx: Receiver<()>,
}

impl<T> BridgeRuntime<T> {
    fn shutting_down(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }
}

fn run_bridge_loop<T: Transport>(runtime: BridgeRuntime<T>) {
    let span = tracing::info_span!("realtime_bridge", topic = %runtime.shared.topic);
    let _entered = span.enter();

    while !runtime.shutting_down() {
        runtime
            .handler
            .counters
            .connect_attempts
            .fetch_add(1, Ordering::Relaxed);
        match runtime.transport.connect(&runtime.endpoint) {
            Ok(connection) => {
                if let Err(err) = run_session(connection, &runtime) {
                    tracing::warn!(
                        "realtime subscription {} dropped: {err}",
                        runtime.shared.topic
                    );
                }
            }
            Err(err) => {
                tracing::warn!(
                    "realtime connect to {} failed: {err}",
                    runtime.endpoint.addr
                );
            }
        }
        runtime.shared.connected.store(false, Ordering::Release);

        if runtime.shutting_down() {
            break;
        }
        match runtime.wake_rx.recv_timeout(runtime.reconnect_delay) {
            Err(RecvTimeoutError::Timeout) => {
                tracing::debug!("reconnecting to {}", runtime.endpoint.addr);
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::debug!("realtime worker stopped");
}

fn run_session<T>(
    mut connection: Box<dyn Connection>,
    runtime: &BridgeRuntime<T>,
) -> Result<(), BridgeError> {
    let subscription = match connection.subscribe(&runtime.shared.topic) {
        Ok(id) => id,
        Err(err) => {
            let _ = connection.disconnect();
            return Err(err.into());
        }
    };
    runtime.shared.connected.store(true, Ordering::Release);
    runtime
        .handler
        .counters
        .sessions
        .fetch_add(1, Ordering::Relaxed);
    tracing::info!("subscribed to {}", runtime.shared.topic);

    let heartbeats = connection.heartbeats();
    let mut last_inbound = Instant::now();
    let mut last_outbound = Instant::now();

    let result = loop {
        if runtime.shutting_down() {
            break Ok(());
        }

        match connection.poll(POLL_SLICE) {
            Ok(Some(Inbound::Message { body, .. })) => {
                last_inbound = Instant::now();
                runtime.handler.handle(&body);
            }
            Ok(Some(Inbound::Heartbeat)) => last_inbound = Instant::now(),
            Ok(None) => {}
            Err(err) => break Err(err.into()),
        }

        if !heartbeats.outgoing.is_zero() && last_outbound.elapsed() >= heartbeats.outgoing {
            if let Err(err) = connection.heartbeat() {
                break Err(err.into());
            }
            last_outbound = Instant::now();
        }

        let silent = last_inbound.elapsed();
        if !heartbeats.incoming.is_zero() && silent > heartbeats.incoming * HEARTBEAT_GRACE {
            break Err(BridgeError::HeartbeatTimeout {
                silent_ms: silent.as_millis() as u64,
            });
        }
    };

    runtime.shared.connected.store(false, Ordering::Release);
    if result.is_ok()
        && let Err(err) = connection.unsubscribe(&subscription)
    {
        tracing::debug!("unsubscribe from {} failed: {err}", runtime.shared.topic);
    }
    if let Err(err) = connection.disconnect() {
        tracing::debug!("disconnect failed: {err}");
    }
    result
}
