#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam::channel::{RecvTimeoutError, Sender};

use mfi_backoffice::realtime::{
    Connection, Endpoint, HeartbeatPolicy, Inbound, SubscriptionId, Transport, TransportError,
};

/// In-memory broker behind [`FakeTransport`]. Clones share state.
#[derive(Clone, Default)]
pub struct FakeBroker {
    state: Arc<BrokerState>,
}

#[derive(Default)]
struct BrokerState {
    connects: AtomicUsize,
    fail_next: AtomicUsize,
    disconnects: AtomicUsize,
    unsubscribes: AtomicUsize,
    heartbeats_sent: AtomicUsize,
    heartbeats: Mutex<HeartbeatPolicy>,
    subscriptions: Mutex<Vec<String>>,
    live: Mutex<Option<Sender<Result<Inbound, TransportError>>>>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(&self) -> FakeTransport {
        FakeTransport {
            broker: self.clone(),
        }
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.state.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn set_heartbeats(&self, policy: HeartbeatPolicy) {
        *self.state.heartbeats.lock().unwrap() = policy;
    }

    /// Deliver a message on the live connection. False when none is live.
    pub fn publish(&self, body: &[u8]) -> bool {
        let live = self.state.live.lock().unwrap();
        let Some(tx) = live.as_ref() else {
            return false;
        };
        tx.send(Ok(Inbound::Message {
            destination: self.subscriptions().last().cloned().unwrap_or_default(),
            subscription: None,
            body: body.to_vec(),
        }))
        .is_ok()
    }

    pub fn send_heartbeat(&self) -> bool {
        let live = self.state.live.lock().unwrap();
        live.as_ref()
            .is_some_and(|tx| tx.send(Ok(Inbound::Heartbeat)).is_ok())
    }

    /// Kill the live connection as if the peer went away.
    pub fn drop_connection(&self) {
        if let Some(tx) = self.state.live.lock().unwrap().take() {
            let _ = tx.send(Err(TransportError::Closed));
        }
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    pub fn unsubscribes(&self) -> usize {
        self.state.unsubscribes.load(Ordering::SeqCst)
    }

    pub fn heartbeats_sent(&self) -> usize {
        self.state.heartbeats_sent.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.state.subscriptions.lock().unwrap().clone()
    }
}

pub struct FakeTransport {
    broker: FakeBroker,
}

impl Transport for FakeTransport {
    fn connect(&self, _endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError> {
        let state = &self.broker.state;
        state.connects.fetch_add(1, Ordering::SeqCst);
        let pending_failures = state.fail_next.load(Ordering::SeqCst);
        if pending_failures > 0 {
            state.fail_next.store(pending_failures - 1, Ordering::SeqCst);
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }

        let (tx, rx) = crossbeam::channel::unbounded();
        *state.live.lock().unwrap() = Some(tx);
        Ok(Box::new(FakeConnection {
            broker: self.broker.clone(),
            rx,
            heartbeats: *state.heartbeats.lock().unwrap(),
            closed: false,
        }))
    }
}

struct FakeConnection {
    broker: FakeBroker,
    rx: crossbeam::channel::Receiver<Result<Inbound, TransportError>>,
    heartbeats: HeartbeatPolicy,
    closed: bool,
}

impl Connection for FakeConnection {
    fn subscribe(&mut self, topic: &str) -> Result<SubscriptionId, TransportError> {
        let mut subs = self.broker.state.subscriptions.lock().unwrap();
        subs.push(topic.to_string());
        Ok(SubscriptionId(format!("fake-{}", subs.len())))
    }

    fn unsubscribe(&mut self, _id: &SubscriptionId) -> Result<(), TransportError> {
        self.broker.state.unsubscribes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<Inbound>, TransportError> {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(inbound)) => Ok(Some(inbound)),
            Ok(Err(err)) => Err(err),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn heartbeat(&mut self) -> Result<(), TransportError> {
        self.broker.state.heartbeats_sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn heartbeats(&self) -> HeartbeatPolicy {
        self.heartbeats
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        if !self.closed {
            self.closed = true;
            self.broker.state.disconnects.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
