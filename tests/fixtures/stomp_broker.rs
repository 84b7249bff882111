#![allow(dead_code)]

use std::io::{BufReader, ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mfi_backoffice::realtime::stomp::{Frame, FrameReader, ReadItem, encode_frame};

struct Subscriber {
    id: String,
    destination: String,
    stream: TcpStream,
}

#[derive(Default)]
struct BrokerState {
    connects: AtomicUsize,
    reject_with: Mutex<Option<String>>,
    heart_beat: Mutex<String>,
    commands: Mutex<Vec<String>>,
    connect_headers: Mutex<Vec<Vec<(String, String)>>>,
    subscribers: Mutex<Vec<Subscriber>>,
    clients: Mutex<Vec<TcpStream>>,
    message_seq: AtomicUsize,
}

/// Minimal STOMP 1.2 broker on a loopback port.
pub struct LoopbackBroker {
    addr: SocketAddr,
    state: Arc<BrokerState>,
    shutdown: Arc<AtomicBool>,
    accept: Option<JoinHandle<()>>,
}

impl LoopbackBroker {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback broker");
        listener.set_nonblocking(true).expect("nonblocking listener");
        let addr = listener.local_addr().expect("broker addr");
        let state = Arc::new(BrokerState {
            heart_beat: Mutex::new("0,0".to_string()),
            ..BrokerState::default()
        });
        let shutdown = Arc::new(AtomicBool::new(false));

        let accept = {
            let state = Arc::clone(&state);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || accept_loop(listener, state, shutdown))
        };

        Self {
            addr,
            state,
            shutdown,
            accept: Some(accept),
        }
    }

    pub fn addr(&self) -> String {
        self.addr.to_string()
    }

    /// Answer every following CONNECT with an ERROR frame.
    pub fn reject_connects(&self, message: &str) {
        *self.state.reject_with.lock().unwrap() = Some(message.to_string());
    }

    pub fn accept_connects(&self) {
        *self.state.reject_with.lock().unwrap() = None;
    }

    pub fn set_heart_beat(&self, value: &str) {
        *self.state.heart_beat.lock().unwrap() = value.to_string();
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.commands.lock().unwrap().clone()
    }

    pub fn connect_header(&self, name: &str) -> Option<String> {
        let headers = self.state.connect_headers.lock().unwrap();
        headers.last().and_then(|frame| {
            frame
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        })
    }

    pub fn subscriber_count(&self, destination: &str) -> usize {
        self.state
            .subscribers
            .lock()
            .unwrap()
            .iter()
            .filter(|sub| sub.destination == destination)
            .count()
    }

    /// Send a MESSAGE to every subscriber of `destination`.
    pub fn publish(&self, destination: &str, body: &[u8]) -> usize {
        let subs = self.state.subscribers.lock().unwrap();
        let mut delivered = 0;
        for sub in subs.iter().filter(|sub| sub.destination == destination) {
            let seq = self.state.message_seq.fetch_add(1, Ordering::SeqCst);
            let frame = Frame::new("MESSAGE")
                .header("destination", destination)
                .header("subscription", sub.id.as_str())
                .header("message-id", format!("m-{seq}"))
                .header("content-type", "application/json")
                .body(body.to_vec());
            if (&sub.stream).write_all(&encode_frame(&frame)).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Close every client socket from the broker side.
    pub fn kick_all(&self) {
        self.state.subscribers.lock().unwrap().clear();
        for stream in self.state.clients.lock().unwrap().drain(..) {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

impl Drop for LoopbackBroker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.kick_all();
        if let Some(accept) = self.accept.take() {
            let _ = accept.join();
        }
    }
}

fn accept_loop(listener: TcpListener, state: Arc<BrokerState>, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                let _ = stream.set_nonblocking(false);
                let state = Arc::clone(&state);
                thread::spawn(move || serve_client(stream, state));
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(5));
            }
            Err(_) => break,
        }
    }
}

fn serve_client(stream: TcpStream, state: Arc<BrokerState>) {
    let Ok(read_half) = stream.try_clone() else {
        return;
    };
    if let Ok(clone) = stream.try_clone() {
        state.clients.lock().unwrap().push(clone);
    }
    let mut reader = FrameReader::new(BufReader::new(read_half), 1 << 20);
    let mut writer = &stream;

    loop {
        let frame = match reader.read_next() {
            Ok(Some(ReadItem::Frame(frame))) => frame,
            Ok(Some(ReadItem::Heartbeat)) => continue,
            Ok(None) | Err(_) => break,
        };
        state.commands.lock().unwrap().push(frame.command.clone());

        match frame.command.as_str() {
            "CONNECT" | "STOMP" => {
                state.connects.fetch_add(1, Ordering::SeqCst);
                state
                    .connect_headers
                    .lock()
                    .unwrap()
                    .push(frame.headers.clone());
                let reject = state.reject_with.lock().unwrap().clone();
                if let Some(message) = reject {
                    let error = Frame::new("ERROR").header("message", message);
                    let _ = writer.write_all(&encode_frame(&error));
                    break;
                }
                let heart_beat = state.heart_beat.lock().unwrap().clone();
                let connected = Frame::new("CONNECTED")
                    .header("version", "1.2")
                    .header("server", "loopback/0.1")
                    .header("heart-beat", heart_beat);
                if writer.write_all(&encode_frame(&connected)).is_err() {
                    break;
                }
            }
            "SUBSCRIBE" => {
                let (Some(id), Some(destination), Ok(sub_stream)) = (
                    frame.get("id"),
                    frame.get("destination"),
                    stream.try_clone(),
                ) else {
                    continue;
                };
                state.subscribers.lock().unwrap().push(Subscriber {
                    id: id.to_string(),
                    destination: destination.to_string(),
                    stream: sub_stream,
                });
            }
            "UNSUBSCRIBE" => {
                if let Some(id) = frame.get("id") {
                    state.subscribers.lock().unwrap().retain(|sub| sub.id != id);
                }
            }
            "DISCONNECT" => {
                if let Some(receipt) = frame.get("receipt") {
                    let ack = Frame::new("RECEIPT").header("receipt-id", receipt);
                    let _ = writer.write_all(&encode_frame(&ack));
                }
                break;
            }
            _ => {}
        }
    }
    let _ = stream.shutdown(Shutdown::Both);
}
