//! MockStudio: scripted WebSocket studio for integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// Errors from MockStudio operations.
#[derive(Debug, Error)]
pub enum StudioError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builds the reply body for a request. `None` leaves the request unanswered.
pub type Responder = Box<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

struct Peer {
    outbound: mpsc::UnboundedSender<Message>,
    task: JoinHandle<()>,
}

struct Shared {
    received: Mutex<Vec<Value>>,
    responder: Mutex<Responder>,
    peers: Mutex<Vec<Peer>>,
    accepted: AtomicUsize,
    changed: Notify,
}

/// A fake studio listening on localhost.
///
/// Every text frame is recorded. Requests carrying a `message-id` are
/// answered with the responder's body plus the echoed id; the default
/// responder answers `{"status": "ok"}`.
pub struct MockStudio {
    port: u16,
    shared: Arc<Shared>,
    accept_task: JoinHandle<()>,
}

impl MockStudio {
    /// Start on an OS-assigned port.
    pub async fn start() -> Result<Self, StudioError> {
        Self::start_on(0).await
    }

    /// Start on a given port (0 picks one).
    pub async fn start_on(port: u16) -> Result<Self, StudioError> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let port = listener.local_addr()?.port();

        let shared = Arc::new(Shared {
            received: Mutex::new(Vec::new()),
            responder: Mutex::new(Box::new(|_| Some(json!({"status": "ok"})))),
            peers: Mutex::new(Vec::new()),
            accepted: AtomicUsize::new(0),
            changed: Notify::new(),
        });

        let accept_shared = shared.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let shared = accept_shared.clone();
                tokio::spawn(serve(stream, shared));
            }
        });

        Ok(Self {
            port,
            shared,
            accept_task,
        })
    }

    pub fn host(&self) -> &'static str {
        "127.0.0.1"
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Replace the reply logic.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        *self.shared.responder.lock() = Box::new(responder);
    }

    /// Every frame received so far, in arrival order.
    pub fn received(&self) -> Vec<Value> {
        self.shared.received.lock().clone()
    }

    /// Frames whose `request-type` equals `request_type`.
    pub fn received_of_type(&self, request_type: &str) -> Vec<Value> {
        self.shared
            .received
            .lock()
            .iter()
            .filter(|v| v.get("request-type").and_then(Value::as_str) == Some(request_type))
            .cloned()
            .collect()
    }

    /// Wait until a request of the given type arrives.
    pub async fn wait_for_request(&self, request_type: &str, timeout: Duration) -> Option<Value> {
        self.wait_until(timeout, || self.received_of_type(request_type).into_iter().next())
            .await
    }

    /// Wait until at least `count` requests of the given type have arrived.
    pub async fn wait_for_requests(
        &self,
        request_type: &str,
        count: usize,
        timeout: Duration,
    ) -> Option<Vec<Value>> {
        self.wait_until(timeout, || {
            let frames = self.received_of_type(request_type);
            (frames.len() >= count).then_some(frames)
        })
        .await
    }

    /// Wait until `count` connections have been accepted in total.
    pub async fn wait_for_connections(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, || (self.connection_count() >= count).then_some(()))
            .await
            .is_some()
    }

    /// Total connections accepted since start.
    pub fn connection_count(&self) -> usize {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    /// Connections still open.
    pub fn open_connections(&self) -> usize {
        let mut peers = self.shared.peers.lock();
        peers.retain(|p| !p.task.is_finished());
        peers.len()
    }

    /// Send a frame to every connected client.
    pub fn push(&self, frame: Value) {
        let text = frame.to_string();
        for peer in self.shared.peers.lock().iter() {
            let _ = peer.outbound.send(Message::text(text.clone()));
        }
    }

    /// Drop every open connection without a close handshake.
    pub fn drop_connections(&self) {
        for peer in self.shared.peers.lock().drain(..) {
            peer.task.abort();
        }
    }

    async fn wait_until<T>(&self, timeout: Duration, check: impl Fn() -> Option<T>) -> Option<T> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let changed = self.shared.changed.notified();
            if let Some(found) = check() {
                return Some(found);
            }
            if tokio::time::timeout_at(deadline, changed).await.is_err() {
                return check();
            }
        }
    }
}

impl Drop for MockStudio {
    fn drop(&mut self) {
        self.accept_task.abort();
        self.drop_connections();
    }
}

async fn serve(stream: TcpStream, shared: Arc<Shared>) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let reply_tx = tx.clone();
    let reader_shared = shared.clone();
    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                outgoing = rx.recv() => {
                    let Some(msg) = outgoing else { break };
                    if sink.send(msg).await.is_err() {
                        break;
                    }
                }
                incoming = stream.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                                continue;
                            };
                            if let Some(reply) = answer(&reader_shared, &frame) {
                                let _ = reply_tx.send(Message::text(reply.to_string()));
                            }
                            reader_shared.received.lock().push(frame);
                            reader_shared.changed.notify_waiters();
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = sink.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
        reader_shared.changed.notify_waiters();
    });

    shared.peers.lock().push(Peer { outbound: tx, task });
    shared.accepted.fetch_add(1, Ordering::SeqCst);
    shared.changed.notify_waiters();
}

fn answer(shared: &Shared, frame: &Value) -> Option<Value> {
    let message_id = frame.get("message-id")?.clone();
    let mut reply = {
        let responder = shared.responder.lock();
        (*responder)(frame)?
    };
    if let Value::Object(map) = &mut reply {
        map.insert("message-id".to_string(), message_id);
    }
    Some(reply)
}

/// Find an available TCP port.
pub fn find_available_port() -> Result<u16, StudioError> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}
