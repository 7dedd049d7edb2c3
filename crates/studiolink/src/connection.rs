//! Connection supervisor.
//!
//! Owns the single WebSocket to the studio: connects, pumps frames in both
//! directions, and reconnects after a fixed delay whenever the connection
//! drops or an attempt fails.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use studiolink_telemetry::{
    log_connected, log_disconnected, log_reconnect_scheduled, MetricsRegistry,
};

use crate::error::{ConnectionError, TransportError};
use crate::protocol;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Events delivered to the engine, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Opened,
    Message(Value),
    /// `clean` is set when the close was requested locally.
    Closed { reason: String, clean: bool },
}

/// Studio address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

/// Supervisor timing and logging settings.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Delay before each reconnect attempt.
    pub reconnect_delay: Duration,
    /// Upper bound for a single connect attempt.
    pub connect_timeout: Duration,
    /// Log every frame (trimmed, chatty topics excluded).
    pub log_messages: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(2000),
            connect_timeout: Duration::from_secs(5),
            log_messages: false,
        }
    }
}

/// Outbound side of the connection.
pub trait Transport: Send + Sync {
    /// Queue a text frame. Fails when no connection is open.
    fn transmit(&self, text: String) -> Result<(), TransportError>;
}

struct Running {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

type FirstAttempt = oneshot::Sender<Result<(), ConnectionError>>;

/// Keeps one connection to the studio alive.
pub struct ConnectionSupervisor {
    config: SupervisorConfig,
    metrics: Arc<MetricsRegistry>,
    state_tx: watch::Sender<ConnectionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    running: Mutex<Option<Running>>,
}

impl ConnectionSupervisor {
    pub fn new(config: SupervisorConfig, metrics: Arc<MetricsRegistry>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            metrics,
            state_tx,
            outbound: Mutex::new(None),
            running: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Start the connection loop and wait for the first attempt.
    ///
    /// The loop keeps retrying after a failed first attempt; call
    /// [`disconnect`](Self::disconnect) to stop it. A running loop is
    /// stopped before the new one starts.
    pub async fn connect(
        self: &Arc<Self>,
        endpoint: Endpoint,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<(), ConnectionError> {
        self.disconnect().await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (first_tx, first_rx) = oneshot::channel();
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            this.connection_loop(endpoint.url(), shutdown_rx, events, first_tx)
                .await;
        });
        *self.running.lock() = Some(Running { shutdown_tx, task });

        first_rx
            .await
            .unwrap_or_else(|_| Err(ConnectionError::Aborted))
    }

    /// Close the connection and cancel any pending reconnect. Idempotent.
    pub async fn disconnect(&self) {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };
        let _ = running.shutdown_tx.send(true);
        if let Err(e) = running.task.await {
            tracing::warn!(error = %e, "Connection task ended abnormally");
        }
        self.outbound.lock().take();
        self.set_state(ConnectionState::Disconnected);
    }

    async fn connection_loop(
        self: Arc<Self>,
        url: String,
        mut shutdown_rx: watch::Receiver<bool>,
        events: mpsc::UnboundedSender<ConnectionEvent>,
        first_tx: FirstAttempt,
    ) {
        let mut first = Some(first_tx);

        loop {
            if *shutdown_rx.borrow() {
                return;
            }

            self.set_state(ConnectionState::Connecting);
            self.metrics.connect_attempts_total.inc();
            tracing::info!(url = %url, "Connecting to studio");

            let result = self
                .try_connect(&url, &mut shutdown_rx, &events, &mut first)
                .await;
            self.outbound.lock().take();

            match result {
                Ok(()) => return,
                Err(e) => {
                    self.metrics.connection_closed();
                    log_disconnected!(url = %url, error = %e, "Studio connection failed");
                    self.set_state(ConnectionState::Failed);
                    self.set_state(ConnectionState::Disconnected);
                    let _ = events.send(ConnectionEvent::Closed {
                        reason: e.to_string(),
                        clean: false,
                    });
                    if let Some(tx) = first.take() {
                        let _ = tx.send(Err(e));
                    }
                }
            }

            log_reconnect_scheduled!(
                delay_ms = self.config.reconnect_delay.as_millis() as u64,
                "Reconnect scheduled"
            );
            self.metrics.reconnects_total.inc();

            tokio::select! {
                _ = shutdown_requested(&mut shutdown_rx) => return,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
    }

    /// One connection attempt. `Ok` means a requested shutdown, `Err` a
    /// failure that warrants a reconnect.
    async fn try_connect(
        &self,
        url: &str,
        shutdown_rx: &mut watch::Receiver<bool>,
        events: &mpsc::UnboundedSender<ConnectionEvent>,
        first: &mut Option<FirstAttempt>,
    ) -> Result<(), ConnectionError> {
        let attempt = tokio::time::timeout(self.config.connect_timeout, connect_async(url));
        let (ws_stream, _response) = tokio::select! {
            _ = shutdown_requested(shutdown_rx) => {
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }
            result = attempt => match result {
                Err(_) => {
                    return Err(ConnectionError::Timeout {
                        url: url.to_string(),
                        timeout_ms: self.config.connect_timeout.as_millis() as u64,
                    })
                }
                Ok(Err(source)) => {
                    return Err(ConnectionError::Handshake {
                        url: url.to_string(),
                        source,
                    })
                }
                Ok(Ok(pair)) => pair,
            },
        };

        let (mut sink, mut stream) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        *self.outbound.lock() = Some(out_tx);

        self.set_state(ConnectionState::Open);
        self.metrics.connection_opened();
        log_connected!(url = %url, "Connected to studio");
        if let Some(tx) = first.take() {
            let _ = tx.send(Ok(()));
        }
        let _ = events.send(ConnectionEvent::Opened);

        loop {
            tokio::select! {
                _ = shutdown_requested(shutdown_rx) => {
                    self.set_state(ConnectionState::Closing);
                    self.outbound.lock().take();
                    if let Err(e) = sink.close().await {
                        tracing::debug!(error = %e, "Error while closing studio connection");
                    }
                    self.metrics.connection_closed();
                    self.set_state(ConnectionState::Disconnected);
                    let _ = events.send(ConnectionEvent::Closed {
                        reason: "disconnected".to_string(),
                        clean: true,
                    });
                    return Ok(());
                }

                Some(text) = out_rx.recv() => {
                    self.log_frame("send", &text);
                    sink.send(Message::Text(text.into())).await?;
                }

                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        self.log_frame("recv", text.as_str());
                        match serde_json::from_str::<Value>(text.as_str()) {
                            Ok(value) => {
                                let _ = events.send(ConnectionEvent::Message(value));
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Dropping frame that is not JSON");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(ConnectionError::ClosedByPeer);
                    }
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    fn set_state(&self, next: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            tracing::info!(from = %current, to = %next, "Connection state changed");
            *current = next;
            true
        });
    }

    fn log_frame(&self, direction: &str, text: &str) {
        if self.config.log_messages && protocol::should_log_frame(text) {
            tracing::info!(
                direction,
                frame = %protocol::trim_frame(text),
                "Studio frame"
            );
        }
    }
}

impl Transport for ConnectionSupervisor {
    fn transmit(&self, text: String) -> Result<(), TransportError> {
        let outbound = self.outbound.lock();
        let tx = outbound.as_ref().ok_or(TransportError::NotConnected)?;
        tx.send(text).map_err(|_| TransportError::NotConnected)
    }
}

/// Resolves once shutdown was requested or the handle is gone.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
