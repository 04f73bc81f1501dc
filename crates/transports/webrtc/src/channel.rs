//! Reconnecting control channel to the signaling endpoint
//!
//! The channel only frames and delivers text; it knows nothing about
//! negotiation. A closed connection (including a failed attempt) is retried
//! after a fixed delay, forever, until [`ControlChannel::reset`] is called.

use crate::protocol::Envelope;
use crate::{Error, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};

/// What the transport reports about an open connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One inbound text frame
    Message(String),

    /// Transport error; logged only, closure follows separately if fatal
    Error(String),

    /// The connection is gone
    Closed(Option<String>),
}

/// Both directions of an established connection
///
/// Dropping `outbound` closes the connection. The connection is considered
/// closed once `inbound` yields [`TransportEvent::Closed`] or ends.
pub struct ChannelLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens duplex text connections
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<ChannelLink>;
}

/// Single consumer of inbound frames
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one frame; the next frame is not delivered until this returns
    async fn on_message(&self, frame: String);
}

/// WebSocket transport over tokio-tungstenite
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl ChannelConnector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<ChannelLink> {
        let (stream, _response) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| {
                Error::WebSocketError(format!("Failed to connect to {}: {}", endpoint, e))
            })?;

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    warn!("WebSocket write failed: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            let mut reason = None;
            while let Some(item) = source.next().await {
                let event = match item {
                    Ok(Message::Text(text)) => TransportEvent::Message(text),
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => TransportEvent::Message(text),
                        Err(_) => TransportEvent::Error("non UTF-8 binary frame".to_string()),
                    },
                    Ok(Message::Close(frame)) => {
                        reason = frame.map(|f| format!("{} {}", f.code, f.reason));
                        break;
                    }
                    Ok(_) => continue,
                    Err(tungstenite::Error::ConnectionClosed)
                    | Err(tungstenite::Error::AlreadyClosed) => break,
                    Err(e) => TransportEvent::Error(e.to_string()),
                };
                if inbound_tx.send(event).is_err() {
                    return;
                }
            }
            let _ = inbound_tx.send(TransportEvent::Closed(reason));
        });

        Ok(ChannelLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

enum LinkState {
    Disconnected,
    Connecting {
        attempt: u64,
    },
    Open {
        attempt: u64,
        outbound: mpsc::UnboundedSender<String>,
        pump: JoinHandle<()>,
    },
}

struct ChannelShared {
    endpoint: String,
    reconnect_delay: Duration,
    connector: Arc<dyn ChannelConnector>,
    link: Mutex<LinkState>,
    handler: RwLock<Option<Arc<dyn MessageHandler>>>,
    /// Bumped by reset; reconnects scheduled under an older epoch are void
    epoch: AtomicU64,
    attempts: AtomicU64,
}

/// Persistent, self-healing duplex text channel
#[derive(Clone)]
pub struct ControlChannel {
    shared: Arc<ChannelShared>,
}

impl ControlChannel {
    /// Create a channel to `endpoint`; nothing is opened until [`connect`](Self::connect)
    pub fn new(
        endpoint: &str,
        reconnect_delay: Duration,
        connector: Arc<dyn ChannelConnector>,
    ) -> Self {
        Self {
            shared: Arc::new(ChannelShared {
                endpoint: endpoint.to_string(),
                reconnect_delay,
                connector,
                link: Mutex::new(LinkState::Disconnected),
                handler: RwLock::new(None),
                epoch: AtomicU64::new(0),
                attempts: AtomicU64::new(0),
            }),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.shared.reconnect_delay
    }

    /// Number of connection attempts made so far
    pub fn connect_attempts(&self) -> u64 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.shared.link.lock(), LinkState::Open { .. })
    }

    /// Register the consumer of inbound frames, replacing any previous one
    pub fn on_message(&self, handler: Arc<dyn MessageHandler>) {
        *self.shared.handler.write() = Some(handler);
    }

    /// Open the connection
    ///
    /// No-op while a connection is open or being opened. A failed attempt is
    /// returned to the caller and a reconnect is already scheduled.
    pub async fn connect(&self) -> Result<()> {
        let attempt = {
            let mut link = self.shared.link.lock();
            if !matches!(*link, LinkState::Disconnected) {
                debug!("Control channel already open or connecting");
                return Ok(());
            }
            let attempt = self.shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            *link = LinkState::Connecting { attempt };
            attempt
        };
        let epoch = self.shared.epoch.load(Ordering::SeqCst);

        info!(endpoint = %self.shared.endpoint, attempt, "Connecting control channel");

        match self.shared.connector.connect(&self.shared.endpoint).await {
            Ok(link) => {
                let mut state = self.shared.link.lock();
                let current = matches!(*state, LinkState::Connecting { attempt: a } if a == attempt);
                if !current || self.shared.epoch.load(Ordering::SeqCst) != epoch {
                    debug!(attempt, "Discarding connection opened after reset");
                    return Ok(());
                }

                let pump = tokio::spawn(pump(
                    Arc::clone(&self.shared),
                    attempt,
                    epoch,
                    link.inbound,
                ));
                *state = LinkState::Open {
                    attempt,
                    outbound: link.outbound,
                    pump,
                };
                info!(endpoint = %self.shared.endpoint, attempt, "WebSocket connected");
                Ok(())
            }
            Err(e) => {
                error!(endpoint = %self.shared.endpoint, attempt, "WebSocket error: {}", e);
                let mut state = self.shared.link.lock();
                if matches!(*state, LinkState::Connecting { attempt: a } if a == attempt) {
                    *state = LinkState::Disconnected;
                    drop(state);
                    schedule_reconnect(&self.shared, epoch);
                }
                Err(e)
            }
        }
    }

    /// Send an envelope
    ///
    /// Never fails: when the channel is not open the envelope is dropped and
    /// logged. Returns whether it was handed to the transport.
    pub fn send(&self, envelope: &Envelope) -> bool {
        let frame = match envelope.encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!(kind = envelope.kind(), "Cannot encode message: {}", e);
                return false;
            }
        };

        let sent = match &*self.shared.link.lock() {
            LinkState::Open { outbound, .. } => outbound.send(frame).is_ok(),
            _ => false,
        };
        if sent {
            debug!(kind = envelope.kind(), "Message sent");
        } else {
            error!(
                kind = envelope.kind(),
                "Cannot send message, WebSocket is not open."
            );
        }
        sent
    }

    /// Close the connection without triggering a reconnect
    ///
    /// A reconnect already waiting out its delay is cancelled too.
    pub fn reset(&self) {
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        let previous = std::mem::replace(&mut *self.shared.link.lock(), LinkState::Disconnected);
        if let LinkState::Open { pump, .. } = previous {
            pump.abort();
        }
        info!(endpoint = %self.shared.endpoint, "WebSocket reset and closed.");
    }
}

/// Deliver inbound frames one at a time until the connection closes
async fn pump(
    shared: Arc<ChannelShared>,
    attempt: u64,
    epoch: u64,
    mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
) {
    let mut reason = None;
    while let Some(event) = inbound.recv().await {
        match event {
            TransportEvent::Message(frame) => {
                let handler = shared.handler.read().clone();
                match handler {
                    Some(handler) => handler.on_message(frame).await,
                    None => warn!("No message handler registered, dropping frame"),
                }
            }
            TransportEvent::Error(e) => error!(endpoint = %shared.endpoint, "WebSocket error: {}", e),
            TransportEvent::Closed(r) => {
                reason = r;
                break;
            }
        }
    }

    info!(
        endpoint = %shared.endpoint,
        reason = reason.as_deref().unwrap_or("none"),
        "WebSocket connection closed"
    );

    let mut state = shared.link.lock();
    if !matches!(*state, LinkState::Open { attempt: a, .. } if a == attempt) {
        return;
    }
    *state = LinkState::Disconnected;
    drop(state);

    if shared.epoch.load(Ordering::SeqCst) == epoch {
        schedule_reconnect(&shared, epoch);
    }
}

fn schedule_reconnect(shared: &Arc<ChannelShared>, epoch: u64) {
    let shared = Arc::clone(shared);
    let delay = shared.reconnect_delay;
    info!(delay_ms = delay.as_millis() as u64, "Scheduling reconnect");

    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if shared.epoch.load(Ordering::SeqCst) != epoch {
            debug!("Reconnect cancelled by reset");
            return;
        }
        info!("Reconnecting WebSocket...");
        let channel = ControlChannel { shared };
        // Failures reschedule themselves
        let _ = channel.connect().await;
    });
}
