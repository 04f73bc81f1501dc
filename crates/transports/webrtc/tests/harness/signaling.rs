//! In-memory signaling links
//!
//! `MemoryConnector` hands the client a `ChannelLink` and the test the
//! matching `ServerEnd`. Dropping a `ServerEnd` closes the link from the
//! server side, so tests must keep it alive for as long as the link should
//! stay open.

use super::{HarnessError, HarnessResult, WAIT};
use alloallo_webrtc::{ChannelConnector, ChannelLink, Envelope, Error, TransportEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Connector producing in-memory links
pub struct MemoryConnector {
    attempts: AtomicUsize,
    refuse: AtomicBool,
    ends: mpsc::UnboundedSender<ServerEnd>,
}

impl MemoryConnector {
    pub fn new() -> (Arc<Self>, ServerEnds) {
        let (ends, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            attempts: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
            ends,
        });
        (connector, ServerEnds { rx })
    }

    /// Connection attempts seen so far, refused ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Refuse (or accept again) further connection attempts
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChannelConnector for MemoryConnector {
    async fn connect(&self, endpoint: &str) -> alloallo_webrtc::Result<ChannelLink> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::WebSocketError(format!(
                "connection to {} refused",
                endpoint
            )));
        }

        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();
        let _ = self.ends.send(ServerEnd {
            attempt,
            opened_at: Instant::now(),
            from_client,
            to_client,
        });
        Ok(ChannelLink { outbound, inbound })
    }
}

/// Stream of server ends, one per accepted connection
pub struct ServerEnds {
    rx: mpsc::UnboundedReceiver<ServerEnd>,
}

impl ServerEnds {
    /// Wait for the next accepted connection
    pub async fn next(&mut self) -> HarnessResult<ServerEnd> {
        match tokio::time::timeout(WAIT, self.rx.recv()).await {
            Ok(Some(end)) => Ok(end),
            Ok(None) => Err(HarnessError::ConnectionError(
                "connector dropped".to_string(),
            )),
            Err(_) => Err(HarnessError::Timeout(
                "no connection accepted".to_string(),
            )),
        }
    }

    /// True when no connection is accepted within `window`
    pub async fn none_within(&mut self, window: Duration) -> bool {
        !matches!(
            tokio::time::timeout(window, self.rx.recv()).await,
            Ok(Some(_))
        )
    }
}

/// Server side of one in-memory link
pub struct ServerEnd {
    pub attempt: usize,
    pub opened_at: Instant,
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<TransportEvent>,
}

impl ServerEnd {
    /// Next raw frame sent by the client
    pub async fn next_frame(&mut self) -> HarnessResult<String> {
        match tokio::time::timeout(WAIT, self.from_client.recv()).await {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => Err(HarnessError::ConnectionError(
                "client closed the link".to_string(),
            )),
            Err(_) => Err(HarnessError::Timeout("no frame from client".to_string())),
        }
    }

    /// Next envelope sent by the client
    pub async fn next_envelope(&mut self) -> HarnessResult<Envelope> {
        let frame = self.next_frame().await?;
        Envelope::decode(&frame).map_err(|e| HarnessError::ProtocolError(e.to_string()))
    }

    /// Next envelope of `kind`, skipping others
    pub async fn next_of_kind(&mut self, kind: &str) -> HarnessResult<Envelope> {
        loop {
            let envelope = self.next_envelope().await?;
            if envelope.kind() == kind {
                return Ok(envelope);
            }
        }
    }

    /// Everything the client has sent and not yet been read
    pub fn drain(&mut self) -> Vec<Envelope> {
        let mut envelopes = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            if let Ok(envelope) = Envelope::decode(&frame) {
                envelopes.push(envelope);
            }
        }
        envelopes
    }

    pub fn deliver(&self, envelope: &Envelope) {
        let frame = envelope.encode().unwrap();
        self.deliver_raw(&frame);
    }

    pub fn deliver_raw(&self, frame: &str) {
        let _ = self
            .to_client
            .send(TransportEvent::Message(frame.to_string()));
    }

    /// Report a transport error without closing
    pub fn fail(&self, error: &str) {
        let _ = self.to_client.send(TransportEvent::Error(error.to_string()));
    }

    /// Close the link from the server side
    pub fn close(self, reason: Option<&str>) {
        let _ = self
            .to_client
            .send(TransportEvent::Closed(reason.map(str::to_string)));
    }
}

/// Which side of a relay sent a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

/// Frames forwarded by a relay, in forwarding order
#[derive(Clone, Default)]
pub struct RelayLog {
    frames: Arc<Mutex<Vec<(Side, String)>>>,
}

impl RelayLog {
    /// Envelopes sent by `side`
    pub fn sent_by(&self, side: Side) -> Vec<Envelope> {
        self.frames
            .lock()
            .iter()
            .filter(|(s, _)| *s == side)
            .filter_map(|(_, frame)| Envelope::decode(frame).ok())
            .collect()
    }

    /// Number of `kind` envelopes sent by `side`
    pub fn count(&self, side: Side, kind: &str) -> usize {
        self.sent_by(side)
            .iter()
            .filter(|envelope| envelope.kind() == kind)
            .count()
    }
}

/// Forward every frame between two links, like a signaling server would
pub fn relay(a: ServerEnd, b: ServerEnd) -> RelayLog {
    let log = RelayLog::default();
    let ServerEnd {
        from_client: from_a,
        to_client: to_a,
        ..
    } = a;
    let ServerEnd {
        from_client: from_b,
        to_client: to_b,
        ..
    } = b;

    tokio::spawn(forward(Side::A, from_a, to_b, log.clone()));
    tokio::spawn(forward(Side::B, from_b, to_a, log.clone()));
    log
}

async fn forward(
    side: Side,
    mut from: mpsc::UnboundedReceiver<String>,
    to: mpsc::UnboundedSender<TransportEvent>,
    log: RelayLog,
) {
    while let Some(frame) = from.recv().await {
        log.frames.lock().push((side, frame.clone()));
        if to.send(TransportEvent::Message(frame)).is_err() {
            break;
        }
    }
}
