//! Call negotiation test harness
//!
//! Provides in-process doubles for everything outside the negotiation core:
//! - In-memory signaling links with a controllable server side
//! - A relay joining two peers' links, like a signaling server would
//! - Scripted peer sessions that record every call made on them
//! - Capture and render surface doubles
//!
//! Basic usage pattern:
//!
//! 1. Create a `MemoryConnector` and a `ScriptedPeerFactory`
//! 2. Build a `CallOrchestrator` with `with_collaborators`
//! 3. Connect, then drive or observe the server side of the link
//! 4. Assert on envelopes, recorded peer calls, and engine state

#![allow(dead_code)]

pub mod media;
pub mod peer;
pub mod signaling;

use alloallo_webrtc::{
    CallConfig, CallOrchestrator, MediaCapture, NegotiationEngine, NegotiationState,
};
use std::sync::Arc;
use std::time::Duration;

pub use media::{DeniedCapture, RecordingSurface};
pub use peer::{PeerCall, ScriptedOptions, ScriptedPeer, ScriptedPeerFactory};
pub use signaling::{relay, MemoryConnector, RelayLog, ServerEnd, ServerEnds, Side};

/// How long harness helpers wait before giving up
pub const WAIT: Duration = Duration::from_secs(5);

/// Result type for test harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Error type for test harness operations
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error(transparent)]
    Call(#[from] alloallo_webrtc::Error),
}

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Configuration used by every harness peer
pub fn test_config(caller: &str, callee: &str) -> CallConfig {
    CallConfig::default()
        .with_signaling_url("ws://signaling.test/ws")
        .with_parties(caller, callee)
}

/// One orchestrator wired to harness doubles
pub struct TestPeer {
    pub orchestrator: CallOrchestrator,
    pub connector: Arc<MemoryConnector>,
    pub ends: ServerEnds,
    pub peers: Arc<ScriptedPeerFactory>,
    pub local_surface: Arc<RecordingSurface>,
    pub remote_surface: Arc<RecordingSurface>,
}

impl TestPeer {
    /// Peer with a working synthetic capture
    pub fn new(caller: &str, callee: &str) -> Self {
        Self::with_capture(
            caller,
            callee,
            Arc::new(alloallo_webrtc::SyntheticCapture::new(
                caller,
                Default::default(),
            )),
            ScriptedPeerFactory::new(),
        )
    }

    pub fn with_capture(
        caller: &str,
        callee: &str,
        capture: Arc<dyn MediaCapture>,
        peers: Arc<ScriptedPeerFactory>,
    ) -> Self {
        let (connector, ends) = MemoryConnector::new();
        let orchestrator = CallOrchestrator::with_collaborators(
            test_config(caller, callee),
            connector.clone(),
            capture,
            peers.clone(),
        )
        .unwrap();

        Self {
            orchestrator,
            connector,
            ends,
            peers,
            local_surface: RecordingSurface::new(),
            remote_surface: RecordingSurface::new(),
        }
    }

    pub fn engine(&self) -> &NegotiationEngine {
        self.orchestrator.engine()
    }

    /// Connect and return the server side of the new link
    pub async fn connect(&mut self) -> HarnessResult<ServerEnd> {
        self.orchestrator.connect().await?;
        self.ends.next().await
    }

    pub async fn start_call(&self) -> alloallo_webrtc::Result<()> {
        self.orchestrator
            .start_call(self.local_surface.clone(), self.remote_surface.clone())
            .await
    }

    pub async fn prepare_to_answer(&self) -> alloallo_webrtc::Result<()> {
        self.orchestrator
            .prepare_to_answer(self.local_surface.clone(), self.remote_surface.clone())
            .await
    }
}

/// Wait until `engine` reaches `state`
pub async fn wait_for_state(
    engine: &NegotiationEngine,
    state: NegotiationState,
) -> HarnessResult<()> {
    let poll = async {
        while engine.state() != state {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(WAIT, poll).await.map_err(|_| {
        HarnessError::Timeout(format!(
            "engine stuck in {} waiting for {}",
            engine.state(),
            state
        ))
    })
}

/// Wait until `check` holds
pub async fn eventually<F>(what: &str, check: F) -> HarnessResult<()>
where
    F: Fn() -> bool,
{
    let poll = async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(WAIT, poll)
        .await
        .map_err(|_| HarnessError::Timeout(what.to_string()))
}

/// Give spawned tasks a moment to process what was delivered
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Events broadcast so far and not yet received
pub fn drain_events(
    rx: &mut tokio::sync::broadcast::Receiver<alloallo_webrtc::CallEvent>,
) -> Vec<alloallo_webrtc::CallEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
