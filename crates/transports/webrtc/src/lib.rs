//! Call negotiation core for one-to-one WebRTC audio/video calls
//!
//! Two parties establish a direct media session by exchanging offers,
//! answers and ICE candidates through a signaling server. This crate owns the
//! persistent control channel to that server, drives the peer-session state
//! machine, and recovers from channel loss.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  Presentation (RenderSurface / MediaCapture)         │
//! │  ↓ start_call / prepare_to_answer / reset            │
//! │  CallOrchestrator                                    │
//! │  ├─ NegotiationEngine (state machine, one session)  │
//! │  │   └─ PeerSession (webrtc-rs RTCPeerConnection)   │
//! │  ├─ MessageRouter (offer / answer / candidate)      │
//! │  └─ ControlChannel (WebSocket, fixed-delay retry)   │
//! │     ↓                                                │
//! │  Signaling server                                    │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use alloallo_webrtc::CallConfig;
//!
//! let config = CallConfig::default()
//!     .with_signaling_url("ws://localhost:8080/ws")
//!     .with_parties("peerA", "peerB");
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.reconnect_delay_ms, 3000);
//! ```
//!
//! ## Async Usage
//!
//! ```no_run
//! use alloallo_webrtc::{CallConfig, CallOrchestrator, LogSurface, SyntheticCapture};
//! use std::sync::Arc;
//!
//! # async fn example() -> alloallo_webrtc::Result<()> {
//! let orchestrator =
//!     CallOrchestrator::new(CallConfig::default(), Arc::new(SyntheticCapture::default()))?;
//!
//! orchestrator.connect().await?;
//! orchestrator
//!     .start_call(
//!         Arc::new(LogSurface::new("local")),
//!         Arc::new(LogSurface::new("remote")),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod channel;
pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod media;
pub mod negotiation;
pub mod orchestrator;
pub mod peer;
pub mod protocol;
pub mod router;

pub use channel::{ChannelConnector, ChannelLink, ControlChannel, MessageHandler, TransportEvent, WebSocketConnector};
pub use config::{CallConfig, MediaConstraints, TurnServerConfig};
pub use directory::{DirectoryClient, DirectoryUser};
pub use error::{Error, MediaError, Result};
pub use events::CallEvent;
pub use media::{LogSurface, MediaCapture, MediaEndpoint, MediaTrack, RenderSurface, SyntheticCapture, TrackKind};
pub use negotiation::{NegotiationEngine, NegotiationState, MAX_PENDING_CANDIDATES};
pub use orchestrator::CallOrchestrator;
pub use peer::{PeerConnectionState, PeerEvent, PeerSession, PeerSessionFactory, WebRtcPeerFactory};
pub use protocol::{Envelope, IceCandidate, SdpType, SessionDescription};
pub use router::MessageRouter;

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
