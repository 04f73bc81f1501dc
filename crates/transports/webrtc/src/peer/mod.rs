//! Peer session abstraction
//!
//! The negotiation engine drives an ICE-capable peer connection through the
//! [`PeerSession`] trait and observes it through a stream of [`PeerEvent`]s.
//! Production sessions wrap webrtc-rs ([`WebRtcPeerFactory`]).

pub mod connection;

pub use connection::{RtcPeerSession, WebRtcPeerFactory};

use crate::media::MediaTrack;
use crate::protocol::{IceCandidate, SessionDescription};
use crate::Result;
use webrtc::ice_transport::ice_server::RTCIceServer;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Connectivity of the underlying peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Notifications emitted by a peer session
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A local ICE candidate was gathered and should be trickled to the peer
    LocalCandidate(IceCandidate),

    /// The remote peer added a track
    RemoteTrack(MediaTrack),

    /// The peer connection changed connectivity state
    ConnectionState(PeerConnectionState),
}

/// One ICE-capable peer connection
#[async_trait]
pub trait PeerSession: Send + Sync {
    /// Attach a local track for sending
    async fn add_track(&self, track: &MediaTrack) -> Result<()>;

    /// Create an offer, requesting fresh ICE credentials when `ice_restart`
    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription>;

    /// Create an answer to the installed remote offer
    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Close the connection; further calls fail
    async fn close(&self) -> Result<()>;
}

/// Creates peer sessions, one per call attempt
#[async_trait]
pub trait PeerSessionFactory: Send + Sync {
    /// Create a session using `ice_servers`, reporting on `events`
    async fn create(
        &self,
        ice_servers: Vec<RTCIceServer>,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerSession>>;
}
