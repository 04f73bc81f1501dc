//! Scripted peer sessions
//!
//! A `ScriptedPeer` behaves like a well-mannered peer connection without any
//! networking: installing a local description gathers candidates, installing
//! a remote description delivers remote tracks, and once both are installed
//! the connection reports `Connected`. Every call is recorded.

use alloallo_webrtc::{
    Error, IceCandidate, MediaCapture, MediaConstraints, MediaTrack, PeerConnectionState,
    PeerEvent, PeerSession, PeerSessionFactory, SdpType, SessionDescription, SyntheticCapture,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use webrtc::ice_transport::ice_server::RTCIceServer;

/// One recorded call on a scripted peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerCall {
    AddTrack(String),
    CreateOffer { ice_restart: bool },
    CreateAnswer,
    SetLocal(SdpType),
    SetRemote(SdpType),
    AddIceCandidate(String),
    Close,
}

/// Knobs shared by every peer a factory creates
#[derive(Clone)]
pub struct ScriptedOptions {
    /// Local candidates gathered per local description
    pub candidates: usize,

    /// When set, `create_offer` waits for a notification
    pub offer_gate: Option<Arc<Notify>>,

    /// When set, `set_remote_description` waits for a notification
    pub remote_gate: Option<Arc<Notify>>,

    /// Reject every remote description
    pub fail_remote: bool,
}

impl Default for ScriptedOptions {
    fn default() -> Self {
        Self {
            candidates: 2,
            offer_gate: None,
            remote_gate: None,
            fail_remote: false,
        }
    }
}

/// Factory recording every peer it creates
pub struct ScriptedPeerFactory {
    options: ScriptedOptions,
    created: Mutex<Vec<Arc<ScriptedPeer>>>,
    ice_urls: Mutex<Vec<String>>,
}

impl ScriptedPeerFactory {
    pub fn new() -> Arc<Self> {
        Self::with_options(ScriptedOptions::default())
    }

    pub fn with_options(options: ScriptedOptions) -> Arc<Self> {
        Arc::new(Self {
            options,
            created: Mutex::new(Vec::new()),
            ice_urls: Mutex::new(Vec::new()),
        })
    }

    pub fn count(&self) -> usize {
        self.created.lock().len()
    }

    /// The `index`th peer created (0-based)
    pub fn peer(&self, index: usize) -> Arc<ScriptedPeer> {
        Arc::clone(&self.created.lock()[index])
    }

    /// ICE server URLs passed to the last `create`
    pub fn ice_urls(&self) -> Vec<String> {
        self.ice_urls.lock().clone()
    }
}

#[async_trait]
impl PeerSessionFactory for ScriptedPeerFactory {
    async fn create(
        &self,
        ice_servers: Vec<RTCIceServer>,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> alloallo_webrtc::Result<Arc<dyn PeerSession>> {
        *self.ice_urls.lock() = ice_servers.into_iter().flat_map(|s| s.urls).collect();

        let mut created = self.created.lock();
        let peer = Arc::new(ScriptedPeer {
            index: created.len(),
            options: self.options.clone(),
            events,
            calls: Mutex::new(Vec::new()),
            local_set: AtomicBool::new(false),
            remote_set: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        created.push(Arc::clone(&peer));
        Ok(peer as Arc<dyn PeerSession>)
    }
}

/// Peer session double
pub struct ScriptedPeer {
    index: usize,
    options: ScriptedOptions,
    events: mpsc::UnboundedSender<PeerEvent>,
    calls: Mutex<Vec<PeerCall>>,
    local_set: AtomicBool,
    remote_set: AtomicBool,
    closed: AtomicBool,
}

impl ScriptedPeer {
    pub fn calls(&self) -> Vec<PeerCall> {
        self.calls.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Candidate lines applied so far, in order
    pub fn applied_candidates(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                PeerCall::AddIceCandidate(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    /// Position of the first recorded call matching `call`
    pub fn position(&self, call: &PeerCall) -> Option<usize> {
        self.calls.lock().iter().position(|c| c == call)
    }

    fn record(&self, call: PeerCall) -> alloallo_webrtc::Result<()> {
        if self.is_closed() {
            return Err(Error::PeerConnectionError(format!(
                "scripted peer {} is closed",
                self.index
            )));
        }
        self.calls.lock().push(call);
        Ok(())
    }

    fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }

    fn maybe_connected(&self) {
        if self.local_set.load(Ordering::SeqCst) && self.remote_set.load(Ordering::SeqCst) {
            self.emit(PeerEvent::ConnectionState(PeerConnectionState::Connected));
        }
    }

    fn description(&self, sdp_type: SdpType) -> SessionDescription {
        let sdp = format!(
            "v=0\r\no=- {} 2 IN IP4 127.0.0.1\r\ns=scripted\r\nt=0 0\r\n",
            self.index
        );
        match sdp_type {
            SdpType::Offer => SessionDescription::offer(sdp),
            _ => SessionDescription::answer(sdp),
        }
    }
}

#[async_trait]
impl PeerSession for ScriptedPeer {
    async fn add_track(&self, track: &MediaTrack) -> alloallo_webrtc::Result<()> {
        self.record(PeerCall::AddTrack(track.id().to_string()))
    }

    async fn create_offer(&self, ice_restart: bool) -> alloallo_webrtc::Result<SessionDescription> {
        if let Some(gate) = &self.options.offer_gate {
            gate.notified().await;
        }
        self.record(PeerCall::CreateOffer { ice_restart })?;
        Ok(self.description(SdpType::Offer))
    }

    async fn create_answer(&self) -> alloallo_webrtc::Result<SessionDescription> {
        self.record(PeerCall::CreateAnswer)?;
        Ok(self.description(SdpType::Answer))
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> alloallo_webrtc::Result<()> {
        self.record(PeerCall::SetLocal(description.sdp_type))?;
        self.local_set.store(true, Ordering::SeqCst);

        for i in 0..self.options.candidates {
            self.emit(PeerEvent::LocalCandidate(IceCandidate {
                candidate: format!(
                    "candidate:{} 1 udp 2122260223 10.0.{}.{} 5000{} typ host",
                    i, self.index, i, i
                ),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
                username_fragment: None,
            }));
        }
        self.maybe_connected();
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> alloallo_webrtc::Result<()> {
        if let Some(gate) = &self.options.remote_gate {
            gate.notified().await;
        }
        if self.options.fail_remote {
            return Err(Error::SdpError("scripted peer rejects remote descriptions".to_string()));
        }
        self.record(PeerCall::SetRemote(description.sdp_type))?;
        self.remote_set.store(true, Ordering::SeqCst);

        let remote = SyntheticCapture::new(&format!("far-{}", self.index), MediaConstraints::default())
            .acquire(MediaConstraints::default())
            .await
            .map_err(Error::from)?;
        for track in remote.tracks() {
            self.emit(PeerEvent::RemoteTrack(track));
        }
        self.maybe_connected();
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> alloallo_webrtc::Result<()> {
        self.record(PeerCall::AddIceCandidate(candidate.candidate))
    }

    async fn close(&self) -> alloallo_webrtc::Result<()> {
        self.calls.lock().push(PeerCall::Close);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
