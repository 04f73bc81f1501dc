//! Peer-session negotiation state machine
//!
//! One [`NegotiationEngine`] owns at most one peer session at a time. It moves
//! through
//!
//! ```text
//! Idle -> LocalMediaReady -> SessionCreated -> OfferSent | OfferReceived -> Connected
//!                                                                 (any) -> Closed
//! ```
//!
//! and never moves backwards except through [`NegotiationEngine::reset`] (or a
//! new [`NegotiationEngine::create_session`], which resets first).
//!
//! Session state lives behind a mutex that is never held across an `.await`.
//! Every async step snapshots the session generation before suspending and
//! re-checks it afterwards; completions from a reset or superseded session
//! are discarded.

use crate::channel::ControlChannel;
use crate::config::{CallConfig, MediaConstraints};
use crate::events::CallEvent;
use crate::media::{MediaCapture, MediaEndpoint, MediaTrack, RenderSurface};
use crate::peer::{PeerConnectionState, PeerEvent, PeerSession, PeerSessionFactory};
use crate::protocol::{Envelope, IceCandidate, SessionDescription};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use webrtc::ice_transport::ice_server::RTCIceServer;

const EVENT_CAPACITY: usize = 64;

/// Remote candidates held per session while the remote description is missing
pub const MAX_PENDING_CANDIDATES: usize = 64;

/// Negotiation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationState {
    /// Nothing acquired yet
    Idle,
    /// Local media acquired, no peer session
    LocalMediaReady,
    /// Peer session exists, no descriptions exchanged
    SessionCreated,
    /// Local offer installed and sent
    OfferSent,
    /// Remote offer installed and answered
    OfferReceived,
    /// Both descriptions installed (caller) or the connection came up (callee)
    Connected,
    /// Session torn down
    Closed,
}

impl NegotiationState {
    /// Whether the state machine may move from `self` to `next`
    pub fn can_transition_to(self, next: NegotiationState) -> bool {
        use NegotiationState::*;
        matches!(
            (self, next),
            (_, Closed)
                | (Idle, LocalMediaReady)
                | (Idle | LocalMediaReady | Closed, SessionCreated)
                | (SessionCreated, OfferSent)
                | (SessionCreated | OfferSent, OfferReceived)
                | (OfferSent | OfferReceived, Connected)
        )
    }

    /// Whether a peer session exists in this state
    pub fn has_session(self) -> bool {
        matches!(
            self,
            NegotiationState::SessionCreated
                | NegotiationState::OfferSent
                | NegotiationState::OfferReceived
                | NegotiationState::Connected
        )
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Progress of installing one description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Empty,
    Installing,
    Installed,
}

/// Remote candidate waiting for the remote description
struct QueuedCandidate {
    tag: Option<String>,
    candidate: IceCandidate,
}

struct ActiveSession {
    generation: u64,
    peer: Arc<dyn PeerSession>,
    /// Call attempt tag carried on the wire
    tag: Option<String>,
    local_description: Slot,
    remote_description: Slot,
    pending_candidates: Vec<QueuedCandidate>,
    remote_media: Option<MediaEndpoint>,
    remote_surface: Option<Arc<dyn RenderSurface>>,
    /// The peer connection reported connectivity
    peer_connected: bool,
    events_task: JoinHandle<()>,
}

struct EngineState {
    state: NegotiationState,
    generation: u64,
    local_media: Option<MediaEndpoint>,
    session: Option<ActiveSession>,
}

struct EngineShared {
    channel: ControlChannel,
    capture: Arc<dyn MediaCapture>,
    peers: Arc<dyn PeerSessionFactory>,
    ice_servers: Vec<RTCIceServer>,
    constraints: MediaConstraints,
    events: broadcast::Sender<CallEvent>,
    inner: Mutex<EngineState>,
}

impl EngineShared {
    /// Move the state machine, refusing transitions it does not allow
    fn transition(&self, inner: &mut EngineState, next: NegotiationState) -> bool {
        let current = inner.state;
        if current == next {
            return false;
        }
        if !current.can_transition_to(next) {
            warn!(
                generation = inner.generation,
                "Refusing state transition {} -> {}", current, next
            );
            return false;
        }

        debug!(
            generation = inner.generation,
            "Negotiation state {} -> {}", current, next
        );
        inner.state = next;
        let _ = self.events.send(CallEvent::StateChanged {
            from: current,
            to: next,
        });
        true
    }

    fn emit(&self, event: CallEvent) {
        let _ = self.events.send(event);
    }
}

/// Drives one peer session at a time
#[derive(Clone)]
pub struct NegotiationEngine {
    shared: Arc<EngineShared>,
}

/// Non-owning handle to a [`NegotiationEngine`]
#[derive(Clone)]
pub struct WeakNegotiationEngine {
    shared: Weak<EngineShared>,
}

impl WeakNegotiationEngine {
    pub fn upgrade(&self) -> Option<NegotiationEngine> {
        self.shared.upgrade().map(|shared| NegotiationEngine { shared })
    }
}

impl NegotiationEngine {
    /// Create an engine sending envelopes on `channel`
    pub fn new(
        config: &CallConfig,
        channel: ControlChannel,
        capture: Arc<dyn MediaCapture>,
        peers: Arc<dyn PeerSessionFactory>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(EngineShared {
                channel,
                capture,
                peers,
                ice_servers: config.ice_servers(),
                constraints: config.media,
                events,
                inner: Mutex::new(EngineState {
                    state: NegotiationState::Idle,
                    generation: 0,
                    local_media: None,
                    session: None,
                }),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakNegotiationEngine {
        WeakNegotiationEngine {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.shared.inner.lock().state
    }

    /// Current session generation; bumped by every reset and new session
    pub fn generation(&self) -> u64 {
        self.shared.inner.lock().generation
    }

    /// Wire tag of the current call attempt
    pub fn session_tag(&self) -> Option<String> {
        self.shared
            .inner
            .lock()
            .session
            .as_ref()
            .and_then(|s| s.tag.clone())
    }

    pub fn local_media(&self) -> Option<MediaEndpoint> {
        self.shared.inner.lock().local_media.clone()
    }

    pub fn remote_media(&self) -> Option<MediaEndpoint> {
        self.shared
            .inner
            .lock()
            .session
            .as_ref()
            .and_then(|s| s.remote_media.clone())
    }

    /// Remote candidates waiting for the remote description
    pub fn pending_candidates(&self) -> usize {
        self.shared
            .inner
            .lock()
            .session
            .as_ref()
            .map_or(0, |s| s.pending_candidates.len())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.shared.events.subscribe()
    }

    /// Acquire local media
    ///
    /// Failures are classified, logged, and broadcast as
    /// [`CallEvent::MediaUnavailable`]; the state does not change.
    #[instrument(skip(self))]
    pub async fn init_local_media(&self) -> Result<MediaEndpoint> {
        let generation = {
            let inner = self.shared.inner.lock();
            if inner.state.has_session() {
                return Err(Error::InvalidState(format!(
                    "local media must be acquired before the session is created (state {})",
                    inner.state
                )));
            }
            inner.generation
        };

        let endpoint = match self.shared.capture.acquire(self.shared.constraints).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                error!("Error accessing media devices: {}", e);
                self.shared.emit(CallEvent::MediaUnavailable(e.clone()));
                return Err(e.into());
            }
        };

        let mut inner = self.shared.inner.lock();
        if inner.generation != generation || inner.state.has_session() {
            debug!(generation, "Discarding local media acquired for a stale session");
            return Err(Error::StaleSession(
                "session changed while acquiring local media".to_string(),
            ));
        }

        info!(tracks = endpoint.track_count(), "Local media ready");
        inner.local_media = Some(endpoint.clone());
        if inner.state == NegotiationState::Idle {
            self.shared
                .transition(&mut inner, NegotiationState::LocalMediaReady);
        }
        Ok(endpoint)
    }

    /// Create a fresh peer session, superseding any existing one
    ///
    /// Every local track is attached before any description is created.
    /// Local candidates are sent as they are gathered and remote tracks are
    /// collected into a lazily created remote endpoint.
    #[instrument(skip(self))]
    pub async fn create_session(&self) -> Result<()> {
        let (generation, local_media, superseded) = {
            let mut inner = self.shared.inner.lock();
            let superseded = inner.session.take();
            if superseded.is_some() {
                info!(generation = inner.generation, "Superseding existing session");
                self.shared.transition(&mut inner, NegotiationState::Closed);
            }
            inner.generation += 1;
            (inner.generation, inner.local_media.clone(), superseded)
        };

        if let Some(old) = superseded {
            close_session(old).await;
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let peer = self
            .shared
            .peers
            .create(self.shared.ice_servers.clone(), events_tx)
            .await
            .map_err(|e| {
                error!(generation, "Failed to create peer session: {}", e);
                e
            })?;

        let tracks = local_media.as_ref().map(MediaEndpoint::tracks).unwrap_or_default();
        for track in &tracks {
            if let Err(e) = peer.add_track(track).await {
                error!(generation, "Failed to attach local track {}: {}", track.id(), e);
                let _ = peer.close().await;
                return Err(e);
            }
        }

        let installed = {
            let mut inner = self.shared.inner.lock();
            if inner.generation == generation {
                let events_task = tokio::spawn(pump_peer_events(
                    Arc::downgrade(&self.shared),
                    generation,
                    events_rx,
                ));
                inner.session = Some(ActiveSession {
                    generation,
                    peer: Arc::clone(&peer),
                    tag: None,
                    local_description: Slot::Empty,
                    remote_description: Slot::Empty,
                    pending_candidates: Vec::new(),
                    remote_media: None,
                    remote_surface: None,
                    peer_connected: false,
                    events_task,
                });
                self.shared
                    .transition(&mut inner, NegotiationState::SessionCreated);
                true
            } else {
                false
            }
        };

        if !installed {
            debug!(generation, "Discarding peer session created for a stale generation");
            let _ = peer.close().await;
            return Err(Error::StaleSession(
                "reset while creating the peer session".to_string(),
            ));
        }
        info!(generation, tracks = tracks.len(), "Peer session created");
        Ok(())
    }

    /// Route remote tracks of the current session to `surface`
    ///
    /// If remote tracks already arrived, the existing endpoint is attached now.
    pub fn attach_remote_surface(&self, surface: Arc<dyn RenderSurface>) -> Result<()> {
        let existing = {
            let mut inner = self.shared.inner.lock();
            let session = inner
                .session
                .as_mut()
                .ok_or_else(|| Error::NoSession("no session to attach a surface to".to_string()))?;
            session.remote_surface = Some(Arc::clone(&surface));
            session.remote_media.clone()
        };
        if let Some(endpoint) = existing {
            surface.attach(endpoint);
        }
        Ok(())
    }

    /// Create an offer and send it to `callee`
    ///
    /// The offer requests an ICE restart, is installed as the local
    /// description, and goes out tagged with a fresh call attempt tag.
    #[instrument(skip(self))]
    pub async fn create_offer(&self, caller: &str, callee: &str) -> Result<()> {
        let (generation, peer, tag) = {
            let mut inner = self.shared.inner.lock();
            let state = inner.state;
            let session = inner.session.as_mut().ok_or_else(|| {
                Error::NoSession("cannot create an offer without a session".to_string())
            })?;
            if state != NegotiationState::SessionCreated
                || session.local_description != Slot::Empty
                || session.remote_description != Slot::Empty
            {
                return Err(Error::InvalidState(format!(
                    "cannot create an offer in state {}",
                    state
                )));
            }
            session.local_description = Slot::Installing;
            let tag = uuid::Uuid::new_v4().to_string();
            session.tag = Some(tag.clone());
            (session.generation, Arc::clone(&session.peer), tag)
        };

        let result = async {
            let offer = peer.create_offer(true).await?;
            peer.set_local_description(offer.clone()).await?;
            Ok::<_, Error>(offer)
        }
        .await;

        {
            let mut inner = self.shared.inner.lock();
            let Some(session) = current_session(&mut inner, generation) else {
                debug!(generation, "Discarding offer for a stale session");
                return Err(Error::StaleSession("reset while creating the offer".to_string()));
            };
            match &result {
                Ok(_) => session.local_description = Slot::Installed,
                Err(e) => {
                    session.local_description = Slot::Empty;
                    error!(generation, "Error creating offer: {}", e);
                }
            }
            if result.is_ok() {
                self.shared.transition(&mut inner, NegotiationState::OfferSent);
            }
        }
        let offer = result?;

        info!(generation, caller, callee, "Sending offer");
        self.shared.channel.send(&Envelope::Offer {
            caller: caller.to_string(),
            callee: callee.to_string(),
            offer,
            session: Some(tag),
        });
        Ok(())
    }

    /// Answer a remote offer
    ///
    /// Requires a session; the offer's call attempt tag is adopted so later
    /// envelopes of this attempt are recognised, and queued candidates tagged
    /// for any other attempt are dropped. An offer crossing our own (`OfferSent`)
    /// wins: the local offer is abandoned and replaced by the answer.
    #[instrument(skip(self, offer))]
    pub async fn handle_offer(
        &self,
        offer: SessionDescription,
        tag: Option<String>,
    ) -> Result<()> {
        let (generation, peer, local_before) = {
            let mut inner = self.shared.inner.lock();
            let state = inner.state;
            let Some(session) = inner.session.as_mut() else {
                error!("Peer connection is not initialized, dropping offer");
                return Err(Error::NoSession("offer received before session".to_string()));
            };
            if !matches!(
                state,
                NegotiationState::SessionCreated | NegotiationState::OfferSent
            ) {
                return Err(Error::InvalidState(format!(
                    "cannot accept an offer in state {}",
                    state
                )));
            }
            if session.remote_description != Slot::Empty
                || session.local_description == Slot::Installing
            {
                return Err(Error::ProtocolError(
                    "remote description already set for this session".to_string(),
                ));
            }
            let local_before = session.local_description;
            if local_before == Slot::Installed {
                info!(
                    generation = session.generation,
                    "Offers crossed, abandoning the local offer"
                );
            }
            session.remote_description = Slot::Installing;
            if let Some(tag) = tag {
                drop_foreign_candidates(session, &tag);
                session.tag = Some(tag);
            }
            (session.generation, Arc::clone(&session.peer), local_before)
        };

        if let Err(e) = peer.set_remote_description(offer).await {
            error!(generation, "Failed to install remote offer: {}", e);
            if let Some(session) = current_session(&mut self.shared.inner.lock(), generation) {
                session.remote_description = Slot::Empty;
            }
            return Err(e);
        }

        let pending = {
            let mut inner = self.shared.inner.lock();
            let Some(session) = current_session(&mut inner, generation) else {
                return Err(Error::StaleSession("reset while installing the offer".to_string()));
            };
            session.remote_description = Slot::Installed;
            if session.local_description != local_before {
                error!(generation, "Local description changed while installing the offer");
                return Err(Error::InvalidState(
                    "local description changed while installing the offer".to_string(),
                ));
            }
            session.local_description = Slot::Installing;
            take_pending(session)
        };
        flush_candidates(peer.as_ref(), generation, pending).await;

        let result = async {
            let answer = peer.create_answer().await?;
            peer.set_local_description(answer.clone()).await?;
            Ok::<_, Error>(answer)
        }
        .await;

        let tag = {
            let mut inner = self.shared.inner.lock();
            let Some(session) = current_session(&mut inner, generation) else {
                debug!(generation, "Discarding answer for a stale session");
                return Err(Error::StaleSession("reset while creating the answer".to_string()));
            };
            if let Err(e) = &result {
                session.local_description = Slot::Empty;
                error!(generation, "Error handling offer: {}", e);
            } else {
                session.local_description = Slot::Installed;
            }
            let tag = session.tag.clone();
            let connected = session.peer_connected;
            if result.is_ok() {
                self.shared
                    .transition(&mut inner, NegotiationState::OfferReceived);
                if connected {
                    self.shared.transition(&mut inner, NegotiationState::Connected);
                }
            }
            tag
        };
        let answer = result?;

        info!(generation, "Sending answer");
        self.shared.channel.send(&Envelope::Answer {
            answer,
            session: tag,
        });
        Ok(())
    }

    /// Install the callee's answer, completing the caller side
    #[instrument(skip(self, answer))]
    pub async fn handle_answer(
        &self,
        answer: SessionDescription,
        tag: Option<String>,
    ) -> Result<()> {
        let (generation, peer) = {
            let mut inner = self.shared.inner.lock();
            let state = inner.state;
            let Some(session) = inner.session.as_mut() else {
                error!("Peer connection is not initialized, dropping answer");
                return Err(Error::NoSession("answer received before session".to_string()));
            };
            check_tag(session, tag.as_deref(), "answer")?;
            if state != NegotiationState::OfferSent {
                return Err(Error::InvalidState(format!(
                    "cannot accept an answer in state {}",
                    state
                )));
            }
            if session.remote_description != Slot::Empty {
                return Err(Error::ProtocolError(
                    "remote description already set for this session".to_string(),
                ));
            }
            session.remote_description = Slot::Installing;
            (session.generation, Arc::clone(&session.peer))
        };

        if let Err(e) = peer.set_remote_description(answer).await {
            error!(generation, "Error handling answer: {}", e);
            if let Some(session) = current_session(&mut self.shared.inner.lock(), generation) {
                session.remote_description = Slot::Empty;
            }
            return Err(e);
        }

        let pending = {
            let mut inner = self.shared.inner.lock();
            let Some(session) = current_session(&mut inner, generation) else {
                return Err(Error::StaleSession("reset while installing the answer".to_string()));
            };
            session.remote_description = Slot::Installed;
            let pending = take_pending(session);
            self.shared
                .transition(&mut inner, NegotiationState::Connected);
            pending
        };
        info!(generation, "Remote answer installed");
        flush_candidates(peer.as_ref(), generation, pending).await;
        Ok(())
    }

    /// Apply a remote ICE candidate, or queue it until the remote description
    /// is installed
    pub async fn add_remote_candidate(
        &self,
        candidate: IceCandidate,
        tag: Option<String>,
    ) -> Result<()> {
        let (generation, peer) = {
            let mut inner = self.shared.inner.lock();
            let Some(session) = inner.session.as_mut() else {
                warn!("Dropping ICE candidate received before any session");
                return Err(Error::NoSession("candidate received before session".to_string()));
            };
            check_tag(session, tag.as_deref(), "candidate")?;
            if session.remote_description != Slot::Installed {
                if session.pending_candidates.len() >= MAX_PENDING_CANDIDATES {
                    warn!(
                        generation = session.generation,
                        "Candidate queue full ({}), dropping ICE candidate",
                        MAX_PENDING_CANDIDATES
                    );
                    return Err(Error::ProtocolError(format!(
                        "more than {} candidates before the remote description",
                        MAX_PENDING_CANDIDATES
                    )));
                }
                session.pending_candidates.push(QueuedCandidate { tag, candidate });
                debug!(
                    generation = session.generation,
                    pending = session.pending_candidates.len(),
                    "Queued ICE candidate until the remote description is set"
                );
                return Ok(());
            }
            (session.generation, Arc::clone(&session.peer))
        };

        peer.add_ice_candidate(candidate).await.map_err(|e| {
            error!(generation, "Error adding received ICE candidate: {}", e);
            e
        })
    }

    /// Tear down the session
    ///
    /// The peer session is closed and both media endpoint references are
    /// cleared; capture devices are not released. Moves to `Closed` from any
    /// state.
    #[instrument(skip(self))]
    pub async fn reset(&self) {
        let session = {
            let mut inner = self.shared.inner.lock();
            inner.generation += 1;
            inner.local_media = None;
            let session = inner.session.take();
            self.shared.transition(&mut inner, NegotiationState::Closed);
            session
        };
        if let Some(session) = session {
            close_session(session).await;
        }
        info!("Peer connection reset");
    }
}

fn current_session(inner: &mut EngineState, generation: u64) -> Option<&mut ActiveSession> {
    inner
        .session
        .as_mut()
        .filter(|session| session.generation == generation)
}

fn check_tag(session: &ActiveSession, tag: Option<&str>, kind: &str) -> Result<()> {
    match (session.tag.as_deref(), tag) {
        (Some(ours), Some(theirs)) if ours != theirs => {
            warn!(
                generation = session.generation,
                "Dropping {} for stale call attempt {}", kind, theirs
            );
            Err(Error::StaleSession(format!(
                "{} belongs to call attempt {}, current is {}",
                kind, theirs, ours
            )))
        }
        _ => Ok(()),
    }
}

/// Discard queued candidates tagged for a call attempt other than `tag`
fn drop_foreign_candidates(session: &mut ActiveSession, tag: &str) {
    let generation = session.generation;
    session.pending_candidates.retain(|queued| match queued.tag.as_deref() {
        Some(theirs) if theirs != tag => {
            warn!(
                generation,
                "Dropping queued ICE candidate for stale call attempt {}", theirs
            );
            false
        }
        _ => true,
    });
}

fn take_pending(session: &mut ActiveSession) -> Vec<IceCandidate> {
    std::mem::take(&mut session.pending_candidates)
        .into_iter()
        .map(|queued| queued.candidate)
        .collect()
}

async fn flush_candidates(peer: &dyn PeerSession, generation: u64, pending: Vec<IceCandidate>) {
    if pending.is_empty() {
        return;
    }
    debug!(generation, count = pending.len(), "Flushing queued ICE candidates");
    for candidate in pending {
        if let Err(e) = peer.add_ice_candidate(candidate).await {
            error!(generation, "Error adding queued ICE candidate: {}", e);
        }
    }
}

async fn close_session(session: ActiveSession) {
    session.events_task.abort();
    if let Err(e) = session.peer.close().await {
        warn!(
            generation = session.generation,
            "Failed to close peer session: {}", e
        );
    }
}

/// What to do after releasing the lock for one peer event
enum Followup {
    None,
    Transmit(Envelope),
    Attach(Arc<dyn RenderSurface>, MediaEndpoint),
}

/// React to one session's peer events until the session goes away
async fn pump_peer_events(
    engine: Weak<EngineShared>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<PeerEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(shared) = engine.upgrade() else {
            return;
        };

        let followup = {
            let mut inner = shared.inner.lock();
            let Some(session) = current_session(&mut inner, generation) else {
                return;
            };
            match event {
                PeerEvent::LocalCandidate(candidate) => Followup::Transmit(Envelope::Candidate {
                    candidate,
                    session: session.tag.clone(),
                }),
                PeerEvent::RemoteTrack(track) => on_remote_track(&shared, session, track),
                PeerEvent::ConnectionState(state) => {
                    debug!(generation, "Peer connection state {:?}", state);
                    if state == PeerConnectionState::Connected {
                        session.peer_connected = true;
                        if inner.state == NegotiationState::OfferReceived {
                            shared.transition(&mut inner, NegotiationState::Connected);
                        }
                    }
                    Followup::None
                }
            }
        };

        match followup {
            Followup::None => {}
            Followup::Transmit(envelope) => {
                shared.channel.send(&envelope);
            }
            Followup::Attach(surface, endpoint) => surface.attach(endpoint),
        }
    }
}

fn on_remote_track(
    shared: &EngineShared,
    session: &mut ActiveSession,
    track: MediaTrack,
) -> Followup {
    let (track_id, kind) = (track.id().to_string(), track.kind());
    let generation = session.generation;
    let created = session.remote_media.is_none();
    let endpoint = session
        .remote_media
        .get_or_insert_with(|| MediaEndpoint::new(format!("remote-{}", generation)))
        .clone();

    if !endpoint.add_track(track) {
        return Followup::None;
    }
    info!(generation, "Remote {} track {} added", kind, track_id);
    shared.emit(CallEvent::RemoteTrackAdded { track_id, kind });

    match (&session.remote_surface, created) {
        (Some(surface), true) => Followup::Attach(Arc::clone(surface), endpoint),
        _ => Followup::None,
    }
}
