//! webrtc-rs backed peer sessions

use super::{PeerConnectionState, PeerEvent, PeerSession, PeerSessionFactory};
use crate::media::{MediaTrack, TrackHandle};
use crate::protocol::{IceCandidate, SdpType, SessionDescription};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

/// Factory producing [`RtcPeerSession`]s
#[derive(Debug, Clone, Default)]
pub struct WebRtcPeerFactory;

impl WebRtcPeerFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PeerSessionFactory for WebRtcPeerFactory {
    async fn create(
        &self,
        ice_servers: Vec<RTCIceServer>,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerSession>> {
        let session = RtcPeerSession::new(ice_servers, events).await?;
        Ok(Arc::new(session))
    }
}

/// Peer session over a webrtc-rs `RTCPeerConnection`
pub struct RtcPeerSession {
    peer_connection: Arc<RTCPeerConnection>,

    /// Senders for attached local tracks (kept so RTP senders outlive the call)
    senders: Mutex<Vec<Arc<RTCRtpSender>>>,
}

impl RtcPeerSession {
    /// Create a peer connection and wire its callbacks into `events`
    pub async fn new(
        ice_servers: Vec<RTCIceServer>,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Self> {
        let mut media_engine = MediaEngine::default();

        // Opus, VP8/VP9, H.264
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::PeerConnectionError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::PeerConnectionError(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let peer_connection =
            Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
                Error::PeerConnectionError(format!("Failed to create peer connection: {}", e))
            })?);

        let candidate_events = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = candidate_events.clone();
            Box::pin(async move {
                // None marks the end of gathering
                let Some(candidate) = candidate else {
                    debug!("ICE gathering complete");
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = events.send(PeerEvent::LocalCandidate(IceCandidate::from(init)));
                    }
                    Err(e) => warn!("Failed to serialize local ICE candidate: {}", e),
                }
            })
        }));

        let track_events = events.clone();
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let events = track_events.clone();
                Box::pin(async move {
                    match MediaTrack::remote(track) {
                        Ok(track) => {
                            debug!("Remote {} track {} received", track.kind(), track.id());
                            let _ = events.send(PeerEvent::RemoteTrack(track));
                        }
                        Err(e) => warn!("Ignoring remote track: {}", e),
                    }
                })
            },
        ));

        let state_events = events;
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let events = state_events.clone();
                Box::pin(async move {
                    let state = match s {
                        RTCPeerConnectionState::New => PeerConnectionState::New,
                        RTCPeerConnectionState::Connecting => PeerConnectionState::Connecting,
                        RTCPeerConnectionState::Connected => PeerConnectionState::Connected,
                        RTCPeerConnectionState::Disconnected => PeerConnectionState::Disconnected,
                        RTCPeerConnectionState::Failed => PeerConnectionState::Failed,
                        RTCPeerConnectionState::Closed => PeerConnectionState::Closed,
                        _ => return,
                    };
                    let _ = events.send(PeerEvent::ConnectionState(state));
                })
            },
        ));

        Ok(Self {
            peer_connection,
            senders: Mutex::new(Vec::new()),
        })
    }

    /// Underlying webrtc-rs connection
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }
}

#[async_trait]
impl PeerSession for RtcPeerSession {
    async fn add_track(&self, track: &MediaTrack) -> Result<()> {
        let TrackHandle::Local(local) = track.handle() else {
            return Err(Error::MediaTrackError(format!(
                "track {} is a remote track and cannot be sent",
                track.id()
            )));
        };

        let sender = self
            .peer_connection
            .add_track(Arc::clone(local))
            .await
            .map_err(|e| {
                Error::MediaTrackError(format!("Failed to add {} track: {}", track.kind(), e))
            })?;
        self.senders.lock().push(sender);

        debug!("Added local {} track {}", track.kind(), track.id());
        Ok(())
    }

    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription> {
        // There is nothing to restart before the first local description
        let restart =
            ice_restart && self.peer_connection.current_local_description().await.is_some();
        let options = RTCOfferOptions {
            ice_restart: restart,
            ..Default::default()
        };

        let offer = self
            .peer_connection
            .create_offer(Some(options))
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create offer: {}", e)))?;

        Ok(offer.into())
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create answer: {}", e)))?;

        Ok(answer.into())
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        let description = RTCSessionDescription::try_from(description)?;
        self.peer_connection
            .set_local_description(description)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let description = RTCSessionDescription::try_from(description)?;
        self.peer_connection
            .set_remote_description(description)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        debug!("Adding remote ICE candidate: {}", candidate.candidate);
        self.peer_connection
            .add_ice_candidate(candidate.into())
            .await
            .map_err(|e| Error::IceCandidateError(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        info!("Closing peer connection");
        self.senders.lock().clear();
        self.peer_connection.close().await.map_err(|e| {
            Error::PeerConnectionError(format!("Failed to close connection: {}", e))
        })
    }
}

impl From<RTCSessionDescription> for SessionDescription {
    fn from(description: RTCSessionDescription) -> Self {
        let sdp_type = match description.sdp_type {
            RTCSdpType::Offer => SdpType::Offer,
            RTCSdpType::Pranswer => SdpType::Pranswer,
            RTCSdpType::Rollback => SdpType::Rollback,
            _ => SdpType::Answer,
        };
        Self {
            sdp_type,
            sdp: description.sdp,
        }
    }
}

impl TryFrom<SessionDescription> for RTCSessionDescription {
    type Error = Error;

    fn try_from(description: SessionDescription) -> Result<Self> {
        let parsed = match description.sdp_type {
            SdpType::Offer => RTCSessionDescription::offer(description.sdp),
            SdpType::Answer => RTCSessionDescription::answer(description.sdp),
            SdpType::Pranswer => RTCSessionDescription::pranswer(description.sdp),
            SdpType::Rollback => {
                return Err(Error::SdpError(
                    "rollback descriptions are not supported".to_string(),
                ))
            }
        };
        parsed.map_err(|e| Error::SdpError(format!("Failed to parse SDP: {}", e)))
    }
}

impl From<RTCIceCandidateInit> for IceCandidate {
    fn from(init: RTCIceCandidateInit) -> Self {
        Self {
            candidate: init.candidate,
            sdp_mid: init.sdp_mid,
            sdp_mline_index: init.sdp_mline_index,
            username_fragment: init.username_fragment,
        }
    }
}

impl From<IceCandidate> for RTCIceCandidateInit {
    fn from(candidate: IceCandidate) -> Self {
        Self {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        }
    }
}
