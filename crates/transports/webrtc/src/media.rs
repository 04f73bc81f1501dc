//! Media endpoints and the capture/render collaborators
//!
//! A [`MediaEndpoint`] is a shared, growable set of tracks. The local endpoint
//! comes from a [`MediaCapture`]; the remote endpoint is created lazily the
//! first time the peer session reports a remote track and is handed to a
//! [`RenderSurface`].

use crate::config::MediaConstraints;
use crate::error::MediaError;
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

impl TrackKind {
    fn from_codec_type(codec_type: RTPCodecType) -> Option<Self> {
        match codec_type {
            RTPCodecType::Audio => Some(TrackKind::Audio),
            RTPCodecType::Video => Some(TrackKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// Underlying webrtc-rs track
#[derive(Clone)]
pub enum TrackHandle {
    /// Track we send
    Local(Arc<dyn TrackLocal + Send + Sync>),
    /// Track the remote peer sends
    Remote(Arc<TrackRemote>),
}

/// One audio or video track
#[derive(Clone)]
pub struct MediaTrack {
    id: String,
    stream_id: String,
    kind: TrackKind,
    handle: TrackHandle,
}

impl MediaTrack {
    /// Wrap a local track
    ///
    /// # Errors
    ///
    /// Fails for tracks whose codec type is neither audio nor video.
    pub fn local(track: Arc<dyn TrackLocal + Send + Sync>) -> Result<Self> {
        let kind = TrackKind::from_codec_type(track.kind()).ok_or_else(|| {
            Error::MediaTrackError(format!("local track {} has no media kind", track.id()))
        })?;
        Ok(Self {
            id: track.id().to_string(),
            stream_id: track.stream_id().to_string(),
            kind,
            handle: TrackHandle::Local(track),
        })
    }

    /// Wrap a remote track delivered by the peer session
    ///
    /// # Errors
    ///
    /// Fails for tracks whose codec type is neither audio nor video.
    pub fn remote(track: Arc<TrackRemote>) -> Result<Self> {
        let kind = TrackKind::from_codec_type(track.kind()).ok_or_else(|| {
            Error::MediaTrackError(format!("remote track {} has no media kind", track.id()))
        })?;
        Ok(Self {
            id: track.id(),
            stream_id: track.stream_id(),
            kind,
            handle: TrackHandle::Remote(track),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn handle(&self) -> &TrackHandle {
        &self.handle
    }

    pub fn is_local(&self) -> bool {
        matches!(self.handle, TrackHandle::Local(_))
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("kind", &self.kind)
            .field("local", &self.is_local())
            .finish()
    }
}

/// Shared, growable collection of tracks
///
/// Clones share the same track list, so a surface holding an endpoint sees
/// tracks added after it was attached.
#[derive(Clone)]
pub struct MediaEndpoint {
    id: String,
    tracks: Arc<RwLock<Vec<MediaTrack>>>,
}

impl MediaEndpoint {
    /// Create an empty endpoint
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tracks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Create an endpoint holding `tracks`
    pub fn with_tracks(id: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        let endpoint = Self::new(id);
        for track in tracks {
            endpoint.add_track(track);
        }
        endpoint
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Add a track; a track id already present is ignored
    ///
    /// Returns `true` if the track was added.
    pub fn add_track(&self, track: MediaTrack) -> bool {
        let mut tracks = self.tracks.write();
        if tracks.iter().any(|t| t.id == track.id) {
            return false;
        }
        tracks.push(track);
        true
    }

    /// Snapshot of the current tracks
    pub fn tracks(&self) -> Vec<MediaTrack> {
        self.tracks.read().clone()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.read().len()
    }

    pub fn has_kind(&self, kind: TrackKind) -> bool {
        self.tracks.read().iter().any(|t| t.kind == kind)
    }

    /// True when both handles share the same track list
    pub fn same_as(&self, other: &MediaEndpoint) -> bool {
        Arc::ptr_eq(&self.tracks, &other.tracks)
    }
}

impl fmt::Debug for MediaEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaEndpoint")
            .field("id", &self.id)
            .field("tracks", &*self.tracks.read())
            .finish()
    }
}

/// Source of local media
#[async_trait]
pub trait MediaCapture: Send + Sync {
    /// Acquire local tracks for the requested kinds
    async fn acquire(
        &self,
        constraints: MediaConstraints,
    ) -> std::result::Result<MediaEndpoint, MediaError>;
}

/// Consumer that presents an endpoint to the user
pub trait RenderSurface: Send + Sync {
    /// Bind `endpoint` to this surface
    fn attach(&self, endpoint: MediaEndpoint);
}

/// Capture producing Opus and VP8 sample tracks without any device
///
/// Used by headless peers. Kinds not listed as available are reported as
/// [`MediaError::NotFound`], the same way a machine without a camera would.
#[derive(Debug, Clone)]
pub struct SyntheticCapture {
    label: String,
    available: MediaConstraints,
}

impl Default for SyntheticCapture {
    fn default() -> Self {
        Self::new("synthetic", MediaConstraints::default())
    }
}

impl SyntheticCapture {
    /// Create a capture that can provide the kinds in `available`
    pub fn new(label: &str, available: MediaConstraints) -> Self {
        Self {
            label: label.to_string(),
            available,
        }
    }

    fn audio_track(&self) -> Arc<TrackLocalStaticSample> {
        Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: "audio/opus".to_string(),
                clock_rate: 48000,
                channels: 2,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            format!("audio-{}", self.label),
            format!("stream-{}", self.label),
        ))
    }

    fn video_track(&self) -> Arc<TrackLocalStaticSample> {
        Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: "video/VP8".to_string(),
                clock_rate: 90000,
                channels: 0,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            format!("video-{}", self.label),
            format!("stream-{}", self.label),
        ))
    }
}

#[async_trait]
impl MediaCapture for SyntheticCapture {
    async fn acquire(
        &self,
        constraints: MediaConstraints,
    ) -> std::result::Result<MediaEndpoint, MediaError> {
        if !constraints.any() {
            return Err(MediaError::Other("no media kinds requested".to_string()));
        }
        if constraints.video && !self.available.video {
            return Err(MediaError::NotFound(format!(
                "{} has no video source",
                self.label
            )));
        }
        if constraints.audio && !self.available.audio {
            return Err(MediaError::NotFound(format!(
                "{} has no audio source",
                self.label
            )));
        }

        let endpoint = MediaEndpoint::new(format!("local-{}", self.label));
        if constraints.audio {
            let track = self.audio_track() as Arc<dyn TrackLocal + Send + Sync>;
            endpoint.add_track(MediaTrack::local(track).map_err(|e| MediaError::Other(e.to_string()))?);
        }
        if constraints.video {
            let track = self.video_track() as Arc<dyn TrackLocal + Send + Sync>;
            endpoint.add_track(MediaTrack::local(track).map_err(|e| MediaError::Other(e.to_string()))?);
        }

        debug!(
            "Synthetic capture {} produced {} track(s)",
            self.label,
            endpoint.track_count()
        );
        Ok(endpoint)
    }
}

/// Surface that only logs what is attached to it
#[derive(Debug, Clone)]
pub struct LogSurface {
    name: String,
}

impl LogSurface {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl RenderSurface for LogSurface {
    fn attach(&self, endpoint: MediaEndpoint) {
        info!(
            surface = %self.name,
            endpoint = %endpoint.id(),
            tracks = endpoint.track_count(),
            "Media endpoint attached"
        );
    }
}
