//! Error types for the call negotiation core

/// Result type alias using the crate Error
pub type Result<T> = std::result::Result<T, Error>;

/// Local media acquisition failures
///
/// Each variant maps to a distinct user-facing message so the presentation
/// layer can tell the user what to fix.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    /// The user (or platform policy) refused camera/microphone access
    #[error("media permission denied: {0}")]
    PermissionDenied(String),

    /// No capture device matching the requested kinds
    #[error("media device not found: {0}")]
    NotFound(String),

    /// Anything else the capture collaborator reported
    #[error("media acquisition failed: {0}")]
    Other(String),
}

impl MediaError {
    /// Message suitable for showing to the person placing the call
    pub fn user_message(&self) -> &'static str {
        match self {
            MediaError::PermissionDenied(_) => {
                "Camera and microphone access was denied. Please allow permissions."
            }
            MediaError::NotFound(_) => {
                "No camera or microphone found. Please connect a device and try again."
            }
            MediaError::Other(_) => {
                "An unexpected error occurred while accessing your media devices."
            }
        }
    }
}

/// Errors that can occur in call negotiation
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Envelope could not be decoded or violated the protocol
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Envelope `type` this client does not speak
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    /// Operation requires a negotiation session that does not exist
    #[error("No active session: {0}")]
    NoSession(String),

    /// Completion belongs to a session that was reset or superseded
    #[error("Stale session: {0}")]
    StaleSession(String),

    /// Operation not valid in the current negotiation state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Local media acquisition failed
    #[error(transparent)]
    Media(#[from] MediaError),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidateError(String),

    /// Media track error
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// WebRTC peer connection error
    #[error("Peer connection error: {0}")]
    PeerConnectionError(String),

    /// Directory (registration / lookup) service error
    #[error("Directory error: {0}")]
    DirectoryError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::WebSocketError(_) | Error::DirectoryError(_)
        )
    }

    /// Check if this error came from local media acquisition
    pub fn is_media_error(&self) -> bool {
        matches!(self, Error::Media(_))
    }

    /// Check if this error is a protocol fault (logged and dropped by the router)
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Error::ProtocolError(_)
                | Error::NoSession(_)
                | Error::StaleSession(_)
                | Error::SerializationError(_)
        )
    }

    /// Check if this error is a negotiation fault
    pub fn is_negotiation_error(&self) -> bool {
        matches!(
            self,
            Error::SdpError(_)
                | Error::IceCandidateError(_)
                | Error::MediaTrackError(_)
                | Error::PeerConnectionError(_)
        )
    }
}

impl From<webrtc::Error> for Error {
    fn from(err: webrtc::Error) -> Self {
        Error::PeerConnectionError(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::DirectoryError(err.to_string())
    }
}
