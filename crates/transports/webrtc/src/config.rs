//! Configuration types for the call negotiation core

use serde::{Deserialize, Serialize};
use std::time::Duration;
use webrtc::ice_transport::ice_server::RTCIceServer;

/// Default fixed delay between control channel reconnect attempts
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;

/// Main configuration for a call context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// WebSocket signaling endpoint (ws:// or wss://)
    pub signaling_url: String,

    /// STUN server URLs handed to the peer session
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Fixed delay before reconnecting a closed control channel
    pub reconnect_delay_ms: u64,

    /// Registration / directory HTTP API base (http:// or https://)
    pub directory_url: String,

    /// Media kinds requested from the capture collaborator
    pub media: MediaConstraints,

    /// Identifier placed in the `caller` field of outgoing offers
    pub caller_id: String,

    /// Identifier placed in the `callee` field of outgoing offers
    pub callee_id: String,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn: or turns:)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

/// Which kinds of local media to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    /// Capture a video track
    pub video: bool,
    /// Capture an audio track
    pub audio: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

impl MediaConstraints {
    /// Audio only
    pub fn audio_only() -> Self {
        Self {
            video: false,
            audio: true,
        }
    }

    /// True when at least one kind is requested
    pub fn any(&self) -> bool {
        self.video || self.audio
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://localhost:8080/ws".to_string(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: Vec::new(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            directory_url: "http://localhost:8080/api/users".to_string(),
            media: MediaConstraints::default(),
            caller_id: "peerA".to_string(),
            callee_id: "peerB".to_string(),
        }
    }
}

impl CallConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `signaling_url` is not a WebSocket URL
    /// - `directory_url` is not an HTTP URL
    /// - a STUN/TURN URL has the wrong scheme
    /// - `reconnect_delay_ms` is zero
    /// - `media` requests nothing
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        let signaling = url::Url::parse(&self.signaling_url).map_err(|e| {
            Error::InvalidConfig(format!(
                "signaling_url is not a valid URL ({}): {}",
                e, self.signaling_url
            ))
        })?;
        if !matches!(signaling.scheme(), "ws" | "wss") {
            return Err(Error::InvalidConfig(format!(
                "signaling_url must start with ws:// or wss://, got {}",
                self.signaling_url
            )));
        }

        let directory = url::Url::parse(&self.directory_url).map_err(|e| {
            Error::InvalidConfig(format!(
                "directory_url is not a valid URL ({}): {}",
                e, self.directory_url
            ))
        })?;
        if !matches!(directory.scheme(), "http" | "https") {
            return Err(Error::InvalidConfig(format!(
                "directory_url must start with http:// or https://, got {}",
                self.directory_url
            )));
        }

        if let Some(bad) = self.stun_servers.iter().find(|url| !url.starts_with("stun:")) {
            return Err(Error::InvalidConfig(format!(
                "STUN server URL must start with stun:, got {}",
                bad
            )));
        }

        if let Some(bad) = self
            .turn_servers
            .iter()
            .find(|turn| !turn.url.starts_with("turn:") && !turn.url.starts_with("turns:"))
        {
            return Err(Error::InvalidConfig(format!(
                "TURN server URL must start with turn: or turns:, got {}",
                bad.url
            )));
        }

        if self.reconnect_delay_ms == 0 {
            return Err(Error::InvalidConfig(
                "reconnect_delay_ms must be greater than zero".to_string(),
            ));
        }

        if !self.media.any() {
            return Err(Error::InvalidConfig(
                "media must request audio, video or both".to_string(),
            ));
        }

        Ok(())
    }

    /// Configuration for two peers on the same host (no STUN/TURN)
    pub fn localhost(signaling_url: &str) -> Self {
        Self {
            signaling_url: signaling_url.to_string(),
            stun_servers: Vec::new(),
            ..Default::default()
        }
    }

    /// Reconnect delay as a [`Duration`]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// ICE server list for the peer session
    pub fn ice_servers(&self) -> Vec<RTCIceServer> {
        self.stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .chain(self.turn_servers.iter().map(|turn| RTCIceServer {
                urls: vec![turn.url.clone()],
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            }))
            .collect()
    }

    /// Set the signaling URL
    pub fn with_signaling_url(mut self, url: &str) -> Self {
        self.signaling_url = url.to_string();
        self
    }

    /// Set the directory base URL
    pub fn with_directory_url(mut self, url: &str) -> Self {
        self.directory_url = url.to_string();
        self
    }

    /// Add TURN servers to this configuration
    pub fn with_turn_servers(mut self, turn_servers: Vec<TurnServerConfig>) -> Self {
        self.turn_servers = turn_servers;
        self
    }

    /// Set the reconnect delay
    pub fn with_reconnect_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay_ms = delay_ms;
        self
    }

    /// Set the requested media kinds
    pub fn with_media(mut self, media: MediaConstraints) -> Self {
        self.media = media;
        self
    }

    /// Set caller and callee identifiers used by outgoing offers
    pub fn with_parties(mut self, caller_id: &str, callee_id: &str) -> Self {
        self.caller_id = caller_id.to_string();
        self.callee_id = callee_id.to_string();
        self
    }
}
