//! Signaling wire protocol
//!
//! Envelopes are JSON text frames tagged by `type`:
//!
//! ```text
//! { "type": "offer",     "caller": <id>, "callee": <id>, "offer": <SessionDescription> }
//! { "type": "answer",    "answer": <SessionDescription> }
//! { "type": "candidate", "candidate": <IceCandidate> }
//! ```
//!
//! Every envelope may also carry a `session` tag naming the call attempt it
//! belongs to. Peers that never send it are still understood.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Kind of a session description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Offer from the caller
    Offer,
    /// Provisional answer
    Pranswer,
    /// Final answer from the callee
    Answer,
    /// Rollback of a pending local description
    Rollback,
}

/// Session description as exchanged on the wire (`{"type": ..., "sdp": ...}`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Description kind
    #[serde(rename = "type")]
    pub sdp_type: SdpType,

    /// Raw SDP text
    pub sdp: String,
}

impl SessionDescription {
    /// Build an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Build an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate descriptor in the browser JSON shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// Candidate line (`candidate:...`)
    pub candidate: String,

    /// Media stream identification tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    /// Index of the m-line the candidate belongs to
    #[serde(
        default,
        rename = "sdpMLineIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,

    /// ICE username fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// Signaling envelope
///
/// The three negotiation kinds are closed; anything else decodes into
/// [`Envelope::Unrecognized`] so the router can reject it explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    /// Caller's offer
    Offer {
        /// Calling party identifier
        caller: String,
        /// Called party identifier
        callee: String,
        /// Offer description
        offer: SessionDescription,
        /// Call attempt tag
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<String>,
    },

    /// Callee's answer
    Answer {
        /// Answer description
        answer: SessionDescription,
        /// Call attempt tag
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<String>,
    },

    /// Trickled ICE candidate
    Candidate {
        /// Candidate descriptor
        candidate: IceCandidate,
        /// Call attempt tag
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<String>,
    },

    /// Syntactically valid envelope with a `type` this peer does not handle
    #[serde(skip)]
    Unrecognized {
        /// The `type` value as received
        kind: String,
    },
}

impl Envelope {
    /// Decode one text frame
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolError`] when the frame is not JSON, has no
    /// string `type`, or a known kind has the wrong payload shape.
    pub fn decode(frame: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(frame)
            .map_err(|e| Error::ProtocolError(format!("envelope is not valid JSON: {}", e)))?;

        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| Error::ProtocolError("envelope has no string `type`".to_string()))?;

        match kind {
            "offer" | "answer" | "candidate" => {
                let kind = kind.to_string();
                serde_json::from_value(value).map_err(|e| {
                    Error::ProtocolError(format!("malformed {} envelope: {}", kind, e))
                })
            }
            other => Ok(Envelope::Unrecognized {
                kind: other.to_string(),
            }),
        }
    }

    /// Encode as a text frame
    ///
    /// # Errors
    ///
    /// [`Envelope::Unrecognized`] has no wire form and cannot be encoded.
    pub fn encode(&self) -> Result<String> {
        if let Envelope::Unrecognized { kind } = self {
            return Err(Error::ProtocolError(format!(
                "cannot encode unrecognized envelope kind {}",
                kind
            )));
        }
        Ok(serde_json::to_string(self)?)
    }

    /// The `type` tag of this envelope
    pub fn kind(&self) -> &str {
        match self {
            Envelope::Offer { .. } => "offer",
            Envelope::Answer { .. } => "answer",
            Envelope::Candidate { .. } => "candidate",
            Envelope::Unrecognized { kind } => kind,
        }
    }

    /// Call attempt tag carried by this envelope, if any
    pub fn session(&self) -> Option<&str> {
        match self {
            Envelope::Offer { session, .. }
            | Envelope::Answer { session, .. }
            | Envelope::Candidate { session, .. } => session.as_deref(),
            Envelope::Unrecognized { .. } => None,
        }
    }
}
