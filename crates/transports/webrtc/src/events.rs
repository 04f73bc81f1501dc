//! Call lifecycle notifications

use crate::error::MediaError;
use crate::media::TrackKind;
use crate::negotiation::NegotiationState;

/// Event broadcast to presentation layers observing a call
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    /// The negotiation state machine moved
    StateChanged {
        from: NegotiationState,
        to: NegotiationState,
    },

    /// Local media could not be acquired; the call sequence was aborted
    MediaUnavailable(MediaError),

    /// A remote track was added to the remote media endpoint
    RemoteTrackAdded { track_id: String, kind: TrackKind },
}

impl CallEvent {
    /// User-facing message for events that need the user's attention
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            CallEvent::MediaUnavailable(err) => Some(err.user_message()),
            _ => None,
        }
    }
}
