//! Inbound envelope dispatch

use crate::channel::MessageHandler;
use crate::negotiation::{NegotiationEngine, WeakNegotiationEngine};
use crate::protocol::Envelope;
use crate::{Error, Result};
use async_trait::async_trait;
use tracing::{debug, error, info, warn, Level};

/// Decodes inbound frames and hands them to the negotiation engine
///
/// Holds the engine weakly: the engine owns the channel that owns the router.
pub struct MessageRouter {
    engine: WeakNegotiationEngine,
}

impl MessageRouter {
    pub fn new(engine: &NegotiationEngine) -> Self {
        Self {
            engine: engine.downgrade(),
        }
    }

    /// Dispatch one decoded envelope by kind
    ///
    /// Returns the engine's verdict; unknown kinds are a protocol error and
    /// never reach the engine.
    pub async fn dispatch(&self, envelope: Envelope) -> Result<()> {
        if let Envelope::Unrecognized { kind } = &envelope {
            return Err(Error::UnknownMessageType(kind.clone()));
        }

        let Some(engine) = self.engine.upgrade() else {
            return Err(Error::NoSession(format!(
                "negotiation engine is gone, dropping {}",
                envelope.kind()
            )));
        };

        match envelope {
            Envelope::Offer {
                caller,
                callee,
                offer,
                session,
            } => {
                info!(%caller, %callee, "Offer received");
                engine.handle_offer(offer, session).await
            }
            Envelope::Answer { answer, session } => engine.handle_answer(answer, session).await,
            Envelope::Candidate { candidate, session } => {
                engine.add_remote_candidate(candidate, session).await
            }
            Envelope::Unrecognized { .. } => Ok(()),
        }
    }

    /// Decode and dispatch one frame, logging every failure
    pub async fn route(&self, frame: &str) {
        let envelope = match Envelope::decode(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("Dropping inbound frame: {}", e);
                return;
            }
        };

        let kind = envelope.kind().to_string();
        debug!(%kind, "Message received via WebSocket");

        if let Err(e) = self.dispatch(envelope).await {
            if failure_level(&e) == Level::WARN {
                warn!(%kind, "Dropped: {}", e);
            } else {
                error!(%kind, "Failed to handle message: {}", e);
            }
        }
    }
}

/// Level a failed dispatch is logged at
///
/// Envelopes that merely arrived at the wrong time are warnings; unknown
/// message types and negotiation failures are errors.
fn failure_level(err: &Error) -> Level {
    if err.is_protocol_error() {
        Level::WARN
    } else {
        Level::ERROR
    }
}

#[async_trait]
impl MessageHandler for MessageRouter {
    async fn on_message(&self, frame: String) {
        self.route(&frame).await;
    }
}
