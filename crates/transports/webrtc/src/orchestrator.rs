//! Public entry point tying channel, router and engine together

use crate::channel::{ChannelConnector, ControlChannel, WebSocketConnector};
use crate::config::CallConfig;
use crate::events::CallEvent;
use crate::media::{MediaCapture, RenderSurface};
use crate::negotiation::{NegotiationEngine, NegotiationState};
use crate::peer::{PeerSessionFactory, WebRtcPeerFactory};
use crate::router::MessageRouter;
use crate::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, instrument};

/// One call context: a control channel, a router, and a negotiation engine
///
/// Several orchestrators may coexist; nothing is shared between them.
/// Dropping an orchestrator resets its control channel.
pub struct CallOrchestrator {
    config: CallConfig,
    channel: ControlChannel,
    engine: NegotiationEngine,
}

impl CallOrchestrator {
    /// Create an orchestrator using WebSockets and webrtc-rs
    ///
    /// # Errors
    ///
    /// Fails if `config` does not validate.
    pub fn new(config: CallConfig, capture: Arc<dyn MediaCapture>) -> Result<Self> {
        Self::with_collaborators(
            config,
            Arc::new(WebSocketConnector),
            capture,
            Arc::new(WebRtcPeerFactory::new()),
        )
    }

    /// Create an orchestrator with explicit transport and peer collaborators
    pub fn with_collaborators(
        config: CallConfig,
        connector: Arc<dyn ChannelConnector>,
        capture: Arc<dyn MediaCapture>,
        peers: Arc<dyn PeerSessionFactory>,
    ) -> Result<Self> {
        config.validate()?;

        let channel = ControlChannel::new(&config.signaling_url, config.reconnect_delay(), connector);
        let engine = NegotiationEngine::new(&config, channel.clone(), capture, peers);
        channel.on_message(Arc::new(MessageRouter::new(&engine)));

        Ok(Self {
            config,
            channel,
            engine,
        })
    }

    pub fn config(&self) -> &CallConfig {
        &self.config
    }

    pub fn channel(&self) -> &ControlChannel {
        &self.channel
    }

    pub fn engine(&self) -> &NegotiationEngine {
        &self.engine
    }

    pub fn state(&self) -> NegotiationState {
        self.engine.state()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.engine.subscribe()
    }

    /// Open the control channel
    ///
    /// A failed attempt is returned, and retried in the background anyway.
    pub async fn connect(&self) -> Result<()> {
        self.channel.connect().await
    }

    /// Place a call to the configured callee
    pub async fn start_call(
        &self,
        local_surface: Arc<dyn RenderSurface>,
        remote_surface: Arc<dyn RenderSurface>,
    ) -> Result<()> {
        let (caller, callee) = (self.config.caller_id.clone(), self.config.callee_id.clone());
        self.call(&caller, &callee, local_surface, remote_surface)
            .await
    }

    /// Place a call from `caller` to `callee`
    ///
    /// Runs strictly in order: acquire local media, show it on
    /// `local_surface`, create the session, route remote tracks to
    /// `remote_surface`, send the offer. The first failure stops the sequence
    /// and leaves the state reached so far.
    #[instrument(skip(self, local_surface, remote_surface))]
    pub async fn call(
        &self,
        caller: &str,
        callee: &str,
        local_surface: Arc<dyn RenderSurface>,
        remote_surface: Arc<dyn RenderSurface>,
    ) -> Result<()> {
        self.prepare(local_surface, remote_surface).await?;
        self.engine.create_offer(caller, callee).await?;
        info!(caller, callee, "Call started");
        Ok(())
    }

    /// Get ready to answer an incoming offer
    ///
    /// Same as [`call`](Self::call) without sending an offer.
    pub async fn prepare_to_answer(
        &self,
        local_surface: Arc<dyn RenderSurface>,
        remote_surface: Arc<dyn RenderSurface>,
    ) -> Result<()> {
        self.prepare(local_surface, remote_surface).await?;
        info!("Waiting for an offer");
        Ok(())
    }

    async fn prepare(
        &self,
        local_surface: Arc<dyn RenderSurface>,
        remote_surface: Arc<dyn RenderSurface>,
    ) -> Result<()> {
        let local = self.engine.init_local_media().await?;
        local_surface.attach(local);
        self.engine.create_session().await?;
        self.engine.attach_remote_surface(remote_surface)
    }

    /// Tear down the current call; the control channel stays open
    ///
    /// ```
    /// # use alloallo_webrtc::{CallConfig, CallOrchestrator, NegotiationState, SyntheticCapture};
    /// # use std::sync::Arc;
    /// # tokio_test::block_on(async {
    /// let orchestrator =
    ///     CallOrchestrator::new(CallConfig::default(), Arc::new(SyntheticCapture::default()))
    ///         .unwrap();
    /// orchestrator.reset().await;
    /// assert_eq!(orchestrator.state(), NegotiationState::Closed);
    /// # });
    /// ```
    pub async fn reset(&self) {
        self.engine.reset().await;
    }

    /// Tear down the call and close the control channel for good
    pub async fn shutdown(&self) {
        self.engine.reset().await;
        self.channel.reset();
    }
}

impl Drop for CallOrchestrator {
    fn drop(&mut self) {
        self.channel.reset();
    }
}
