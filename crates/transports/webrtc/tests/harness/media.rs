//! Capture and render surface doubles

use alloallo_webrtc::{MediaCapture, MediaConstraints, MediaEndpoint, MediaError, RenderSurface};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Capture that always fails with the configured error
pub struct DeniedCapture {
    error: MediaError,
    attempts: AtomicUsize,
}

impl DeniedCapture {
    pub fn new(error: MediaError) -> Arc<Self> {
        Arc::new(Self {
            error,
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn permission_denied() -> Arc<Self> {
        Self::new(MediaError::PermissionDenied(
            "user dismissed the prompt".to_string(),
        ))
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaCapture for DeniedCapture {
    async fn acquire(&self, _constraints: MediaConstraints) -> Result<MediaEndpoint, MediaError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// Surface recording every endpoint attached to it
#[derive(Default)]
pub struct RecordingSurface {
    attached: Mutex<Vec<MediaEndpoint>>,
}

impl RecordingSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attach_count(&self) -> usize {
        self.attached.lock().len()
    }

    pub fn last(&self) -> Option<MediaEndpoint> {
        self.attached.lock().last().cloned()
    }
}

impl RenderSurface for RecordingSurface {
    fn attach(&self, endpoint: MediaEndpoint) {
        self.attached.lock().push(endpoint);
    }
}
