//! The event loop that drives one overlay window.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::ConfigurationDocument;
use crate::host::{dispatch, HostRuntime};
use crate::overlay::{Effects, OverlayFrame, OverlayState, PointerInput};
use crate::store::SharedConfigStore;
use crate::types::PlaybackEvent;

/// Roughly one frame at 30 fps.
pub const DEFAULT_TICK: Duration = Duration::from_millis(33);

/// Requests coming from the overlay window itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayRequest {
    Pointer(PointerInput),
    OpenSettings,
}

/// Receives every frame that differs from the previous one.
pub trait FrameSink: Send {
    fn push(&mut self, frame: &OverlayFrame) -> Result<()>;
}

impl<F> FrameSink for F
where
    F: FnMut(&OverlayFrame) -> Result<()> + Send,
{
    fn push(&mut self, frame: &OverlayFrame) -> Result<()> {
        self(frame)
    }
}

pub struct SessionInputs {
    pub playback: mpsc::UnboundedReceiver<PlaybackEvent>,
    pub config: mpsc::UnboundedReceiver<ConfigurationDocument>,
    pub requests: mpsc::UnboundedReceiver<OverlayRequest>,
}

pub struct OverlaySession<S> {
    state: OverlayState,
    store: SharedConfigStore,
    host: Arc<dyn HostRuntime>,
    sink: S,
    last_frame: Option<OverlayFrame>,
}

impl<S: FrameSink> OverlaySession<S> {
    pub async fn new(store: SharedConfigStore, host: Arc<dyn HostRuntime>, sink: S) -> Self {
        let config = store.lock().await.document().clone();
        let state = OverlayState::new(config, Instant::now().into_std());
        Self {
            state,
            store,
            host,
            sink,
            last_frame: None,
        }
    }

    async fn perform(&mut self, effects: Effects) {
        dispatch(self.host.as_ref(), &effects.host);
        if let Some(locked) = effects.lock_write {
            if let Err(e) = self.store.lock().await.set_locked(locked) {
                error!("Failed to persist lock flag: {:#}", e);
            }
        }

        let frame = self.state.frame();
        if self.last_frame.as_ref() == Some(&frame) {
            return;
        }
        if let Err(e) = self.sink.push(&frame) {
            error!("Failed to push overlay frame: {:#}", e);
        }
        self.last_frame = Some(frame);
    }

    /// Run until `cancel` fires.
    pub async fn run(mut self, mut inputs: SessionInputs, tick: Duration, cancel: CancellationToken) {
        info!("Overlay session started (tick {:?})", tick);
        let initial = Effects {
            host: self.state.initial_commands(),
            lock_write: None,
        };
        self.perform(initial).await;

        let mut ticker = time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let effects = tokio::select! {
                _ = cancel.cancelled() => break,
                Some(event) = inputs.playback.recv() => {
                    self.state.apply(event, Instant::now().into_std())
                }
                Some(doc) = inputs.config.recv() => {
                    self.state.apply_config(doc, Instant::now().into_std())
                }
                Some(request) = inputs.requests.recv() => match request {
                    OverlayRequest::Pointer(input) => {
                        self.state.pointer(input, Instant::now().into_std())
                    }
                    OverlayRequest::OpenSettings => self.state.request_open_settings(),
                },
                _ = ticker.tick() => self.state.tick(Instant::now().into_std()),
            };
            if !effects.is_empty() {
                debug!("Overlay effects: {:?}", effects);
            }
            self.perform(effects).await;
        }
        info!("Overlay session stopped");
    }
}

/// Build a session from the store's current document and run it.
pub async fn run_overlay_session<S: FrameSink>(
    store: SharedConfigStore,
    host: Arc<dyn HostRuntime>,
    inputs: SessionInputs,
    sink: S,
    tick: Duration,
    cancel: CancellationToken,
) {
    OverlaySession::new(store, host, sink)
        .await
        .run(inputs, tick, cancel)
        .await
}
