use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

use log::info;
use overlay_core::{OverlayRequest, PlaybackEvent, SharedConfigStore, WindowMode};
use tauri::menu::MenuItem;
use tauri::Wry;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const MAIN_WINDOW: &str = "main";
pub const SETTINGS_WINDOW: &str = "settings";

/// Emitted to the overlay window on every frame change.
pub const OVERLAY_FRAME_EVENT: &str = "overlay-frame";
/// Emitted to the settings window when the document changed elsewhere.
pub const SETTINGS_CHANGED_EVENT: &str = "settings-changed";

// Global state types
pub struct ConfigStores {
    pub overlay: SharedConfigStore,
    pub settings: SharedConfigStore,
}

impl ConfigStores {
    pub fn for_mode(&self, mode: WindowMode) -> &SharedConfigStore {
        match mode {
            WindowMode::Overlay => &self.overlay,
            WindowMode::Settings => &self.settings,
        }
    }
}

/// Senders into the running overlay session.
#[derive(Clone)]
pub struct SessionHandle {
    pub playback: mpsc::UnboundedSender<PlaybackEvent>,
    pub requests: mpsc::UnboundedSender<OverlayRequest>,
}

/// Tray entry whose label follows the lock flag.
pub struct LockMenuItem(pub MenuItem<Wry>);

/// Cancelled on exit; stops the session, ingestion and replication tasks.
pub struct Shutdown(pub CancellationToken);

/// Window mode per window label. A label's mode is fixed the first time the
/// window is seen and never re-read from its URL.
#[derive(Default)]
pub struct WindowModes(StdMutex<HashMap<String, WindowMode>>);

impl WindowModes {
    pub fn register(&self, label: &str, mode: WindowMode) -> Result<(), String> {
        let mut modes = self.lock()?;
        modes.insert(label.to_string(), mode);
        info!("Window {} runs in {:?} mode", label, mode);
        Ok(())
    }

    /// Mode for `label`, deriving it from `start_url` only if none is recorded yet.
    pub fn resolve<F>(&self, label: &str, start_url: F) -> Result<WindowMode, String>
    where
        F: FnOnce() -> Result<String, String>,
    {
        let mut modes = self.lock()?;
        if let Some(mode) = modes.get(label) {
            return Ok(*mode);
        }
        let mode = WindowMode::from_start_url(&start_url()?);
        modes.insert(label.to_string(), mode);
        info!("Window {} runs in {:?} mode", label, mode);
        Ok(mode)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, WindowMode>>, String> {
        self.0
            .lock()
            .map_err(|_| "Window mode table is poisoned".to_string())
    }
}
