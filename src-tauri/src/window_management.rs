use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use overlay_core::{HostRuntime, WindowMode};
use tauri::{AppHandle, Emitter, Manager, PhysicalPosition, WebviewUrl, WebviewWindow};

use crate::types::{LockMenuItem, WindowModes, MAIN_WINDOW, SETTINGS_WINDOW};

/// Where "Reset Position" puts the overlay.
const RESET_POSITION: PhysicalPosition<i32> = PhysicalPosition { x: 100, y: 100 };

/// [`HostRuntime`] backed by the Tauri windows of this process.
pub struct TauriHost {
    app: AppHandle,
}

impl TauriHost {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }

    fn main_window(&self) -> Result<WebviewWindow> {
        main_window(&self.app)
    }
}

pub fn main_window(app: &AppHandle) -> Result<WebviewWindow> {
    app.get_webview_window(MAIN_WINDOW)
        .ok_or_else(|| anyhow!("Main window not found"))
}

pub fn lock_menu_label(locked: bool) -> &'static str {
    if locked {
        "Unlock"
    } else {
        "Lock"
    }
}

impl HostRuntime for TauriHost {
    fn set_lock_state(&self, locked: bool) -> Result<()> {
        if let Some(item) = self.app.try_state::<LockMenuItem>() {
            item.0
                .set_text(lock_menu_label(locked))
                .context("Failed to update tray label")?;
        }
        self.app
            .emit("lock-state-update", locked)
            .context("Failed to emit lock-state-update")?;
        Ok(())
    }

    fn set_pointer_passthrough(&self, ignore: bool) -> Result<()> {
        self.main_window()?
            .set_ignore_cursor_events(ignore)
            .with_context(|| format!("Failed to set click-through to {}", ignore))?;
        debug!("Click-through {}", if ignore { "enabled" } else { "disabled" });
        Ok(())
    }

    fn set_unlock_timing(&self, wait_secs: f64, hold_secs: f64) -> Result<()> {
        self.app
            .emit_to(
                MAIN_WINDOW,
                "unlock-timing",
                serde_json::json!({ "waitTime": wait_secs, "holdTime": hold_secs }),
            )
            .context("Failed to emit unlock-timing")?;
        Ok(())
    }

    fn set_hover_unlock_enabled(&self, enabled: bool) -> Result<()> {
        self.app
            .emit_to(MAIN_WINDOW, "hover-unlock-enabled", enabled)
            .context("Failed to emit hover-unlock-enabled")?;
        Ok(())
    }

    fn begin_window_drag(&self) -> Result<()> {
        self.main_window()?
            .start_dragging()
            .context("Failed to start dragging")?;
        Ok(())
    }

    fn open_settings_window(&self) -> Result<()> {
        open_settings_window(&self.app)
    }

    fn enumerate_font_families(&self) -> Result<Vec<String>> {
        let font_system = cosmic_text::FontSystem::new();
        let families = font_system
            .db()
            .faces()
            .flat_map(|face| face.families.iter().map(|(name, _)| name.clone()))
            .collect();
        Ok(families)
    }
}

/// Show the settings window, creating it on first use.
pub fn open_settings_window(app: &AppHandle) -> Result<()> {
    if let Some(window) = app.get_webview_window(SETTINGS_WINDOW) {
        window.show().context("Failed to show settings window")?;
        window.set_focus().context("Failed to focus settings window")?;
        return Ok(());
    }

    info!("Creating settings window");
    app.state::<WindowModes>()
        .register(SETTINGS_WINDOW, WindowMode::Settings)
        .map_err(|e| anyhow!(e))?;
    tauri::WebviewWindowBuilder::new(
        app,
        SETTINGS_WINDOW,
        WebviewUrl::App(WindowMode::Settings.start_url().into()),
    )
    .title("Settings")
    .inner_size(400.0, 600.0)
    .resizable(true)
    .decorations(true)
    .always_on_top(true)
    .build()
    .context("Failed to create settings window")?;
    Ok(())
}

pub fn reset_position(app: &AppHandle) -> Result<()> {
    let window = main_window(app)?;
    window
        .set_position(RESET_POSITION)
        .context("Failed to set position")?;
    window.show().context("Failed to show window")?;
    window.set_focus().context("Failed to focus window")?;
    info!("Overlay moved back to ({}, {})", RESET_POSITION.x, RESET_POSITION.y);
    Ok(())
}
