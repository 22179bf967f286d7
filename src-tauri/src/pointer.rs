//! Cursor polling for the overlay window.
//!
//! A click-through window receives no pointer events, so hover is derived by
//! comparing the global cursor position with the window rectangle.

use std::time::Duration;

use log::{debug, warn};
use overlay_core::{OverlayRequest, PointerInput};
use tauri::{AppHandle, PhysicalPosition, PhysicalSize};
use tokio_util::sync::CancellationToken;

use crate::types::SessionHandle;
use crate::window_management::main_window;

pub const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Movement below this radius does not count as activity.
pub const JITTER_RADIUS: f64 = 5.0;

#[derive(Debug, Default)]
pub struct HoverTracker {
    inside: bool,
    anchor: Option<(f64, f64)>,
}

impl HoverTracker {
    /// Feed one cursor sample. Returns the pointer input it amounts to, if any.
    pub fn sample(&mut self, inside: bool, cursor: (f64, f64)) -> Option<PointerInput> {
        match (self.inside, inside) {
            (false, true) => {
                self.inside = true;
                self.anchor = Some(cursor);
                Some(PointerInput::Enter)
            }
            (true, false) => {
                self.inside = false;
                self.anchor = None;
                Some(PointerInput::Leave)
            }
            (true, true) => {
                let (ax, ay) = self.anchor.unwrap_or(cursor);
                let moved = ((cursor.0 - ax).powi(2) + (cursor.1 - ay).powi(2)).sqrt();
                if moved > JITTER_RADIUS {
                    self.anchor = Some(cursor);
                    Some(PointerInput::Activity)
                } else {
                    None
                }
            }
            (false, false) => None,
        }
    }
}

pub fn contains(
    origin: PhysicalPosition<i32>,
    size: PhysicalSize<u32>,
    cursor: PhysicalPosition<f64>,
) -> bool {
    let x = cursor.x - origin.x as f64;
    let y = cursor.y - origin.y as f64;
    x >= 0.0 && y >= 0.0 && x < size.width as f64 && y < size.height as f64
}

fn cursor_inside(app: &AppHandle) -> anyhow::Result<(bool, PhysicalPosition<f64>)> {
    let window = main_window(app)?;
    let cursor = app.cursor_position()?;
    let inside = contains(window.outer_position()?, window.outer_size()?, cursor);
    Ok((inside, cursor))
}

pub fn spawn_cursor_poll(app: AppHandle, session: SessionHandle, cancel: CancellationToken) {
    tauri::async_runtime::spawn(async move {
        let mut tracker = HoverTracker::default();
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        let mut reported_failure = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let (inside, cursor) = match cursor_inside(&app) {
                Ok(sample) => {
                    reported_failure = false;
                    sample
                }
                Err(e) => {
                    if !reported_failure {
                        warn!("Cursor poll failed: {:#}", e);
                        reported_failure = true;
                    }
                    continue;
                }
            };

            if let Some(input) = tracker.sample(inside, (cursor.x, cursor.y)) {
                if session.requests.send(OverlayRequest::Pointer(input)).is_err() {
                    break;
                }
            }
        }
        debug!("Cursor poll stopped");
    });
}
