use log::info;
use overlay_core::config::ConfigurationDocument;
use overlay_core::host::font_families;
use overlay_core::{OverlayRequest, PlaybackEvent, PointerInput, SharedConfigStore, WindowMode};
use serde_json::Value;
use tauri::{AppHandle, Manager, State, WebviewWindow};

use crate::types::{ConfigStores, SessionHandle, WindowModes};
use crate::window_management::TauriHost;

/// Keys that survive a reset from the settings window.
const RESET_PRESERVED_KEYS: &[&str] = &["language"];

fn window_mode(window: &WebviewWindow) -> Result<WindowMode, String> {
    let modes = window.state::<WindowModes>();
    modes.resolve(window.label(), || {
        window
            .url()
            .map(|url| url.to_string())
            .map_err(|e| format!("Failed to read window URL: {}", e))
    })
}

fn store_for<'a>(
    window: &WebviewWindow,
    stores: &'a ConfigStores,
) -> Result<&'a SharedConfigStore, String> {
    Ok(stores.for_mode(window_mode(window)?))
}

#[tauri::command]
pub fn get_window_mode(window: WebviewWindow) -> Result<WindowMode, String> {
    window_mode(&window)
}

#[tauri::command]
pub async fn get_settings(
    window: WebviewWindow,
    stores: State<'_, ConfigStores>,
) -> Result<ConfigurationDocument, String> {
    let store = store_for(&window, &stores)?;
    let store = store.lock().await;
    Ok(store.document().clone())
}

#[tauri::command]
pub async fn update_settings(
    partial: Value,
    window: WebviewWindow,
    stores: State<'_, ConfigStores>,
) -> Result<ConfigurationDocument, String> {
    let store = store_for(&window, &stores)?;
    let mut store = store.lock().await;
    store
        .update(&partial)
        .map(|doc| doc.clone())
        .map_err(|e| format!("Failed to update settings: {:#}", e))
}

#[tauri::command]
pub async fn reset_settings(
    window: WebviewWindow,
    stores: State<'_, ConfigStores>,
) -> Result<ConfigurationDocument, String> {
    let store = store_for(&window, &stores)?;
    let mut store = store.lock().await;
    store
        .reset(RESET_PRESERVED_KEYS)
        .map(|doc| doc.clone())
        .map_err(|e| format!("Failed to reset settings: {:#}", e))
}

/// The overlay's own lock writes go through its session so the gesture
/// state follows; the settings window writes directly and replicates.
#[tauri::command]
pub async fn set_locked(
    locked: bool,
    window: WebviewWindow,
    stores: State<'_, ConfigStores>,
    session: State<'_, SessionHandle>,
) -> Result<(), String> {
    match window_mode(&window)? {
        WindowMode::Overlay => session
            .playback
            .send(PlaybackEvent::LockStateUpdate(locked))
            .map_err(|_| "Overlay session is not running".to_string()),
        WindowMode::Settings => {
            info!("Settings window set lock flag to {}", locked);
            stores
                .settings
                .lock()
                .await
                .set_locked(locked)
                .map_err(|e| format!("Failed to save lock flag: {:#}", e))
        }
    }
}

#[tauri::command]
pub async fn get_system_fonts(app_handle: AppHandle) -> Result<Vec<String>, String> {
    let host = TauriHost::new(app_handle);
    tauri::async_runtime::spawn_blocking(move || font_families(&host))
        .await
        .map_err(|e| format!("Font enumeration failed: {}", e))
}

#[tauri::command]
pub fn start_drag(session: State<'_, SessionHandle>) -> Result<(), String> {
    send_request(&session, OverlayRequest::Pointer(PointerInput::DragRequest))
}

#[tauri::command]
pub fn open_settings_window(session: State<'_, SessionHandle>) -> Result<(), String> {
    send_request(&session, OverlayRequest::OpenSettings)
}

fn send_request(session: &SessionHandle, request: OverlayRequest) -> Result<(), String> {
    session
        .requests
        .send(request)
        .map_err(|_| "Overlay session is not running".to_string())
}
