use std::sync::Arc;

use log::{error, info, warn};
use overlay_core::ingest::{
    port_from_env, IngestServer, DEFAULT_HTTP_PORT, DEFAULT_WS_PORT, HTTP_PORT_ENV, WS_PORT_ENV,
};
use overlay_core::session::DEFAULT_TICK;
use overlay_core::store::DurableSlot;
use overlay_core::{
    run_overlay_session, spawn_replication, ConfigStore, FileSlot, MemorySlot, OverlayFrame,
    OverlayRequest, PlaybackEvent, SessionInputs, SharedConfigStore, WindowMode,
};
use tauri::menu::{Menu, MenuItem, PredefinedMenuItem};
use tauri::tray::TrayIconBuilder;
use tauri::{App, AppHandle, Emitter, Manager, RunEvent};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

// Module declarations
mod commands;
mod pointer;
mod types;
mod window_management;

use commands::{
    get_settings, get_system_fonts, get_window_mode, open_settings_window, reset_settings,
    set_locked, start_drag, update_settings,
};
use types::{
    ConfigStores, LockMenuItem, SessionHandle, Shutdown, WindowModes, MAIN_WINDOW,
    OVERLAY_FRAME_EVENT, SETTINGS_CHANGED_EVENT, SETTINGS_WINDOW,
};
use window_management::{lock_menu_label, main_window, reset_position, TauriHost};

fn settings_slot(app: &App) -> Arc<dyn DurableSlot> {
    match app.path().app_config_dir() {
        Ok(dir) => {
            let slot = FileSlot::in_dir(dir);
            info!("Settings file: {}", slot.path().display());
            Arc::new(slot)
        }
        Err(e) => {
            warn!("No app config dir ({}), settings will not persist", e);
            Arc::new(MemorySlot::new())
        }
    }
}

/// Flip the lock flag through the overlay session, as the gesture would.
#[cfg(desktop)]
fn toggle_lock(app: &AppHandle) {
    let stores = app.state::<ConfigStores>().overlay.clone();
    let session = app.state::<SessionHandle>().inner().clone();
    tauri::async_runtime::spawn(async move {
        let locked = stores.lock().await.document().is_locked;
        info!("Toggling lock: {} -> {}", locked, !locked);
        if session
            .playback
            .send(PlaybackEvent::LockStateUpdate(!locked))
            .is_err()
        {
            error!("Overlay session is not running; lock toggle dropped");
        }
    });
}

#[cfg(desktop)]
fn setup_tray(app: &App, locked: bool) -> tauri::Result<()> {
    let toggle_lock_i = MenuItem::with_id(app, "toggle_lock", lock_menu_label(locked), true, None::<&str>)?;
    let settings_i = MenuItem::with_id(app, "settings", "Settings", true, None::<&str>)?;
    let reset_pos_i = MenuItem::with_id(app, "reset_pos", "Reset Position", true, None::<&str>)?;
    let quit_i = MenuItem::with_id(app, "quit", "Quit", true, None::<&str>)?;
    let separator = PredefinedMenuItem::separator(app)?;
    let menu = Menu::with_items(
        app,
        &[&toggle_lock_i, &settings_i, &reset_pos_i, &separator, &quit_i],
    )?;
    app.manage(LockMenuItem(toggle_lock_i));

    let mut tray = TrayIconBuilder::with_id("lyric-overlay-tray")
        .tooltip("Lyric Overlay")
        .menu(&menu)
        .on_menu_event(|app, event| match event.id().as_ref() {
            "toggle_lock" => toggle_lock(app),
            "settings" => {
                let session = app.state::<SessionHandle>();
                if session.requests.send(OverlayRequest::OpenSettings).is_err() {
                    error!("Overlay session is not running; cannot open settings");
                }
            }
            "reset_pos" => {
                if let Err(e) = reset_position(app) {
                    error!("Failed to reset overlay position: {:#}", e);
                }
            }
            "quit" => {
                info!("Quit requested from tray");
                app.exit(0);
            }
            _ => {}
        });
    if let Some(icon) = app.default_window_icon() {
        tray = tray.icon(icon.clone());
    }
    tray.build(app)?;

    info!("System tray initialized");
    Ok(())
}

#[cfg(desktop)]
fn setup_shortcuts(app: &App) -> Result<(), Box<dyn std::error::Error>> {
    use tauri_plugin_global_shortcut::{
        Code, GlobalShortcutExt, Modifiers, Shortcut, ShortcutState,
    };

    let ctrl_shift_l = Shortcut::new(Some(Modifiers::CONTROL | Modifiers::SHIFT), Code::KeyL);

    app.handle().plugin(
        tauri_plugin_global_shortcut::Builder::new()
            .with_handler(move |app, shortcut, event| {
                if event.state() == ShortcutState::Pressed && shortcut == &ctrl_shift_l {
                    info!("Global shortcut Ctrl+Shift+L triggered - toggling lock");
                    toggle_lock(app);
                }
            })
            .build(),
    )?;
    app.global_shortcut().register(ctrl_shift_l)?;

    info!("Global shortcut registered: Ctrl+Shift+L (lock/unlock)");
    Ok(())
}

fn start_services(app: &App) -> Result<(), Box<dyn std::error::Error>> {
    let handle = app.handle().clone();
    let cancel = CancellationToken::new();

    let slot = settings_slot(app);
    let mut overlay = ConfigStore::load(slot.clone(), WindowMode::Overlay);
    let mut settings = ConfigStore::load(slot, WindowMode::Settings);
    #[cfg(desktop)]
    let locked = overlay.document().is_locked;

    let (playback_tx, playback_rx) = mpsc::unbounded_channel::<PlaybackEvent>();
    let (config_tx, config_rx) = mpsc::unbounded_channel();
    let (requests_tx, requests_rx) = mpsc::unbounded_channel();
    let session = SessionHandle {
        playback: playback_tx.clone(),
        requests: requests_tx,
    };

    // The overlay replica feeds its session; the settings replica refreshes
    // the settings window.
    overlay.on_external_change(move |doc| {
        let _ = config_tx.send(doc.clone());
    });
    let emitter = handle.clone();
    settings.on_external_change(move |doc| {
        if let Err(e) = emitter.emit_to(SETTINGS_WINDOW, SETTINGS_CHANGED_EVENT, doc) {
            error!("Failed to emit {}: {}", SETTINGS_CHANGED_EVENT, e);
        }
    });
    let (overlay_subscription, overlay_changes) = overlay.subscribe()?;
    let (settings_subscription, settings_changes) = settings.subscribe()?;

    let overlay_store: SharedConfigStore = Arc::new(Mutex::new(overlay));
    let settings_store: SharedConfigStore = Arc::new(Mutex::new(settings));
    let replication = [
        (overlay_store.clone(), overlay_changes),
        (settings_store.clone(), settings_changes),
    ];

    app.manage(ConfigStores {
        overlay: overlay_store.clone(),
        settings: settings_store,
    });
    app.manage(session.clone());
    app.manage(Shutdown(cancel.clone()));

    // The overlay's mode comes from its start URL, read once here.
    let modes = WindowModes::default();
    let main = main_window(&handle)?;
    modes.resolve(main.label(), || {
        main.url()
            .map(|url| url.to_string())
            .map_err(|e| format!("Failed to read main window URL: {}", e))
    })?;
    app.manage(modes);

    #[cfg(desktop)]
    {
        setup_tray(app, locked)?;
        setup_shortcuts(app)?;
    }

    // Overlay session
    let host = Arc::new(TauriHost::new(handle.clone()));
    let frame_handle = handle.clone();
    let sink = move |frame: &OverlayFrame| -> anyhow::Result<()> {
        frame_handle.emit_to(MAIN_WINDOW, OVERLAY_FRAME_EVENT, frame)?;
        Ok(())
    };
    let inputs = SessionInputs {
        playback: playback_rx,
        config: config_rx,
        requests: requests_rx,
    };
    let session_cancel = cancel.clone();
    tauri::async_runtime::spawn(async move {
        // Watchers stop once their subscription is dropped.
        let _subscriptions = (overlay_subscription, settings_subscription);
        for (store, rx) in replication {
            spawn_replication(store, rx, session_cancel.clone());
        }
        run_overlay_session(overlay_store, host, inputs, sink, DEFAULT_TICK, session_cancel).await;
    });

    // Playback ingestion
    let mut server = IngestServer::new();
    server.set_event_callback(move |event| {
        if playback_tx.send(event).is_err() {
            warn!("Overlay session gone; dropping playback event");
        }
    });
    let http_port = port_from_env(HTTP_PORT_ENV, DEFAULT_HTTP_PORT);
    let http_server = server.clone();
    let http_cancel = cancel.clone();
    tauri::async_runtime::spawn(async move {
        match IngestServer::bind(http_port).await {
            Ok(listener) => {
                if let Err(e) = http_server.serve_http(listener, http_cancel).await {
                    error!("HTTP ingestion failed: {:#}", e);
                }
            }
            Err(e) => error!("{:#}", e),
        }
    });

    let ws_port = port_from_env(WS_PORT_ENV, DEFAULT_WS_PORT);
    let ws_cancel = cancel.clone();
    tauri::async_runtime::spawn(async move {
        match IngestServer::bind(ws_port).await {
            Ok(listener) => {
                if let Err(e) = server.serve(listener, ws_cancel).await {
                    error!("WebSocket ingestion failed: {:#}", e);
                }
            }
            Err(e) => error!("{:#}", e),
        }
    });

    pointer::spawn_cursor_poll(handle, session, cancel);
    Ok(())
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    dotenv::dotenv().ok();

    // Initialize logger
    env_logger::Builder::from_default_env()
        .filter_level(if cfg!(debug_assertions) {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .init();

    info!("Starting Lyric Overlay...");

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| start_services(app))
        .invoke_handler(tauri::generate_handler![
            get_window_mode,
            get_settings,
            update_settings,
            reset_settings,
            set_locked,
            get_system_fonts,
            start_drag,
            open_settings_window
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app, event| {
            if let RunEvent::Exit = event {
                info!("Shutting down");
                if let Some(shutdown) = app.try_state::<Shutdown>() {
                    shutdown.0.cancel();
                }
            }
        });
}
