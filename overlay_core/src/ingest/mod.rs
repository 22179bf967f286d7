//! Playback ingestion: the local endpoints the Playback Event Source pushes to.
//!
//! The HTTP port takes bare payloads on `POST /lyrics` and `POST /progress`.
//! The WebSocket port takes `{type, data, timestamp}` envelopes for every
//! inbound channel. Both hand decoded events to the same callback.

mod http;
mod websocket;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use tokio::net::TcpListener;

use crate::types::PlaybackEvent;

pub use websocket::{parse_message, Inbound, IngestMessage};

pub const DEFAULT_HTTP_PORT: u16 = 15000;
pub const DEFAULT_WS_PORT: u16 = 15001;
pub const HTTP_PORT_ENV: &str = "LYRIC_OVERLAY_PORT";
pub const WS_PORT_ENV: &str = "LYRIC_OVERLAY_WS_PORT";

/// Port from the environment variable `var`, falling back to `default`.
pub fn port_from_env(var: &str, default: u16) -> u16 {
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid {}={:?}, using {}", var, raw, default);
            default
        }),
        Err(_) => default,
    }
}

type EventCallback = Arc<dyn Fn(PlaybackEvent) + Send + Sync>;

/// Shared by both transports. Clones deliver to the same callback.
#[derive(Clone, Default)]
pub struct IngestServer {
    event_callback: Option<EventCallback>,
}

impl IngestServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_event_callback<F>(&mut self, callback: F)
    where
        F: Fn(PlaybackEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(Arc::new(callback));
    }

    pub async fn bind(port: u16) -> Result<TcpListener> {
        let addr = format!("127.0.0.1:{}", port);
        let listener = TcpListener::bind(&addr).await.with_context(|| {
            format!(
                "Failed to bind {} (another instance running or port in use?)",
                addr
            )
        })?;
        info!("Ingestion listening on: {}", addr);
        Ok(listener)
    }

    fn deliver(&self, event: PlaybackEvent) {
        match self.event_callback {
            Some(ref callback) => callback(event),
            None => debug!("No event callback set; dropping {}", event.channel()),
        }
    }
}
