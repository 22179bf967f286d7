use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use anyhow::{Context, Result};

use super::IngestServer;
use crate::types::PlaybackEvent;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub timestamp: u64,
}

impl IngestMessage {
    fn new(message_type: &str, data: serde_json::Value) -> Self {
        Self {
            message_type: message_type.to_string(),
            data,
            timestamp: now_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(PlaybackEvent),
    Ping,
    Ignored,
}

/// Parse one text frame. Anything unusable is logged and ignored.
pub fn parse_message(text: &str) -> Inbound {
    let message = match serde_json::from_str::<IngestMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Failed to parse message: {} ({})", text, e);
            return Inbound::Ignored;
        }
    };

    if message.message_type == "ping" {
        return Inbound::Ping;
    }

    match PlaybackEvent::from_channel(&message.message_type, message.data) {
        Ok(Some(event)) => Inbound::Event(event),
        Ok(None) => {
            debug!("Unknown message type: {}", message.message_type);
            Inbound::Ignored
        }
        Err(e) => {
            warn!("Failed to parse {} payload: {}", message.message_type, e);
            Inbound::Ignored
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl IngestServer {
    /// Accept WebSocket connections until `cancel` fires. Open connections
    /// are closed on the way out.
    pub async fn serve(&self, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        loop {
            let (stream, addr) = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => accepted.context("Failed to accept connection")?,
            };

            let server = self.clone();
            let cancel = cancel.child_token();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, server, cancel).await {
                    error!("Error handling connection from {}: {:#}", addr, e);
                }
            });
        }
        info!("WebSocket ingestion stopped");
        Ok(())
    }
}

async fn handle_connection(
    raw_stream: TcpStream,
    addr: SocketAddr,
    server: IngestServer,
    cancel: CancellationToken,
) -> Result<()> {
    let ws_stream = accept_async(raw_stream)
        .await
        .context("WebSocket handshake failed")?;
    let client_id = Uuid::new_v4().to_string();

    info!("New connection: {} with ID: {}", addr, client_id);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let welcome = IngestMessage::new(
        "connected",
        serde_json::json!({
            "client_id": client_id,
            "status": "ready"
        }),
    );
    ws_sender
        .send(Message::Text(serde_json::to_string(&welcome)?))
        .await?;

    let (tx, mut rx) = mpsc::unbounded_channel();

    let client_id_for_sender = client_id.clone();
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_sender.send(message).await {
                error!("Failed to send message to client {}: {}", client_id_for_sender, e);
                break;
            }
        }
        debug!("Message forwarding task ended for client {}", client_id_for_sender);
    });

    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = tx.send(Message::Close(None));
                break;
            }
            msg = ws_receiver.next() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        match msg? {
            Message::Text(text) => match parse_message(&text) {
                Inbound::Event(event) => {
                    debug!("Client {} sent {}", client_id, event.channel());
                    server.deliver(event);
                }
                Inbound::Ping => {
                    let pong = IngestMessage::new("pong", serde_json::json!({}));
                    let _ = tx.send(Message::Text(serde_json::to_string(&pong)?));
                }
                Inbound::Ignored => {}
            },
            Message::Binary(_) => {
                debug!("Received binary message (not supported)");
            }
            Message::Close(_) => {
                info!("Client {} disconnected", client_id);
                break;
            }
            _ => {}
        }
    }

    info!("Connection {} closed", client_id);
    Ok(())
}
