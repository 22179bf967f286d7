use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::routing::post;
use axum::Router;
use log::{debug, info, warn};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use super::IngestServer;
use crate::types::PlaybackEvent;

type Reply = (StatusCode, &'static str);

impl IngestServer {
    /// `POST /lyrics` and `POST /progress`, open to any origin so a browser
    /// page can post to them.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
            .allow_headers(Any);

        Router::new()
            .route("/lyrics", post(handle_lyrics))
            .route("/progress", post(handle_progress))
            .layer(cors)
            .with_state(self.clone())
    }

    /// Serve the HTTP routes until `cancel` fires.
    pub async fn serve_http(&self, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .context("HTTP ingestion failed")?;
        info!("HTTP ingestion stopped");
        Ok(())
    }
}

async fn handle_lyrics(State(server): State<IngestServer>, body: Bytes) -> Reply {
    accept(&server, PlaybackEvent::LYRICS_UPDATE, &body)
}

async fn handle_progress(State(server): State<IngestServer>, body: Bytes) -> Reply {
    accept(&server, PlaybackEvent::PROGRESS_UPDATE, &body)
}

fn accept(server: &IngestServer, channel: &str, body: &[u8]) -> Reply {
    let decoded = serde_json::from_slice::<Value>(body)
        .and_then(|data| PlaybackEvent::from_channel(channel, data));
    match decoded {
        Ok(Some(event)) => {
            debug!("HTTP {}", channel);
            server.deliver(event);
            (StatusCode::OK, "OK")
        }
        Ok(None) => (StatusCode::NOT_FOUND, "Unknown channel"),
        Err(e) => {
            warn!("Failed to parse {} payload: {}", channel, e);
            (StatusCode::BAD_REQUEST, "Malformed payload")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LyricLine, LyricsPayload, ProgressSnapshot, TrackInfo};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    struct Running {
        addr: SocketAddr,
        events: mpsc::UnboundedReceiver<PlaybackEvent>,
        cancel: CancellationToken,
        task: tokio::task::JoinHandle<Result<()>>,
    }

    async fn start() -> Running {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (events_tx, events) = mpsc::unbounded_channel();
        let mut server = IngestServer::new();
        server.set_event_callback(move |event| {
            let _ = events_tx.send(event);
        });
        let cancel = CancellationToken::new();
        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { server.serve_http(listener, cancel).await })
        };

        Running {
            addr,
            events,
            cancel,
            task,
        }
    }

    // Loopback requests must not go through a proxy from the environment.
    fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    async fn post_json(addr: SocketAddr, path: &str, body: &str) -> reqwest::StatusCode {
        client()
            .post(format!("http://{}{}", addr, path))
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .unwrap()
            .status()
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<PlaybackEvent>) -> PlaybackEvent {
        timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn lyrics_route_delivers_lyrics_update() {
        let mut running = start().await;

        let body = r#"{
            "track": {"title": "Song", "artist": "Band", "album": "Record", "duration": 200},
            "lyrics": [{"startTime": 1.5, "text": "hello"}],
            "isSynced": true
        }"#;
        assert_eq!(post_json(running.addr, "/lyrics", body).await, reqwest::StatusCode::OK);

        match next_event(&mut running.events).await {
            PlaybackEvent::LyricsUpdate(LyricsPayload {
                track: TrackInfo { title, .. },
                lyrics,
                ..
            }) => {
                assert_eq!(title, "Song");
                assert_eq!(lyrics.len(), 1);
                let LyricLine { start_time, text, .. } = &lyrics[0];
                assert_eq!(*start_time, 1.5);
                assert_eq!(text, "hello");
            }
            other => panic!("unexpected event {:?}", other),
        }

        running.cancel.cancel();
        running.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn progress_route_delivers_progress_update() {
        let mut running = start().await;

        let body = r#"{"position": 42.0, "isPlaying": false, "remaining": 10}"#;
        assert_eq!(post_json(running.addr, "/progress", body).await, reqwest::StatusCode::OK);

        assert_eq!(
            next_event(&mut running.events).await,
            PlaybackEvent::ProgressUpdate(ProgressSnapshot {
                position: 42.0,
                is_playing: false,
                remaining: Some(10.0),
                ..Default::default()
            })
        );

        running.cancel.cancel();
        running.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected_and_dropped() {
        let mut running = start().await;

        let status = post_json(running.addr, "/progress", "{\"isPlaying\": true").await;
        assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
        let status = post_json(running.addr, "/lyrics", r#"{"lyrics": []}"#).await;
        assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);

        assert!(running.events.try_recv().is_err());

        running.cancel.cancel();
        running.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn preflight_allows_any_origin() {
        let running = start().await;

        let response = client()
            .request(
                reqwest::Method::OPTIONS,
                format!("http://{}/progress", running.addr),
            )
            .header("origin", "https://open.spotify.com")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
        drop(response);

        running.cancel.cancel();
        running.task.await.unwrap().unwrap();
    }
}
