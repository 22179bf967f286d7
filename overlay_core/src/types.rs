use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub album_art: Option<String>,
    #[serde(default)]
    pub duration: f64, // seconds
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LyricLine {
    pub start_time: f64, // seconds
    #[serde(default)]
    pub end_time: Option<f64>,
    pub text: String,
    #[serde(default)]
    pub pron_text: Option<String>, // Phonetic/romanized text
    #[serde(default)]
    pub trans_text: Option<String>,
}

/// Preview of the upcoming track, a subset of [`TrackInfo`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NextTrackInfo {
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album_art: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LyricsPayload {
    pub track: TrackInfo,
    #[serde(default)]
    pub lyrics: Vec<LyricLine>,
    #[serde(default = "default_synced")]
    pub is_synced: bool,
}

fn default_synced() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub position: f64,
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub remaining: Option<f64>,
    #[serde(default)]
    pub next_track: Option<NextTrackInfo>,
}

/// Inbound push events, one variant per named channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    LyricsUpdate(LyricsPayload),
    ProgressUpdate(ProgressSnapshot),
    LockStateUpdate(bool),
    OverlayHover(bool),
    UnlockProgress(f64),
}

impl PlaybackEvent {
    pub const LYRICS_UPDATE: &'static str = "lyrics-update";
    pub const PROGRESS_UPDATE: &'static str = "progress-update";
    pub const LOCK_STATE_UPDATE: &'static str = "lock-state-update";
    pub const OVERLAY_HOVER: &'static str = "overlay-hover";
    pub const UNLOCK_PROGRESS: &'static str = "unlock-progress";

    pub fn channel(&self) -> &'static str {
        match self {
            PlaybackEvent::LyricsUpdate(_) => Self::LYRICS_UPDATE,
            PlaybackEvent::ProgressUpdate(_) => Self::PROGRESS_UPDATE,
            PlaybackEvent::LockStateUpdate(_) => Self::LOCK_STATE_UPDATE,
            PlaybackEvent::OverlayHover(_) => Self::OVERLAY_HOVER,
            PlaybackEvent::UnlockProgress(_) => Self::UNLOCK_PROGRESS,
        }
    }

    /// Decode a payload received on `channel`. Unknown channels yield `Ok(None)`.
    pub fn from_channel(
        channel: &str,
        data: serde_json::Value,
    ) -> Result<Option<Self>, serde_json::Error> {
        let event = match channel {
            Self::LYRICS_UPDATE => PlaybackEvent::LyricsUpdate(serde_json::from_value(data)?),
            Self::PROGRESS_UPDATE => PlaybackEvent::ProgressUpdate(serde_json::from_value(data)?),
            Self::LOCK_STATE_UPDATE => {
                PlaybackEvent::LockStateUpdate(serde_json::from_value(data)?)
            }
            Self::OVERLAY_HOVER => PlaybackEvent::OverlayHover(serde_json::from_value(data)?),
            Self::UNLOCK_PROGRESS => PlaybackEvent::UnlockProgress(serde_json::from_value(data)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}
