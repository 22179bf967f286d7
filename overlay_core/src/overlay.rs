//! Everything one overlay window knows, and the frame it renders from it.

use std::time::Instant;

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::ConfigurationDocument;
use crate::gesture::{GestureInput, GestureState, GestureTiming, UnlockGesture};
use crate::host::HostCommand;
use crate::lookahead::{select_lookahead, Lookahead};
use crate::lyrics::{active_line, DisplayText, LyricSet};
use crate::types::{PlaybackEvent, ProgressSnapshot, TrackInfo};
use crate::visibility::{target_opacity, VisibilityInput};

/// What a state change asks of the outside world.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Effects {
    pub host: Vec<HostCommand>,
    /// Lock flag to persist through the configuration store.
    pub lock_write: Option<bool>,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        self.host.is_empty() && self.lock_write.is_none()
    }

    fn extend(&mut self, other: Effects) {
        self.host.extend(other.host);
        if other.lock_write.is_some() {
            self.lock_write = other.lock_write;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerInput {
    Enter,
    Leave,
    /// The pointer moved while over the window.
    Activity,
    DragRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMetadata {
    pub title: String,
    pub artist: String,
    pub album_art: Option<String>,
    pub is_next_preview: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayFrame {
    pub active_index: Option<usize>,
    /// Lyric index of `lines[0]`.
    pub first_index: usize,
    pub lines: Vec<DisplayText>,
    pub idle: bool,
    pub metadata: Option<FrameMetadata>,
    pub opacity: f64,
    pub locked: bool,
    pub gesture_state: GestureState,
    pub unlock_progress: f64,
}

pub struct OverlayState {
    track: Option<TrackInfo>,
    lyrics: LyricSet,
    progress: ProgressSnapshot,
    hovering: bool,
    remote_progress: f64,
    gesture: UnlockGesture,
    config: ConfigurationDocument,
}

impl OverlayState {
    pub fn new(config: ConfigurationDocument, now: Instant) -> Self {
        let gesture = UnlockGesture::new(config.is_locked, GestureTiming::from_config(&config), now);
        Self {
            track: None,
            lyrics: LyricSet::empty(),
            progress: ProgressSnapshot::default(),
            hovering: false,
            remote_progress: 0.0,
            gesture,
            config,
        }
    }

    pub fn config(&self) -> &ConfigurationDocument {
        &self.config
    }

    pub fn is_locked(&self) -> bool {
        self.config.is_locked
    }

    /// Commands that bring a freshly started host in line with this state.
    pub fn initial_commands(&self) -> Vec<HostCommand> {
        let mut commands = lock_commands(self.config.is_locked);
        commands.extend(timing_commands(&self.config));
        commands
    }

    pub fn apply(&mut self, event: PlaybackEvent, now: Instant) -> Effects {
        match event {
            PlaybackEvent::LyricsUpdate(payload) => {
                info!(
                    "Now showing: {} - {} ({} lines)",
                    payload.track.artist,
                    payload.track.title,
                    payload.lyrics.len()
                );
                self.lyrics = LyricSet::new(payload.lyrics, payload.is_synced);
                self.track = Some(payload.track);
                Effects::default()
            }
            PlaybackEvent::ProgressUpdate(mut snapshot) => {
                if snapshot.remaining.is_some_and(|r| !r.is_finite()) {
                    snapshot.remaining = None;
                }
                if !snapshot.position.is_finite() {
                    warn!("Ignoring non-finite playback position {}", snapshot.position);
                    snapshot.position = self.progress.position;
                }
                self.progress = snapshot;
                Effects::default()
            }
            PlaybackEvent::LockStateUpdate(locked) => {
                info!("Lock override: {}", if locked { "locked" } else { "unlocked" });
                self.gesture.handle(GestureInput::LockToggled(locked), now);
                self.set_lock_flag(locked)
            }
            PlaybackEvent::OverlayHover(hovering) => {
                let input = if hovering {
                    PointerInput::Enter
                } else {
                    PointerInput::Leave
                };
                self.pointer(input, now)
            }
            PlaybackEvent::UnlockProgress(progress) => {
                if progress.is_finite() {
                    self.remote_progress = progress.clamp(0.0, 100.0);
                }
                Effects::default()
            }
        }
    }

    /// Take a replicated configuration document.
    pub fn apply_config(&mut self, doc: ConfigurationDocument, now: Instant) -> Effects {
        let mut effects = Effects::default();

        let timing = GestureTiming::from_config(&doc);
        if timing != self.gesture.timing() {
            self.gesture.set_timing(timing, now);
            effects.host.extend(timing_commands(&doc));
        }

        let lock_changed = doc.is_locked != self.config.is_locked;
        self.config = doc;
        if lock_changed {
            debug!("Replicated lock flag: {}", self.config.is_locked);
            self.gesture
                .handle(GestureInput::LockToggled(self.config.is_locked), now);
            effects.host.extend(lock_commands(self.config.is_locked));
        }
        effects
    }

    pub fn pointer(&mut self, input: PointerInput, now: Instant) -> Effects {
        let mut effects = Effects::default();
        let gesture_input = match input {
            PointerInput::Enter => {
                self.hovering = true;
                GestureInput::HoverEnter
            }
            PointerInput::Leave => {
                self.hovering = false;
                GestureInput::HoverLeave
            }
            PointerInput::Activity | PointerInput::DragRequest => GestureInput::PointerActivity,
        };
        effects.extend(self.feed_gesture(gesture_input, now));

        if input == PointerInput::DragRequest {
            if self.config.is_locked {
                debug!("Drag ignored while locked");
            } else {
                effects.host.push(HostCommand::BeginWindowDrag);
            }
        }
        effects
    }

    pub fn tick(&mut self, now: Instant) -> Effects {
        self.feed_gesture(GestureInput::Tick, now)
    }

    pub fn request_open_settings(&self) -> Effects {
        Effects {
            host: vec![HostCommand::OpenSettingsWindow],
            lock_write: None,
        }
    }

    pub fn frame(&self) -> OverlayFrame {
        let active_index = active_line(&self.lyrics, self.progress.position);
        let (first_index, lines) = match active_index {
            Some(active) => {
                let (first, lines) = self.lyrics.context(
                    active,
                    self.config.lyrics_prev_lines as usize,
                    self.config.lyrics_next_lines as usize,
                );
                (first, lines.iter().map(DisplayText::from_line).collect())
            }
            None => (0, Vec::new()),
        };

        let opacity = target_opacity(VisibilityInput {
            is_playing: self.progress.is_playing,
            hide_when_paused: self.config.hide_when_paused,
            has_track: self.track.is_some(),
            is_hovering: self.hovering,
            is_locked: self.config.is_locked,
        });

        let unlock_progress = match self.gesture.state() {
            GestureState::Holding => self.gesture.progress(),
            _ => self.remote_progress,
        };

        OverlayFrame {
            active_index,
            first_index,
            lines,
            idle: active_index.is_none(),
            metadata: self.metadata(),
            opacity,
            locked: self.config.is_locked,
            gesture_state: self.gesture.state(),
            unlock_progress,
        }
    }

    fn metadata(&self) -> Option<FrameMetadata> {
        let lookahead = select_lookahead(
            self.progress.remaining,
            self.config.next_track_seconds,
            self.config.show_next_track,
            self.progress.next_track.as_ref(),
        );
        match lookahead {
            Lookahead::ShowNext(next) => Some(FrameMetadata {
                title: next.title.clone(),
                artist: next.artist.clone(),
                album_art: next.album_art.clone(),
                is_next_preview: true,
            }),
            Lookahead::ShowCurrent => self.track.as_ref().map(|track| FrameMetadata {
                title: track.title.clone(),
                artist: track.artist.clone(),
                album_art: track.album_art.clone(),
                is_next_preview: false,
            }),
        }
    }

    fn feed_gesture(&mut self, input: GestureInput, now: Instant) -> Effects {
        match self.gesture.handle(input, now).lock_change {
            Some(locked) => {
                info!("Unlock gesture set lock flag to {}", locked);
                self.set_lock_flag(locked)
            }
            None => Effects::default(),
        }
    }

    fn set_lock_flag(&mut self, locked: bool) -> Effects {
        self.config.is_locked = locked;
        Effects {
            host: lock_commands(locked),
            lock_write: Some(locked),
        }
    }
}

fn lock_commands(locked: bool) -> Vec<HostCommand> {
    vec![
        HostCommand::SetLockState(locked),
        HostCommand::SetPointerPassthrough(locked),
    ]
}

fn timing_commands(doc: &ConfigurationDocument) -> Vec<HostCommand> {
    vec![
        HostCommand::SetUnlockTiming {
            wait_secs: doc.unlock_wait_time,
            hold_secs: doc.unlock_hold_time,
        },
        HostCommand::SetHoverUnlockEnabled(doc.enable_hover_unlock),
    ]
}
