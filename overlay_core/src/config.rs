//! The settings document shared by the overlay and settings windows.
//!
//! Every field has an explicit default. Incoming documents are merged key by
//! key over a base document: unknown keys are dropped, values of the wrong
//! shape are rejected individually, and numeric values are clamped into their
//! documented range afterwards.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Durable key the document is persisted under.
pub const SETTINGS_KEY: &str = "overlay-settings-v3";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TextShadow {
    None,
    Soft,
    Hard,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnimationType {
    Fade,
    Slide,
    Scale,
    None,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundMode {
    Transparent,
    Solid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ko,
    En,
}

/// Overlay elements whose stacking order is user-configurable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ElementId {
    TrackInfo,
    Original,
    Phonetic,
    Translation,
}

/// Result of applying a single key to a document.
#[derive(Debug, PartialEq)]
pub enum FieldUpdate {
    Applied,
    UnknownKey,
    Rejected(String),
}

macro_rules! configuration_document {
    ($( $field:ident : $ty:ty = $key:literal => $default:expr ),* $(,)?) => {
        #[derive(Debug, Clone, PartialEq, Serialize)]
        pub struct ConfigurationDocument {
            $(
                #[serde(rename = $key)]
                pub $field: $ty,
            )*
        }

        impl Default for ConfigurationDocument {
            fn default() -> Self {
                Self {
                    $( $field: $default, )*
                }
            }
        }

        impl ConfigurationDocument {
            /// Every key the schema knows, in declaration order.
            pub const KEYS: &'static [&'static str] = &[$( $key ),*];

            /// Set one key from its JSON value, keeping the previous value when
            /// the new one has the wrong shape or fails validation.
            pub fn apply_value(&mut self, key: &str, value: &Value) -> FieldUpdate {
                match key {
                    $(
                        $key => match <$ty as Deserialize>::deserialize(value) {
                            Ok(parsed) => {
                                let previous = std::mem::replace(&mut self.$field, parsed);
                                if self.field_is_valid(key) {
                                    FieldUpdate::Applied
                                } else {
                                    self.$field = previous;
                                    FieldUpdate::Rejected(format!("invalid value {}", value))
                                }
                            }
                            Err(e) => FieldUpdate::Rejected(e.to_string()),
                        },
                    )*
                    _ => FieldUpdate::UnknownKey,
                }
            }
        }
    };
}

configuration_document! {
    // Elements
    show_original: bool = "showOriginal" => true,
    show_phonetic: bool = "showPhonetic" => true,
    show_translation: bool = "showTranslation" => true,
    show_track_info: bool = "showTrackInfo" => true,
    show_album_art: bool = "showAlbumArt" => true,
    element_order: Vec<ElementId> = "elementOrder" => vec![
        ElementId::TrackInfo,
        ElementId::Original,
        ElementId::Phonetic,
        ElementId::Translation,
    ],

    // Lyric lines
    lyrics_prev_lines: u32 = "lyricsPrevLines" => 0,
    lyrics_next_lines: u32 = "lyricsNextLines" => 0,
    lyrics_set_gap: u32 = "lyricsSetGap" => 8,
    fade_non_active_lyrics: bool = "fadeNonActiveLyrics" => true,

    // Visibility
    hide_when_paused: bool = "hideWhenPaused" => false,
    show_next_track: bool = "showNextTrack" => true,
    next_track_seconds: f64 = "nextTrackSeconds" => 15.0,

    // Colors
    text_color: String = "textColor" => "#ffffff".to_string(),
    active_color: String = "activeColor" => "#1db954".to_string(),
    phonetic_color: String = "phoneticColor" => "#cccccc".to_string(),
    translation_color: String = "translationColor" => "#aaaaaa".to_string(),
    track_info_color: String = "trackInfoColor" => "#ffffff".to_string(),
    background_color: String = "backgroundColor" => "#000000".to_string(),

    // Typography
    original_font_size: u32 = "originalFontSize" => 24,
    phonetic_font_size: u32 = "phoneticFontSize" => 14,
    translation_font_size: u32 = "translationFontSize" => 16,
    track_info_font_size: u32 = "trackInfoFontSize" => 13,
    original_font_family: String = "originalFontFamily" => String::new(),
    phonetic_font_family: String = "phoneticFontFamily" => String::new(),
    translation_font_family: String = "translationFontFamily" => String::new(),
    original_font_weight: String = "originalFontWeight" => "700".to_string(),
    phonetic_font_weight: String = "phoneticFontWeight" => "500".to_string(),
    translation_font_weight: String = "translationFontWeight" => "500".to_string(),
    track_info_font_weight: String = "trackInfoFontWeight" => "600".to_string(),
    track_info_opacity: u32 = "trackInfoOpacity" => 90,

    // Effects
    text_shadow: TextShadow = "textShadow" => TextShadow::None,
    text_stroke: bool = "textStroke" => false,
    text_stroke_size: u32 = "textStrokeSize" => 1,
    animation_type: AnimationType = "animationType" => AnimationType::Slide,
    animation_duration: u32 = "animationDuration" => 300,

    // Layout
    text_align: TextAlign = "textAlign" => TextAlign::Center,
    overlay_max_width: u32 = "overlayMaxWidth" => 0,
    section_gap: u32 = "sectionGap" => 8,
    line_gap: u32 = "lineGap" => 6,
    border_radius: u32 = "borderRadius" => 12,
    padding: u32 = "padding" => 12,
    line_background_opacity: u32 = "lineBackgroundOpacity" => 60,

    // Background
    background_mode: BackgroundMode = "backgroundMode" => BackgroundMode::Transparent,
    solid_background_color: String = "solidBackgroundColor" => "#000000".to_string(),
    solid_background_opacity: u32 = "solidBackgroundOpacity" => 60,

    // Album art
    album_art_size: u32 = "albumArtSize" => 40,
    album_art_border_radius: u32 = "albumArtBorderRadius" => 6,

    // System
    is_locked: bool = "isLocked" => true,
    language: Language = "language" => Language::Ko,
    enable_hover_unlock: bool = "enableHoverUnlock" => true,
    unlock_wait_time: f64 = "unlockWaitTime" => 1.2,
    unlock_hold_time: f64 = "unlockHoldTime" => 3.0,
    enable_auto_lock: bool = "enableAutoLock" => false,
    auto_lock_delay: f64 = "autoLockDelay" => 3.0,
    custom_css: String = "customCSS" => String::new(),
}

impl ConfigurationDocument {
    fn field_is_valid(&self, key: &str) -> bool {
        match key {
            "textColor" => is_hex_color(&self.text_color),
            "activeColor" => is_hex_color(&self.active_color),
            "phoneticColor" => is_hex_color(&self.phonetic_color),
            "translationColor" => is_hex_color(&self.translation_color),
            "trackInfoColor" => is_hex_color(&self.track_info_color),
            "backgroundColor" => is_hex_color(&self.background_color),
            "solidBackgroundColor" => is_hex_color(&self.solid_background_color),
            "originalFontWeight" => is_font_weight(&self.original_font_weight),
            "phoneticFontWeight" => is_font_weight(&self.phonetic_font_weight),
            "translationFontWeight" => is_font_weight(&self.translation_font_weight),
            "trackInfoFontWeight" => is_font_weight(&self.track_info_font_weight),
            "elementOrder" => is_element_order(&self.element_order),
            _ => true,
        }
    }

    /// Pull every numeric setting into its slider range.
    fn clamp_ranges(&mut self) {
        self.lyrics_prev_lines = self.lyrics_prev_lines.min(5);
        self.lyrics_next_lines = self.lyrics_next_lines.min(5);
        self.lyrics_set_gap = self.lyrics_set_gap.min(32);
        self.next_track_seconds = self.next_track_seconds.clamp(5.0, 30.0);

        self.original_font_size = self.original_font_size.clamp(12, 48);
        self.phonetic_font_size = self.phonetic_font_size.clamp(10, 32);
        self.translation_font_size = self.translation_font_size.clamp(10, 32);
        self.track_info_font_size = self.track_info_font_size.clamp(10, 32);
        self.track_info_opacity = self.track_info_opacity.min(100);

        self.text_stroke_size = self.text_stroke_size.clamp(1, 5);
        self.animation_duration = self.animation_duration.min(2000);

        self.overlay_max_width = self.overlay_max_width.min(1000);
        self.section_gap = self.section_gap.min(32);
        self.line_gap = self.line_gap.min(20);
        self.border_radius = self.border_radius.min(24);
        self.padding = self.padding.min(48);
        self.line_background_opacity = self.line_background_opacity.min(100);
        self.solid_background_opacity = self.solid_background_opacity.min(100);

        self.album_art_size = self.album_art_size.clamp(24, 64);
        self.album_art_border_radius = self.album_art_border_radius.min(32);

        self.unlock_wait_time = self.unlock_wait_time.clamp(0.5, 3.0);
        self.unlock_hold_time = self.unlock_hold_time.clamp(1.0, 5.0);
        self.auto_lock_delay = self.auto_lock_delay.clamp(1.0, 10.0);
    }

    /// The document as a JSON object, keyed by schema key.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    /// Parse a persisted document over defaults. Unparsable text yields defaults.
    pub fn from_json_or_default(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => merge(&Self::default(), &value),
            Err(e) => {
                warn!("Stored settings are not valid JSON, using defaults: {}", e);
                Self::default()
            }
        }
    }
}

/// Merge `incoming` over `base` key by key.
///
/// Merging is idempotent: `merge(&merge(base, doc), doc) == merge(base, doc)`.
pub fn merge(base: &ConfigurationDocument, incoming: &Value) -> ConfigurationDocument {
    let mut merged = base.clone();
    match incoming.as_object() {
        Some(fields) => {
            for (key, value) in fields {
                match merged.apply_value(key, value) {
                    FieldUpdate::Applied => {}
                    FieldUpdate::UnknownKey => debug!("Dropping unknown setting '{}'", key),
                    FieldUpdate::Rejected(reason) => {
                        warn!("Rejected value for setting '{}': {}", key, reason)
                    }
                }
            }
        }
        None => warn!("Ignoring settings document that is not a JSON object"),
    }
    merged.clamp_ranges();
    merged
}

/// Defaults, except for `preserve_keys`, which keep their value from `current`.
pub fn reset_preserving(current: &ConfigurationDocument, preserve_keys: &[&str]) -> ConfigurationDocument {
    let current = current.to_value();
    let preserved: Map<String, Value> = preserve_keys
        .iter()
        .filter_map(|key| current.get(*key).map(|v| (key.to_string(), v.clone())))
        .collect();
    merge(&ConfigurationDocument::default(), &Value::Object(preserved))
}

fn is_hex_color(value: &str) -> bool {
    let Some(hex) = value.strip_prefix('#') else {
        return false;
    };
    matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_font_weight(value: &str) -> bool {
    value
        .parse::<u16>()
        .map(|weight| (300..=800).contains(&weight) && weight % 100 == 0)
        .unwrap_or(false)
}

fn is_element_order(order: &[ElementId]) -> bool {
    !order.is_empty()
        && order
            .iter()
            .enumerate()
            .all(|(i, id)| !order[..i].contains(id))
}
