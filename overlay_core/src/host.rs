//! Outbound calls into the window host.
//!
//! The host owns the actual OS window. Every call is fire-and-forget: a
//! failure is logged and skipped, never retried.

use anyhow::Result;
use log::{debug, error};

pub trait HostRuntime: Send + Sync {
    fn set_lock_state(&self, locked: bool) -> Result<()>;
    /// `ignore = true` lets clicks fall through to whatever is underneath.
    fn set_pointer_passthrough(&self, ignore: bool) -> Result<()>;
    fn set_unlock_timing(&self, wait_secs: f64, hold_secs: f64) -> Result<()>;
    fn set_hover_unlock_enabled(&self, enabled: bool) -> Result<()>;
    fn begin_window_drag(&self) -> Result<()>;
    fn open_settings_window(&self) -> Result<()>;
    fn enumerate_font_families(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    SetLockState(bool),
    SetPointerPassthrough(bool),
    SetUnlockTiming { wait_secs: f64, hold_secs: f64 },
    SetHoverUnlockEnabled(bool),
    BeginWindowDrag,
    OpenSettingsWindow,
}

impl HostCommand {
    pub fn name(&self) -> &'static str {
        match self {
            HostCommand::SetLockState(_) => "set_lock_state",
            HostCommand::SetPointerPassthrough(_) => "set_pointer_passthrough",
            HostCommand::SetUnlockTiming { .. } => "set_unlock_timing",
            HostCommand::SetHoverUnlockEnabled(_) => "set_hover_unlock_enabled",
            HostCommand::BeginWindowDrag => "begin_window_drag",
            HostCommand::OpenSettingsWindow => "open_settings_window",
        }
    }

    fn send(&self, host: &dyn HostRuntime) -> Result<()> {
        match *self {
            HostCommand::SetLockState(locked) => host.set_lock_state(locked),
            HostCommand::SetPointerPassthrough(ignore) => host.set_pointer_passthrough(ignore),
            HostCommand::SetUnlockTiming {
                wait_secs,
                hold_secs,
            } => host.set_unlock_timing(wait_secs, hold_secs),
            HostCommand::SetHoverUnlockEnabled(enabled) => host.set_hover_unlock_enabled(enabled),
            HostCommand::BeginWindowDrag => host.begin_window_drag(),
            HostCommand::OpenSettingsWindow => host.open_settings_window(),
        }
    }
}

/// Send every command in order. A failing command does not stop the rest.
pub fn dispatch(host: &dyn HostRuntime, commands: &[HostCommand]) {
    for command in commands {
        debug!("Host call: {:?}", command);
        if let Err(e) = command.send(host) {
            error!("Host call {} failed: {:#}", command.name(), e);
        }
    }
}

/// Installed font families, sorted and de-duplicated. Empty when the host
/// cannot enumerate them.
pub fn font_families(host: &dyn HostRuntime) -> Vec<String> {
    match host.enumerate_font_families() {
        Ok(mut families) => {
            families.retain(|family| !family.trim().is_empty());
            families.sort_by_key(|family| family.to_lowercase());
            families.dedup_by(|a, b| a.to_lowercase() == b.to_lowercase());
            families
        }
        Err(e) => {
            error!("Host call enumerate_font_families failed: {:#}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;

    /// Records every call; calls named in `failing` return an error.
    #[derive(Default)]
    pub(crate) struct RecordingHost {
        pub calls: Mutex<Vec<String>>,
        pub failing: Vec<&'static str>,
        pub fonts: Vec<String>,
    }

    impl RecordingHost {
        fn record(&self, call: String, name: &str) -> Result<()> {
            self.calls.lock().unwrap().push(call);
            if self.failing.contains(&name) {
                Err(anyhow!("{} unavailable", name))
            } else {
                Ok(())
            }
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl HostRuntime for RecordingHost {
        fn set_lock_state(&self, locked: bool) -> Result<()> {
            self.record(format!("lock:{}", locked), "set_lock_state")
        }

        fn set_pointer_passthrough(&self, ignore: bool) -> Result<()> {
            self.record(format!("passthrough:{}", ignore), "set_pointer_passthrough")
        }

        fn set_unlock_timing(&self, wait_secs: f64, hold_secs: f64) -> Result<()> {
            self.record(format!("timing:{}/{}", wait_secs, hold_secs), "set_unlock_timing")
        }

        fn set_hover_unlock_enabled(&self, enabled: bool) -> Result<()> {
            self.record(format!("hover_unlock:{}", enabled), "set_hover_unlock_enabled")
        }

        fn begin_window_drag(&self) -> Result<()> {
            self.record("drag".to_string(), "begin_window_drag")
        }

        fn open_settings_window(&self) -> Result<()> {
            self.record("settings".to_string(), "open_settings_window")
        }

        fn enumerate_font_families(&self) -> Result<Vec<String>> {
            self.record("fonts".to_string(), "enumerate_font_families")?;
            Ok(self.fonts.clone())
        }
    }

    #[test]
    fn dispatch_continues_past_failures() {
        let host = RecordingHost {
            failing: vec!["set_pointer_passthrough"],
            ..Default::default()
        };
        dispatch(
            &host,
            &[
                HostCommand::SetLockState(true),
                HostCommand::SetPointerPassthrough(true),
                HostCommand::SetUnlockTiming {
                    wait_secs: 1.2,
                    hold_secs: 3.0,
                },
            ],
        );
        assert_eq!(
            host.calls(),
            vec!["lock:true", "passthrough:true", "timing:1.2/3"]
        );
    }

    #[test]
    fn font_families_are_sorted_and_unique() {
        let host = RecordingHost {
            fonts: ["Noto Sans", "arial", "Arial", "", "Consolas"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ..Default::default()
        };
        assert_eq!(font_families(&host), vec!["arial", "Consolas", "Noto Sans"]);
    }

    #[test]
    fn non_ascii_families_differing_in_case_are_merged() {
        let host = RecordingHost {
            fonts: ["Émigré", "Straße", "émigré", "STRAẞE"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ..Default::default()
        };
        assert_eq!(font_families(&host), vec!["Straße", "Émigré"]);
    }

    #[test]
    fn font_enumeration_failure_yields_empty_list() {
        let host = RecordingHost {
            failing: vec!["enumerate_font_families"],
            fonts: vec!["Arial".to_string()],
            ..Default::default()
        };
        assert!(font_families(&host).is_empty());
    }
}
