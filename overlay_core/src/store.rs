//! Configuration Store: the process-local copy of the settings document, its
//! durable slot, and replication between windows.
//!
//! Writes are last-write-wins. Only the settings window performs general
//! updates; the overlay window is a read replica whose single write path is
//! the lock flag.

use std::collections::VecDeque;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, error, info, warn};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{merge, reset_preserving, ConfigurationDocument, SETTINGS_KEY};
use crate::window_mode::WindowMode;

/// A change to the durable slot observed from outside this store.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub new_value: Option<String>,
}

/// Keeps a slot subscription alive; notifications stop once it is dropped.
pub struct SlotSubscription {
    _guard: Option<Box<dyn Send>>,
}

/// One durable key holding the serialized document.
pub trait DurableSlot: Send + Sync {
    fn read(&self) -> Result<Option<String>>;
    fn write(&self, contents: &str) -> Result<()>;
    fn subscribe(&self, tx: mpsc::UnboundedSender<StorageChange>) -> Result<SlotSubscription>;
}

/// JSON file under the app config directory, watched with `notify`.
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", SETTINGS_KEY)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }
}

fn read_optional(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

impl DurableSlot for FileSlot {
    fn read(&self) -> Result<Option<String>> {
        read_optional(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))
    }

    fn write(&self, contents: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        // Write to a sibling temp file, then rename over the slot
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path)
                .with_context(|| format!("Failed to create {}", temp_path.display()))?;
            file.write_all(contents.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn subscribe(&self, tx: mpsc::UnboundedSender<StorageChange>) -> Result<SlotSubscription> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| anyhow!("Settings path has no parent directory"))?
            .to_path_buf();
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

        let path = self.path.clone();
        let file_name = path.file_name().map(|name| name.to_os_string());

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    error!("Settings watcher error: {}", e);
                    return;
                }
            };
            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                return;
            }
            let touches_slot = event
                .paths
                .iter()
                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
            if !touches_slot {
                return;
            }

            match read_optional(&path) {
                Ok(new_value) => {
                    let _ = tx.send(StorageChange { new_value });
                }
                Err(e) => warn!("Failed to read changed settings file: {}", e),
            }
        })
        .context("Failed to create settings watcher")?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;

        info!("Watching settings at {}", self.path.display());
        Ok(SlotSubscription {
            _guard: Some(Box::new(watcher)),
        })
    }
}

#[derive(Default)]
struct MemorySlotInner {
    value: Option<String>,
    subscribers: Vec<mpsc::UnboundedSender<StorageChange>>,
}

/// In-process slot. Clones share the same value and change broadcasts.
#[derive(Clone, Default)]
pub struct MemorySlot {
    inner: Arc<StdMutex<MemorySlotInner>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored value without notifying subscribers.
    pub fn seed(&self, contents: Option<&str>) -> Result<()> {
        let mut inner = self.lock()?;
        inner.value = contents.map(str::to_string);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemorySlotInner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("Memory settings slot is poisoned"))
    }
}

impl DurableSlot for MemorySlot {
    fn read(&self) -> Result<Option<String>> {
        Ok(self.lock()?.value.clone())
    }

    fn write(&self, contents: &str) -> Result<()> {
        let mut inner = self.lock()?;
        inner.value = Some(contents.to_string());
        let change = StorageChange {
            new_value: inner.value.clone(),
        };
        inner
            .subscribers
            .retain(|subscriber| subscriber.send(change.clone()).is_ok());
        Ok(())
    }

    fn subscribe(&self, tx: mpsc::UnboundedSender<StorageChange>) -> Result<SlotSubscription> {
        self.lock()?.subscribers.push(tx);
        Ok(SlotSubscription { _guard: None })
    }
}

pub type ChangeListener = Arc<dyn Fn(&ConfigurationDocument) + Send + Sync>;

/// Own writes whose notifications may still be queued are remembered up to this many.
const MAX_PENDING_ECHOES: usize = 64;

pub struct ConfigStore {
    slot: Arc<dyn DurableSlot>,
    mode: WindowMode,
    document: ConfigurationDocument,
    // Last text this store wrote or applied.
    last_observed: Option<String>,
    // Slot texts this store already accounts for, oldest first. Their
    // notifications arrive in write order and are not external changes.
    pending_echoes: VecDeque<String>,
    listeners: Vec<ChangeListener>,
}

pub type SharedConfigStore = Arc<Mutex<ConfigStore>>;

impl ConfigStore {
    /// Read the slot and merge it over defaults. Missing, unreadable or
    /// malformed documents all produce defaults.
    pub fn load(slot: Arc<dyn DurableSlot>, mode: WindowMode) -> Self {
        let stored = match slot.read() {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Could not read stored settings, using defaults: {:#}", e);
                None
            }
        };
        let document = stored
            .as_deref()
            .map(ConfigurationDocument::from_json_or_default)
            .unwrap_or_default();

        info!("Settings loaded for {:?} window", mode);
        Self {
            slot,
            mode,
            document,
            last_observed: stored,
            pending_echoes: VecDeque::new(),
            listeners: Vec::new(),
        }
    }

    pub fn document(&self) -> &ConfigurationDocument {
        &self.document
    }

    pub fn mode(&self) -> WindowMode {
        self.mode
    }

    /// Merge a partial or full document, persist it, and let other windows see it.
    pub fn update(&mut self, partial: &Value) -> Result<&ConfigurationDocument> {
        self.ensure_writer("update")?;
        self.document = merge(&self.document, partial);
        self.persist()?;
        Ok(&self.document)
    }

    /// Replace the document with defaults, keeping `preserve_keys`.
    pub fn reset(&mut self, preserve_keys: &[&str]) -> Result<&ConfigurationDocument> {
        self.ensure_writer("reset")?;
        self.document = reset_preserving(&self.document, preserve_keys);
        info!("Settings reset (preserved: {:?})", preserve_keys);
        self.persist()?;
        Ok(&self.document)
    }

    /// The lock flag is the one field either window may write.
    ///
    /// The write starts from the latest durable document rather than this
    /// store's copy, so a stale replica does not roll back other fields.
    pub fn set_locked(&mut self, locked: bool) -> Result<()> {
        if let Ok(Some(latest)) = self.slot.read() {
            if self.last_observed.as_deref() != Some(latest.as_str()) {
                self.document = ConfigurationDocument::from_json_or_default(&latest);
                self.expect_echo(latest);
            }
        }
        self.document.is_locked = locked;
        info!("Lock flag set to {} from {:?} window", locked, self.mode);
        self.persist()
    }

    /// Register a callback run whenever another window's write is observed.
    pub fn on_external_change<F>(&mut self, callback: F)
    where
        F: Fn(&ConfigurationDocument) + Send + Sync + 'static,
    {
        self.listeners.push(Arc::new(callback));
    }

    /// Apply a change notification. Returns whether the document changed hands.
    pub fn apply_external(&mut self, change: StorageChange) -> bool {
        if self.is_echo(change.new_value.as_deref()) {
            debug!("Ignoring echo of our own settings write");
            return false;
        }

        self.document = match change.new_value.as_deref() {
            Some(text) => match serde_json::from_str::<Value>(text) {
                Ok(value) => merge(&ConfigurationDocument::default(), &value),
                Err(e) => {
                    warn!("Ignoring malformed settings change: {}", e);
                    return false;
                }
            },
            None => {
                warn!("Settings slot was cleared, falling back to defaults");
                ConfigurationDocument::default()
            }
        };
        self.last_observed = change.new_value;
        // Anything queued before this change is older than it.
        self.pending_echoes.clear();

        debug!("Applied external settings change to {:?} window", self.mode);
        for listener in &self.listeners {
            listener(&self.document);
        }
        true
    }

    /// Subscribe to the slot's change notifications.
    pub fn subscribe(&self) -> Result<(SlotSubscription, mpsc::UnboundedReceiver<StorageChange>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.slot.subscribe(tx)?;
        Ok((subscription, rx))
    }

    fn ensure_writer(&self, operation: &str) -> Result<()> {
        if !self.mode.is_settings() {
            bail!(
                "Settings {} rejected: the {:?} window only replicates settings",
                operation,
                self.mode
            );
        }
        Ok(())
    }

    fn persist(&mut self) -> Result<()> {
        let serialized = serde_json::to_string_pretty(&self.document)?;
        self.slot.write(&serialized)?;
        self.expect_echo(serialized.clone());
        self.last_observed = Some(serialized);
        Ok(())
    }

    fn expect_echo(&mut self, text: String) {
        if self.pending_echoes.len() == MAX_PENDING_ECHOES {
            self.pending_echoes.pop_front();
        }
        self.pending_echoes.push_back(text);
    }

    // A notification for a pending text also retires every older pending text.
    fn is_echo(&mut self, new_value: Option<&str>) -> bool {
        if let Some(text) = new_value {
            if let Some(index) = self.pending_echoes.iter().position(|p| p == text) {
                self.pending_echoes.drain(..=index);
                return true;
            }
        }
        new_value == self.last_observed.as_deref()
    }
}

/// Feed slot changes into `store` until cancelled or the channel closes.
pub fn spawn_replication(
    store: SharedConfigStore,
    mut changes: mpsc::UnboundedReceiver<StorageChange>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                change = changes.recv() => match change {
                    Some(change) => {
                        store.lock().await.apply_external(change);
                    }
                    None => break,
                },
            }
        }
        debug!("Settings replication stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Language;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn memory_pair() -> (MemorySlot, ConfigStore, ConfigStore) {
        let slot = MemorySlot::new();
        let settings = ConfigStore::load(Arc::new(slot.clone()), WindowMode::Settings);
        let overlay = ConfigStore::load(Arc::new(slot.clone()), WindowMode::Overlay);
        (slot, settings, overlay)
    }

    #[test]
    fn load_without_stored_document_uses_defaults() {
        let (_, settings, _) = memory_pair();
        assert_eq!(settings.document(), &ConfigurationDocument::default());
    }

    #[test]
    fn load_with_malformed_document_uses_defaults() {
        let slot = MemorySlot::new();
        slot.seed(Some("{\"isLocked\": fal")).unwrap();
        let store = ConfigStore::load(Arc::new(slot), WindowMode::Overlay);
        assert_eq!(store.document(), &ConfigurationDocument::default());
    }

    #[test]
    fn load_merges_stored_document_over_defaults() {
        let slot = MemorySlot::new();
        slot.seed(Some(r#"{"lineGap": 10, "retiredKey": true}"#)).unwrap();
        let store = ConfigStore::load(Arc::new(slot), WindowMode::Settings);
        assert_eq!(store.document().line_gap, 10);
        assert_eq!(store.document().padding, 12);
    }

    #[test]
    fn update_persists_and_replicates() {
        let (slot, mut settings, mut overlay) = memory_pair();
        let (_sub, mut rx) = overlay.subscribe().unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_listener = seen.clone();
        overlay.on_external_change(move |doc| {
            assert!(doc.hide_when_paused);
            seen_in_listener.fetch_add(1, Ordering::SeqCst);
        });

        settings.update(&json!({ "hideWhenPaused": true })).unwrap();

        let stored = slot.read().unwrap().unwrap();
        assert!(stored.contains("\"hideWhenPaused\": true"));

        let change = rx.try_recv().unwrap();
        assert!(overlay.apply_external(change));
        assert!(overlay.document().hide_when_paused);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn own_writes_are_not_external_changes() {
        let (_, mut settings, _) = memory_pair();
        let (_sub, mut rx) = settings.subscribe().unwrap();

        settings.update(&json!({ "lineGap": 2 })).unwrap();
        let change = rx.try_recv().unwrap();
        assert!(!settings.apply_external(change));
    }

    #[test]
    fn delayed_echoes_do_not_roll_back_later_writes() {
        let (slot, mut settings, _) = memory_pair();
        let (_sub, mut rx) = settings.subscribe().unwrap();

        settings.update(&json!({ "lineGap": 1 })).unwrap();
        settings.update(&json!({ "padding": 40 })).unwrap();

        // Replication catches up only after both writes
        let first = rx.try_recv().unwrap();
        assert!(!settings.apply_external(first));
        assert_eq!(settings.document().padding, 40);

        settings.update(&json!({ "textColor": "#123456" })).unwrap();
        while let Ok(change) = rx.try_recv() {
            assert!(!settings.apply_external(change));
        }

        let durable = ConfigurationDocument::from_json_or_default(&slot.read().unwrap().unwrap());
        assert_eq!(durable.line_gap, 1);
        assert_eq!(durable.padding, 40);
        assert_eq!(durable.text_color, "#123456");
    }

    #[test]
    fn coalesced_echo_retires_older_writes() {
        let (_, mut settings, _) = memory_pair();
        settings.update(&json!({ "lineGap": 1 })).unwrap();
        settings.update(&json!({ "padding": 40 })).unwrap();
        let latest = serde_json::to_string_pretty(settings.document()).unwrap();

        // A watcher that read the file late reports only the newest text
        assert!(!settings.apply_external(StorageChange {
            new_value: Some(latest.clone()),
        }));
        assert!(!settings.apply_external(StorageChange {
            new_value: Some(latest),
        }));
        assert_eq!(settings.document().line_gap, 1);
        assert_eq!(settings.document().padding, 40);
    }

    #[test]
    fn lock_write_over_unseen_edit_ignores_its_queued_notification() {
        let (_, mut settings, mut overlay) = memory_pair();
        let (_sub, mut rx) = overlay.subscribe().unwrap();

        settings.update(&json!({ "textColor": "#ff0000" })).unwrap();
        overlay.set_locked(false).unwrap();

        // Both the settings edit and the lock write are already accounted for
        while let Ok(change) = rx.try_recv() {
            assert!(!overlay.apply_external(change));
        }
        assert!(!overlay.document().is_locked);
        assert_eq!(overlay.document().text_color, "#ff0000");
    }

    #[test]
    fn external_write_between_own_writes_settles_on_durable_text() {
        let (slot, mut settings, mut overlay) = memory_pair();
        let (_sub, mut rx) = settings.subscribe().unwrap();

        settings.update(&json!({ "lineGap": 1 })).unwrap();
        overlay.set_locked(false).unwrap();
        settings.update(&json!({ "padding": 40 })).unwrap();

        while let Ok(change) = rx.try_recv() {
            settings.apply_external(change);
        }
        let durable = ConfigurationDocument::from_json_or_default(&slot.read().unwrap().unwrap());
        assert_eq!(settings.document(), &durable);
    }

    #[test]
    fn overlay_replica_rejects_general_writes() {
        let (slot, _, mut overlay) = memory_pair();
        assert!(overlay.update(&json!({ "lineGap": 2 })).is_err());
        assert!(overlay.reset(&["language"]).is_err());
        assert!(slot.read().unwrap().is_none());
    }

    #[test]
    fn overlay_lock_write_replicates_to_settings() {
        let (_, mut settings, mut overlay) = memory_pair();
        let (_sub, mut rx) = settings.subscribe().unwrap();

        overlay.set_locked(false).unwrap();
        assert!(!overlay.document().is_locked);

        let change = rx.try_recv().unwrap();
        assert!(settings.apply_external(change));
        assert!(!settings.document().is_locked);
    }

    #[test]
    fn stale_replica_lock_write_keeps_newer_fields() {
        let (_, mut settings, mut overlay) = memory_pair();

        // The overlay never processed this notification
        settings.update(&json!({ "textColor": "#ff0000" })).unwrap();
        overlay.set_locked(false).unwrap();

        assert_eq!(overlay.document().text_color, "#ff0000");
        assert!(!overlay.document().is_locked);
    }

    #[test]
    fn reset_preserves_language() {
        let (_, mut settings, _) = memory_pair();
        settings
            .update(&json!({ "language": "en", "activeColor": "#000000" }))
            .unwrap();

        let doc = settings.reset(&["language"]).unwrap().clone();
        let mut expected = ConfigurationDocument::default();
        expected.language = Language::En;
        assert_eq!(doc, expected);
    }

    #[test]
    fn malformed_external_change_is_ignored() {
        let (_, _, mut overlay) = memory_pair();
        let applied = overlay.apply_external(StorageChange {
            new_value: Some("garbage".to_string()),
        });
        assert!(!applied);
        assert_eq!(overlay.document(), &ConfigurationDocument::default());
    }

    #[test]
    fn cleared_slot_resets_replica() {
        let slot = MemorySlot::new();
        slot.seed(Some(r#"{"lineGap": 10}"#)).unwrap();
        let mut overlay = ConfigStore::load(Arc::new(slot), WindowMode::Overlay);

        assert!(overlay.apply_external(StorageChange { new_value: None }));
        assert_eq!(overlay.document(), &ConfigurationDocument::default());
    }

    #[test]
    fn file_slot_round_trips_and_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let slot = Arc::new(FileSlot::in_dir(dir.path().join("config")));
        let mut store = ConfigStore::load(slot.clone(), WindowMode::Settings);
        store.update(&json!({ "padding": 20 })).unwrap();

        assert!(slot.path().exists());
        assert!(!slot.temp_path().exists());

        let reloaded = ConfigStore::load(slot, WindowMode::Overlay);
        assert_eq!(reloaded.document().padding, 20);
    }

    #[test]
    fn file_slot_missing_file_reads_none() {
        let dir = tempdir().unwrap();
        let slot = FileSlot::in_dir(dir.path());
        assert!(slot.read().unwrap().is_none());
    }

    async fn next_change(rx: &mut mpsc::UnboundedReceiver<StorageChange>) -> Option<StorageChange> {
        tokio::time::timeout(std::time::Duration::from_millis(500), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn file_slot_watcher_reports_slot_writes_only() {
        let dir = tempdir().unwrap();
        let config_dir = dir.path().join("config");
        let mut settings = ConfigStore::load(Arc::new(FileSlot::in_dir(&config_dir)), WindowMode::Settings);
        let overlay_slot = FileSlot::in_dir(&config_dir);
        let mut overlay = ConfigStore::load(Arc::new(FileSlot::in_dir(&config_dir)), WindowMode::Overlay);
        let (_sub, mut rx) = overlay.subscribe().unwrap();

        // Siblings, including a stray temp file, are not the slot
        fs::write(config_dir.join("other.json"), "{}").unwrap();
        fs::write(overlay_slot.temp_path(), "{\"lineGap\": 3}").unwrap();
        assert_eq!(next_change(&mut rx).await, None);

        settings.update(&json!({ "padding": 24 })).unwrap();
        let written = fs::read_to_string(overlay_slot.path()).unwrap();

        let change = next_change(&mut rx).await.expect("no change for slot write");
        assert_eq!(change.new_value.as_deref(), Some(written.as_str()));
        assert!(overlay.apply_external(change));
        assert_eq!(overlay.document().padding, 24);

        // Further events for the same write carry the same text
        while let Some(change) = next_change(&mut rx).await {
            assert_eq!(change.new_value.as_deref(), Some(written.as_str()));
        }
    }

    #[tokio::test]
    async fn replication_task_applies_changes() {
        let slot = MemorySlot::new();
        let overlay = ConfigStore::load(Arc::new(slot.clone()), WindowMode::Overlay);
        let (sub, rx) = overlay.subscribe().unwrap();
        let overlay: SharedConfigStore = Arc::new(Mutex::new(overlay));

        let cancel = CancellationToken::new();
        let handle = spawn_replication(overlay.clone(), rx, cancel.clone());

        let mut settings = ConfigStore::load(Arc::new(slot), WindowMode::Settings);
        settings.update(&json!({ "showNextTrack": false })).unwrap();

        for _ in 0..50 {
            if !overlay.lock().await.document().show_next_track {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!overlay.lock().await.document().show_next_track);

        cancel.cancel();
        handle.await.unwrap();
        drop(sub);
    }
}
