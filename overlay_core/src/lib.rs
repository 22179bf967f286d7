//! Playback, configuration and lock-gesture core of the lyric overlay.
//!
//! Nothing in here touches a window. The desktop shell implements
//! [`host::HostRuntime`] and feeds events into [`session::run_overlay_session`].

pub mod config;
pub mod gesture;
pub mod host;
pub mod ingest;
pub mod lookahead;
pub mod lyrics;
pub mod overlay;
pub mod session;
pub mod store;
pub mod types;
pub mod visibility;
pub mod window_mode;

pub use config::ConfigurationDocument;
pub use host::{HostCommand, HostRuntime};
pub use overlay::{OverlayFrame, OverlayState, PointerInput};
pub use session::{run_overlay_session, FrameSink, OverlayRequest, SessionInputs};
pub use store::{spawn_replication, ConfigStore, FileSlot, MemorySlot, SharedConfigStore};
pub use types::PlaybackEvent;
pub use window_mode::WindowMode;
