//! Renderer-side controller for a desktop torrent streaming client.
//!
//! The crate owns a single mutable application state tree, projects a display
//! tree from it, and coordinates torrent lifecycle events with on-demand local
//! HTTP streaming and handoff to external playback devices. The torrent
//! engine, the playback devices, the host shell and the display surface are
//! all capabilities supplied by the embedder; see [`torrents::TorrentEngine`],
//! [`devices::MediaDevice`], [`shell::HostShell`] and
//! [`render::DisplaySurface`].

pub mod app;
pub mod devices;
pub mod logging;
pub mod poster;
pub mod render;
pub mod server;
pub mod shell;
pub mod state;
pub mod torrents;
pub mod window;

#[cfg(test)]
pub(crate) mod testutil;

pub use app::{Action, App, Event};
pub use state::{ActivePlayer, AppState, Route};

/// Application name used for window titles and device playback titles.
pub const APP_NAME: &str = "Castaway";
