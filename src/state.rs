use std::sync::Arc;

use crate::devices::MediaDevice;
use crate::server::StreamingSession;
use crate::window::Rect;
use crate::APP_NAME;

/// Where the UI currently is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Route {
    #[default]
    Home,
    Player,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Player => "/player",
        }
    }
}

/// The playback target last handed a stream. Persists across torrent
/// selections.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ActivePlayer {
    #[default]
    None,
    Local,
    Airplay,
    Cast,
}

/// View-facing state: navigation, dock indicators, discovered devices and
/// window bookkeeping.
pub struct ViewState {
    pub route: Route,
    pub dock_badge: u32,
    /// `-1.0` when hidden, otherwise the least-complete torrent's fraction.
    pub dock_progress: f64,
    pub airplay: Option<Arc<dyn MediaDevice>>,
    pub cast: Option<Arc<dyn MediaDevice>>,
    pub is_focused: bool,
    /// Main window bounds saved before entering the player, restored on back.
    pub saved_bounds: Option<Rect>,
    pub title: String,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            route: Route::Home,
            dock_badge: 0,
            dock_progress: -1.0,
            airplay: None,
            cast: None,
            is_focused: true,
            saved_bounds: None,
            title: APP_NAME.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct VideoState {
    pub is_paused: bool,
}

/// The single mutable application state tree. Created once at startup and
/// owned by the [`crate::App`]; nothing outside the dispatcher mutates it.
#[derive(Default)]
pub struct AppState {
    /// The active streaming session, if any. At most one at a time.
    pub server: Option<StreamingSession>,
    pub active_player: ActivePlayer,
    pub view: ViewState,
    pub video: VideoState,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }
}
