use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::MissedTickBehavior;

use crate::devices::{self, DeviceKind, MediaDevice};
use crate::poster;
use crate::render::{self, DisplaySurface, RenderLoop, ViewFn};
use crate::server::{self, StreamingSession};
use crate::shell::HostShell;
use crate::state::{ActivePlayer, AppState, Route};
use crate::torrents::{EngineEvent, Torrent, TorrentEngine, TorrentEvent, TorrentHandle};
use crate::window::{self, Size};
use crate::{log_debug, log_error, log_info, log_warn, APP_NAME};

/// Commands accepted by the dispatcher. The sole external API for mutating
/// application state; each variant carries its typed payload and the match in
/// [`App::dispatch`] is exhaustive.
#[derive(Clone)]
pub enum Action {
    AddTorrent(String),
    Seed(Vec<PathBuf>),
    OpenPlayer(Arc<Torrent>),
    DeleteTorrent(Arc<Torrent>),
    OpenChromecast(Arc<Torrent>),
    OpenAirplay(Arc<Torrent>),
    SetDimensions(Size),
    Back,
    PlayPause,
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Action::AddTorrent(_) => "addTorrent",
            Action::Seed(_) => "seed",
            Action::OpenPlayer(_) => "openPlayer",
            Action::DeleteTorrent(_) => "deleteTorrent",
            Action::OpenChromecast(_) => "openChromecast",
            Action::OpenAirplay(_) => "openAirplay",
            Action::SetDimensions(_) => "setDimensions",
            Action::Back => "back",
            Action::PlayPause => "playPause",
        }
    }
}

/// Where a freshly bound streaming session is handed off to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandoffTarget {
    Local,
    Device(DeviceKind),
}

/// Everything the event loop reacts to. External glue (IPC, discovery,
/// window focus) feeds these through [`App::sender`]; spawned tasks post
/// their single completion event here as well.
pub enum Event {
    Action(Action),
    Engine(EngineEvent),
    Torrent(Arc<Torrent>, TorrentEvent),
    ServerBound {
        epoch: u64,
        session: StreamingSession,
        target: HandoffTarget,
        torrent: Arc<Torrent>,
    },
    ServerFailed {
        epoch: u64,
        error: String,
    },
    PosterReady(Arc<Torrent>),
    TorrentRemoved(Arc<Torrent>),
    DeviceFound(DeviceKind, Arc<dyn MediaDevice>),
    DeviceError(DeviceKind, String),
    Focus(bool),
    Error(String),
    Tick,
}

/// The controller: owns the state tree and the render loop, processes one
/// event at a time. All state mutation happens inside [`App::handle_event`];
/// asynchronous work (server bind, poster resolution, torrent removal) is
/// spawned and completes by posting an event back onto the queue.
pub struct App {
    state: AppState,
    engine: Arc<dyn TorrentEngine>,
    shell: Arc<dyn HostShell>,
    render: RenderLoop,
    tx: UnboundedSender<Event>,
    rx: UnboundedReceiver<Event>,
    /// Bumped whenever the current session is closed or replaced; bind
    /// completions carrying an older epoch are dropped.
    server_epoch: u64,
}

impl App {
    pub fn new(
        engine: Arc<dyn TorrentEngine>,
        shell: Arc<dyn HostShell>,
        surface: Box<dyn DisplaySurface>,
    ) -> Self {
        Self::with_view(engine, shell, Box::new(render::project), surface)
    }

    pub fn with_view(
        engine: Arc<dyn TorrentEngine>,
        shell: Arc<dyn HostShell>,
        view: ViewFn,
        surface: Box<dyn DisplaySurface>,
    ) -> Self {
        let (tx, rx) = unbounded_channel();

        let mut engine_events = engine.subscribe();
        let forward = tx.clone();
        tokio::spawn(async move {
            while let Some(event) = engine_events.recv().await {
                if forward.send(Event::Engine(event)).is_err() {
                    break;
                }
            }
        });

        let mut app = Self {
            state: AppState::new(),
            engine,
            shell,
            render: RenderLoop::new(view, surface),
            tx,
            rx,
            server_epoch: 0,
        };
        app.update();
        app
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Handle for feeding events in from outside the loop.
    pub fn sender(&self) -> UnboundedSender<Event> {
        self.tx.clone()
    }

    /// Runs the event loop until every sender is gone. A fixed 1-second tick
    /// drains throttled renders even when no event fires.
    pub async fn run(mut self) {
        let mut tick = tokio::time::interval(RenderLoop::THROTTLE_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                event = self.rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                _ = tick.tick() => self.handle_event(Event::Tick),
            }
        }
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Action(action) => self.dispatch(action),
            Event::Engine(EngineEvent::Warning(message)) => {
                log_warn!("torrent engine: {}", message);
            }
            Event::Engine(EngineEvent::Error(message)) => {
                self.report_error(&format!("torrent engine: {}", message));
            }
            Event::Torrent(torrent, event) => self.torrent_event(torrent, event),
            Event::ServerBound {
                epoch,
                session,
                target,
                torrent,
            } => self.server_bound(epoch, session, target, torrent),
            Event::ServerFailed { epoch, error } => {
                if epoch == self.server_epoch {
                    self.report_error(&format!("streaming server: {}", error));
                } else {
                    log_debug!("ignoring failure of a superseded server bind: {}", error);
                }
            }
            Event::PosterReady(_) => self.update(),
            Event::TorrentRemoved(torrent) => {
                log_info!("deleted torrent {}", torrent.name());
                self.update();
            }
            Event::DeviceFound(kind, device) => {
                match kind {
                    DeviceKind::Airplay => self.state.view.airplay = Some(device),
                    DeviceKind::Cast => self.state.view.cast = Some(device),
                }
                self.update();
            }
            Event::DeviceError(kind, message) => {
                self.report_error(&devices::relabel_error(kind, &message));
            }
            Event::Focus(focused) => self.focus(focused),
            Event::Error(message) => self.report_error(&message),
            Event::Tick => {
                if self.render.throttle.flush() {
                    self.update();
                }
            }
        }
    }

    pub fn dispatch(&mut self, action: Action) {
        log_info!("dispatch: {}", action.name());
        match action {
            Action::AddTorrent(id) => self.add_torrent(&id),
            Action::Seed(files) => self.seed(files),
            Action::OpenPlayer(torrent) => self.open_stream(torrent, HandoffTarget::Local),
            Action::DeleteTorrent(torrent) => self.delete_torrent(torrent),
            Action::OpenChromecast(torrent) => {
                self.open_stream(torrent, HandoffTarget::Device(DeviceKind::Cast))
            }
            Action::OpenAirplay(torrent) => {
                self.open_stream(torrent, HandoffTarget::Device(DeviceKind::Airplay))
            }
            Action::SetDimensions(dims) => self.set_dimensions(dims),
            Action::Back => self.back(),
            Action::PlayPause => {
                self.state.video.is_paused = !self.state.video.is_paused;
                self.update();
            }
        }
    }

    fn add_torrent(&mut self, id: &str) {
        match self.engine.add(id) {
            Ok(handle) => self.wire_torrent(handle),
            Err(e) => self.report_error(&format!("add torrent: {}", e)),
        }
    }

    fn seed(&mut self, files: Vec<PathBuf>) {
        if files.is_empty() {
            return;
        }
        match self.engine.seed(files) {
            Ok(handle) => self.wire_torrent(handle),
            Err(e) => self.report_error(&format!("seed: {}", e)),
        }
    }

    /// Forwards the torrent's lifecycle stream into the event queue.
    fn wire_torrent(&mut self, handle: TorrentHandle) {
        let TorrentHandle {
            torrent,
            mut events,
        } = handle;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if tx.send(Event::Torrent(torrent.clone(), event)).is_err() {
                    break;
                }
            }
        });
        self.update();
    }

    fn torrent_event(&mut self, torrent: Arc<Torrent>, event: TorrentEvent) {
        match event {
            TorrentEvent::InfoHash => self.update(),
            TorrentEvent::Download | TorrentEvent::Upload => {
                if self.render.throttle.request() {
                    self.update();
                }
            }
            TorrentEvent::Ready => {
                self.resolve_poster(torrent);
                self.update();
            }
            TorrentEvent::Done => {
                if !self.state.view.is_focused {
                    self.state.view.dock_badge += 1;
                    self.shell.set_badge(self.state.view.dock_badge);
                }
                self.update();
            }
        }
    }

    fn resolve_poster(&mut self, torrent: Arc<Torrent>) {
        if torrent.poster().is_some() {
            return;
        }
        let engine = self.engine.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            match poster::resolve(&engine, &torrent).await {
                // A concurrent resolution may have won; only the first
                // assignment announces itself.
                Ok(p) => {
                    if torrent.set_poster(p) {
                        let _ = tx.send(Event::PosterReady(torrent));
                    }
                }
                Err(e) => {
                    let _ = tx.send(Event::Error(e.to_string()));
                }
            }
        });
    }

    /// Starts a streaming session for the torrent's largest file. The bind
    /// completes asynchronously; the handoff continues in `server_bound`.
    fn open_stream(&mut self, torrent: Arc<Torrent>, target: HandoffTarget) {
        if self.state.server.is_some() {
            self.report_error("a streaming session is already open");
            return;
        }
        self.server_epoch += 1;
        let epoch = self.server_epoch;
        let engine = self.engine.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = match server::start(engine, torrent.clone()).await {
                Ok(session) => Event::ServerBound {
                    epoch,
                    session,
                    target,
                    torrent,
                },
                Err(e) => Event::ServerFailed {
                    epoch,
                    error: e.to_string(),
                },
            };
            let _ = tx.send(event);
        });
    }

    fn server_bound(
        &mut self,
        epoch: u64,
        session: StreamingSession,
        target: HandoffTarget,
        torrent: Arc<Torrent>,
    ) {
        if epoch != self.server_epoch {
            // The user navigated away while the bind was in flight. Dropping
            // the session closes its listener.
            log_debug!("dropping superseded streaming session {}", session.local_url);
            return;
        }
        let network_url = session.network_url.clone();
        self.state.server = Some(session);
        match target {
            HandoffTarget::Local => {
                self.state.active_player = ActivePlayer::Local;
                self.state.view.route = Route::Player;
            }
            HandoffTarget::Device(kind) => {
                self.state.active_player = match kind {
                    DeviceKind::Airplay => ActivePlayer::Airplay,
                    DeviceKind::Cast => ActivePlayer::Cast,
                };
                let device = match kind {
                    DeviceKind::Airplay => self.state.view.airplay.clone(),
                    DeviceKind::Cast => self.state.view.cast.clone(),
                };
                match device {
                    Some(device) => {
                        let title = format!("{} — {}", APP_NAME, torrent.name());
                        if let Err(e) = device.play(&network_url, &title) {
                            self.report_error(&devices::relabel_error(kind, &e));
                        }
                    }
                    None => {
                        self.close_server();
                        self.report_error(&format!("no {} device found", kind.label()));
                        return;
                    }
                }
            }
        }
        self.update();
    }

    fn delete_torrent(&mut self, torrent: Arc<Torrent>) {
        // Idempotent: the flag flips exactly once, so the engine removal
        // happens exactly once no matter how often the action fires.
        if !torrent.begin_delete() {
            return;
        }
        log_info!("deleting torrent {}", torrent.name());
        self.update();
        let engine = self.engine.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let key = torrent
                .info_hash()
                .unwrap_or_else(|| torrent.id())
                .to_string();
            let event = match engine.remove(&key).await {
                Ok(()) => Event::TorrentRemoved(torrent),
                Err(e) => Event::Error(format!("delete torrent: {}", e)),
            };
            let _ = tx.send(event);
        });
    }

    fn set_dimensions(&mut self, dims: Size) {
        self.state.view.saved_bounds = Some(self.shell.window_bounds());
        let bounds = window::fit_to_work_area(dims, self.shell.work_area());
        self.shell.set_aspect_ratio(
            window::aspect_ratio(dims),
            Size::new(0, window::HEADER_HEIGHT),
        );
        self.shell.set_bounds(bounds, false);
    }

    fn back(&mut self) {
        if self.state.view.route == Route::Player {
            self.restore_bounds();
            self.close_server();
        } else {
            // A bind still in flight completes into a view the user has
            // navigated away from; let it lapse. An open casting session is
            // left alone.
            self.server_epoch += 1;
        }
        self.state.view.route = Route::Home;
        self.update();
    }

    fn restore_bounds(&self) {
        self.shell.set_aspect_ratio(0.0, Size::ZERO);
        if let Some(bounds) = self.state.view.saved_bounds {
            self.shell.set_bounds(bounds, true);
        }
    }

    /// Closes the active session if any, and invalidates binds still in
    /// flight. Safe to call with no session open.
    fn close_server(&mut self) {
        self.server_epoch += 1;
        if let Some(mut session) = self.state.server.take() {
            session.close();
        }
    }

    fn focus(&mut self, focused: bool) {
        self.state.view.is_focused = focused;
        if focused && self.state.view.dock_badge > 0 {
            self.state.view.dock_badge = 0;
            self.shell.set_badge(0);
        }
    }

    /// Re-projects state, patches the display and refreshes the dock
    /// progress indicator (pushed to the shell only when it changed).
    fn update(&mut self) {
        let torrents = self.engine.torrents();
        self.render.update(&self.state, &torrents);
        let progress = render::dock_progress(&torrents);
        if progress != self.state.view.dock_progress {
            self.state.view.dock_progress = progress;
            self.shell.set_progress(progress);
        }
    }

    /// Global error funnel: log, notify the user, re-render so any partial
    /// state change is still reflected. Nothing here is fatal.
    fn report_error(&mut self, message: &str) {
        log_error!("{}", message);
        self.shell.notify_error(message);
        self.update();
    }
}
