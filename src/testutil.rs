//! Shared fakes for the capability traits, used across module tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::devices::MediaDevice;
use crate::render::{DisplaySurface, TreePatch};
use crate::shell::HostShell;
use crate::torrents::{
    EngineEvent, FileReader, Torrent, TorrentEngine, TorrentEvent, TorrentHandle,
};
use crate::window::{Rect, Size};

/// In-memory torrent engine. Torrents are registered through `add`/`seed`;
/// tests drive their lifecycle with [`FakeEngine::emit`] and provide file
/// bytes with [`FakeEngine::insert_file_data`].
#[derive(Default)]
pub struct FakeEngine {
    torrents: Mutex<Vec<Arc<Torrent>>>,
    senders: Mutex<HashMap<String, UnboundedSender<TorrentEvent>>>,
    engine_tx: Mutex<Option<UnboundedSender<EngineEvent>>>,
    removals: Mutex<Vec<String>>,
    files: Mutex<HashMap<(String, usize), Vec<u8>>>,
    open_calls: AtomicUsize,
    seed_counter: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_file_data(&self, info_hash: &str, index: usize, bytes: Vec<u8>) {
        self.files
            .lock()
            .unwrap()
            .insert((info_hash.to_string(), index), bytes);
    }

    /// Emits a lifecycle event for the torrent added under `id`.
    pub fn emit(&self, id: &str, event: TorrentEvent) {
        let senders = self.senders.lock().unwrap();
        let tx = senders.get(id).expect("unknown torrent id");
        tx.send(event).expect("torrent event receiver dropped");
    }

    pub fn emit_engine(&self, event: EngineEvent) {
        if let Some(tx) = self.engine_tx.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }

    pub fn removals(&self) -> Vec<String> {
        self.removals.lock().unwrap().clone()
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    fn register(&self, id: String) -> TorrentHandle {
        let torrent = Arc::new(Torrent::new(id.clone()));
        let (tx, rx) = unbounded_channel();
        self.torrents.lock().unwrap().push(torrent.clone());
        self.senders.lock().unwrap().insert(id, tx);
        TorrentHandle {
            torrent,
            events: rx,
        }
    }
}

#[async_trait]
impl TorrentEngine for FakeEngine {
    fn add(&self, torrent_id: &str) -> Result<TorrentHandle, String> {
        Ok(self.register(torrent_id.to_string()))
    }

    fn seed(&self, _files: Vec<PathBuf>) -> Result<TorrentHandle, String> {
        let n = self.seed_counter.fetch_add(1, Ordering::SeqCst);
        Ok(self.register(format!("seed-{}", n)))
    }

    async fn remove(&self, info_hash: &str) -> Result<(), String> {
        self.removals.lock().unwrap().push(info_hash.to_string());
        Ok(())
    }

    fn torrents(&self) -> Vec<Arc<Torrent>> {
        self.torrents.lock().unwrap().clone()
    }

    fn subscribe(&self) -> UnboundedReceiver<EngineEvent> {
        let (tx, rx) = unbounded_channel();
        *self.engine_tx.lock().unwrap() = Some(tx);
        rx
    }

    async fn open_file(&self, info_hash: &str, index: usize) -> Result<FileReader, String> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        self.files
            .lock()
            .unwrap()
            .get(&(info_hash.to_string(), index))
            .cloned()
            .map(|bytes| Box::new(std::io::Cursor::new(bytes)) as FileReader)
            .ok_or_else(|| format!("no data for {} #{}", info_hash, index))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ShellCall {
    Badge(u32),
    Progress(f64),
    AspectRatio(f64, Size),
    Bounds(Rect, bool),
    Error(String),
}

/// Records every outbound shell command.
#[derive(Default)]
pub struct FakeShell {
    calls: Mutex<Vec<ShellCall>>,
}

impl FakeShell {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<ShellCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ShellCall::Error(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn badges(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ShellCall::Badge(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    fn push(&self, call: ShellCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl HostShell for FakeShell {
    fn set_badge(&self, count: u32) {
        self.push(ShellCall::Badge(count));
    }

    fn set_progress(&self, fraction: f64) {
        self.push(ShellCall::Progress(fraction));
    }

    fn set_aspect_ratio(&self, ratio: f64, extra: Size) {
        self.push(ShellCall::AspectRatio(ratio, extra));
    }

    fn set_bounds(&self, bounds: Rect, animate: bool) {
        self.push(ShellCall::Bounds(bounds, animate));
    }

    fn window_bounds(&self) -> Rect {
        Rect {
            x: 100,
            y: 80,
            width: 800,
            height: 600,
        }
    }

    fn work_area(&self) -> Size {
        Size::new(1920, 1080)
    }

    fn notify_error(&self, message: &str) {
        self.push(ShellCall::Error(message.to_string()));
    }
}

/// Playback device that records play commands.
pub struct FakeDevice {
    name: String,
    plays: Mutex<Vec<(String, String)>>,
    fail_with: Option<String>,
}

impl FakeDevice {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            plays: Mutex::new(Vec::new()),
            fail_with: None,
        })
    }

    pub fn failing(name: &str, error: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            plays: Mutex::new(Vec::new()),
            fail_with: Some(error.to_string()),
        })
    }

    pub fn plays(&self) -> Vec<(String, String)> {
        self.plays.lock().unwrap().clone()
    }
}

impl MediaDevice for FakeDevice {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn play(&self, url: &str, title: &str) -> Result<(), String> {
        if let Some(error) = &self.fail_with {
            return Err(error.clone());
        }
        self.plays
            .lock()
            .unwrap()
            .push((url.to_string(), title.to_string()));
        Ok(())
    }
}

/// Surface that records each applied patch batch.
#[derive(Default)]
pub struct RecordingSurface {
    log: Arc<Mutex<Vec<Vec<TreePatch>>>>,
}

impl RecordingSurface {
    pub fn log_handle(&self) -> Arc<Mutex<Vec<Vec<TreePatch>>>> {
        self.log.clone()
    }
}

impl DisplaySurface for RecordingSurface {
    fn apply(&mut self, patches: &[TreePatch]) {
        self.log.lock().unwrap().push(patches.to_vec());
    }
}
