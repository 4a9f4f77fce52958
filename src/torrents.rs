use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::poster::Poster;

/// One file inside a torrent, in metadata order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TorrentFileInfo {
    pub index: usize,
    pub name: String,
    pub length: u64,
}

/// Per-torrent lifecycle signals. Payloads live on the shared [`Torrent`];
/// the signal only says that something changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TorrentEvent {
    /// The info-hash resolved; the torrent has a stable identity.
    InfoHash,
    Download,
    Upload,
    /// Metadata resolved far enough to enumerate files.
    Ready,
    /// 100% complete.
    Done,
}

/// Engine-level signals not tied to a single torrent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    Warning(String),
    Error(String),
}

/// A torrent entity. Owned by the engine, shared with the controller as
/// `Arc<Torrent>`; all fields are interior-mutable so the engine can update
/// them from its own tasks.
#[derive(Debug)]
pub struct Torrent {
    /// The identifier the torrent was added with (magnet link, path, hash).
    id: String,
    info_hash: OnceCell<String>,
    name: Mutex<String>,
    files: Mutex<Vec<TorrentFileInfo>>,
    progress: Mutex<f64>,
    poster: OnceCell<Poster>,
    is_deleting: AtomicBool,
}

impl Torrent {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: Mutex::new(id.clone()),
            id,
            info_hash: OnceCell::new(),
            files: Mutex::new(Vec::new()),
            progress: Mutex::new(0.0),
            poster: OnceCell::new(),
            is_deleting: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn info_hash(&self) -> Option<&str> {
        self.info_hash.get().map(|s| s.as_str())
    }

    /// Records the resolved info-hash. Set once; later calls are ignored.
    pub fn set_info_hash(&self, hash: impl Into<String>) {
        let _ = self.info_hash.set(hash.into());
    }

    pub fn name(&self) -> String {
        self.name.lock().map(|n| n.clone()).unwrap_or_default()
    }

    /// Records resolved metadata: display name and the ordered file list.
    pub fn set_metadata(&self, name: impl Into<String>, files: Vec<TorrentFileInfo>) {
        if let Ok(mut n) = self.name.lock() {
            *n = name.into();
        }
        if let Ok(mut f) = self.files.lock() {
            *f = files;
        }
    }

    pub fn files(&self) -> Vec<TorrentFileInfo> {
        self.files.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn progress(&self) -> f64 {
        self.progress.lock().map(|p| *p).unwrap_or(0.0)
    }

    pub fn set_progress(&self, fraction: f64) {
        if let Ok(mut p) = self.progress.lock() {
            *p = fraction.clamp(0.0, 1.0);
        }
    }

    pub fn poster(&self) -> Option<&Poster> {
        self.poster.get()
    }

    /// Assigns the poster. Returns false when one is already set; the first
    /// assignment wins for the lifetime of the torrent.
    pub fn set_poster(&self, poster: Poster) -> bool {
        self.poster.set(poster).is_ok()
    }

    pub fn is_deleting(&self) -> bool {
        self.is_deleting.load(Ordering::SeqCst)
    }

    /// Marks the torrent as deleting. Returns true exactly once; the flag
    /// never resets, which makes deletion idempotent for callers.
    pub fn begin_delete(&self) -> bool {
        !self.is_deleting.swap(true, Ordering::SeqCst)
    }
}

/// Byte reader for one file of a torrent, produced by the engine.
pub type FileReader = Box<dyn AsyncRead + Send + Unpin>;

/// A freshly added or seeded torrent together with its lifecycle stream.
pub struct TorrentHandle {
    pub torrent: Arc<Torrent>,
    pub events: UnboundedReceiver<TorrentEvent>,
}

/// Capability trait over the underlying torrent engine. The controller never
/// talks wire protocol; it adds, seeds and removes torrents and reads file
/// bytes for the streaming server.
#[async_trait]
pub trait TorrentEngine: Send + Sync + 'static {
    fn add(&self, torrent_id: &str) -> Result<TorrentHandle, String>;

    fn seed(&self, files: Vec<PathBuf>) -> Result<TorrentHandle, String>;

    /// Removes a torrent. Single-shot: succeeds once or reports failure once.
    async fn remove(&self, info_hash: &str) -> Result<(), String>;

    /// Snapshot of all torrents currently known to the engine.
    fn torrents(&self) -> Vec<Arc<Torrent>>;

    /// Engine-level warning/error stream. Subscribed once at startup.
    fn subscribe(&self) -> UnboundedReceiver<EngineEvent>;

    /// Opens one file of a torrent for sequential reading.
    async fn open_file(&self, info_hash: &str, index: usize) -> Result<FileReader, String>;
}
