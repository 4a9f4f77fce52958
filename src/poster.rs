use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tokio::io::AsyncReadExt;

use crate::torrents::{Torrent, TorrentEngine, TorrentFileInfo};

/// Poster files larger than this are truncated; a partial image is still
/// better than holding megabytes of video in memory.
const MAX_POSTER_BYTES: u64 = 10 * 1024 * 1024;

/// An in-process preview image handle. Never persisted; released with the
/// torrent that owns it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Poster {
    pub bytes: Arc<Vec<u8>>,
    pub mime: &'static str,
}

impl Poster {
    pub fn new(bytes: Vec<u8>, mime: &'static str) -> Self {
        Self {
            bytes: Arc::new(bytes),
            mime,
        }
    }
}

/// Derives a preview image for a torrent: the largest file with a known image
/// extension, read through the engine. At-most-once semantics are enforced by
/// the caller via [`Torrent::set_poster`].
pub async fn resolve(engine: &Arc<dyn TorrentEngine>, torrent: &Arc<Torrent>) -> Result<Poster> {
    let files = torrent.files();
    let candidate = pick_poster_file(&files)
        .ok_or_else(|| anyhow!("{}: no image file to derive a poster from", torrent.name()))?;
    let info_hash = torrent
        .info_hash()
        .ok_or_else(|| anyhow!("{}: torrent identity not resolved yet", torrent.name()))?;

    let reader = engine
        .open_file(info_hash, candidate.index)
        .await
        .map_err(|e| anyhow!(e))?;

    let mut bytes = Vec::new();
    reader.take(MAX_POSTER_BYTES).read_to_end(&mut bytes).await?;
    if bytes.is_empty() {
        bail!("{}: poster file has no data yet", candidate.name);
    }
    Ok(Poster::new(bytes, image_mime(&candidate.name).unwrap_or("image/png")))
}

/// Largest image file; ties broken by metadata order.
fn pick_poster_file(files: &[TorrentFileInfo]) -> Option<&TorrentFileInfo> {
    files
        .iter()
        .filter(|f| image_mime(&f.name).is_some())
        .fold(None, |best: Option<&TorrentFileInfo>, f| match best {
            Some(b) if b.length >= f.length => Some(b),
            _ => Some(f),
        })
}

fn image_mime(name: &str) -> Option<&'static str> {
    let ext = name.rsplit('.').next()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
