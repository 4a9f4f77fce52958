use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;

use crate::log_error;
use crate::torrents::{Torrent, TorrentEngine, TorrentFileInfo};

/// The single active local-HTTP-server-plus-URLs record used to feed a
/// playback target. Closing (or dropping) it tears down the listener.
pub struct StreamingSession {
    pub local_url: String,
    pub network_url: String,
    pub file_index: usize,
    shutdown: Option<oneshot::Sender<()>>,
}

impl StreamingSession {
    /// Synchronously shuts the server down. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSession")
            .field("local_url", &self.local_url)
            .field("network_url", &self.network_url)
            .field("file_index", &self.file_index)
            .finish()
    }
}

#[derive(Clone)]
struct ServeCtx {
    engine: Arc<dyn TorrentEngine>,
    info_hash: String,
    files: Arc<Vec<TorrentFileInfo>>,
}

/// Binds an ephemeral HTTP server to an OS-assigned port and serves the
/// torrent's files under `/:index`. The returned URLs point at the torrent's
/// largest file. Reachability of the network URL is not verified.
pub async fn start(
    engine: Arc<dyn TorrentEngine>,
    torrent: Arc<Torrent>,
) -> Result<StreamingSession> {
    let files = torrent.files();
    let index = pick_stream_file(&files)
        .ok_or_else(|| anyhow!("{}: torrent has no files yet", torrent.name()))?;
    let info_hash = torrent
        .info_hash()
        .ok_or_else(|| anyhow!("{}: torrent identity not resolved yet", torrent.name()))?
        .to_string();

    let ctx = ServeCtx {
        engine,
        info_hash,
        files: Arc::new(files),
    };
    let router = Router::new()
        .route("/:index", get(stream_file))
        .with_state(ctx);

    // Port 0 so the OS picks a free port; avoids collisions with anything
    // else on the host.
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind streaming server")?;
    let port = listener.local_addr().context("streaming server address")?.port();

    let (tx, rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        // Resolves on explicit close and when the session is dropped.
        let _ = rx.await;
    });
    tokio::spawn(async move {
        if let Err(e) = server.await {
            log_error!("streaming server: {}", e);
        }
    });

    let suffix = format!(":{}/{}", port, index);
    Ok(StreamingSession {
        local_url: format!("http://localhost{}", suffix),
        network_url: format!("http://{}{}", lan_address(), suffix),
        file_index: index,
        shutdown: Some(tx),
    })
}

async fn stream_file(State(ctx): State<ServeCtx>, Path(index): Path<usize>) -> Response {
    let Some(file) = ctx.files.get(index) else {
        return (StatusCode::NOT_FOUND, "no such file").into_response();
    };
    match ctx.engine.open_file(&ctx.info_hash, index).await {
        Ok(reader) => {
            let headers = [(header::CONTENT_TYPE, content_type(&file.name))];
            (headers, Body::from_stream(ReaderStream::new(reader))).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e).into_response(),
    }
}

/// Index of the file with the largest byte length; ties resolve to the
/// earliest index. `None` when the torrent has no files yet.
pub fn pick_stream_file(files: &[TorrentFileInfo]) -> Option<usize> {
    files
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, u64)>, (i, f)| match best {
            Some((_, len)) if len >= f.length => best,
            _ => Some((i, f.length)),
        })
        .map(|(i, _)| i)
}

fn content_type(name: &str) -> &'static str {
    let ext = name
        .rsplit('.')
        .next()
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Best-effort LAN-reachable address of this host. The UDP connect never
/// sends a packet; it only asks the OS which interface would route out.
fn lan_address() -> IpAddr {
    std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect(("8.8.8.8", 80))?;
            Ok(socket.local_addr()?.ip())
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
