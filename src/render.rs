use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::state::{ActivePlayer, AppState, Route};
use crate::torrents::Torrent;

/// A renderer-agnostic display tree. The embedder's UI layer turns patches
/// against this tree into whatever widget system it uses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DisplayTree {
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
        children: Vec<DisplayTree>,
    },
    Text {
        text: String,
    },
}

impl DisplayTree {
    pub fn element(
        tag: impl Into<String>,
        attrs: BTreeMap<String, String>,
        children: Vec<DisplayTree>,
    ) -> Self {
        DisplayTree::Element {
            tag: tag.into(),
            attrs,
            children,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        DisplayTree::Text { text: text.into() }
    }
}

/// A minimal edit against the previously rendered tree. `path` is the child
/// index walk from the root to the affected node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TreePatch {
    Replace { path: Vec<usize>, node: DisplayTree },
    SetText { path: Vec<usize>, text: String },
    SetAttr { path: Vec<usize>, name: String, value: String },
    RemoveAttr { path: Vec<usize>, name: String },
    AppendChild { path: Vec<usize>, node: DisplayTree },
    TruncateChildren { path: Vec<usize>, len: usize },
}

/// Computes the minimal patch list that turns `old` into `new`.
pub fn diff(old: &DisplayTree, new: &DisplayTree) -> Vec<TreePatch> {
    let mut patches = Vec::new();
    diff_node(old, new, &mut Vec::new(), &mut patches);
    patches
}

fn diff_node(
    old: &DisplayTree,
    new: &DisplayTree,
    path: &mut Vec<usize>,
    out: &mut Vec<TreePatch>,
) {
    match (old, new) {
        (DisplayTree::Text { text: a }, DisplayTree::Text { text: b }) => {
            if a != b {
                out.push(TreePatch::SetText {
                    path: path.clone(),
                    text: b.clone(),
                });
            }
        }
        (
            DisplayTree::Element {
                tag: old_tag,
                attrs: old_attrs,
                children: old_children,
            },
            DisplayTree::Element {
                tag: new_tag,
                attrs: new_attrs,
                children: new_children,
            },
        ) if old_tag == new_tag => {
            for (name, value) in new_attrs {
                if old_attrs.get(name) != Some(value) {
                    out.push(TreePatch::SetAttr {
                        path: path.clone(),
                        name: name.clone(),
                        value: value.clone(),
                    });
                }
            }
            for name in old_attrs.keys() {
                if !new_attrs.contains_key(name) {
                    out.push(TreePatch::RemoveAttr {
                        path: path.clone(),
                        name: name.clone(),
                    });
                }
            }
            let common = old_children.len().min(new_children.len());
            for i in 0..common {
                path.push(i);
                diff_node(&old_children[i], &new_children[i], path, out);
                path.pop();
            }
            for child in &new_children[common..] {
                out.push(TreePatch::AppendChild {
                    path: path.clone(),
                    node: child.clone(),
                });
            }
            if old_children.len() > new_children.len() {
                out.push(TreePatch::TruncateChildren {
                    path: path.clone(),
                    len: new_children.len(),
                });
            }
        }
        _ => out.push(TreePatch::Replace {
            path: path.clone(),
            node: new.clone(),
        }),
    }
}

/// The live display the render loop patches. Implemented by the embedder's
/// UI layer.
pub trait DisplaySurface: Send {
    fn apply(&mut self, patches: &[TreePatch]);
}

/// Surface that forwards patches to the UI process as JSON lines, the way a
/// shell-hosted frontend consumes them.
pub struct IpcSurface<W: Write + Send> {
    sink: W,
}

impl<W: Write + Send> IpcSurface<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }
}

impl<W: Write + Send> DisplaySurface for IpcSurface<W> {
    fn apply(&mut self, patches: &[TreePatch]) {
        for patch in patches {
            if let Ok(line) = serde_json::to_string(patch) {
                let _ = writeln!(self.sink, "{}", line);
            }
        }
    }
}

/// Trailing-edge rate limiter for high-frequency re-renders. `request` fires
/// at most once per interval and marks later calls pending; `flush` is driven
/// by the render loop's periodic tick and drains the pending render, so the
/// final state of a burst always reaches the screen within one interval.
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
    pending: bool,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            pending: false,
        }
    }

    /// Asks to render now. True means render immediately; false means the
    /// request was coalesced into the next flush.
    pub fn request(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => {
                self.pending = true;
                false
            }
            _ => {
                self.last = Some(now);
                self.pending = false;
                true
            }
        }
    }

    /// Drains a pending coalesced render once the window has elapsed, keeping
    /// renders to at most one per interval.
    pub fn flush(&mut self) -> bool {
        if !self.pending {
            return false;
        }
        let now = Instant::now();
        if let Some(last) = self.last {
            if now.duration_since(last) < self.interval {
                return false;
            }
        }
        self.pending = false;
        self.last = Some(now);
        true
    }
}

/// Dock progress indicator value: the minimum progress among torrents that
/// are not complete, or `-1.0` when there are none.
pub fn dock_progress(torrents: &[Arc<Torrent>]) -> f64 {
    let min = torrents
        .iter()
        .map(|t| t.progress())
        .filter(|p| *p < 1.0)
        .fold(f64::INFINITY, f64::min);
    if min.is_finite() {
        min
    } else {
        -1.0
    }
}

/// Default pure projection of state to a display tree.
pub fn project(state: &AppState, torrents: &[Arc<Torrent>]) -> DisplayTree {
    let mut attrs = BTreeMap::new();
    attrs.insert("route".into(), state.view.route.as_str().into());
    attrs.insert("title".into(), state.view.title.clone());
    attrs.insert(
        "player".into(),
        match state.active_player {
            ActivePlayer::None => "none",
            ActivePlayer::Local => "local",
            ActivePlayer::Airplay => "airplay",
            ActivePlayer::Cast => "cast",
        }
        .into(),
    );

    let list = DisplayTree::element(
        "torrent-list",
        BTreeMap::new(),
        torrents.iter().map(|t| torrent_item(t)).collect(),
    );

    let mut children = vec![list];
    if state.view.route == Route::Player {
        let mut player_attrs = BTreeMap::new();
        if let Some(session) = &state.server {
            player_attrs.insert("src".into(), session.local_url.clone());
        }
        player_attrs.insert("paused".into(), state.video.is_paused.to_string());
        children.push(DisplayTree::element("player", player_attrs, Vec::new()));
    }

    DisplayTree::element("app", attrs, children)
}

fn torrent_item(torrent: &Arc<Torrent>) -> DisplayTree {
    let mut attrs = BTreeMap::new();
    attrs.insert("progress".into(), format!("{:.4}", torrent.progress()));
    if torrent.is_deleting() {
        attrs.insert("deleting".into(), "true".into());
    }
    if torrent.poster().is_some() {
        attrs.insert("has-poster".into(), "true".into());
    }
    DisplayTree::element("torrent", attrs, vec![DisplayTree::text(torrent.name())])
}

/// Pure view function the loop projects state through.
pub type ViewFn = Box<dyn Fn(&AppState, &[Arc<Torrent>]) -> DisplayTree + Send>;

/// Owns the previously rendered tree, the projection and the throttle. Every
/// update projects a fresh tree, diffs it against the previous one and
/// applies the minimal patch to the surface.
pub struct RenderLoop {
    view: ViewFn,
    surface: Box<dyn DisplaySurface>,
    current: Option<DisplayTree>,
    pub throttle: Throttle,
}

impl RenderLoop {
    /// Throttle window for download/upload-driven renders; the periodic tick
    /// that drains coalesced renders runs at the same period.
    pub const THROTTLE_INTERVAL: Duration = Duration::from_secs(1);

    pub fn new(view: ViewFn, surface: Box<dyn DisplaySurface>) -> Self {
        Self {
            view,
            surface,
            current: None,
            throttle: Throttle::new(Self::THROTTLE_INTERVAL),
        }
    }

    pub fn update(&mut self, state: &AppState, torrents: &[Arc<Torrent>]) {
        let new = (self.view)(state, torrents);
        let patches = match &self.current {
            Some(old) => diff(old, &new),
            None => vec![TreePatch::Replace {
                path: Vec::new(),
                node: new.clone(),
            }],
        };
        if !patches.is_empty() {
            self.surface.apply(&patches);
        }
        self.current = Some(new);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::RecordingSurface;

    fn el(tag: &str, attrs: &[(&str, &str)], children: Vec<DisplayTree>) -> DisplayTree {
        DisplayTree::element(
            tag,
            attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            children,
        )
    }

    #[test]
    fn identical_trees_produce_no_patches() {
        let tree = el("app", &[("route", "/")], vec![DisplayTree::text("hi")]);
        assert!(diff(&tree, &tree.clone()).is_empty());
    }

    #[test]
    fn text_changes_patch_in_place() {
        let old = el("app", &[], vec![DisplayTree::text("a")]);
        let new = el("app", &[], vec![DisplayTree::text("b")]);
        assert_eq!(
            diff(&old, &new),
            vec![TreePatch::SetText {
                path: vec![0],
                text: "b".into()
            }]
        );
    }

    #[test]
    fn attr_changes_and_removals_are_minimal() {
        let old = el("app", &[("route", "/"), ("stale", "x")], vec![]);
        let new = el("app", &[("route", "/player")], vec![]);
        let patches = diff(&old, &new);
        assert!(patches.contains(&TreePatch::SetAttr {
            path: vec![],
            name: "route".into(),
            value: "/player".into()
        }));
        assert!(patches.contains(&TreePatch::RemoveAttr {
            path: vec![],
            name: "stale".into()
        }));
        assert_eq!(patches.len(), 2);
    }

    #[test]
    fn tag_changes_replace_the_subtree() {
        let old = el("app", &[], vec![el("torrent-list", &[], vec![])]);
        let new = el("app", &[], vec![el("player", &[], vec![])]);
        assert_eq!(
            diff(&old, &new),
            vec![TreePatch::Replace {
                path: vec![0],
                node: el("player", &[], vec![])
            }]
        );
    }

    #[test]
    fn grown_and_shrunk_child_lists() {
        let old = el("l", &[], vec![DisplayTree::text("a")]);
        let new = el("l", &[], vec![DisplayTree::text("a"), DisplayTree::text("b")]);
        assert_eq!(
            diff(&old, &new),
            vec![TreePatch::AppendChild {
                path: vec![],
                node: DisplayTree::text("b")
            }]
        );
        assert_eq!(
            diff(&new, &old),
            vec![TreePatch::TruncateChildren {
                path: vec![],
                len: 1
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_is_trailing_edge() {
        let mut throttle = Throttle::new(Duration::from_secs(1));

        // First request of a burst fires immediately, the rest coalesce.
        assert!(throttle.request());
        assert!(!throttle.request());
        assert!(!throttle.request());
        assert!(!throttle.flush(), "coalesced render waits out the window");

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(throttle.flush());
        assert!(!throttle.flush());

        // A quiet window later, requests fire immediately again.
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(throttle.request());
    }

    #[tokio::test(start_paused = true)]
    async fn pending_request_is_never_lost() {
        let mut throttle = Throttle::new(Duration::from_secs(1));
        assert!(throttle.request());
        assert!(!throttle.request());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(throttle.flush());
    }

    #[test]
    fn dock_progress_hides_without_active_torrents() {
        assert_eq!(dock_progress(&[]), -1.0);
        let done = Arc::new(Torrent::new("a"));
        done.set_progress(1.0);
        assert_eq!(dock_progress(&[done]), -1.0);
    }

    #[test]
    fn dock_progress_is_the_least_complete_fraction() {
        let a = Arc::new(Torrent::new("a"));
        a.set_progress(0.7);
        let b = Arc::new(Torrent::new("b"));
        b.set_progress(0.3);
        let c = Arc::new(Torrent::new("c"));
        c.set_progress(1.0);
        assert_eq!(dock_progress(&[a, b, c]), 0.3);
    }

    #[tokio::test]
    async fn first_render_replaces_the_root_and_stable_state_is_quiet() {
        let surface = RecordingSurface::default();
        let log = surface.log_handle();
        let mut render = RenderLoop::new(Box::new(project), Box::new(surface));

        let state = AppState::new();
        render.update(&state, &[]);
        {
            let log = log.lock().unwrap();
            assert_eq!(log.len(), 1);
            assert!(matches!(log[0][0], TreePatch::Replace { .. }));
        }

        render.update(&state, &[]);
        assert_eq!(log.lock().unwrap().len(), 1, "no patches for unchanged state");
    }
}
