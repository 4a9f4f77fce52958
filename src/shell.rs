use crate::window::{Rect, Size};

/// Outbound capability to the host shell (dock, window, notifications).
/// Implemented by the embedder; every method is fire-and-forget.
pub trait HostShell: Send + Sync {
    /// Dock badge count. `0` clears the badge.
    fn set_badge(&self, count: u32);

    /// Dock progress indicator: a fraction in `[0, 1]`, or `-1.0` to hide it.
    fn set_progress(&self, fraction: f64);

    /// Locks the window to an aspect ratio, with `extra` excluded from the
    /// ratio (window chrome). A ratio of `0.0` removes the lock.
    fn set_aspect_ratio(&self, ratio: f64, extra: Size);

    fn set_bounds(&self, bounds: Rect, animate: bool);

    /// Current bounds of the main window.
    fn window_bounds(&self) -> Rect;

    /// Usable area of the primary display.
    fn work_area(&self) -> Size;

    /// Shows a user-facing error notification.
    fn notify_error(&self, message: &str);
}
