/// External playback device classes the controller can hand a stream to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceKind {
    Airplay,
    Cast,
}

impl DeviceKind {
    /// User-facing class label, used to prefix device error messages.
    pub fn label(&self) -> &'static str {
        match self {
            DeviceKind::Airplay => "AirPlay",
            DeviceKind::Cast => "Chromecast",
        }
    }
}

/// Capability of a discovered playback device. Created and destroyed by the
/// discovery glue outside this crate; the controller only references it.
///
/// `play` is fire-and-forget: a synchronous `Err` means the command could not
/// be issued, while playback failures arrive later as asynchronous device
/// error events ([`crate::Event::DeviceError`]).
pub trait MediaDevice: Send + Sync {
    fn name(&self) -> String;

    fn play(&self, url: &str, title: &str) -> Result<(), String>;
}

/// Prefixes a device error with its class label before it reaches the global
/// error handler. Both device classes go through the same path.
pub fn relabel_error(kind: DeviceKind, message: &str) -> String {
    format!("{}: {}", kind.label(), message)
}
