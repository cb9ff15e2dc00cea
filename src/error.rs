//! Error types for the compositing core.

use x11rb::errors::{ConnectError, ConnectionError, ReplyError, ReplyOrIdError};
use x11rb::protocol::xproto::{Visualid, Window};

/// Errors surfaced by the compositing core.
///
/// Startup failures (missing extensions, a foreign `_NET_WM_CM_Sn` owner) are
/// fatal to the process; the per-window and per-pixmap variants are transient
/// races that callers skip over and retry on the next event.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect to the X server: {0}")]
    Connect(#[from] ConnectError),

    #[error("X connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("X request failed: {0}")]
    Reply(#[from] ReplyError),

    #[error("failed to allocate an X resource id: {0}")]
    IdAlloc(#[from] ReplyOrIdError),

    #[error("required X extension {0} is not present")]
    MissingExtension(&'static str),

    #[error("X extension {name} {found_major}.{found_minor} is older than the required {required_major}.{required_minor}")]
    ExtensionTooOld {
        name: &'static str,
        found_major: u32,
        found_minor: u32,
        required_major: u32,
        required_minor: u32,
    },

    #[error("another compositing manager already owns _NET_WM_CM_S{0}")]
    CompositorExists(usize),

    #[error("lost the race for _NET_WM_CM_S{0}")]
    CompositorRaceLost(usize),

    /// The window vanished between being listed and being queried.
    #[error("window {0:#x} disappeared while it was being queried")]
    WindowVanished(Window),

    /// `NameWindowPixmap` went through but the pixmap could not be measured,
    /// typically because the window was unmapped in between.
    #[error("no backing pixmap available for window {0:#x}")]
    PixmapUnavailable(Window),

    #[error("no usable GLX framebuffer config for visual {0:#x}")]
    NoFbConfig(Visualid),

    #[error("GLX is unavailable: {0}")]
    Glx(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
