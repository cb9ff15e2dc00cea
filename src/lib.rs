//! veil: X11 compositing manager core.
//!
//! The crate claims exclusive ownership of composition for one screen,
//! redirects every top-level window's rendering into off-screen pixmaps,
//! mirrors the window tree and per-window state, exposes each window's
//! backing pixmap as a GL texture via `GLX_EXT_texture_from_pixmap`, and
//! tracks damage so a renderer repaints only when needed. It never draws
//! anything itself: a scene-graph front-end drives it through the
//! [`Compositor`] and per-window [`ClientWindow`] signals.
//!
//! The protocol thread owns the X connection and mutates all mirrored state;
//! the render thread consumes shared [`WindowPixmap`]s and the GLX layer.

pub mod compositor;
pub mod error;
pub mod glx;
pub mod signal;
pub mod x11;
pub mod x11_async;

pub use compositor::{ClientWindow, Compositor, PixmapItem, WindowPixmap};
pub use error::Error;
pub use glx::{GlxInfo, TextureFromPixmap};
pub use signal::{Signal, SlotId};
pub use x11::{Atoms, Display, Geometry, WmWindowType};
pub use x11_async::EventStream;
