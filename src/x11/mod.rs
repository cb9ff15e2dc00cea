//! X connection wrapper.
//!
//! [`Display`] owns the x11rb connection, the screen handles, the interned
//! atom table, and resource-id allocation. It also provides the scoped
//! server-grab primitive used while window state and backing pixmaps are
//! queried: a grab freezes other clients so a batch of requests observes one
//! consistent snapshot of the server.

pub mod atoms;

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt as _, Screen, Timestamp, Window};
use x11rb::rust_connection::RustConnection;

use crate::error::Error;
pub use atoms::{Atoms, WmWindowType};

/// A window rectangle in root coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// The X server connection plus the per-screen state shared by every part of
/// the core.
pub struct Display {
    conn: RustConnection,
    screen_num: usize,
    root: Window,
    atoms: Atoms,
    grab_depth: AtomicUsize,
    last_timestamp: AtomicU32,
}

impl Display {
    /// Connect to the server named by `DISPLAY` and intern the atom table.
    pub fn open() -> Result<Self, Error> {
        let (conn, screen_num) = x11rb::connect(None)?;
        let root = conn.setup().roots[screen_num].root;
        let atoms = Atoms::new(&conn, screen_num)?;
        Ok(Self {
            conn,
            screen_num,
            root,
            atoms,
            grab_depth: AtomicUsize::new(0),
            last_timestamp: AtomicU32::new(x11rb::CURRENT_TIME),
        })
    }

    pub fn conn(&self) -> &RustConnection {
        &self.conn
    }

    pub fn screen_num(&self) -> usize {
        self.screen_num
    }

    pub fn screen(&self) -> &Screen {
        &self.conn.setup().roots[self.screen_num]
    }

    pub fn root(&self) -> Window {
        self.root
    }

    pub fn atoms(&self) -> &Atoms {
        &self.atoms
    }

    /// Allocate a fresh server-side resource id.
    pub fn generate_id(&self) -> Result<u32, Error> {
        Ok(self.conn.generate_id()?)
    }

    /// Grab the server for the lifetime of the returned guard.
    ///
    /// Grabs are depth-counted: only the outermost guard actually issues
    /// `GrabServer`, and dropping it issues `UngrabServer` and flushes. X has
    /// no native nesting, so the counter lets the initial tree enumeration
    /// hold a grab around the per-window reads that grab on their own.
    pub fn grab(&self) -> ServerGrab<'_> {
        if self.grab_depth.fetch_add(1, Ordering::SeqCst) == 0 {
            if let Err(err) = self.conn.grab_server() {
                debug!("GrabServer failed: {err}");
            }
        }
        ServerGrab { display: self }
    }

    /// Record an event timestamp; the newest one is used when the compositor
    /// selection is claimed.
    pub fn note_timestamp(&self, timestamp: Timestamp) {
        if timestamp != x11rb::CURRENT_TIME {
            self.last_timestamp.store(timestamp, Ordering::Relaxed);
        }
    }

    /// The newest timestamp seen in any event, or `CURRENT_TIME` before the
    /// first one arrives.
    pub fn latest_timestamp(&self) -> Timestamp {
        self.last_timestamp.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Display {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Display")
            .field("screen_num", &self.screen_num)
            .field("root", &self.root)
            .finish()
    }
}

/// RAII server grab; see [`Display::grab`].
pub struct ServerGrab<'a> {
    display: &'a Display,
}

impl Drop for ServerGrab<'_> {
    fn drop(&mut self) {
        if self.display.grab_depth.fetch_sub(1, Ordering::SeqCst) == 1 {
            if let Err(err) = self.display.conn.ungrab_server() {
                debug!("UngrabServer failed: {err}");
            }
            if let Err(err) = self.display.conn.flush() {
                debug!("flush after UngrabServer failed: {err}");
            }
        }
    }
}
