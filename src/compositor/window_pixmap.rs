//! Off-screen backing pixmap of a redirected window.
//!
//! One `WindowPixmap` exists per (window, generation): naming the composite
//! pixmap pins the window's current off-screen storage, and a Damage object
//! on that pixmap reports when the client has rendered into it. The mirror
//! drops its reference when the window resizes, but scene-graph observers may
//! keep the old generation alive to paint the last frame; the server
//! resources are freed when the final reference goes away.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::composite::ConnectionExt as _;
use x11rb::protocol::damage::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{ConnectionExt as _, Pixmap, Visualid, Window};

use crate::error::Error;
use crate::signal::Signal;
use crate::x11::Display;

/// Edge-triggered dirty flag: damage notifications arrive once per cleared
/// interval, so only the first one after a clear reports a transition.
#[derive(Debug, Default)]
struct DamageFlag(AtomicBool);

impl DamageFlag {
    /// Returns true when this call moved the flag from clean to dirty.
    fn mark(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    /// Returns true when the flag was dirty and is now clean.
    fn clear(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct WindowPixmap {
    display: Arc<Display>,
    window: Window,
    pixmap: Pixmap,
    damage: damage::Damage,
    size: (u16, u16),
    visual: Visualid,
    damaged_flag: DamageFlag,

    /// Fires on the first damage notification after construction or after
    /// [`clear_damage`](Self::clear_damage).
    pub damaged: Signal<()>,
    /// Fires from `Drop` with the damage id, so the compositor can remove its
    /// index entry in step with the destruction.
    pub destroyed: Signal<damage::Damage>,
}

impl WindowPixmap {
    /// Pin the window's current backing pixmap and attach damage tracking.
    ///
    /// The caller supplies the window's visual; the pixmap itself has no
    /// visual of its own. Fails when the pixmap cannot be measured, which
    /// happens when the window is unmapped or destroyed between the event
    /// that triggered the rebuild and this request.
    pub(crate) fn new(
        display: Arc<Display>,
        window: Window,
        visual: Visualid,
    ) -> Result<Arc<Self>, Error> {
        let conn = display.conn();
        let pixmap = display.generate_id()?;
        let damage = display.generate_id()?;

        conn.composite_name_window_pixmap(window, pixmap)?;
        let geometry_cookie = conn.get_geometry(pixmap)?;
        conn.damage_create(damage, pixmap, damage::ReportLevel::NON_EMPTY)?;

        let geometry = match geometry_cookie.reply() {
            Ok(geometry) => geometry,
            Err(err) => {
                debug!("window {window:#x}: backing pixmap vanished mid-request: {err}");
                let _ = conn.damage_destroy(damage);
                let _ = conn.free_pixmap(pixmap);
                let _ = conn.flush();
                return Err(Error::PixmapUnavailable(window));
            }
        };

        Ok(Arc::new(Self {
            display,
            window,
            pixmap,
            damage,
            size: (geometry.width, geometry.height),
            visual,
            damaged_flag: DamageFlag::default(),
            damaged: Signal::new(),
            destroyed: Signal::new(),
        }))
    }

    pub fn window(&self) -> Window {
        self.window
    }

    /// The server-side pixmap id; this is what a GLX pixmap is created over.
    pub fn pixmap(&self) -> Pixmap {
        self.pixmap
    }

    pub fn damage(&self) -> damage::Damage {
        self.damage
    }

    pub fn size(&self) -> (u16, u16) {
        self.size
    }

    /// The owning window's visual at the time the pixmap was named.
    pub fn visual(&self) -> Visualid {
        self.visual
    }

    pub fn is_damaged(&self) -> bool {
        self.damaged_flag.get()
    }

    /// Acknowledge the current damage so the server reports the next one.
    ///
    /// A renderer must call this after consuming a frame; with a NonEmpty
    /// report level the server stays silent until the pending damage is
    /// subtracted.
    pub fn clear_damage(&self) {
        if self.damaged_flag.clear() {
            let conn = self.display.conn();
            let _ = conn.damage_subtract(self.damage, x11rb::NONE, x11rb::NONE);
            let _ = conn.flush();
        }
    }

    pub(crate) fn handle_damage(&self, event: &damage::NotifyEvent) {
        debug_assert_eq!(event.damage, self.damage);
        if event.drawable != self.pixmap {
            return;
        }
        if self.damaged_flag.mark() {
            self.damaged.emit(&());
        }
    }
}

impl Drop for WindowPixmap {
    fn drop(&mut self) {
        let conn = self.display.conn();
        let _ = conn.damage_destroy(self.damage);
        let _ = conn.free_pixmap(self.pixmap);
        let _ = conn.flush();
        self.destroyed.emit(&self.damage);
    }
}

impl std::fmt::Debug for WindowPixmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowPixmap")
            .field("window", &self.window)
            .field("pixmap", &self.pixmap)
            .field("damage", &self.damage)
            .field("size", &self.size)
            .field("damaged", &self.damaged_flag.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::DamageFlag;

    #[test]
    fn only_first_mark_per_interval_reports_transition() {
        let flag = DamageFlag::default();
        assert!(flag.mark());
        assert!(!flag.mark());
        assert!(flag.get());
    }

    #[test]
    fn clearing_rearms_the_transition() {
        let flag = DamageFlag::default();
        assert!(flag.mark());
        assert!(flag.clear());
        assert!(!flag.get());
        assert!(flag.mark());
    }

    #[test]
    fn clear_on_clean_flag_reports_nothing_to_do() {
        let flag = DamageFlag::default();
        assert!(!flag.clear());
    }
}
