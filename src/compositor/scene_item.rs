//! Scene-graph adaptor for one client window.
//!
//! A `PixmapItem` is the glue a renderer mounts between a [`ClientWindow`]
//! and its scene node: it tracks which backing pixmap currently feeds which
//! texture, converts damage notifications into repaint requests, and exposes
//! the Y-inversion verdict the node's texture transform needs. It owns the
//! [`TextureFromPixmap`], so it lives on the render thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::glx::TextureFromPixmap;
use crate::signal::SlotId;

use super::client_window::ClientWindow;
use super::window_pixmap::WindowPixmap;

pub struct PixmapItem {
    client_window: Arc<ClientWindow>,
    pixmap: Option<Arc<WindowPixmap>>,
    texture: Option<TextureFromPixmap>,
    /// Set from signal slots (damage, map changes); the render loop drains it
    /// with [`take_repaint_request`](Self::take_repaint_request).
    repaint: Arc<AtomicBool>,
    damage_slot: Option<SlotId>,
    map_slot: SlotId,
}

impl PixmapItem {
    pub fn new(client_window: Arc<ClientWindow>) -> Self {
        let repaint = Arc::new(AtomicBool::new(true));
        let flag = repaint.clone();
        let map_slot = client_window.map_state_changed.connect(move |_| {
            flag.store(true, Ordering::SeqCst);
        });
        Self {
            client_window,
            pixmap: None,
            texture: None,
            repaint,
            damage_slot: None,
            map_slot,
        }
    }

    pub fn client_window(&self) -> &Arc<ClientWindow> {
        &self.client_window
    }

    /// True once per repaint request; painting a frame rearms it.
    pub fn take_repaint_request(&self) -> bool {
        self.repaint.swap(false, Ordering::SeqCst)
    }

    /// Synchronize with the window state before painting a frame.
    ///
    /// Returns the texture to draw with, or `None` when there is nothing to
    /// show (no backing pixmap yet, or no usable FBConfig for the window's
    /// visual). When the backing pixmap changed, the old texture is destroyed
    /// before the replacement is created. Reported damage is folded into a
    /// deferred rebind and acknowledged to the server.
    pub fn sync(&mut self) -> Option<&TextureFromPixmap> {
        let Some(pixmap) = self.client_window.pixmap() else {
            self.teardown();
            return None;
        };

        let replaced = self
            .pixmap
            .as_ref()
            .map_or(true, |current| !Arc::ptr_eq(current, &pixmap));
        if replaced {
            self.texture = None;
            if let (Some(old), Some(slot)) = (&self.pixmap, self.damage_slot.take()) {
                old.damaged.disconnect(slot);
            }

            let flag = self.repaint.clone();
            self.damage_slot = Some(pixmap.damaged.connect(move |()| {
                flag.store(true, Ordering::SeqCst);
            }));

            match TextureFromPixmap::new(pixmap.pixmap(), pixmap.visual(), pixmap.size()) {
                Ok(texture) => self.texture = Some(texture),
                Err(err) => {
                    debug!(
                        "window {:#x}: no texture for pixmap {:#x}: {err}",
                        self.client_window.window(),
                        pixmap.pixmap()
                    );
                }
            }
            self.pixmap = Some(pixmap.clone());
        }

        if pixmap.is_damaged() {
            if let Some(texture) = &self.texture {
                texture.rebind();
            }
            pixmap.clear_damage();
        }
        self.texture.as_ref()
    }

    /// The size the scene node should take: window geometry while the window
    /// is mapped, otherwise the last frame still held by the pixmap.
    pub fn implicit_size(&self) -> (u32, u32) {
        implicit_size(
            self.client_window.is_valid(),
            self.client_window.is_mapped(),
            self.client_window.geometry().size(),
            self.pixmap.as_ref().map(|pixmap| pixmap.size()),
        )
    }

    fn teardown(&mut self) {
        self.texture = None;
        if let (Some(pixmap), Some(slot)) = (&self.pixmap, self.damage_slot.take()) {
            pixmap.damaged.disconnect(slot);
        }
        self.pixmap = None;
    }
}

impl Drop for PixmapItem {
    fn drop(&mut self) {
        self.client_window.map_state_changed.disconnect(self.map_slot);
        self.teardown();
    }
}

fn implicit_size(
    valid: bool,
    mapped: bool,
    geometry: (u32, u32),
    pixmap: Option<(u16, u16)>,
) -> (u32, u32) {
    if valid && mapped {
        geometry
    } else if let Some((width, height)) = pixmap {
        (width.into(), height.into())
    } else {
        (0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::implicit_size;

    #[test]
    fn mapped_window_uses_its_geometry() {
        assert_eq!(
            implicit_size(true, true, (300, 300), Some((400, 400))),
            (300, 300)
        );
    }

    #[test]
    fn unmapped_window_keeps_the_last_frame_size() {
        assert_eq!(
            implicit_size(true, false, (300, 300), Some((400, 400))),
            (400, 400)
        );
        assert_eq!(
            implicit_size(false, true, (300, 300), Some((400, 400))),
            (400, 400)
        );
    }

    #[test]
    fn nothing_to_show_collapses_to_zero() {
        assert_eq!(implicit_size(true, false, (300, 300), None), (0, 0));
    }
}
