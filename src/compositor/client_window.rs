//! Per-window mirror of server-side state.
//!
//! A `ClientWindow` shadows one top-level X window: geometry, map state,
//! override-redirect, shape, focus, `WM_TRANSIENT_FOR`, the EWMH window type,
//! and its position in the stacking order. The mirror is mutated only by the
//! event dispatcher; consumers on other threads read it through accessors and
//! subscribe to its change signals.

use std::sync::{Arc, Mutex};

use tracing::debug;
use x11rb::protocol::shape::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ChangeWindowAttributesAux, ConnectionExt as _, EventMask, MapState,
    NotifyDetail, Visualid, Window, WindowClass,
};
use x11rb::protocol::Event;

use crate::error::Error;
use crate::signal::Signal;
use crate::x11::{Display, Geometry, WmWindowType};

use super::window_pixmap::WindowPixmap;

/// Mirrored state, separated from the I/O so the transition rules are plain
/// data manipulation. Mutators report whether anything actually changed;
/// signals fire only on genuine change.
#[derive(Debug)]
struct State {
    class: WindowClass,
    geometry: Geometry,
    mapped: bool,
    override_redirect: bool,
    above: Window,
    z_index: i32,
    visual: Visualid,
    bounding_shaped: bool,
    clip_shaped: bool,
    focused: bool,
    transient_for: Window,
    wm_type_atom: Atom,
    valid: bool,
    pixmap: Option<Arc<WindowPixmap>>,
    pixmap_stale: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GeometryUpdate {
    changed: bool,
    resized: bool,
}

impl State {
    fn new(class: WindowClass, geometry: Geometry, mapped: bool, visual: Visualid) -> Self {
        Self {
            class,
            geometry,
            mapped,
            override_redirect: false,
            above: x11rb::NONE,
            z_index: 0,
            visual,
            bounding_shaped: false,
            clip_shaped: false,
            focused: false,
            transient_for: x11rb::NONE,
            wm_type_atom: x11rb::NONE,
            valid: true,
            pixmap: None,
            pixmap_stale: true,
        }
    }

    fn set_geometry(&mut self, geometry: Geometry) -> GeometryUpdate {
        if self.geometry == geometry {
            return GeometryUpdate { changed: false, resized: false };
        }
        let resized = self.geometry.size() != geometry.size();
        if resized {
            self.pixmap_stale = true;
        }
        self.geometry = geometry;
        GeometryUpdate { changed: true, resized }
    }

    /// Position-only update; ReparentNotify and GravityNotify report a new
    /// origin but never a new size.
    fn move_to(&mut self, x: i32, y: i32) -> GeometryUpdate {
        let moved = Geometry::new(x, y, self.geometry.width, self.geometry.height);
        self.set_geometry(moved)
    }

    fn set_mapped(&mut self, mapped: bool) -> bool {
        if self.mapped == mapped {
            return false;
        }
        self.mapped = mapped;
        true
    }

    fn set_override_redirect(&mut self, override_redirect: bool) -> bool {
        if self.override_redirect == override_redirect {
            return false;
        }
        self.override_redirect = override_redirect;
        true
    }

    fn set_focused(&mut self, focused: bool) -> bool {
        if self.focused == focused {
            return false;
        }
        self.focused = focused;
        true
    }

    fn is_shaped(&self) -> bool {
        self.bounding_shaped || self.clip_shaped
    }

    /// Returns true when `is_shaped()` changed.
    fn set_shape(&mut self, kind: shape::SK, shaped: bool) -> bool {
        let before = self.is_shaped();
        if kind == shape::SK::BOUNDING {
            self.bounding_shaped = shaped;
        } else if kind == shape::SK::CLIP {
            self.clip_shaped = shaped;
        }
        self.is_shaped() != before
    }

    /// Returns true the first time only.
    fn invalidate(&mut self) -> bool {
        let first = self.valid;
        self.valid = false;
        first
    }
}

pub struct ClientWindow {
    display: Arc<Display>,
    window: Window,
    state: Mutex<State>,

    pub invalidated: Signal<()>,
    pub geometry_changed: Signal<Geometry>,
    pub map_state_changed: Signal<bool>,
    pub z_index_changed: Signal<i32>,
    pub override_redirect_changed: Signal<bool>,
    pub transient_changed: Signal<bool>,
    pub transient_for_changed: Signal<()>,
    pub wm_type_changed: Signal<WmWindowType>,
    pub shape_changed: Signal<bool>,
    pub focus_changed: Signal<bool>,
    pub pixmap_changed: Signal<Arc<WindowPixmap>>,
    pub stacking_order_changed: Signal<()>,
}

impl ClientWindow {
    /// Mirror `window` from the server.
    ///
    /// The whole read runs under a server grab so attributes, geometry,
    /// properties, and shape extents describe one moment in time. A window
    /// that vanished between being listed and being queried fails with
    /// [`Error::WindowVanished`] and leaves no mirror behind.
    pub fn new(display: Arc<Display>, window: Window) -> Result<Arc<Self>, Error> {
        let grab = display.grab();
        let conn = display.conn();

        let attributes = conn
            .get_window_attributes(window)?
            .reply()
            .map_err(|_| Error::WindowVanished(window))?;

        // Merge with your_event_mask: a window manager listening on this
        // window must keep receiving its own notifications.
        let event_mask = attributes.your_event_mask
            | EventMask::STRUCTURE_NOTIFY
            | EventMask::PROPERTY_CHANGE
            | EventMask::FOCUS_CHANGE;
        conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().event_mask(event_mask),
        )?;
        conn.shape_select_input(window, true)?;

        let geometry_cookie = conn.get_geometry(window)?;
        let transient_cookie = conn.get_property(
            false,
            window,
            AtomEnum::WM_TRANSIENT_FOR,
            AtomEnum::WINDOW,
            0,
            1,
        )?;
        let wm_type_cookie = conn.get_property(
            false,
            window,
            display.atoms().net_wm_window_type,
            AtomEnum::ATOM,
            0,
            32,
        )?;
        let extents_cookie = conn.shape_query_extents(window)?;
        let focus_cookie = conn.get_input_focus()?;

        let geometry = geometry_cookie
            .reply()
            .map_err(|_| Error::WindowVanished(window))?;
        let transient_for = transient_cookie
            .reply()
            .ok()
            .and_then(|reply| reply.value32().and_then(|mut values| values.next()))
            .unwrap_or(x11rb::NONE);
        let wm_type_atom = wm_type_cookie
            .reply()
            .ok()
            .and_then(|reply| reply.value32().and_then(|mut values| values.next()))
            .unwrap_or(x11rb::NONE);
        let (bounding_shaped, clip_shaped) = extents_cookie
            .reply()
            .map(|reply| (reply.bounding_shaped, reply.clip_shaped))
            .unwrap_or((false, false));
        let focused = focus_cookie
            .reply()
            .map(|reply| reply.focus == window)
            .unwrap_or(false);

        let mut state = State::new(
            attributes.class,
            Geometry::new(
                geometry.x.into(),
                geometry.y.into(),
                geometry.width.into(),
                geometry.height.into(),
            ),
            attributes.map_state == MapState::VIEWABLE,
            attributes.visual,
        );
        state.override_redirect = attributes.override_redirect;
        state.bounding_shaped = bounding_shaped;
        state.clip_shaped = clip_shaped;
        state.focused = focused;
        state.transient_for = transient_for;
        state.wm_type_atom = wm_type_atom;

        drop(grab);
        Ok(Arc::new(Self {
            display,
            window,
            state: Mutex::new(state),
            invalidated: Signal::new(),
            geometry_changed: Signal::new(),
            map_state_changed: Signal::new(),
            z_index_changed: Signal::new(),
            override_redirect_changed: Signal::new(),
            transient_changed: Signal::new(),
            transient_for_changed: Signal::new(),
            wm_type_changed: Signal::new(),
            shape_changed: Signal::new(),
            focus_changed: Signal::new(),
            pixmap_changed: Signal::new(),
            stacking_order_changed: Signal::new(),
        }))
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn display(&self) -> &Arc<Display> {
        &self.display
    }

    pub fn window_class(&self) -> WindowClass {
        self.state.lock().unwrap().class
    }

    pub fn geometry(&self) -> Geometry {
        self.state.lock().unwrap().geometry
    }

    pub fn is_mapped(&self) -> bool {
        self.state.lock().unwrap().mapped
    }

    pub fn is_override_redirect(&self) -> bool {
        self.state.lock().unwrap().override_redirect
    }

    pub fn is_valid(&self) -> bool {
        self.state.lock().unwrap().valid
    }

    pub fn visual(&self) -> Visualid {
        self.state.lock().unwrap().visual
    }

    pub fn z_index(&self) -> i32 {
        self.state.lock().unwrap().z_index
    }

    pub fn set_z_index(&self, z_index: i32) {
        let changed = {
            let mut state = self.state.lock().unwrap();
            if state.z_index == z_index {
                false
            } else {
                state.z_index = z_index;
                true
            }
        };
        if changed {
            self.z_index_changed.emit(&z_index);
        }
    }

    /// The sibling directly below, `x11rb::NONE` at the bottom. Maintained by
    /// the compositor's restack; no notification of its own.
    pub fn above_sibling(&self) -> Window {
        self.state.lock().unwrap().above
    }

    pub fn set_above(&self, above: Window) {
        self.state.lock().unwrap().above = above;
    }

    pub fn transient_for(&self) -> Window {
        self.state.lock().unwrap().transient_for
    }

    pub fn is_transient(&self) -> bool {
        self.transient_for() != x11rb::NONE
    }

    pub fn wm_type(&self) -> WmWindowType {
        let atom = self.state.lock().unwrap().wm_type_atom;
        self.display.atoms().wm_window_type(atom)
    }

    pub fn is_shaped(&self) -> bool {
        self.state.lock().unwrap().is_shaped()
    }

    pub fn has_input_focus(&self) -> bool {
        self.state.lock().unwrap().focused
    }

    /// The current backing pixmap, rebuilding it lazily.
    ///
    /// A rebuild happens only while the window is mapped and a map or resize
    /// marked the cached pixmap stale. When naming the new pixmap fails (the
    /// window went away or was unmapped under us), the previous value is
    /// returned unchanged; the next map or size change re-marks it stale and
    /// the rebuild is retried.
    pub fn pixmap(&self) -> Option<Arc<WindowPixmap>> {
        let visual = {
            let mut state = self.state.lock().unwrap();
            if !state.pixmap_stale || !state.mapped {
                return state.pixmap.clone();
            }
            state.pixmap_stale = false;
            state.visual
        };

        let built = {
            let _grab = self.display.grab();
            WindowPixmap::new(self.display.clone(), self.window, visual)
        };
        match built {
            Ok(pixmap) => {
                self.state.lock().unwrap().pixmap = Some(pixmap.clone());
                self.pixmap_changed.emit(&pixmap);
                Some(pixmap)
            }
            Err(err) => {
                debug!("window {:#x}: pixmap rebuild failed: {err}", self.window);
                self.state.lock().unwrap().pixmap.clone()
            }
        }
    }

    /// Mark the mirror dead. Idempotent; `invalidated` fires exactly once and
    /// is the last notification this window emits.
    pub fn invalidate(&self) {
        let first = self.state.lock().unwrap().invalidate();
        if first {
            self.invalidated.emit(&());
        }
    }

    pub(crate) fn handle_event(&self, event: &Event) {
        match event {
            Event::ConfigureNotify(e) => {
                debug_assert_eq!(e.window, self.window);
                let (update, or_changed, stacking_changed, geometry) = {
                    let mut state = self.state.lock().unwrap();
                    let geometry = Geometry::new(
                        e.x.into(),
                        e.y.into(),
                        e.width.into(),
                        e.height.into(),
                    );
                    let update = state.set_geometry(geometry);
                    let or_changed = state.set_override_redirect(e.override_redirect);
                    (update, or_changed, e.above_sibling != state.above, geometry)
                };
                if update.changed {
                    self.geometry_changed.emit(&geometry);
                }
                if or_changed {
                    self.override_redirect_changed.emit(&self.is_override_redirect());
                }
                if stacking_changed {
                    self.stacking_order_changed.emit(&());
                }
            }
            Event::MapNotify(e) => {
                debug_assert_eq!(e.window, self.window);
                let (or_changed, map_changed) = {
                    let mut state = self.state.lock().unwrap();
                    state.pixmap_stale = true;
                    (state.set_override_redirect(e.override_redirect), state.set_mapped(true))
                };
                if or_changed {
                    self.override_redirect_changed.emit(&self.is_override_redirect());
                }
                if map_changed {
                    self.map_state_changed.emit(&true);
                }
            }
            Event::UnmapNotify(e) => {
                debug_assert_eq!(e.window, self.window);
                // The cached pixmap is kept: observers may still paint the
                // last frame of an unmapped window.
                let map_changed = self.state.lock().unwrap().set_mapped(false);
                if map_changed {
                    self.map_state_changed.emit(&false);
                }
            }
            Event::ReparentNotify(e) => {
                debug_assert_eq!(e.window, self.window);
                let (update, or_changed) = {
                    let mut state = self.state.lock().unwrap();
                    let update = state.move_to(e.x.into(), e.y.into());
                    (update, state.set_override_redirect(e.override_redirect))
                };
                if update.changed {
                    self.geometry_changed.emit(&self.geometry());
                }
                if or_changed {
                    self.override_redirect_changed.emit(&self.is_override_redirect());
                }
            }
            Event::GravityNotify(e) => {
                debug_assert_eq!(e.window, self.window);
                let update = self
                    .state
                    .lock()
                    .unwrap()
                    .move_to(e.x.into(), e.y.into());
                if update.changed {
                    self.geometry_changed.emit(&self.geometry());
                }
            }
            Event::CirculateNotify(e) => {
                debug_assert_eq!(e.window, self.window);
                self.stacking_order_changed.emit(&());
            }
            Event::ShapeNotify(e) => {
                debug_assert_eq!(e.affected_window, self.window);
                let changed = self.state.lock().unwrap().set_shape(e.shape_kind, e.shaped);
                if changed {
                    self.shape_changed.emit(&self.is_shaped());
                }
            }
            Event::FocusIn(e) => {
                debug_assert_eq!(e.event, self.window);
                if e.detail == NotifyDetail::INFERIOR {
                    return;
                }
                let changed = self.state.lock().unwrap().set_focused(true);
                if changed {
                    self.focus_changed.emit(&true);
                }
            }
            Event::FocusOut(e) => {
                debug_assert_eq!(e.event, self.window);
                if e.detail == NotifyDetail::INFERIOR {
                    return;
                }
                let changed = self.state.lock().unwrap().set_focused(false);
                if changed {
                    self.focus_changed.emit(&false);
                }
            }
            Event::PropertyNotify(e) => {
                debug_assert_eq!(e.window, self.window);
                if e.atom == u32::from(AtomEnum::WM_TRANSIENT_FOR) {
                    self.update_transient_for();
                } else if e.atom == self.display.atoms().net_wm_window_type {
                    self.update_wm_type();
                }
            }
            _ => {}
        }
    }

    fn update_transient_for(&self) {
        let conn = self.display.conn();
        let fetched = conn
            .get_property(
                false,
                self.window,
                AtomEnum::WM_TRANSIENT_FOR,
                AtomEnum::WINDOW,
                0,
                1,
            )
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .and_then(|reply| reply.value32().and_then(|mut values| values.next()));
        let Some(transient_for) = fetched else {
            return;
        };

        let (for_changed, kind_changed, is_transient) = {
            let mut state = self.state.lock().unwrap();
            let old = state.transient_for;
            state.transient_for = transient_for;
            (
                old != transient_for,
                (old != x11rb::NONE) != (transient_for != x11rb::NONE),
                transient_for != x11rb::NONE,
            )
        };
        if for_changed {
            self.transient_for_changed.emit(&());
        }
        if kind_changed {
            self.transient_changed.emit(&is_transient);
        }
    }

    fn update_wm_type(&self) {
        let conn = self.display.conn();
        let fetched = conn
            .get_property(
                false,
                self.window,
                self.display.atoms().net_wm_window_type,
                AtomEnum::ATOM,
                0,
                32,
            )
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .and_then(|reply| reply.value32().and_then(|mut values| values.next()));
        let Some(wm_type_atom) = fetched else {
            return;
        };

        let changed = {
            let mut state = self.state.lock().unwrap();
            if state.wm_type_atom == wm_type_atom {
                false
            } else {
                state.wm_type_atom = wm_type_atom;
                true
            }
        };
        if changed {
            self.wm_type_changed.emit(&self.wm_type());
        }
    }
}

impl std::fmt::Debug for ClientWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("ClientWindow")
            .field("window", &self.window)
            .field("geometry", &state.geometry)
            .field("mapped", &state.mapped)
            .field("valid", &state.valid)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> State {
        State::new(
            WindowClass::INPUT_OUTPUT,
            Geometry::new(0, 0, 300, 300),
            false,
            0x21,
        )
    }

    #[test]
    fn resize_marks_pixmap_stale_but_move_does_not() {
        let mut st = state();
        st.pixmap_stale = false;

        let update = st.set_geometry(Geometry::new(10, 20, 300, 300));
        assert!(update.changed);
        assert!(!update.resized);
        assert!(!st.pixmap_stale);

        let update = st.set_geometry(Geometry::new(10, 20, 400, 400));
        assert!(update.changed);
        assert!(update.resized);
        assert!(st.pixmap_stale);
    }

    #[test]
    fn identical_geometry_reports_no_change() {
        let mut st = state();
        st.pixmap_stale = false;
        let update = st.set_geometry(Geometry::new(0, 0, 300, 300));
        assert!(!update.changed);
        assert!(!st.pixmap_stale);
    }

    #[test]
    fn move_keeps_the_current_size() {
        let mut st = state();
        let update = st.move_to(-5, 17);
        assert!(update.changed);
        assert_eq!(st.geometry, Geometry::new(-5, 17, 300, 300));
    }

    #[test]
    fn map_state_changes_only_on_transition() {
        let mut st = state();
        assert!(st.set_mapped(true));
        assert!(!st.set_mapped(true));
        assert!(st.set_mapped(false));
        assert!(!st.set_mapped(false));
    }

    #[test]
    fn shape_is_the_disjunction_of_bounding_and_clip() {
        let mut st = state();
        assert!(st.set_shape(shape::SK::BOUNDING, true));
        assert!(st.is_shaped());
        // Adding the clip shape changes the components but not is_shaped().
        assert!(!st.set_shape(shape::SK::CLIP, true));
        assert!(!st.set_shape(shape::SK::BOUNDING, false));
        assert!(st.is_shaped());
        assert!(st.set_shape(shape::SK::CLIP, false));
        assert!(!st.is_shaped());
    }

    #[test]
    fn input_shape_kind_is_ignored() {
        let mut st = state();
        assert!(!st.set_shape(shape::SK::INPUT, true));
        assert!(!st.is_shaped());
    }

    #[test]
    fn invalidate_is_one_way_and_reports_only_the_first_call() {
        let mut st = state();
        assert!(st.invalidate());
        assert!(!st.invalidate());
        assert!(!st.valid);
    }

    #[test]
    fn focus_changes_only_on_transition() {
        let mut st = state();
        assert!(st.set_focused(true));
        assert!(!st.set_focused(true));
        assert!(st.set_focused(false));
    }
}
