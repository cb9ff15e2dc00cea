//! Root-level compositing controller.
//!
//! The `Compositor` claims composition for one screen: it verifies and
//! negotiates the required extensions, makes the composite overlay window
//! click-through, redirects every child of the root into off-screen storage,
//! mirrors the child tree as [`ClientWindow`]s, and demultiplexes the X event
//! stream to the per-window and per-pixmap handlers.

pub mod client_window;
pub mod scene_item;
pub mod window_pixmap;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, info};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::composite::{self, ConnectionExt as _};
use x11rb::protocol::damage::{self, ConnectionExt as _};
use x11rb::protocol::render;
use x11rb::protocol::shape::{self, ConnectionExt as _};
use x11rb::protocol::xfixes::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ChangeWindowAttributesAux, ConnectionExt as _, EventMask, Timestamp, Window,
    WindowClass,
};
use x11rb::protocol::Event;

use crate::error::Error;
use crate::signal::{Signal, SlotId};
use crate::x11::{Display, Geometry};

pub use client_window::ClientWindow;
pub use scene_item::PixmapItem;
pub use window_pixmap::WindowPixmap;

/// A mirrored window plus the compositor's own slot registrations on it, so
/// they can be disconnected when the window leaves the tree.
struct TrackedWindow {
    window: Arc<ClientWindow>,
    pixmap_slot: SlotId,
    stacking_slot: SlotId,
}

struct Inner {
    display: Arc<Display>,
    overlay_window: Window,
    windows: Mutex<HashMap<Window, TrackedWindow>>,
    /// Weak so a pixmap kept alive only by scene observers does not pin the
    /// index; entries are removed by the pixmap's `destroyed` notification.
    pixmaps: Mutex<HashMap<damage::Damage, Weak<WindowPixmap>>>,
    root_geometry: Mutex<Geometry>,
    active_window: Mutex<Option<Arc<ClientWindow>>>,
    registered_owner: Mutex<Option<Window>>,
    /// Windows discovered during startup are announced from the event loop,
    /// not from inside the constructor, so listeners attached after
    /// construction still see them.
    pending_created: Mutex<Vec<Arc<ClientWindow>>>,
    init_finished: AtomicBool,

    window_created: Signal<Arc<ClientWindow>>,
    root_geometry_changed: Signal<Geometry>,
    active_window_changed: Signal<()>,
}

pub struct Compositor {
    inner: Arc<Inner>,
}

impl Compositor {
    /// Take over composition for the display's screen.
    ///
    /// Fails when a required extension is missing or when `_NET_WM_CM_Sn`
    /// already has an owner. The extension negotiation, root event-mask
    /// update, overlay acquisition, redirection, and initial tree enumeration
    /// run under one server grab so no window can appear or vanish between
    /// the tree query and the per-window mirrors.
    pub fn new(display: Arc<Display>) -> Result<Self, Error> {
        let conn = display.conn();
        let root = display.root();
        let selection = display.atoms().net_wm_cm_owner;

        let owner = conn.get_selection_owner(selection)?.reply()?.owner;
        if owner != x11rb::NONE {
            return Err(Error::CompositorExists(display.screen_num()));
        }

        let grab = display.grab();

        for (name, label) in [
            (composite::X11_EXTENSION_NAME, "Composite"),
            (damage::X11_EXTENSION_NAME, "Damage"),
            (xfixes::X11_EXTENSION_NAME, "XFixes"),
            (shape::X11_EXTENSION_NAME, "Shape"),
            (render::X11_EXTENSION_NAME, "Render"),
        ] {
            if conn.extension_information(name)?.is_none() {
                return Err(Error::MissingExtension(label));
            }
        }

        let composite_opcode = conn
            .extension_information(composite::X11_EXTENSION_NAME)?
            .map(|info| info.major_opcode)
            .unwrap_or(0);
        let damage_opcode = conn
            .extension_information(damage::X11_EXTENSION_NAME)?
            .map(|info| info.major_opcode)
            .unwrap_or(0);

        // Negotiate and verify versions: NameWindowPixmap needs Composite
        // 0.2, the NonEmpty report level needs Damage 1.1.
        let composite_version = conn.composite_query_version(0, 4)?.reply()?;
        require_version(
            "Composite",
            (composite_version.major_version, composite_version.minor_version),
            (0, 2),
        )?;
        let damage_version = conn.damage_query_version(1, 1)?.reply()?;
        require_version(
            "Damage",
            (damage_version.major_version, damage_version.minor_version),
            (1, 1),
        )?;
        let _ = conn.xfixes_query_version(5, 0)?.reply()?;
        let _ = conn.shape_query_version()?.reply()?;
        info!(
            "Composite {}.{} (opcode {composite_opcode}), Damage {}.{} (opcode {damage_opcode})",
            composite_version.major_version,
            composite_version.minor_version,
            damage_version.major_version,
            damage_version.minor_version,
        );

        // Merge the root event mask; a window manager is usually listening
        // here as well. PROPERTY_CHANGE is needed for _NET_ACTIVE_WINDOW.
        let root_attributes = conn.get_window_attributes(root)?.reply()?;
        let event_mask = root_attributes.your_event_mask
            | EventMask::SUBSTRUCTURE_NOTIFY
            | EventMask::STRUCTURE_NOTIFY
            | EventMask::PROPERTY_CHANGE;
        conn.change_window_attributes(
            root,
            &ChangeWindowAttributesAux::new().event_mask(event_mask),
        )?;

        let overlay_window = conn.composite_get_overlay_window(root)?.reply()?.overlay_win;
        info!("Composite overlay window: {overlay_window:#x}");

        // Empty input region: the overlay stays click-through.
        let region = display.generate_id()?;
        conn.xfixes_create_region(region, &[])?;
        conn.xfixes_set_window_shape_region(overlay_window, shape::SK::INPUT, 0, 0, region)?;
        conn.xfixes_destroy_region(region)?;

        conn.composite_redirect_subwindows(root, composite::Redirect::MANUAL)?;

        let root_geometry_reply = conn.get_geometry(root)?.reply()?;
        let root_geometry = Geometry::new(
            root_geometry_reply.x.into(),
            root_geometry_reply.y.into(),
            root_geometry_reply.width.into(),
            root_geometry_reply.height.into(),
        );
        let tree = conn.query_tree(root)?.reply()?;

        let inner = Arc::new(Inner {
            display: display.clone(),
            overlay_window,
            windows: Mutex::new(HashMap::new()),
            pixmaps: Mutex::new(HashMap::new()),
            root_geometry: Mutex::new(root_geometry),
            active_window: Mutex::new(None),
            registered_owner: Mutex::new(None),
            pending_created: Mutex::new(Vec::new()),
            init_finished: AtomicBool::new(false),
            window_created: Signal::new(),
            root_geometry_changed: Signal::new(),
            active_window_changed: Signal::new(),
        });

        for &child in &tree.children {
            inner.add_child_window(child);
        }
        drop(grab);

        inner.init_finished.store(true, Ordering::SeqCst);
        info!("tracking {} windows", inner.windows.lock().unwrap().len());

        Ok(Self { inner })
    }

    pub fn overlay_window(&self) -> Window {
        self.inner.overlay_window
    }

    pub fn root_geometry(&self) -> Geometry {
        *self.inner.root_geometry.lock().unwrap()
    }

    pub fn active_window(&self) -> Option<Arc<ClientWindow>> {
        self.inner.active_window.lock().unwrap().clone()
    }

    pub fn find_window(&self, window: Window) -> Option<Arc<ClientWindow>> {
        self.inner
            .windows
            .lock()
            .unwrap()
            .get(&window)
            .map(|tracked| tracked.window.clone())
    }

    /// Snapshot of every tracked window, in no particular order.
    pub fn windows(&self) -> Vec<Arc<ClientWindow>> {
        self.inner
            .windows
            .lock()
            .unwrap()
            .values()
            .map(|tracked| tracked.window.clone())
            .collect()
    }

    pub fn window_created(&self) -> &Signal<Arc<ClientWindow>> {
        &self.inner.window_created
    }

    pub fn root_geometry_changed(&self) -> &Signal<Geometry> {
        &self.inner.root_geometry_changed
    }

    pub fn active_window_changed(&self) -> &Signal<()> {
        &self.inner.active_window_changed
    }

    /// Claim `_NET_WM_CM_Sn` for `owner`, then read the owner back: losing
    /// the read-back comparison means another compositor raced us to the
    /// selection and the process must not continue composing.
    pub fn register_compositor(&self, owner: Window) -> Result<(), Error> {
        let display = &self.inner.display;
        let conn = display.conn();
        let selection = display.atoms().net_wm_cm_owner;

        conn.set_selection_owner(owner, selection, display.latest_timestamp())?;
        let current = conn.get_selection_owner(selection)?.reply()?.owner;
        if current != owner {
            return Err(Error::CompositorRaceLost(display.screen_num()));
        }
        *self.inner.registered_owner.lock().unwrap() = Some(owner);
        info!("registered as compositing manager (owner {owner:#x})");
        Ok(())
    }

    /// Deliver `window_created` announcements queued during startup. The
    /// event loop calls this before waiting; [`handle_event`](Self::handle_event)
    /// also drains on entry.
    pub fn drain_pending(&self) {
        self.inner.drain_pending();
    }

    /// Demultiplex one X event.
    pub fn handle_event(&self, event: &Event) {
        self.inner.drain_pending();
        if let Event::Error(e) = event {
            debug!(
                "X error: code {}, opcode {}.{}",
                e.error_code, e.major_opcode, e.minor_opcode
            );
            return;
        }
        if let Some(timestamp) = event_timestamp(event) {
            self.inner.display.note_timestamp(timestamp);
        }
        self.inner.handle_event(event);
    }
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor")
            .field("overlay_window", &self.inner.overlay_window)
            .field("windows", &self.inner.windows.lock().unwrap().len())
            .finish()
    }
}

impl Inner {
    fn handle_event(self: &Arc<Self>, event: &Event) {
        let net_active_window = self.display.atoms().net_active_window;
        match classify(event, self.display.root(), net_active_window) {
            Route::Damage(damage_id) => {
                let Event::DamageNotify(e) = event else { return };
                let entry = self.pixmaps.lock().unwrap().get(&damage_id).cloned();
                match entry.and_then(|weak| weak.upgrade()) {
                    Some(pixmap) => pixmap.handle_damage(e),
                    // Unknown or already-destroyed damage object: drop the
                    // event, prune the entry if one was left behind.
                    None => {
                        self.pixmaps.lock().unwrap().remove(&damage_id);
                    }
                }
            }
            Route::AddChild(window) => self.add_child_window(window),
            Route::RemoveChild(window) => self.remove_child_window(window),
            Route::Reparent { window, attached } => {
                if attached {
                    self.add_child_window(window);
                } else {
                    self.remove_child_window(window);
                }
                self.forward(window, event);
            }
            Route::RootGeometry(geometry) => {
                let changed = {
                    let mut root_geometry = self.root_geometry.lock().unwrap();
                    if *root_geometry == geometry {
                        false
                    } else {
                        *root_geometry = geometry;
                        true
                    }
                };
                if changed {
                    self.root_geometry_changed.emit(&geometry);
                }
            }
            Route::Forward(window) => self.forward(window, event),
            Route::ForwardAndRestack(window) => {
                self.forward(window, event);
                self.restack();
            }
            Route::ActiveWindow => self.update_active_window(),
            Route::Ignore => {}
        }
    }

    fn forward(&self, window: Window, event: &Event) {
        let target = self
            .windows
            .lock()
            .unwrap()
            .get(&window)
            .map(|tracked| tracked.window.clone());
        if let Some(target) = target {
            target.handle_event(event);
        }
    }

    fn add_child_window(self: &Arc<Self>, window: Window) {
        if window == self.display.root() || window == self.overlay_window {
            return;
        }
        if self.windows.lock().unwrap().contains_key(&window) {
            return;
        }

        let client = match ClientWindow::new(self.display.clone(), window) {
            Ok(client) => client,
            Err(err) => {
                debug!("skipping window {window:#x}: {err}");
                return;
            }
        };
        // InputOnly windows have nothing to composite and nothing to show.
        if client.window_class() == WindowClass::INPUT_ONLY {
            return;
        }

        let weak = Arc::downgrade(self);
        let pixmap_slot = client.pixmap_changed.connect(move |pixmap| {
            if let Some(inner) = weak.upgrade() {
                inner.register_pixmap(pixmap);
            }
        });
        let weak = Arc::downgrade(self);
        let stacking_slot = client.stacking_order_changed.connect(move |()| {
            if let Some(inner) = weak.upgrade() {
                inner.restack();
            }
        });

        self.windows.lock().unwrap().insert(
            window,
            TrackedWindow {
                window: client.clone(),
                pixmap_slot,
                stacking_slot,
            },
        );
        self.restack();

        if self.init_finished.load(Ordering::SeqCst) {
            self.window_created.emit(&client);
        } else {
            self.pending_created.lock().unwrap().push(client);
        }
    }

    fn remove_child_window(&self, window: Window) {
        let Some(tracked) = self.windows.lock().unwrap().remove(&window) else {
            return;
        };
        tracked.window.pixmap_changed.disconnect(tracked.pixmap_slot);
        tracked
            .window
            .stacking_order_changed
            .disconnect(tracked.stacking_slot);
        tracked.window.invalidate();
    }

    fn register_pixmap(self: &Arc<Self>, pixmap: &Arc<WindowPixmap>) {
        self.pixmaps
            .lock()
            .unwrap()
            .insert(pixmap.damage(), Arc::downgrade(pixmap));
        let weak = Arc::downgrade(self);
        pixmap.destroyed.connect(move |damage_id| {
            if let Some(inner) = weak.upgrade() {
                inner.pixmaps.lock().unwrap().remove(damage_id);
            }
        });
    }

    /// Re-derive `z_index` and `above_sibling` for every tracked window from
    /// the server's bottom-to-top child list.
    fn restack(&self) {
        let reply = self
            .display
            .conn()
            .query_tree(self.display.root())
            .map_err(Error::from)
            .and_then(|cookie| cookie.reply().map_err(Error::from));
        let tree = match reply {
            Ok(tree) => tree,
            Err(err) => {
                debug!("restack: QueryTree failed: {err}");
                return;
            }
        };

        let targets: Vec<(Arc<ClientWindow>, i32, Window)> = {
            let windows = self.windows.lock().unwrap();
            stacking_assignments(&tree.children)
                .into_iter()
                .filter_map(|(window, z_index, above)| {
                    windows
                        .get(&window)
                        .map(|tracked| (tracked.window.clone(), z_index, above))
                })
                .collect()
        };
        for (window, z_index, above) in targets {
            window.set_above(above);
            window.set_z_index(z_index);
        }
    }

    fn update_active_window(&self) {
        let conn = self.display.conn();
        let active_id = conn
            .get_property(
                false,
                self.display.root(),
                self.display.atoms().net_active_window,
                AtomEnum::WINDOW,
                0,
                1,
            )
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .and_then(|reply| reply.value32().and_then(|mut values| values.next()))
            .unwrap_or(x11rb::NONE);

        let resolved = if active_id == x11rb::NONE {
            None
        } else {
            self.windows
                .lock()
                .unwrap()
                .get(&active_id)
                .map(|tracked| tracked.window.clone())
        };

        let changed = {
            let mut active = self.active_window.lock().unwrap();
            let same = match (&*active, &resolved) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            };
            if !same {
                *active = resolved.clone();
            }
            !same
        };
        if changed {
            self.active_window_changed.emit(&());
        }
    }

    fn drain_pending(&self) {
        let pending = std::mem::take(&mut *self.pending_created.lock().unwrap());
        for window in pending {
            self.window_created.emit(&window);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let conn = self.display.conn();
        if self.registered_owner.lock().unwrap().take().is_some() {
            let _ = conn.set_selection_owner(
                x11rb::NONE,
                self.display.atoms().net_wm_cm_owner,
                x11rb::CURRENT_TIME,
            );
        }
        let _ = conn.composite_release_overlay_window(self.display.root());
        let _ = conn.flush();
    }
}

/// Where the demultiplexer sends an event. Pure classification; the side
/// effects live in [`Inner::handle_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Damage(damage::Damage),
    AddChild(Window),
    RemoveChild(Window),
    Reparent { window: Window, attached: bool },
    RootGeometry(Geometry),
    Forward(Window),
    ForwardAndRestack(Window),
    ActiveWindow,
    Ignore,
}

fn classify(event: &Event, root: Window, net_active_window: Atom) -> Route {
    match event {
        Event::DamageNotify(e) => Route::Damage(e.damage),
        Event::CreateNotify(e) if e.parent == root => Route::AddChild(e.window),
        Event::CreateNotify(_) => Route::Ignore,
        Event::DestroyNotify(e) if e.event == root => Route::RemoveChild(e.window),
        Event::DestroyNotify(_) => Route::Ignore,
        Event::ReparentNotify(e) if e.event == root => Route::Reparent {
            window: e.window,
            attached: e.parent == root,
        },
        Event::ReparentNotify(_) => Route::Ignore,
        Event::ConfigureNotify(e) => {
            if e.window == root {
                Route::RootGeometry(Geometry::new(0, 0, e.width.into(), e.height.into()))
            } else if e.window != e.event {
                // Propagated to an ancestor, not the window's own notification.
                Route::Ignore
            } else {
                Route::Forward(e.window)
            }
        }
        Event::MapNotify(e) if e.event == root => Route::Forward(e.window),
        Event::UnmapNotify(e) if e.event == root => Route::Forward(e.window),
        Event::GravityNotify(e) if e.event == root => Route::Forward(e.window),
        Event::CirculateNotify(e) if e.event == root => Route::ForwardAndRestack(e.window),
        Event::PropertyNotify(e) => {
            if e.window == root && e.atom == net_active_window {
                Route::ActiveWindow
            } else {
                Route::Forward(e.window)
            }
        }
        Event::FocusIn(e) => Route::Forward(e.event),
        Event::FocusOut(e) => Route::Forward(e.event),
        Event::ShapeNotify(e) => Route::Forward(e.affected_window),
        _ => Route::Ignore,
    }
}

fn require_version(
    name: &'static str,
    found: (u32, u32),
    required: (u32, u32),
) -> Result<(), Error> {
    if version_at_least(found, required) {
        Ok(())
    } else {
        Err(Error::ExtensionTooOld {
            name,
            found_major: found.0,
            found_minor: found.1,
            required_major: required.0,
            required_minor: required.1,
        })
    }
}

fn version_at_least(found: (u32, u32), required: (u32, u32)) -> bool {
    found.0 > required.0 || (found.0 == required.0 && found.1 >= required.1)
}

/// `(window, z_index, above_sibling)` for a bottom-to-top child list; the
/// bottom window has no sibling below it.
fn stacking_assignments(children: &[Window]) -> Vec<(Window, i32, Window)> {
    children
        .iter()
        .enumerate()
        .map(|(i, &window)| {
            let above = if i == 0 { x11rb::NONE } else { children[i - 1] };
            (window, i as i32, above)
        })
        .collect()
}

fn event_timestamp(event: &Event) -> Option<Timestamp> {
    match event {
        Event::PropertyNotify(e) => Some(e.time),
        Event::ShapeNotify(e) => Some(e.server_time),
        Event::DamageNotify(e) => Some(e.timestamp),
        Event::SelectionClear(e) => Some(e.time),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x11rb::protocol::xproto::{
        CirculateNotifyEvent, ConfigureNotifyEvent, CreateNotifyEvent, DestroyNotifyEvent,
        MapNotifyEvent, Place, Property, PropertyNotifyEvent, ReparentNotifyEvent,
        UnmapNotifyEvent,
    };

    const ROOT: Window = 0x100;
    const ACTIVE_ATOM: Atom = 0x200;
    const WIN: Window = 0x300;

    fn configure(event: Window, window: Window, width: u16) -> Event {
        Event::ConfigureNotify(ConfigureNotifyEvent {
            response_type: 22,
            sequence: 0,
            event,
            window,
            above_sibling: x11rb::NONE,
            x: 0,
            y: 0,
            width,
            height: width,
            border_width: 0,
            override_redirect: false,
        })
    }

    #[test]
    fn create_notify_adds_only_root_children() {
        let event = Event::CreateNotify(CreateNotifyEvent {
            response_type: 16,
            sequence: 0,
            parent: ROOT,
            window: WIN,
            x: 0,
            y: 0,
            width: 10,
            height: 10,
            border_width: 0,
            override_redirect: false,
        });
        assert_eq!(classify(&event, ROOT, ACTIVE_ATOM), Route::AddChild(WIN));

        let nested = Event::CreateNotify(CreateNotifyEvent {
            response_type: 16,
            sequence: 0,
            parent: WIN,
            window: 0x400,
            x: 0,
            y: 0,
            width: 10,
            height: 10,
            border_width: 0,
            override_redirect: false,
        });
        assert_eq!(classify(&nested, ROOT, ACTIVE_ATOM), Route::Ignore);
    }

    #[test]
    fn destroy_notify_removes_when_reported_by_root() {
        let event = Event::DestroyNotify(DestroyNotifyEvent {
            response_type: 17,
            sequence: 0,
            event: ROOT,
            window: WIN,
        });
        assert_eq!(classify(&event, ROOT, ACTIVE_ATOM), Route::RemoveChild(WIN));

        let propagated = Event::DestroyNotify(DestroyNotifyEvent {
            response_type: 17,
            sequence: 0,
            event: WIN,
            window: 0x400,
        });
        assert_eq!(classify(&propagated, ROOT, ACTIVE_ATOM), Route::Ignore);
    }

    #[test]
    fn reparent_direction_follows_the_new_parent() {
        let attach = Event::ReparentNotify(ReparentNotifyEvent {
            response_type: 21,
            sequence: 0,
            event: ROOT,
            window: WIN,
            parent: ROOT,
            x: 0,
            y: 0,
            override_redirect: false,
        });
        assert_eq!(
            classify(&attach, ROOT, ACTIVE_ATOM),
            Route::Reparent { window: WIN, attached: true }
        );

        let detach = Event::ReparentNotify(ReparentNotifyEvent {
            response_type: 21,
            sequence: 0,
            event: ROOT,
            window: WIN,
            parent: 0x400,
            x: 0,
            y: 0,
            override_redirect: false,
        });
        assert_eq!(
            classify(&detach, ROOT, ACTIVE_ATOM),
            Route::Reparent { window: WIN, attached: false }
        );
    }

    #[test]
    fn root_configure_updates_root_geometry() {
        assert_eq!(
            classify(&configure(ROOT, ROOT, 1920), ROOT, ACTIVE_ATOM),
            Route::RootGeometry(Geometry::new(0, 0, 1920, 1920))
        );
    }

    #[test]
    fn propagated_configure_is_dropped() {
        // event != window: the notification reached us via an ancestor mask.
        assert_eq!(
            classify(&configure(ROOT, WIN, 300), ROOT, ACTIVE_ATOM),
            Route::Ignore
        );
        assert_eq!(
            classify(&configure(WIN, WIN, 300), ROOT, ACTIVE_ATOM),
            Route::Forward(WIN)
        );
    }

    #[test]
    fn map_unmap_forward_only_from_root_substructure() {
        let map = Event::MapNotify(MapNotifyEvent {
            response_type: 19,
            sequence: 0,
            event: ROOT,
            window: WIN,
            override_redirect: false,
        });
        assert_eq!(classify(&map, ROOT, ACTIVE_ATOM), Route::Forward(WIN));

        let unmap = Event::UnmapNotify(UnmapNotifyEvent {
            response_type: 18,
            sequence: 0,
            event: WIN,
            window: WIN,
            from_configure: false,
        });
        assert_eq!(classify(&unmap, ROOT, ACTIVE_ATOM), Route::Ignore);
    }

    #[test]
    fn circulate_triggers_restack_as_well() {
        let event = Event::CirculateNotify(CirculateNotifyEvent {
            response_type: 26,
            sequence: 0,
            event: ROOT,
            window: WIN,
            place: Place::ON_TOP,
        });
        assert_eq!(
            classify(&event, ROOT, ACTIVE_ATOM),
            Route::ForwardAndRestack(WIN)
        );
    }

    #[test]
    fn active_window_property_on_root_is_special_cased() {
        let event = Event::PropertyNotify(PropertyNotifyEvent {
            response_type: 28,
            sequence: 0,
            window: ROOT,
            atom: ACTIVE_ATOM,
            time: 1,
            state: Property::NEW_VALUE,
        });
        assert_eq!(classify(&event, ROOT, ACTIVE_ATOM), Route::ActiveWindow);

        let other = Event::PropertyNotify(PropertyNotifyEvent {
            response_type: 28,
            sequence: 0,
            window: WIN,
            atom: ACTIVE_ATOM,
            time: 1,
            state: Property::NEW_VALUE,
        });
        assert_eq!(classify(&other, ROOT, ACTIVE_ATOM), Route::Forward(WIN));
    }

    #[test]
    fn stacking_assignments_match_the_child_list() {
        let children = [0x10, 0x20, 0x30];
        let assignments = stacking_assignments(&children);
        assert_eq!(
            assignments,
            vec![(0x10, 0, x11rb::NONE), (0x20, 1, 0x10), (0x30, 2, 0x20)]
        );
    }

    #[test]
    fn stacking_assignments_on_empty_tree() {
        assert!(stacking_assignments(&[]).is_empty());
    }

    #[test]
    fn version_comparison_orders_major_before_minor() {
        assert!(version_at_least((1, 1), (1, 1)));
        assert!(version_at_least((1, 2), (1, 1)));
        assert!(version_at_least((2, 0), (1, 1)));
        assert!(!version_at_least((1, 0), (1, 1)));
        assert!(!version_at_least((0, 4), (1, 1)));
    }

    #[test]
    fn too_old_extension_is_rejected() {
        assert!(require_version("Damage", (1, 1), (1, 1)).is_ok());
        assert!(matches!(
            require_version("Damage", (1, 0), (1, 1)),
            Err(Error::ExtensionTooOld { name: "Damage", .. })
        ));
    }
}
