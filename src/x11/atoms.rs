//! EWMH atom table.
//!
//! Only the hints this core consumes are interned: the per-screen compositor
//! selection, the active-window root property, and `_NET_WM_WINDOW_TYPE`
//! with its kind atoms.

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Atom, ConnectionExt as _};

use crate::error::Error;

/// Holds all interned atoms.
#[derive(Debug, Clone)]
pub struct Atoms {
    /// `_NET_WM_CM_Sn` for the connection's screen.
    pub net_wm_cm_owner: Atom,
    pub net_active_window: Atom,
    pub net_wm_window_type: Atom,
    pub net_wm_window_type_desktop: Atom,
    pub net_wm_window_type_dock: Atom,
    pub net_wm_window_type_toolbar: Atom,
    pub net_wm_window_type_menu: Atom,
    pub net_wm_window_type_utility: Atom,
    pub net_wm_window_type_splash: Atom,
    pub net_wm_window_type_dialog: Atom,
    pub net_wm_window_type_dropdown_menu: Atom,
    pub net_wm_window_type_popup_menu: Atom,
    pub net_wm_window_type_tooltip: Atom,
    pub net_wm_window_type_notification: Atom,
    pub net_wm_window_type_combo: Atom,
    pub net_wm_window_type_dnd: Atom,
    pub net_wm_window_type_normal: Atom,
}

impl Atoms {
    /// Intern all required atoms.
    pub fn new<C: Connection>(conn: &C, screen_num: usize) -> Result<Self, Error> {
        let intern = |name: String| -> Result<Atom, Error> {
            Ok(conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
        };
        let intern_static = |name: &str| intern(name.to_owned());

        Ok(Self {
            net_wm_cm_owner: intern(format!("_NET_WM_CM_S{screen_num}"))?,
            net_active_window: intern_static("_NET_ACTIVE_WINDOW")?,
            net_wm_window_type: intern_static("_NET_WM_WINDOW_TYPE")?,
            net_wm_window_type_desktop: intern_static("_NET_WM_WINDOW_TYPE_DESKTOP")?,
            net_wm_window_type_dock: intern_static("_NET_WM_WINDOW_TYPE_DOCK")?,
            net_wm_window_type_toolbar: intern_static("_NET_WM_WINDOW_TYPE_TOOLBAR")?,
            net_wm_window_type_menu: intern_static("_NET_WM_WINDOW_TYPE_MENU")?,
            net_wm_window_type_utility: intern_static("_NET_WM_WINDOW_TYPE_UTILITY")?,
            net_wm_window_type_splash: intern_static("_NET_WM_WINDOW_TYPE_SPLASH")?,
            net_wm_window_type_dialog: intern_static("_NET_WM_WINDOW_TYPE_DIALOG")?,
            net_wm_window_type_dropdown_menu: intern_static("_NET_WM_WINDOW_TYPE_DROPDOWN_MENU")?,
            net_wm_window_type_popup_menu: intern_static("_NET_WM_WINDOW_TYPE_POPUP_MENU")?,
            net_wm_window_type_tooltip: intern_static("_NET_WM_WINDOW_TYPE_TOOLTIP")?,
            net_wm_window_type_notification: intern_static("_NET_WM_WINDOW_TYPE_NOTIFICATION")?,
            net_wm_window_type_combo: intern_static("_NET_WM_WINDOW_TYPE_COMBO")?,
            net_wm_window_type_dnd: intern_static("_NET_WM_WINDOW_TYPE_DND")?,
            net_wm_window_type_normal: intern_static("_NET_WM_WINDOW_TYPE_NORMAL")?,
        })
    }

    /// Map a `_NET_WM_WINDOW_TYPE` kind atom to the typed enum.
    pub fn wm_window_type(&self, atom: Atom) -> WmWindowType {
        if atom == x11rb::NONE {
            return WmWindowType::None;
        }
        match atom {
            a if a == self.net_wm_window_type_desktop => WmWindowType::Desktop,
            a if a == self.net_wm_window_type_dock => WmWindowType::Dock,
            a if a == self.net_wm_window_type_toolbar => WmWindowType::Toolbar,
            a if a == self.net_wm_window_type_menu => WmWindowType::Menu,
            a if a == self.net_wm_window_type_utility => WmWindowType::Utility,
            a if a == self.net_wm_window_type_splash => WmWindowType::Splash,
            a if a == self.net_wm_window_type_dialog => WmWindowType::Dialog,
            a if a == self.net_wm_window_type_dropdown_menu => WmWindowType::DropdownMenu,
            a if a == self.net_wm_window_type_popup_menu => WmWindowType::PopupMenu,
            a if a == self.net_wm_window_type_tooltip => WmWindowType::Tooltip,
            a if a == self.net_wm_window_type_notification => WmWindowType::Notification,
            a if a == self.net_wm_window_type_combo => WmWindowType::Combo,
            a if a == self.net_wm_window_type_dnd => WmWindowType::Dnd,
            a if a == self.net_wm_window_type_normal => WmWindowType::Normal,
            _ => WmWindowType::Unknown,
        }
    }
}

/// The EWMH window type of a client window, decoded from the first atom of
/// `_NET_WM_WINDOW_TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WmWindowType {
    /// The property is not set.
    None,
    /// The property names an atom outside the EWMH kind table.
    Unknown,
    Desktop,
    Dock,
    Toolbar,
    Menu,
    Utility,
    Splash,
    Dialog,
    DropdownMenu,
    PopupMenu,
    Tooltip,
    Notification,
    Combo,
    Dnd,
    Normal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_atoms() -> Atoms {
        Atoms {
            net_wm_cm_owner: 100,
            net_active_window: 101,
            net_wm_window_type: 102,
            net_wm_window_type_desktop: 103,
            net_wm_window_type_dock: 104,
            net_wm_window_type_toolbar: 105,
            net_wm_window_type_menu: 106,
            net_wm_window_type_utility: 107,
            net_wm_window_type_splash: 108,
            net_wm_window_type_dialog: 109,
            net_wm_window_type_dropdown_menu: 110,
            net_wm_window_type_popup_menu: 111,
            net_wm_window_type_tooltip: 112,
            net_wm_window_type_notification: 113,
            net_wm_window_type_combo: 114,
            net_wm_window_type_dnd: 115,
            net_wm_window_type_normal: 116,
        }
    }

    #[test]
    fn decodes_known_kind_atoms() {
        let atoms = fake_atoms();
        assert_eq!(atoms.wm_window_type(109), WmWindowType::Dialog);
        assert_eq!(atoms.wm_window_type(116), WmWindowType::Normal);
        assert_eq!(atoms.wm_window_type(104), WmWindowType::Dock);
    }

    #[test]
    fn unset_property_decodes_to_none() {
        assert_eq!(fake_atoms().wm_window_type(x11rb::NONE), WmWindowType::None);
    }

    #[test]
    fn foreign_atom_decodes_to_unknown() {
        assert_eq!(fake_atoms().wm_window_type(9999), WmWindowType::Unknown);
    }
}
