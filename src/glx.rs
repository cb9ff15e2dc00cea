//! GLX texture-from-pixmap.
//!
//! [`GlxInfo`] is the process-wide GLX state: the Xlib display used for GLX
//! calls, the `GLX_EXT_texture_from_pixmap` entry points, the RENDER
//! pict-format channel widths per visual, the visual→depth table, and a cache
//! of per-visual FBConfig choices. [`TextureFromPixmap`] wraps one GL texture
//! bound to one server pixmap.
//!
//! Everything in this module runs on the render thread; the protocol thread
//! never touches it.

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::c_int;
use std::ptr;
use std::sync::{Mutex, OnceLock};

use tracing::{debug, error, warn};
use x11_dl::glx::{self, Glx};
use x11_dl::xlib::{self, Xlib};
use x11rb::connection::Connection;
use x11rb::protocol::render::ConnectionExt as _;
use x11rb::protocol::xproto::{Pixmap, Visualid};

use crate::error::Error;

// GLX_EXT_texture_from_pixmap tokens (not part of core GLX headers).
const GLX_BIND_TO_TEXTURE_RGB_EXT: i32 = 0x20D0;
const GLX_BIND_TO_TEXTURE_RGBA_EXT: i32 = 0x20D1;
const GLX_BIND_TO_TEXTURE_TARGETS_EXT: i32 = 0x20D3;
const GLX_TEXTURE_FORMAT_EXT: i32 = 0x20D5;
const GLX_TEXTURE_TARGET_EXT: i32 = 0x20D6;
const GLX_MIPMAP_TEXTURE_EXT: i32 = 0x20D7;
const GLX_Y_INVERTED_EXT: i32 = 0x20D8;
const GLX_TEXTURE_FORMAT_RGB_EXT: i32 = 0x20D9;
const GLX_TEXTURE_FORMAT_RGBA_EXT: i32 = 0x20DA;
const GLX_TEXTURE_2D_EXT: i32 = 0x20DC;
const GLX_FRONT_LEFT_EXT: i32 = 0x20DE;
const GLX_TEXTURE_2D_BIT_EXT: i32 = 0x0002;

type BindTexImage =
    unsafe extern "C" fn(*mut xlib::Display, glx::GLXDrawable, c_int, *const c_int);
type ReleaseTexImage = unsafe extern "C" fn(*mut xlib::Display, glx::GLXDrawable, c_int);

/// The GLX texture format a config can bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    Rgb,
    Rgba,
}

impl TextureFormat {
    fn glx_token(self) -> i32 {
        match self {
            TextureFormat::Rgb => GLX_TEXTURE_FORMAT_RGB_EXT,
            TextureFormat::Rgba => GLX_TEXTURE_FORMAT_RGBA_EXT,
        }
    }
}

/// The FBConfig chosen for one X visual.
#[derive(Clone, Copy)]
pub struct VisualConfig {
    config: glx::GLXFBConfig,
    texture_format: TextureFormat,
    y_inverted: bool,
    depth_bits: i32,
    stencil_bits: i32,
    alpha_matches: bool,
}

/// RGBA channel widths of a visual's PictFormat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChannelWidths {
    red: u8,
    green: u8,
    blue: u8,
    alpha: u8,
}

impl ChannelWidths {
    fn buffer_size(&self) -> i32 {
        i32::from(self.red) + i32::from(self.green) + i32::from(self.blue) + i32::from(self.alpha)
    }
}

/// Decide the bindable format for a visual and whether the config's alpha
/// support matches the visual's alpha presence.
fn select_texture_format(alpha_bits: u8, bind_rgb: bool, bind_rgba: bool) -> (TextureFormat, bool) {
    if alpha_bits > 0 {
        (
            if bind_rgba { TextureFormat::Rgba } else { TextureFormat::Rgb },
            bind_rgba,
        )
    } else {
        (
            if bind_rgb { TextureFormat::Rgb } else { TextureFormat::Rgba },
            bind_rgb,
        )
    }
}

/// Ranking between filtered configs: an alpha-matching config always wins;
/// among equals, fewer ancillary depth+stencil bits win.
fn outranks(
    alpha_matches: bool,
    depth_bits: i32,
    stencil_bits: i32,
    best: Option<&VisualConfig>,
) -> bool {
    match best {
        None => true,
        Some(best) => {
            if alpha_matches != best.alpha_matches {
                alpha_matches
            } else {
                depth_bits + stencil_bits < best.depth_bits + best.stencil_bits
            }
        }
    }
}

// The GLX display and FBConfig handles live in a process-wide static. All GL
// and GLX calls are confined to the render thread; the config cache is behind
// a mutex.
unsafe impl Send for GlxInfo {}
unsafe impl Sync for GlxInfo {}

pub struct GlxInfo {
    xlib: Xlib,
    glx: Glx,
    display: *mut xlib::Display,
    screen: c_int,
    tfp_bind: BindTexImage,
    tfp_release: ReleaseTexImage,
    visual_channels: HashMap<Visualid, ChannelWidths>,
    visual_depth: HashMap<Visualid, u8>,
    /// Per-visual choice; a cached `None` means the failure was already
    /// reported and the visual stays textureless.
    configs: Mutex<HashMap<Visualid, Option<VisualConfig>>>,
}

unsafe extern "C" fn glx_error_handler(
    _display: *mut xlib::Display,
    event: *mut xlib::XErrorEvent,
) -> c_int {
    if !event.is_null() {
        let (code, request, minor) =
            unsafe { ((*event).error_code, (*event).request_code, (*event).minor_code) };
        warn!("X error on GLX display: code {code}, request {request}.{minor}");
    }
    0
}

impl GlxInfo {
    /// The process-wide instance, initialized on first use. Returns `None`
    /// (after reporting once) when GLX or the TFP extension is unavailable.
    pub fn instance() -> Option<&'static GlxInfo> {
        static INSTANCE: OnceLock<Option<GlxInfo>> = OnceLock::new();
        INSTANCE
            .get_or_init(|| match GlxInfo::init() {
                Ok(info) => Some(info),
                Err(err) => {
                    error!("GLX texture-from-pixmap unavailable: {err}");
                    None
                }
            })
            .as_ref()
    }

    fn init() -> Result<Self, Error> {
        // Snapshot the RENDER pict formats and the visual→depth table through
        // a scratch protocol connection; both are static server data.
        let (conn, _) = x11rb::connect(None)?;
        let pict_formats = conn.render_query_pict_formats()?.reply()?;

        let format_by_id: HashMap<_, _> = pict_formats
            .formats
            .iter()
            .map(|format| (format.id, format))
            .collect();
        let mut visual_channels = HashMap::new();
        for pict_screen in &pict_formats.screens {
            for pict_depth in &pict_screen.depths {
                for pict_visual in &pict_depth.visuals {
                    if let Some(format) = format_by_id.get(&pict_visual.format) {
                        visual_channels.insert(
                            pict_visual.visual,
                            ChannelWidths {
                                red: format.direct.red_mask.count_ones() as u8,
                                green: format.direct.green_mask.count_ones() as u8,
                                blue: format.direct.blue_mask.count_ones() as u8,
                                alpha: format.direct.alpha_mask.count_ones() as u8,
                            },
                        );
                    }
                }
            }
        }

        let mut visual_depth = HashMap::new();
        for screen_info in &conn.setup().roots {
            for depth_info in &screen_info.allowed_depths {
                for visual in &depth_info.visuals {
                    visual_depth.insert(visual.visual_id, depth_info.depth);
                }
            }
        }
        drop(conn);

        let xlib = Xlib::open().map_err(|err| Error::Glx(err.to_string()))?;
        let glx = Glx::open().map_err(|err| Error::Glx(err.to_string()))?;

        let display = unsafe { (xlib.XOpenDisplay)(ptr::null()) };
        if display.is_null() {
            return Err(Error::Glx("XOpenDisplay failed".into()));
        }
        // The default Xlib handler exits the process; a racing unmap must not
        // take the compositor down with a BadPixmap.
        unsafe {
            (xlib.XSetErrorHandler)(Some(glx_error_handler));
        }
        let screen = unsafe { (xlib.XDefaultScreen)(display) };

        let extensions = unsafe {
            let raw = (glx.glXQueryExtensionsString)(display, screen);
            if raw.is_null() {
                ""
            } else {
                CStr::from_ptr(raw).to_str().unwrap_or("")
            }
        };
        if !extensions
            .split(' ')
            .any(|ext| ext == "GLX_EXT_texture_from_pixmap")
        {
            unsafe { (xlib.XCloseDisplay)(display) };
            return Err(Error::Glx("GLX_EXT_texture_from_pixmap not supported".into()));
        }

        let load = |name: &str| unsafe {
            let symbol = CString::new(name).unwrap();
            (glx.glXGetProcAddress)(symbol.as_ptr() as *const _)
        };
        let (Some(bind), Some(release)) = (load("glXBindTexImageEXT"), load("glXReleaseTexImageEXT"))
        else {
            unsafe { (xlib.XCloseDisplay)(display) };
            return Err(Error::Glx(
                "GLX_EXT_texture_from_pixmap is reported but its entry points are missing".into(),
            ));
        };
        let tfp_bind: BindTexImage = unsafe { std::mem::transmute(bind) };
        let tfp_release: ReleaseTexImage = unsafe { std::mem::transmute(release) };

        debug!(
            "GLX initialized: {} pict-format visuals, {} depth entries",
            visual_channels.len(),
            visual_depth.len()
        );

        Ok(Self {
            xlib,
            glx,
            display,
            screen,
            tfp_bind,
            tfp_release,
            visual_channels,
            visual_depth,
            configs: Mutex::new(HashMap::new()),
        })
    }

    /// The FBConfig for a visual, computed on first request and cached.
    pub fn config_for(&self, visual: Visualid) -> Option<VisualConfig> {
        let mut cache = self.configs.lock().unwrap();
        if let Some(cached) = cache.get(&visual) {
            return *cached;
        }
        let config = self.create_visual_config(visual);
        if config.is_none() {
            error!("no usable FBConfig for visual {visual:#x}");
        }
        cache.insert(visual, config);
        config
    }

    fn create_visual_config(&self, visual: Visualid) -> Option<VisualConfig> {
        let Some(&channels) = self.visual_channels.get(&visual) else {
            error!("no PictFormat for visual {visual:#x}");
            return None;
        };
        let target_depth = self.visual_depth.get(&visual).copied()?;

        let attrs = [
            glx::GLX_RENDER_TYPE as i32,
            glx::GLX_RGBA_BIT as i32,
            glx::GLX_DRAWABLE_TYPE as i32,
            glx::GLX_WINDOW_BIT as i32 | glx::GLX_PIXMAP_BIT as i32,
            glx::GLX_X_VISUAL_TYPE as i32,
            glx::GLX_TRUE_COLOR as i32,
            glx::GLX_X_RENDERABLE as i32,
            1,
            glx::GLX_BUFFER_SIZE as i32,
            channels.buffer_size(),
            glx::GLX_RED_SIZE as i32,
            channels.red.into(),
            glx::GLX_GREEN_SIZE as i32,
            channels.green.into(),
            glx::GLX_BLUE_SIZE as i32,
            channels.blue.into(),
            glx::GLX_ALPHA_SIZE as i32,
            channels.alpha.into(),
            glx::GLX_STENCIL_SIZE as i32,
            0,
            glx::GLX_DEPTH_SIZE as i32,
            0,
            0,
        ];

        let mut config_count = 0;
        let configs = unsafe {
            (self.glx.glXChooseFBConfig)(self.display, self.screen, attrs.as_ptr(), &mut config_count)
        };
        if configs.is_null() || config_count <= 0 {
            return None;
        }

        let attr = |config: glx::GLXFBConfig, token: i32| -> Option<i32> {
            let mut value = 0;
            let status =
                unsafe { (self.glx.glXGetFBConfigAttrib)(self.display, config, token, &mut value) };
            if status == 0 { Some(value) } else { None }
        };

        let mut best: Option<VisualConfig> = None;
        for i in 0..config_count as usize {
            let config = unsafe { *configs.add(i) };

            let (Some(red), Some(green), Some(blue)) = (
                attr(config, glx::GLX_RED_SIZE as i32),
                attr(config, glx::GLX_GREEN_SIZE as i32),
                attr(config, glx::GLX_BLUE_SIZE as i32),
            ) else {
                continue;
            };
            if (red, green, blue)
                != (channels.red.into(), channels.green.into(), channels.blue.into())
            {
                continue;
            }

            // The config's own visual must sit at the same depth, or binding
            // the pixmap comes out with mismatched channels.
            let Some(config_visual) = attr(config, glx::GLX_VISUAL_ID as i32) else {
                continue;
            };
            if self.visual_depth.get(&(config_visual as Visualid)).copied() != Some(target_depth) {
                continue;
            }

            let bind_rgb = attr(config, GLX_BIND_TO_TEXTURE_RGB_EXT).unwrap_or(0) != 0;
            let bind_rgba = attr(config, GLX_BIND_TO_TEXTURE_RGBA_EXT).unwrap_or(0) != 0;
            if !bind_rgb && !bind_rgba {
                continue;
            }

            let Some(targets) = attr(config, GLX_BIND_TO_TEXTURE_TARGETS_EXT) else {
                continue;
            };
            if targets & GLX_TEXTURE_2D_BIT_EXT == 0 {
                continue;
            }

            let y_inverted = attr(config, GLX_Y_INVERTED_EXT).unwrap_or(0) != 0;
            let (Some(depth_bits), Some(stencil_bits)) = (
                attr(config, glx::GLX_DEPTH_SIZE as i32),
                attr(config, glx::GLX_STENCIL_SIZE as i32),
            ) else {
                continue;
            };

            let (texture_format, alpha_matches) =
                select_texture_format(channels.alpha, bind_rgb, bind_rgba);
            if outranks(alpha_matches, depth_bits, stencil_bits, best.as_ref()) {
                best = Some(VisualConfig {
                    config,
                    texture_format,
                    y_inverted,
                    depth_bits,
                    stencil_bits,
                    alpha_matches,
                });
            }
        }
        unsafe { (self.xlib.XFree)(configs as *mut _) };
        best
    }
}

/// A GL texture backed by a server pixmap through `GLX_EXT_texture_from_pixmap`.
///
/// Owned by a single scene-graph node. Construction, `bind`, and drop must
/// all happen on the render thread with a current GL context.
pub struct TextureFromPixmap {
    texture: gl::types::GLuint,
    glx_pixmap: glx::GLXPixmap,
    pixmap: Pixmap,
    size: (u16, u16),
    has_alpha: bool,
    y_inverted: bool,
    rebind_pending: std::cell::Cell<bool>,
}

impl TextureFromPixmap {
    /// Allocate a GL texture and a GLX pixmap over `pixmap`.
    pub fn new(pixmap: Pixmap, visual: Visualid, size: (u16, u16)) -> Result<Self, Error> {
        let info = GlxInfo::instance()
            .ok_or_else(|| Error::Glx("GLX_EXT_texture_from_pixmap unavailable".into()))?;
        let config = info.config_for(visual).ok_or(Error::NoFbConfig(visual))?;

        let mut texture = 0;
        unsafe {
            gl::GenTextures(1, &mut texture);
            gl::BindTexture(gl::TEXTURE_2D, texture);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as i32);
        }

        let attribs = [
            GLX_TEXTURE_TARGET_EXT,
            GLX_TEXTURE_2D_EXT,
            GLX_TEXTURE_FORMAT_EXT,
            config.texture_format.glx_token(),
            GLX_MIPMAP_TEXTURE_EXT,
            0,
            0,
        ];
        let glx_pixmap = unsafe {
            (info.glx.glXCreatePixmap)(
                info.display,
                config.config,
                pixmap as xlib::XID,
                attribs.as_ptr(),
            )
        };
        if glx_pixmap == 0 {
            unsafe { gl::DeleteTextures(1, &texture) };
            return Err(Error::Glx(format!(
                "glXCreatePixmap failed for pixmap {pixmap:#x}"
            )));
        }

        Ok(Self {
            texture,
            glx_pixmap,
            pixmap,
            size,
            has_alpha: config.texture_format == TextureFormat::Rgba,
            y_inverted: !config.y_inverted,
            rebind_pending: std::cell::Cell::new(true),
        })
    }

    pub fn texture_id(&self) -> u32 {
        self.texture
    }

    pub fn pixmap(&self) -> Pixmap {
        self.pixmap
    }

    pub fn size(&self) -> (u16, u16) {
        self.size
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    /// True when the texture's origin is top-left and the quad needs a
    /// vertical mirror.
    pub fn y_inverted(&self) -> bool {
        self.y_inverted
    }

    /// Request a fresh `tfpBind` on the next [`bind`](Self::bind). Idempotent.
    pub fn rebind(&self) {
        if self.glx_pixmap != 0 {
            self.rebind_pending.set(true);
        }
    }

    /// Bind the texture for drawing, re-binding the pixmap content if damage
    /// was reported since the last frame.
    pub fn bind(&self) {
        unsafe {
            gl::BindTexture(gl::TEXTURE_2D, self.texture);
        }
        if self.glx_pixmap != 0 && self.rebind_pending.replace(false) {
            if let Some(info) = GlxInfo::instance() {
                unsafe {
                    // Let the server finish rendering into the pixmap before
                    // GL samples it.
                    (info.glx.glXWaitX)();
                    (info.tfp_bind)(info.display, self.glx_pixmap, GLX_FRONT_LEFT_EXT, ptr::null());
                }
            }
        }
    }
}

impl Drop for TextureFromPixmap {
    fn drop(&mut self) {
        if let Some(info) = GlxInfo::instance() {
            if self.glx_pixmap != 0 {
                unsafe {
                    (info.tfp_release)(info.display, self.glx_pixmap, GLX_FRONT_LEFT_EXT);
                    (info.glx.glXDestroyPixmap)(info.display, self.glx_pixmap);
                }
            }
            unsafe {
                gl::DeleteTextures(1, &self.texture);
            }
        }
    }
}

impl std::fmt::Debug for TextureFromPixmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureFromPixmap")
            .field("texture", &self.texture)
            .field("pixmap", &self.pixmap)
            .field("size", &self.size)
            .field("has_alpha", &self.has_alpha)
            .field("y_inverted", &self.y_inverted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(alpha_matches: bool, depth_bits: i32, stencil_bits: i32) -> VisualConfig {
        VisualConfig {
            config: std::ptr::null_mut(),
            texture_format: TextureFormat::Rgba,
            y_inverted: false,
            depth_bits,
            stencil_bits,
            alpha_matches,
        }
    }

    #[test]
    fn alpha_visual_prefers_rgba_binding() {
        assert_eq!(
            select_texture_format(8, true, true),
            (TextureFormat::Rgba, true)
        );
        // RGBA not bindable: fall back to RGB and record the mismatch.
        assert_eq!(
            select_texture_format(8, true, false),
            (TextureFormat::Rgb, false)
        );
    }

    #[test]
    fn opaque_visual_prefers_rgb_binding() {
        assert_eq!(
            select_texture_format(0, true, true),
            (TextureFormat::Rgb, true)
        );
        assert_eq!(
            select_texture_format(0, false, true),
            (TextureFormat::Rgba, false)
        );
    }

    #[test]
    fn any_candidate_outranks_nothing() {
        assert!(outranks(false, 24, 8, None));
    }

    #[test]
    fn alpha_match_beats_smaller_ancillary_buffers() {
        let best = config(false, 0, 0);
        assert!(outranks(true, 24, 8, Some(&best)));
        let best = config(true, 0, 0);
        assert!(!outranks(false, 0, 0, Some(&best)));
    }

    #[test]
    fn fewer_depth_and_stencil_bits_win_among_equals() {
        let best = config(true, 24, 8);
        assert!(outranks(true, 16, 0, Some(&best)));
        assert!(!outranks(true, 24, 8, Some(&best)));
        assert!(!outranks(true, 32, 8, Some(&best)));
    }
}
