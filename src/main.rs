//! veil: X11 compositing manager core.
//!
//! Claims `_NET_WM_CM_Sn`, redirects top-level windows into off-screen
//! pixmaps, and mirrors the window tree for a scene-graph front-end. This
//! binary runs the protocol loop; rendering is the front-end's job.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use x11rb::protocol::xproto::{ConnectionExt as _, CreateWindowAux, WindowClass};

use veil::{Compositor, Display, EventStream};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let dpy = Arc::new(Display::open().context("failed to connect to the X server")?);
    info!(
        "connected to X server, screen {}, root {:#x}",
        dpy.screen_num(),
        dpy.root()
    );

    let compositor =
        Compositor::new(dpy.clone()).context("failed to initialize the compositor")?;
    info!("root geometry: {:?}", compositor.root_geometry());

    compositor.window_created().connect(|window| {
        debug!(
            "window created: {:#x} {:?} mapped={}",
            window.window(),
            window.geometry(),
            window.is_mapped()
        );
    });
    compositor
        .root_geometry_changed()
        .connect(|geometry| info!("root geometry changed: {geometry:?}"));

    // A minimal window to hold the _NET_WM_CM_Sn selection; a full front-end
    // would use its presentation window instead.
    let owner = dpy.generate_id()?;
    dpy.conn().create_window(
        x11rb::COPY_DEPTH_FROM_PARENT,
        owner,
        dpy.root(),
        -1,
        -1,
        1,
        1,
        0,
        WindowClass::INPUT_ONLY,
        x11rb::COPY_FROM_PARENT,
        &CreateWindowAux::new(),
    )?;
    compositor
        .register_compositor(owner)
        .context("failed to register as the compositing manager")?;

    let events = EventStream::new(dpy.clone())?;
    loop {
        events.flush()?;
        compositor.drain_pending();
        while let Some(event) = events
            .poll_next_event()
            .context("lost the X connection")?
        {
            compositor.handle_event(&event);
        }
        events.wait_readable().await;
    }
}
