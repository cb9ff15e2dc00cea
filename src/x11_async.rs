//! Async X11 event stream.
//!
//! A background thread polls the connection's file descriptor with mio and
//! notifies the tokio loop when events are readable; the loop then drains the
//! connection's buffer without blocking a runtime thread.

use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Notify};
use tracing::warn;
use x11rb::connection::Connection;
use x11rb::protocol::Event;

use crate::error::Error;
use crate::x11::Display;

pub struct EventStream {
    display: Arc<Display>,
    notify: Arc<Notify>,
    _shutdown: oneshot::Receiver<()>,
}

impl EventStream {
    pub fn new(display: Arc<Display>) -> Result<Self, Error> {
        let fd = display.conn().stream().as_raw_fd();
        let notify = Arc::new(Notify::new());
        let task_notify = notify.clone();

        let (shutdown_guard, shutdown) = oneshot::channel::<()>();
        let mut poll = mio::Poll::new()?;
        let mut events = mio::Events::with_capacity(1);
        poll.registry().register(
            &mut mio::unix::SourceFd(&fd),
            mio::Token(0),
            mio::Interest::READABLE,
        )?;

        let timeout = Duration::from_millis(100);
        tokio::task::spawn_blocking(move || loop {
            if shutdown_guard.is_closed() {
                return;
            }
            if let Err(err) = poll.poll(&mut events, Some(timeout)) {
                warn!("X socket poll failed: {err}");
                continue;
            }
            events
                .iter()
                .filter(|event| event.token() == mio::Token(0))
                .for_each(|_| task_notify.notify_one());
        });

        Ok(Self {
            display,
            notify,
            _shutdown: shutdown,
        })
    }

    /// Non-blocking: the next buffered event, or `None` when drained.
    pub fn poll_next_event(&self) -> Result<Option<Event>, Error> {
        Ok(self.display.conn().poll_for_event()?)
    }

    /// Wait until the server socket becomes readable.
    pub async fn wait_readable(&self) {
        self.notify.notified().await;
    }

    /// Push out queued requests before going to sleep.
    pub fn flush(&self) -> Result<(), Error> {
        self.display.conn().flush()?;
        Ok(())
    }
}
