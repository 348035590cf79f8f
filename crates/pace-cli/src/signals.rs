//! Signal handling for graceful shutdown.
//!
//! Registers Unix handlers (SIGINT, SIGTERM) that flip an atomic flag the
//! paced loop polls once per cycle. Handlers only touch the atomic, keeping
//! them async-signal-safe.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

static SHUTDOWN_FLAG: AtomicBool = AtomicBool::new(false);

/// Handle for checking and requesting shutdown.
#[derive(Debug, Clone, Copy)]
pub struct SignalHandler;

impl SignalHandler {
    /// Install process signal handlers and return a handle.
    ///
    /// On non-Unix platforms only manual shutdown requests are supported.
    pub fn install() -> Self {
        #[cfg(unix)]
        // SAFETY: the handler stores to a static atomic and nothing else,
        // which is async-signal-safe.
        unsafe {
            libc::signal(libc::SIGINT, handle_shutdown_signal as libc::sighandler_t);
            libc::signal(libc::SIGTERM, handle_shutdown_signal as libc::sighandler_t);
        }
        debug!("Shutdown handler installed");
        Self
    }

    /// Whether a shutdown signal has been received.
    #[inline]
    pub fn shutdown_requested(self) -> bool {
        SHUTDOWN_FLAG.load(Ordering::Relaxed)
    }

    /// Request shutdown from any thread.
    pub fn request_shutdown(self) {
        SHUTDOWN_FLAG.store(true, Ordering::Relaxed);
    }
}

#[cfg(unix)]
extern "C" fn handle_shutdown_signal(_: libc::c_int) {
    SHUTDOWN_FLAG.store(true, Ordering::Relaxed);
}
