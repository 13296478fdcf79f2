//! Ctrl-C handling during apply
//!
//! The first SIGINT cancels the apply at the next operation boundary so the
//! partial snapshot still gets saved. The handler then restores the default
//! disposition, so a second Ctrl-C terminates immediately.

use stackgraph::CancelToken;
use std::sync::OnceLock;

static TOKEN: OnceLock<CancelToken> = OnceLock::new();

/// Install the SIGINT handler and return the token it cancels
///
/// Repeated calls return the same token.
pub fn cancel_on_interrupt() -> CancelToken {
    let token = TOKEN.get_or_init(CancelToken::new).clone();
    install();
    token
}

#[cfg(unix)]
fn install() {
    extern "C" fn on_sigint(_: libc::c_int) {
        if let Some(token) = TOKEN.get() {
            token.cancel();
        }
        // SAFETY: signal() is async-signal-safe
        unsafe {
            libc::signal(libc::SIGINT, libc::SIG_DFL);
        }
    }

    let handler = on_sigint as extern "C" fn(libc::c_int);
    // SAFETY: the handler only touches an atomic and calls signal()
    let previous = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        log::warn!("Failed to install Ctrl-C handler; interrupting will not save state");
    }
}

#[cfg(not(unix))]
fn install() {
    log::debug!("Ctrl-C cancellation is not supported on this platform");
}
