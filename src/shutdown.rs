//! Cooperative cancellation.
//!
//! A single flag is shared by every worker, the tuner, and the sandbox's poll
//! loop. Signal handlers only flip the flag; nothing is preempted mid-step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Cloneable cancellation token.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    /// Creates a token that has not been triggered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown. Idempotent.
    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true once shutdown was requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration`, waking early on shutdown.
    ///
    /// Returns `true` if the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

static SIGNAL_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

/// Routes SIGINT and SIGTERM to `shutdown` and ignores SIGPIPE.
///
/// Only the first installed token is wired; later calls keep it.
#[cfg(unix)]
pub fn install_signal_handlers(shutdown: &Shutdown) -> std::io::Result<()> {
    extern "C" fn on_signal(_signal: libc::c_int) {
        if let Some(flag) = SIGNAL_FLAG.get() {
            flag.store(true, Ordering::SeqCst);
        }
    }

    let _ = SIGNAL_FLAG.set(Arc::clone(&shutdown.flag));

    // SAFETY: the handler only performs an atomic store; `sigaction` is given
    // a zeroed, fully initialized struct.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = 0;

        for signal in [libc::SIGINT, libc::SIGTERM] {
            if libc::sigaction(signal, &action, std::ptr::null_mut()) != 0 {
                return Err(std::io::Error::last_os_error());
            }
        }
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
    Ok(())
}

/// No signal wiring on this platform.
#[cfg(not(unix))]
pub fn install_signal_handlers(_shutdown: &Shutdown) -> std::io::Result<()> {
    Ok(())
}
