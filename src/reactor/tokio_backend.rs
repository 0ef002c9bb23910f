//! Tokio-backed reactor: one task per armed interest.
//!
//! Readiness arms register the raw descriptor with the runtime's I/O
//! driver through [`AsyncFd`]; timer arms sleep until the deadline. The
//! registration is dropped as soon as the interest fires, so a descriptor
//! is only ever watched while something is armed on it.

use std::collections::HashMap;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::{Callback, Reactor, Token};

/// Borrowed descriptor wrapper; the transport keeps ownership of the fd.
struct Fd(RawFd);

impl AsRawFd for Fd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

/// Reactor running armed interests as tasks on a tokio runtime.
pub struct TokioReactor {
    handle: Handle,
    tasks: Arc<Mutex<HashMap<Token, JoinHandle<()>>>>,
}

impl TokioReactor {
    /// Create a reactor on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics outside a tokio runtime context; use
    /// [`TokioReactor::with_handle`] to pass a handle explicitly.
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    /// Create a reactor spawning onto the given runtime handle.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn arm_ready(&self, fd: RawFd, interest: Interest, cb: Callback) -> Token {
        let token = Token::fresh();
        let jh = self.handle.spawn(async move {
            match AsyncFd::with_interest(Fd(fd), interest) {
                Ok(afd) => {
                    let ready = match interest {
                        i if i.is_readable() => afd.readable().await.map(drop),
                        _ => afd.writable().await.map(drop),
                    };
                    if let Err(e) = ready {
                        tracing::warn!("readiness wait on fd {fd} failed: {e}");
                    }
                }
                Err(e) => {
                    tracing::warn!("registering fd {fd} failed: {e}");
                }
            }
            // Fire even after a registration failure so the state machine
            // observes the error through the following syscall.
            cb();
        });
        self.track(token, jh);
        token
    }

    fn track(&self, token: Token, jh: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|_, jh| !jh.is_finished());
        tasks.insert(token, jh);
    }
}

impl Default for TokioReactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Reactor for TokioReactor {
    fn arm_read(&self, fd: RawFd, cb: Callback) -> Token {
        self.arm_ready(fd, Interest::READABLE, cb)
    }

    fn arm_write(&self, fd: RawFd, cb: Callback) -> Token {
        self.arm_ready(fd, Interest::WRITABLE, cb)
    }

    fn arm_timer_at(&self, deadline: Instant, cb: Callback) -> Token {
        let token = Token::fresh();
        let jh = self.handle.spawn(async move {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
            cb();
        });
        self.track(token, jh);
        token
    }

    fn disarm(&self, token: Token) {
        if let Some(jh) = self.tasks.lock().remove(&token) {
            jh.abort();
        }
    }
}
