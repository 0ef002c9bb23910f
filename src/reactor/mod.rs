//! Event-readiness abstraction over the two supported back-ends.
//!
//! The connection machinery never talks to an event loop directly; it arms
//! one-shot interests through [`Reactor`] and the chosen back-end invokes
//! the callback when the interest fires. Exactly one back-end drives a
//! handle for its whole lifetime:
//!
//! - [`PollReactor`]: a dedicated thread around a poll loop with
//!   bit-granular per-descriptor read/write interest and a monotonic timer
//!   heap.
//! - [`TokioReactor`]: one task per armed interest on a tokio runtime.
//!
//! Every arm is one-shot: the callback runs at most once, after which the
//! token is spent. `disarm` is idempotent and disarming a spent or unknown
//! token is a no-op. Back-ends never invoke a callback synchronously from
//! inside an `arm_*` call; callers rely on that to arm while holding
//! their own state lock.

use std::os::fd::RawFd;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

mod poll_backend;
mod tokio_backend;

pub use poll_backend::PollReactor;
pub use tokio_backend::TokioReactor;

/// Callback fired when an armed interest becomes ready.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Cancellation handle for one armed interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(u64);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

impl Token {
    /// Allocate a process-unique token; back-end implementations call
    /// this once per arm.
    pub fn fresh() -> Self {
        Token(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn raw(self) -> u64 {
        self.0
    }
}

/// One-shot readiness and timer arming.
pub trait Reactor: Send + Sync {
    /// Run `cb` once when `fd` becomes readable.
    fn arm_read(&self, fd: RawFd, cb: Callback) -> Token;

    /// Run `cb` once when `fd` becomes writable.
    fn arm_write(&self, fd: RawFd, cb: Callback) -> Token;

    /// Run `cb` once at `deadline` (immediately if already past).
    fn arm_timer_at(&self, deadline: Instant, cb: Callback) -> Token;

    /// Cancel an armed interest; spent or unknown tokens are ignored.
    fn disarm(&self, token: Token);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique() {
        let a = Token::fresh();
        let b = Token::fresh();
        assert_ne!(a, b);
        assert!(b.raw() > a.raw());
    }
}
