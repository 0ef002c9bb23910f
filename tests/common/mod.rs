//! Shared test support: a deterministic reactor and wire helpers.

use std::io::Read;
use std::os::fd::RawFd;
use std::os::unix::net::UnixStream;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;

use zwire_client::protocol::{Command, FrameBuilder, Header, HEADER_SIZE};
use zwire_client::reactor::{Callback, Reactor, Token};

/// What an armed interest is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmKind {
    Read(RawFd),
    Write(RawFd),
    Timer(Instant),
}

struct Armed {
    token: Token,
    kind: ArmKind,
    cb: Callback,
}

/// Reactor that records arms and fires them only when the test says so.
///
/// Every timing-sensitive scenario runs through this: instead of waiting
/// out a 10 second retry interval, the test inspects the armed deadline
/// and fires the callback directly.
#[derive(Default)]
pub struct ManualReactor {
    armed: Mutex<Vec<Armed>>,
}

impl ManualReactor {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, kind: ArmKind, cb: Callback) -> Token {
        let token = Token::fresh();
        self.armed.lock().push(Armed { token, kind, cb });
        token
    }

    fn fire_first<F: Fn(&ArmKind) -> bool>(&self, matches: F) -> bool {
        let cb = {
            let mut armed = self.armed.lock();
            let Some(pos) = armed.iter().position(|a| matches(&a.kind)) else {
                return false;
            };
            armed.remove(pos).cb
        };
        // Run outside the registry lock: the callback will re-arm.
        cb();
        true
    }

    /// Fire the armed read interest, if any.
    pub fn fire_read(&self) -> bool {
        self.fire_first(|kind| matches!(kind, ArmKind::Read(_)))
    }

    /// Fire the armed write interest, if any.
    pub fn fire_write(&self) -> bool {
        self.fire_first(|kind| matches!(kind, ArmKind::Write(_)))
    }

    /// Fire the earliest armed timer, if any.
    pub fn fire_next_timer(&self) -> bool {
        let cb = {
            let mut armed = self.armed.lock();
            let mut best: Option<(usize, Instant)> = None;
            for (i, a) in armed.iter().enumerate() {
                if let ArmKind::Timer(deadline) = a.kind {
                    if best.map_or(true, |(_, d)| deadline < d) {
                        best = Some((i, deadline));
                    }
                }
            }
            let Some((pos, _)) = best else {
                return false;
            };
            armed.remove(pos).cb
        };
        cb();
        true
    }

    /// Deadlines of all armed timers.
    pub fn timer_deadlines(&self) -> Vec<Instant> {
        self.armed
            .lock()
            .iter()
            .filter_map(|a| match a.kind {
                ArmKind::Timer(deadline) => Some(deadline),
                _ => None,
            })
            .collect()
    }

    pub fn timer_count(&self) -> usize {
        self.timer_deadlines().len()
    }

    pub fn read_arm_count(&self) -> usize {
        self.armed
            .lock()
            .iter()
            .filter(|a| matches!(a.kind, ArmKind::Read(_)))
            .count()
    }
}

impl Reactor for ManualReactor {
    fn arm_read(&self, fd: RawFd, cb: Callback) -> Token {
        self.push(ArmKind::Read(fd), cb)
    }

    fn arm_write(&self, fd: RawFd, cb: Callback) -> Token {
        self.push(ArmKind::Write(fd), cb)
    }

    fn arm_timer_at(&self, deadline: Instant, cb: Callback) -> Token {
        self.push(ArmKind::Timer(deadline), cb)
    }

    fn disarm(&self, token: Token) {
        self.armed.lock().retain(|a| a.token != token);
    }
}

/// Build a frame with the given command and raw body.
pub fn frame_with_body(command: Command, body: &[u8]) -> Bytes {
    let mut frame = FrameBuilder::new(command);
    frame.put_slice(body);
    frame.finish()
}

/// Blocking-read one frame off the server side of the socket.
pub fn read_frame(stream: &mut UnixStream) -> (Header, Vec<u8>) {
    let mut head = [0u8; HEADER_SIZE];
    stream.read_exact(&mut head).expect("frame header");
    let header = Header::decode(&head).expect("six header bytes");
    let mut body = vec![0u8; header.length as usize - HEADER_SIZE];
    stream.read_exact(&mut body).expect("frame body");
    (header, body)
}
