//! Polling reactor: a dedicated thread around a `mio::Poll`.
//!
//! Descriptor interest is bit-granular: a descriptor is registered once
//! and its read/write interest bits are flipped as arms come and go, with
//! full deregistration when the last bit clears. Timers live in an
//! ordered map keyed by monotonic deadline and bound the poll timeout.
//! Arms and disarms arrive over a command channel and are applied on the
//! poll thread, woken through a [`mio::Waker`].

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::os::fd::RawFd;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Instant;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token as MioToken, Waker};

use super::{Callback, Reactor, Token};

const WAKER_TOKEN: MioToken = MioToken(usize::MAX);

enum Command {
    ArmRead {
        fd: RawFd,
        token: Token,
        cb: Callback,
    },
    ArmWrite {
        fd: RawFd,
        token: Token,
        cb: Callback,
    },
    ArmTimer {
        deadline: Instant,
        token: Token,
        cb: Callback,
    },
    Disarm {
        token: Token,
    },
    Shutdown,
}

/// Reactor driving readiness and timers from a single poll thread.
pub struct PollReactor {
    tx: Sender<Command>,
    waker: Waker,
    thread: Option<thread::JoinHandle<()>>,
}

impl PollReactor {
    /// Spawn the poll thread.
    pub fn new() -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN)?;
        let (tx, rx) = mpsc::channel();

        let thread = thread::Builder::new()
            .name("zwire-poll".into())
            .spawn(move || Loop::new(poll).run(rx))?;

        Ok(Self {
            tx,
            waker,
            thread: Some(thread),
        })
    }

    fn submit(&self, cmd: Command) {
        if self.tx.send(cmd).is_ok() {
            if let Err(e) = self.waker.wake() {
                tracing::warn!("poll waker failed: {e}");
            }
        }
    }
}

impl Reactor for PollReactor {
    fn arm_read(&self, fd: RawFd, cb: Callback) -> Token {
        let token = Token::fresh();
        self.submit(Command::ArmRead { fd, token, cb });
        token
    }

    fn arm_write(&self, fd: RawFd, cb: Callback) -> Token {
        let token = Token::fresh();
        self.submit(Command::ArmWrite { fd, token, cb });
        token
    }

    fn arm_timer_at(&self, deadline: Instant, cb: Callback) -> Token {
        let token = Token::fresh();
        self.submit(Command::ArmTimer {
            deadline,
            token,
            cb,
        });
        token
    }

    fn disarm(&self, token: Token) {
        self.submit(Command::Disarm { token });
    }
}

impl Drop for PollReactor {
    fn drop(&mut self) {
        self.submit(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

struct FdEntry {
    mio_token: MioToken,
    read: Option<(Token, Callback)>,
    write: Option<(Token, Callback)>,
}

impl FdEntry {
    fn interest(&self) -> Option<Interest> {
        match (self.read.is_some(), self.write.is_some()) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }
}

struct Loop {
    poll: Poll,
    fds: HashMap<RawFd, FdEntry>,
    by_mio: HashMap<usize, RawFd>,
    timers: BTreeMap<(Instant, u64), Callback>,
    next_mio: usize,
}

impl Loop {
    fn new(poll: Poll) -> Self {
        Self {
            poll,
            fds: HashMap::new(),
            by_mio: HashMap::new(),
            timers: BTreeMap::new(),
            next_mio: 0,
        }
    }

    fn run(mut self, rx: Receiver<Command>) {
        let mut events = Events::with_capacity(64);
        loop {
            match self.drain_commands(&rx) {
                ControlFlow::Continue => {}
                ControlFlow::Shutdown => return,
            }

            let timeout = self
                .timers
                .keys()
                .next()
                .map(|(deadline, _)| deadline.saturating_duration_since(Instant::now()));

            if let Err(e) = self.poll.poll(&mut events, timeout) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                tracing::error!("poll failed, reactor thread exiting: {e}");
                return;
            }

            let mut fired: Vec<Callback> = Vec::new();
            for event in events.iter() {
                if event.token() == WAKER_TOKEN {
                    continue;
                }
                self.collect_ready(event, &mut fired);
            }
            self.collect_expired(&mut fired);

            for cb in fired {
                cb();
            }
        }
    }

    fn drain_commands(&mut self, rx: &Receiver<Command>) -> ControlFlow {
        loop {
            match rx.try_recv() {
                Ok(Command::ArmRead { fd, token, cb }) => self.arm_fd(fd, token, cb, true),
                Ok(Command::ArmWrite { fd, token, cb }) => self.arm_fd(fd, token, cb, false),
                Ok(Command::ArmTimer {
                    deadline,
                    token,
                    cb,
                }) => {
                    self.timers.insert((deadline, token.raw()), cb);
                }
                Ok(Command::Disarm { token }) => self.disarm(token),
                Ok(Command::Shutdown) | Err(TryRecvError::Disconnected) => {
                    return ControlFlow::Shutdown
                }
                Err(TryRecvError::Empty) => return ControlFlow::Continue,
            }
        }
    }

    fn arm_fd(&mut self, fd: RawFd, token: Token, cb: Callback, read: bool) {
        if !self.fds.contains_key(&fd) {
            let mio_token = MioToken(self.next_mio);
            self.next_mio += 1;
            self.by_mio.insert(mio_token.0, fd);
            self.fds.insert(
                fd,
                FdEntry {
                    mio_token,
                    read: None,
                    write: None,
                },
            );
        }
        let Some(entry) = self.fds.get_mut(&fd) else {
            return;
        };

        let fresh = entry.read.is_none() && entry.write.is_none();
        if read {
            entry.read = Some((token, cb));
        } else {
            entry.write = Some((token, cb));
        }

        let Some(interest) = entry.interest() else {
            return;
        };
        let mio_token = entry.mio_token;
        let result = if fresh {
            self.poll
                .registry()
                .register(&mut SourceFd(&fd), mio_token, interest)
        } else {
            self.poll
                .registry()
                .reregister(&mut SourceFd(&fd), mio_token, interest)
        };
        if let Err(e) = result {
            tracing::warn!("registering fd {fd} failed: {e}");
        }
    }

    fn disarm(&mut self, token: Token) {
        self.timers.retain(|(_, t), _| *t != token.raw());

        let mut cleared: Option<RawFd> = None;
        for (fd, entry) in self.fds.iter_mut() {
            if matches!(entry.read, Some((t, _)) if t == token) {
                entry.read = None;
                cleared = Some(*fd);
                break;
            }
            if matches!(entry.write, Some((t, _)) if t == token) {
                entry.write = None;
                cleared = Some(*fd);
                break;
            }
        }
        if let Some(fd) = cleared {
            self.update_registration(fd);
        }
    }

    fn collect_ready(&mut self, event: &mio::event::Event, fired: &mut Vec<Callback>) {
        let Some(&fd) = self.by_mio.get(&event.token().0) else {
            return;
        };
        let Some(entry) = self.fds.get_mut(&fd) else {
            return;
        };

        // Error/hangup conditions surface through whichever interest is
        // armed, so the owner observes them on the next syscall.
        let fault = event.is_error() || event.is_read_closed() || event.is_write_closed();

        if event.is_readable() || fault {
            if let Some((_, cb)) = entry.read.take() {
                fired.push(cb);
            }
        }
        if event.is_writable() || fault {
            if let Some((_, cb)) = entry.write.take() {
                fired.push(cb);
            }
        }
        self.update_registration(fd);
    }

    fn collect_expired(&mut self, fired: &mut Vec<Callback>) {
        let now = Instant::now();
        loop {
            let Some(&key) = self.timers.keys().next() else {
                break;
            };
            if key.0 > now {
                break;
            }
            if let Some(cb) = self.timers.remove(&key) {
                fired.push(cb);
            }
        }
    }

    fn update_registration(&mut self, fd: RawFd) {
        let Some(entry) = self.fds.get(&fd) else {
            return;
        };
        match entry.interest() {
            Some(interest) => {
                let mio_token = entry.mio_token;
                if let Err(e) =
                    self.poll
                        .registry()
                        .reregister(&mut SourceFd(&fd), mio_token, interest)
                {
                    tracing::warn!("reregistering fd {fd} failed: {e}");
                }
            }
            None => {
                let mio_token = entry.mio_token;
                let _ = self.poll.registry().deregister(&mut SourceFd(&fd));
                self.by_mio.remove(&mio_token.0);
                self.fds.remove(&fd);
            }
        }
    }
}

enum ControlFlow {
    Continue,
    Shutdown,
}
