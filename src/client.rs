//! Client handle, builder and connection lifecycle.
//!
//! The [`ClientBuilder`] collects the endpoint, reactor and notification
//! handlers; [`Client`] then drives the whole lifecycle:
//! 1. `init` schedules the first connect
//! 2. on connect: non-blocking socket, read arm, handshake, subscription
//!    replay
//! 3. on any I/O or framing failure: tear down and retry under backoff
//!
//! The handle is a cheap clone over shared state. Reactor registrations
//! capture clones, so every armed callback keeps the state alive for as
//! long as it is registered; there is no way to free a handle out from
//! under the event loop.
//!
//! # Example
//!
//! ```ignore
//! use zwire_client::{Client, Command, RouteType};
//!
//! let client = Client::builder()
//!     .on(Command::RouterIdUpdate, |_, _, body| {
//!         let rid = zwire_client::codec::router_id_update_read(&body).unwrap();
//!         println!("router id is now {rid:?}");
//!     })
//!     .build();
//! client.init(RouteType::Bgp);
//! ```

use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::codec::{Ipv4Prefix, Ipv4Route, Ipv6Prefix, Ipv6Route, LinkAddrFormat};
use crate::error::{Result, ZwireError};
use crate::handler::{HandlerTable, MessageHandler};
use crate::protocol::{
    simple_frame, Command, FrameBuilder, Header, ReadBuffer, ReadOutcome, RouteType, HEADER_SIZE,
    ROUTE_TYPE_MAX,
};
use crate::reactor::{Reactor, TokioReactor};
use crate::transport::{Endpoint, Transport};
use crate::write_buffer::{FlushStatus, WriteBuffer};

/// Consecutive connect failures after which retries stop until an
/// external reset.
pub const MAX_CONNECT_FAILURES: u32 = 10;

/// Failure count below which retries use the short interval.
const FAST_RETRY_LIMIT: u32 = 3;
const RETRY_FAST: Duration = Duration::from_secs(10);
const RETRY_SLOW: Duration = Duration::from_secs(60);

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not initialized, or stopped; no connect attempts happen.
    Disabled,
    /// A connect (or retry) timer is armed.
    Scheduled,
    /// A connect attempt is in progress.
    Connecting,
    /// Connected; frames flow.
    Connected,
    /// A failure was observed; dormant here once retries are exhausted.
    Failing,
}

/// Subscribe or unsubscribe, for the redistribution mutators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedistOp {
    Add,
    Delete,
}

/// Construction-time configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Where the route manager listens.
    pub endpoint: Endpoint,
    /// Link-layer address encoding of INTERFACE_ADD (must match the
    /// manager's build).
    pub link_addr: LinkAddrFormat,
}

/// Events the state machine arms through the reactor.
#[derive(Debug, Clone, Copy)]
enum Event {
    ScheduleConnect,
    ScheduleLookup,
    ConnectRetry,
    Read,
}

enum FillResult {
    Progress,
    Again,
    Failed,
}

/// Builder for configuring and creating a client handle.
pub struct ClientBuilder {
    config: Config,
    reactor: Option<Arc<dyn Reactor>>,
    handlers: HandlerTable,
}

impl ClientBuilder {
    /// Create a builder with the default UNIX endpoint.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            reactor: None,
            handlers: HandlerTable::new(),
        }
    }

    /// Set the manager endpoint.
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.config.endpoint = endpoint;
        self
    }

    /// Set the INTERFACE_ADD link-layer address encoding.
    pub fn link_addr_format(mut self, format: LinkAddrFormat) -> Self {
        self.config.link_addr = format;
        self
    }

    /// Run on the given reactor instead of the default tokio back-end.
    pub fn reactor(mut self, reactor: Arc<dyn Reactor>) -> Self {
        self.reactor = Some(reactor);
        self
    }

    /// Register a notification handler for `command`.
    pub fn on<F>(mut self, command: Command, handler: F) -> Self
    where
        F: Fn(Command, &Client, Bytes) + Send + Sync + 'static,
    {
        self.handlers.set(command, Arc::new(handler) as MessageHandler);
        self
    }

    /// Build the handle.
    ///
    /// With no explicit reactor this uses [`TokioReactor::new`], which
    /// requires a tokio runtime context.
    pub fn build(self) -> Client {
        let reactor = self
            .reactor
            .unwrap_or_else(|| Arc::new(TokioReactor::new()) as Arc<dyn Reactor>);
        Client {
            core: Arc::new(Core {
                reactor,
                config: self.config,
                handlers: self.handlers,
                state: Mutex::new(Inner::new()),
            }),
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Core {
    reactor: Arc<dyn Reactor>,
    config: Config,
    handlers: HandlerTable,
    state: Mutex<Inner>,
}

struct Inner {
    enabled: bool,
    status: ClientState,
    transport: Option<Transport>,
    ibuf: ReadBuffer,
    wb: WriteBuffer,
    fail: u32,
    redist_default: RouteType,
    redist: [bool; ROUTE_TYPE_MAX],
    default_information: bool,
    t_read: Option<crate::reactor::Token>,
    t_write: Option<crate::reactor::Token>,
    t_connect: Option<crate::reactor::Token>,
}

impl Inner {
    fn new() -> Self {
        Self {
            enabled: false,
            status: ClientState::Disabled,
            transport: None,
            ibuf: ReadBuffer::new(),
            wb: WriteBuffer::new(),
            fail: 0,
            redist_default: RouteType::System,
            redist: [false; ROUTE_TYPE_MAX],
            default_information: false,
            t_read: None,
            t_write: None,
            t_connect: None,
        }
    }
}

/// Handle to the route-manager connection.
///
/// Cloning is cheap; all clones share one connection and one state
/// machine.
#[derive(Clone)]
pub struct Client {
    core: Arc<Core>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Enable the client and schedule the first connect.
    ///
    /// `redist_default` names the caller's own route source; routes of
    /// that type are never requested back from the manager.
    pub fn init(&self, redist_default: RouteType) {
        let mut s = self.core.state.lock();
        s.enabled = true;
        s.fail = 0;
        s.redist = [false; ROUTE_TYPE_MAX];
        s.redist_default = redist_default;
        s.redist[redist_default.code() as usize] = true;
        s.default_information = false;

        tracing::debug!("client start scheduled");
        self.event_locked(&mut s, Event::ScheduleConnect);
    }

    /// Attempt a connect now (normally driven by the connect timer).
    ///
    /// Idempotent: already connected, disabled, or a pending timer all
    /// return without touching anything. Once the retry cap is reached
    /// this reports [`ZwireError::RetriesExhausted`] until
    /// [`reset`](Client::reset) rearms the machine.
    pub fn start(&self) -> Result<()> {
        let mut s = self.core.state.lock();
        self.start_locked(&mut s)
    }

    /// Tear everything down without scheduling a retry.
    ///
    /// Counters are untouched; the handle is reusable through
    /// [`init`](Client::init).
    pub fn stop(&self) {
        let mut s = self.core.state.lock();
        self.stop_locked(&mut s);
    }

    /// Stop, then re-init with the same default route type.
    pub fn reset(&self) {
        let redist_default = self.core.state.lock().redist_default;
        self.stop();
        self.init(redist_default);
    }

    /// Schedule a lookup-mode connect: no handshake, no read arm, socket
    /// left blocking for synchronous request/reply use.
    pub fn lookup_schedule(&self) {
        let mut s = self.core.state.lock();
        self.event_locked(&mut s, Event::ScheduleLookup);
    }

    /// Synchronously send one request frame and read one reply frame on a
    /// lookup-mode connection.
    ///
    /// On any I/O or framing error the connection is torn down (without a
    /// retry schedule) and the caller re-issues
    /// [`lookup_schedule`](Client::lookup_schedule).
    pub fn lookup_exchange(&self, frame: Bytes) -> Result<(Header, Bytes)> {
        let mut s = self.core.state.lock();
        let Some(tp) = s.transport.as_mut() else {
            return Err(ZwireError::NotConnected);
        };
        let result = exchange_on(tp, &frame);
        if result.is_err() {
            self.stop_locked(&mut s);
        }
        result
    }

    /// Update the redistribution subscription for `route_type`.
    ///
    /// Set-idempotent: asking for the state already held does nothing and
    /// sends nothing. The subscription is remembered and replayed on every
    /// reconnect. The default route type stays subscribed for the life of
    /// the handle.
    pub fn redistribute(&self, op: RedistOp, route_type: RouteType) -> Result<()> {
        let mut s = self.core.state.lock();
        let idx = route_type.code() as usize;
        match op {
            RedistOp::Add => {
                if s.redist[idx] {
                    return Ok(());
                }
                s.redist[idx] = true;
            }
            RedistOp::Delete => {
                if route_type == s.redist_default || !s.redist[idx] {
                    return Ok(());
                }
                s.redist[idx] = false;
            }
        }

        if s.transport.is_some() {
            let command = match op {
                RedistOp::Add => Command::RedistributeAdd,
                RedistOp::Delete => Command::RedistributeDelete,
            };
            self.send_locked(&mut s, redistribute_frame(command, route_type))?;
        }
        Ok(())
    }

    /// Update the default-route redistribution subscription.
    pub fn redistribute_default(&self, op: RedistOp) -> Result<()> {
        let mut s = self.core.state.lock();
        match op {
            RedistOp::Add => {
                if s.default_information {
                    return Ok(());
                }
                s.default_information = true;
            }
            RedistOp::Delete => {
                if !s.default_information {
                    return Ok(());
                }
                s.default_information = false;
            }
        }

        if s.transport.is_some() {
            let command = match op {
                RedistOp::Add => Command::RedistributeDefaultAdd,
                RedistOp::Delete => Command::RedistributeDefaultDelete,
            };
            self.send_locked(&mut s, simple_frame(command))?;
        }
        Ok(())
    }

    /// Encode and enqueue an IPv4 route install/withdraw.
    pub fn route_ipv4(
        &self,
        command: Command,
        prefix: &Ipv4Prefix,
        route: &Ipv4Route,
    ) -> Result<()> {
        self.send_message(route.encode(command, prefix))
    }

    /// Encode and enqueue an IPv6 route install/withdraw.
    pub fn route_ipv6(
        &self,
        command: Command,
        prefix: &Ipv6Prefix,
        route: &Ipv6Route,
    ) -> Result<()> {
        self.send_message(route.encode(command, prefix))
    }

    /// Enqueue a pre-built frame.
    ///
    /// `Err(NotConnected)` when there is no connection; the caller may
    /// re-issue after observing reconnection. Nothing is replayed
    /// automatically except the redistribution subscriptions.
    pub fn send_message(&self, frame: Bytes) -> Result<()> {
        let mut s = self.core.state.lock();
        self.send_locked(&mut s, frame)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        self.core.state.lock().status
    }

    /// True while a connection is up.
    pub fn is_connected(&self) -> bool {
        self.core.state.lock().transport.is_some()
    }

    /// Consecutive connect/I-O failures since the last success.
    pub fn fail_count(&self) -> u32 {
        self.core.state.lock().fail
    }

    /// Whether `route_type` is currently subscribed.
    pub fn is_subscribed(&self, route_type: RouteType) -> bool {
        self.core.state.lock().redist[route_type.code() as usize]
    }

    /// The configured link-layer address format, for handlers decoding
    /// INTERFACE_ADD.
    pub fn link_addr_format(&self) -> LinkAddrFormat {
        self.core.config.link_addr
    }

    // ---- state machine internals ----

    fn start_locked(&self, s: &mut Inner) -> Result<()> {
        if !s.enabled || s.transport.is_some() || s.t_connect.is_some() {
            return Ok(());
        }
        if s.fail >= MAX_CONNECT_FAILURES {
            // Dormant: the retry cap was reached and only reset() rearms.
            return Err(ZwireError::RetriesExhausted { failures: s.fail });
        }

        s.status = ClientState::Connecting;
        let transport = match Transport::connect(&self.core.config.endpoint) {
            Ok(transport) => transport,
            Err(e) => {
                tracing::debug!("connect failed: {e}");
                s.fail += 1;
                s.status = ClientState::Failing;
                self.event_locked(s, Event::ConnectRetry);
                return Err(e.into());
            }
        };

        if let Err(e) = transport.set_nonblocking(true) {
            tracing::warn!("set_nonblocking({}) failed: {e}", transport.as_raw_fd());
        }

        tracing::debug!("connect success on fd {}", transport.as_raw_fd());
        s.transport = Some(transport);
        s.fail = 0;
        s.status = ClientState::Connected;

        self.event_locked(s, Event::Read);
        self.handshake_locked(s)
    }

    /// On-connect handshake, in protocol order; any send error tears the
    /// connection down and aborts the rest.
    fn handshake_locked(&self, s: &mut Inner) -> Result<()> {
        if s.redist_default.code() != 0 {
            let mut frame = FrameBuilder::new(Command::Hello);
            frame.put_u8(s.redist_default.code());
            self.send_locked(s, frame.finish())?;
        }

        self.send_locked(s, simple_frame(Command::RouterIdAdd))?;
        self.send_locked(s, simple_frame(Command::InterfaceAdd))?;

        for route_type in RouteType::all() {
            if route_type != s.redist_default && s.redist[route_type.code() as usize] {
                self.send_locked(
                    s,
                    redistribute_frame(Command::RedistributeAdd, route_type),
                )?;
            }
        }

        if s.default_information {
            self.send_locked(s, simple_frame(Command::RedistributeDefaultAdd))?;
        }
        Ok(())
    }

    fn stop_locked(&self, s: &mut Inner) {
        tracing::debug!("client stopped");
        for token in [s.t_read.take(), s.t_write.take(), s.t_connect.take()]
            .into_iter()
            .flatten()
        {
            self.core.reactor.disarm(token);
        }
        s.ibuf.reset();
        s.wb.clear();
        s.transport = None;
        s.status = ClientState::Disabled;
    }

    fn failed_locked(&self, s: &mut Inner) {
        s.fail += 1;
        self.stop_locked(s);
        s.status = ClientState::Failing;
        self.event_locked(s, Event::ConnectRetry);
    }

    fn send_locked(&self, s: &mut Inner, frame: Bytes) -> Result<()> {
        let status = {
            let Some(tp) = s.transport.as_mut() else {
                return Err(ZwireError::NotConnected);
            };
            s.wb.write(tp, frame)
        };
        match status {
            Ok(FlushStatus::Empty) => {
                if let Some(token) = s.t_write.take() {
                    self.core.reactor.disarm(token);
                }
                Ok(())
            }
            Ok(FlushStatus::Pending) => {
                self.arm_write_locked(s);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("write to route manager failed, closing: {e}");
                self.failed_locked(s);
                Err(e)
            }
        }
    }

    fn arm_write_locked(&self, s: &mut Inner) {
        if s.t_write.is_some() {
            return;
        }
        let Some(tp) = s.transport.as_ref() else {
            return;
        };
        let fd = tp.as_raw_fd();
        let client = self.clone();
        s.t_write = Some(
            self.core
                .reactor
                .arm_write(fd, Box::new(move || client.handle_write())),
        );
    }

    fn event_locked(&self, s: &mut Inner, event: Event) {
        match event {
            Event::ScheduleConnect => {
                if s.t_connect.is_some() {
                    return;
                }
                let client = self.clone();
                s.t_connect = Some(self.core.reactor.arm_timer_at(
                    Instant::now(),
                    Box::new(move || client.handle_connect_timer()),
                ));
                s.status = ClientState::Scheduled;
            }
            Event::ScheduleLookup => {
                if s.t_connect.is_some() {
                    return;
                }
                let client = self.clone();
                s.t_connect = Some(self.core.reactor.arm_timer_at(
                    Instant::now(),
                    Box::new(move || client.handle_lookup_timer()),
                ));
                s.status = ClientState::Scheduled;
            }
            Event::ConnectRetry => {
                if s.fail >= MAX_CONNECT_FAILURES {
                    tracing::warn!("connect failed {} times, dormant until reset", s.fail);
                    return;
                }
                if s.t_connect.is_some() {
                    return;
                }
                let delay = if s.fail < FAST_RETRY_LIMIT {
                    RETRY_FAST
                } else {
                    RETRY_SLOW
                };
                tracing::debug!("connect retry scheduled in {}s", delay.as_secs());
                let client = self.clone();
                s.t_connect = Some(self.core.reactor.arm_timer_at(
                    Instant::now() + delay,
                    Box::new(move || client.handle_connect_timer()),
                ));
                s.status = ClientState::Scheduled;
            }
            Event::Read => {
                let Some(tp) = s.transport.as_ref() else {
                    return;
                };
                let fd = tp.as_raw_fd();
                let client = self.clone();
                s.t_read = Some(
                    self.core
                        .reactor
                        .arm_read(fd, Box::new(move || client.handle_read())),
                );
            }
        }
    }

    fn handle_connect_timer(&self) {
        let mut s = self.core.state.lock();
        s.t_connect = None;
        let _ = self.start_locked(&mut s);
    }

    fn handle_lookup_timer(&self) {
        let mut s = self.core.state.lock();
        s.t_connect = None;
        if s.transport.is_some() {
            return;
        }
        match Transport::connect(&self.core.config.endpoint) {
            Ok(transport) => {
                s.transport = Some(transport);
                s.status = ClientState::Connected;
            }
            Err(e) => {
                tracing::debug!("lookup connect failed: {e}");
            }
        }
    }

    fn handle_write(&self) {
        let mut guard = self.core.state.lock();
        let s = &mut *guard;
        s.t_write = None;
        let status = {
            let Some(tp) = s.transport.as_mut() else {
                return;
            };
            s.wb.flush_available(tp)
        };
        match status {
            Ok(FlushStatus::Empty) => {}
            Ok(FlushStatus::Pending) => self.arm_write_locked(s),
            Err(e) => {
                tracing::warn!("flush to route manager failed, closing: {e}");
                self.failed_locked(s);
            }
        }
    }

    /// Read-readiness: continue the current frame, dispatch when complete.
    fn handle_read(&self) {
        let mut guard = self.core.state.lock();
        let s = &mut *guard;
        s.t_read = None;
        if s.transport.is_none() {
            return;
        }

        // Header phase.
        if s.ibuf.written() < HEADER_SIZE {
            match self.fill_locked(s, HEADER_SIZE - s.ibuf.written()) {
                FillResult::Progress => {}
                FillResult::Again => {
                    self.event_locked(s, Event::Read);
                    return;
                }
                FillResult::Failed => return,
            }
            if s.ibuf.written() < HEADER_SIZE {
                self.event_locked(s, Event::Read);
                return;
            }
        }

        let Some(header) = Header::decode(s.ibuf.as_slice()) else {
            return;
        };
        if let Err(e) = header.validate() {
            tracing::error!("dropping connection: {e}");
            self.failed_locked(s);
            return;
        }

        // Body phase.
        let frame_len = header.length as usize;
        if frame_len > s.ibuf.capacity() {
            tracing::warn!(
                "message size {frame_len} exceeds buffer size {}, expanding",
                s.ibuf.capacity()
            );
            s.ibuf.ensure_capacity(frame_len);
        }
        if s.ibuf.written() < frame_len {
            match self.fill_locked(s, frame_len - s.ibuf.written()) {
                FillResult::Progress => {}
                FillResult::Again => {
                    self.event_locked(s, Event::Read);
                    return;
                }
                FillResult::Failed => return,
            }
            if s.ibuf.written() < frame_len {
                self.event_locked(s, Event::Read);
                return;
            }
        }

        let command = header.command;
        // Split the frame off the read buffer; the body slice shares its
        // memory with the frozen frame, no copy.
        let frame = s.ibuf.take_frame(frame_len);
        let body = frame.slice(HEADER_SIZE..);
        tracing::debug!("received command {command:#06x}, {} byte body", body.len());
        drop(guard);

        // Dispatch without the lock; the handler may stop or restart us.
        match (Command::from_code(command), self.core.handlers.get(command)) {
            (Some(cmd), Some(handler)) => (handler.as_ref())(cmd, self, body),
            _ => tracing::debug!("no handler for command {command:#06x}, dropping"),
        }

        let mut s = self.core.state.lock();
        if s.transport.is_none() {
            // Connection was closed during frame processing.
            return;
        }
        self.event_locked(&mut s, Event::Read);
    }

    fn fill_locked(&self, s: &mut Inner, want: usize) -> FillResult {
        let outcome = {
            let Inner {
                transport, ibuf, ..
            } = &mut *s;
            let Some(tp) = transport.as_mut() else {
                return FillResult::Failed;
            };
            ibuf.fill_from(tp, want)
        };
        match outcome {
            Ok(ReadOutcome::Data(_)) => FillResult::Progress,
            Ok(ReadOutcome::WouldBlock) => FillResult::Again,
            Ok(ReadOutcome::Closed) => {
                tracing::debug!("connection closed by route manager");
                self.failed_locked(s);
                FillResult::Failed
            }
            Err(e) => {
                tracing::warn!("read from route manager failed, closing: {e}");
                self.failed_locked(s);
                FillResult::Failed
            }
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.core.state.lock();
        f.debug_struct("Client")
            .field("status", &s.status)
            .field("fail", &s.fail)
            .field("connected", &s.transport.is_some())
            .finish()
    }
}

fn redistribute_frame(command: Command, route_type: RouteType) -> Bytes {
    let mut frame = FrameBuilder::new(command);
    frame.put_u8(route_type.code());
    frame.finish()
}

/// Blocking single request/reply on a lookup-mode socket.
fn exchange_on(tp: &mut Transport, frame: &[u8]) -> Result<(Header, Bytes)> {
    tp.write_all(frame)?;

    let mut head = [0u8; HEADER_SIZE];
    tp.read_exact(&mut head)?;
    let header = Header::decode(&head)
        .ok_or_else(|| ZwireError::Protocol("short reply header".into()))?;
    header.validate()?;

    let mut body = vec![0u8; header.body_len()];
    tp.read_exact(&mut body)?;
    Ok((header, Bytes::from(body)))
}
