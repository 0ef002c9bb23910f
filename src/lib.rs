//! # zwire-client
//!
//! Client runtime for the Z routing control protocol. A routing daemon
//! embeds this crate to exchange routing information with the central
//! kernel-route manager over a local stream socket (UNIX-domain by
//! default, loopback TCP as an alternative).
//!
//! ## Architecture
//!
//! - **Wire codec**: 6-byte big-endian header (`length`, marker `0xFF`,
//!   version `2`, `command`) plus bit-exact typed bodies
//! - **Connection lifecycle**: connect, handshake, subscription replay,
//!   and bounded-backoff reconnect, driven entirely by reactor events
//! - **Dispatch**: inbound notifications routed to per-command handlers;
//!   unknown commands are dropped for forward compatibility
//!
//! The event substrate is pluggable through the [`reactor::Reactor`]
//! trait: a tokio back-end (the default) and a dedicated poll-thread
//! back-end ship with the crate, chosen once at handle construction.
//!
//! ## Example
//!
//! ```ignore
//! use zwire_client::{Client, Command, RedistOp, RouteType};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::builder()
//!         .on(Command::RouterIdUpdate, |_cmd, _client, body| {
//!             let rid = zwire_client::codec::router_id_update_read(&body);
//!             tracing::info!("router id update: {rid:?}");
//!         })
//!         .build();
//!
//!     client.init(RouteType::Bgp);
//!     client.redistribute(RedistOp::Add, RouteType::Static).ok();
//! }
//! ```

pub mod codec;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod reactor;
pub mod transport;

mod client;
mod write_buffer;

pub use client::{
    Client, ClientBuilder, ClientState, Config, RedistOp, MAX_CONNECT_FAILURES,
};
pub use error::{Result, ZwireError};
pub use protocol::{Command, Header, RouteType, HEADER_SIZE, MAX_PACKET_SIZE};
pub use transport::{Endpoint, DEFAULT_SERV_PATH, TCP_PORT};
pub use write_buffer::{FlushStatus, WriteBuffer};
