//! Binary protocol: header format, frame assembly, read-side buffering.

mod frame;
mod read_buffer;
mod wire_format;

pub use frame::{simple_frame, FrameBuilder};
pub use read_buffer::{ReadBuffer, ReadOutcome};
pub use wire_format::{
    message_flags, nexthop_type, safi, zebra_flags, Command, Header, RouteType, HEADER_MARKER,
    HEADER_SIZE, MAX_PACKET_SIZE, PROTOCOL_VERSION, ROUTE_TYPE_MAX,
};
