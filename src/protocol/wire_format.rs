//! Wire format encoding and decoding.
//!
//! Implements the 6-byte header format shared by every message:
//! ```text
//! ┌───────────┬────────┬─────────┬───────────┐
//! │ Length    │ Marker │ Version │ Command   │
//! │ 2 bytes   │ 1 byte │ 1 byte  │ 2 bytes   │
//! │ uint16 BE │ 0xFF   │ 2       │ uint16 BE │
//! └───────────┴────────┴─────────┴───────────┘
//! ```
//!
//! The length field counts the whole frame, these six bytes included.
//! All multi-byte integers are Big Endian; the protocol is packed bytes
//! with no padding anywhere.

use crate::error::{Result, ZwireError};

/// Header size in bytes (fixed, exactly 6; included in the length field).
pub const HEADER_SIZE: usize = 6;

/// Constant marker byte; a mismatch on the first message means the peer
/// speaks a pre-versioned dialect.
pub const HEADER_MARKER: u8 = 0xFF;

/// Protocol version carried in every header.
pub const PROTOCOL_VERSION: u8 = 2;

/// Initial read-buffer capacity; frames above this force a reallocation.
pub const MAX_PACKET_SIZE: usize = 4096;

/// Commands exchanged with the route manager.
///
/// Codes are the protocol's stable constants; unknown inbound codes are
/// dropped silently for forward compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Command {
    InterfaceAdd = 1,
    InterfaceDelete = 2,
    InterfaceAddressAdd = 3,
    InterfaceAddressDelete = 4,
    InterfaceUp = 5,
    InterfaceDown = 6,
    Ipv4RouteAdd = 7,
    Ipv4RouteDelete = 8,
    Ipv6RouteAdd = 9,
    Ipv6RouteDelete = 10,
    RedistributeAdd = 11,
    RedistributeDelete = 12,
    RedistributeDefaultAdd = 13,
    RedistributeDefaultDelete = 14,
    Ipv4NexthopLookup = 15,
    Ipv6NexthopLookup = 16,
    Ipv4ImportLookup = 17,
    Ipv6ImportLookup = 18,
    InterfaceRename = 19,
    RouterIdAdd = 20,
    RouterIdDelete = 21,
    RouterIdUpdate = 22,
    Hello = 23,
}

impl Command {
    /// Wire code of this command.
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Map a wire code back to a command, `None` for unknown codes.
    pub fn from_code(code: u16) -> Option<Self> {
        use Command::*;
        Some(match code {
            1 => InterfaceAdd,
            2 => InterfaceDelete,
            3 => InterfaceAddressAdd,
            4 => InterfaceAddressDelete,
            5 => InterfaceUp,
            6 => InterfaceDown,
            7 => Ipv4RouteAdd,
            8 => Ipv4RouteDelete,
            9 => Ipv6RouteAdd,
            10 => Ipv6RouteDelete,
            11 => RedistributeAdd,
            12 => RedistributeDelete,
            13 => RedistributeDefaultAdd,
            14 => RedistributeDefaultDelete,
            15 => Ipv4NexthopLookup,
            16 => Ipv6NexthopLookup,
            17 => Ipv4ImportLookup,
            18 => Ipv6ImportLookup,
            19 => InterfaceRename,
            20 => RouterIdAdd,
            21 => RouterIdDelete,
            22 => RouterIdUpdate,
            23 => Hello,
            _ => return None,
        })
    }
}

/// Number of distinct route-type codes (valid codes are `0..ROUTE_TYPE_MAX`).
pub const ROUTE_TYPE_MAX: usize = 11;

/// Source protocol of a route; doubles as the redistribution-table index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RouteType {
    System = 0,
    Kernel = 1,
    Connect = 2,
    Static = 3,
    Rip = 4,
    Ripng = 5,
    Ospf = 6,
    Ospf6 = 7,
    Isis = 8,
    Bgp = 9,
    Hsls = 10,
}

impl RouteType {
    /// Wire code of this route type.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Map a wire code back to a route type, `None` for unknown codes.
    pub fn from_code(code: u8) -> Option<Self> {
        use RouteType::*;
        Some(match code {
            0 => System,
            1 => Kernel,
            2 => Connect,
            3 => Static,
            4 => Rip,
            5 => Ripng,
            6 => Ospf,
            7 => Ospf6,
            8 => Isis,
            9 => Bgp,
            10 => Hsls,
            _ => return None,
        })
    }

    /// All route types in ascending code order.
    pub fn all() -> impl Iterator<Item = RouteType> {
        (0..ROUTE_TYPE_MAX as u8).filter_map(RouteType::from_code)
    }
}

/// Per-route flags carried in the `zebra_flags` byte of route messages.
pub mod zebra_flags {
    /// Route learned from the local system.
    pub const INTERNAL: u8 = 0x01;
    /// Route installed by this daemon itself.
    pub const SELFROUTE: u8 = 0x02;
    /// Discard traffic silently; the nexthop section degenerates to a
    /// single sentinel entry.
    pub const BLACKHOLE: u8 = 0x04;
    /// Route learned over iBGP.
    pub const IBGP: u8 = 0x08;
    /// Route currently selected for forwarding.
    pub const SELECTED: u8 = 0x10;
    /// Statically configured route.
    pub const STATIC: u8 = 0x40;
    /// Discard traffic with an unreachable reply.
    pub const REJECT: u8 = 0x80;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Presence bits in the `message_flags` byte: which optional sections the
/// route body carries.
pub mod message_flags {
    /// Nexthop section present.
    pub const NEXTHOP: u8 = 0x01;
    /// Interface-index nexthops present (informational; the entries live in
    /// the shared nexthop section).
    pub const IFINDEX: u8 = 0x02;
    /// One-byte administrative distance present.
    pub const DISTANCE: u8 = 0x04;
    /// Four-byte metric present.
    pub const METRIC: u8 = 0x08;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Type codes of individual nexthop entries.
pub mod nexthop_type {
    pub const IFINDEX: u8 = 1;
    pub const IFNAME: u8 = 2;
    pub const IPV4: u8 = 3;
    pub const IPV4_IFINDEX: u8 = 4;
    pub const IPV4_IFNAME: u8 = 5;
    pub const IPV6: u8 = 6;
    pub const IPV6_IFINDEX: u8 = 7;
    pub const IPV6_IFNAME: u8 = 8;
    pub const BLACKHOLE: u8 = 9;
}

/// Subsequent address-family identifiers (route sub-table selectors).
pub mod safi {
    pub const UNICAST: u16 = 1;
    pub const MULTICAST: u16 = 2;
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Total frame length, header included.
    pub length: u16,
    /// Marker byte as read from the wire.
    pub marker: u8,
    /// Version byte as read from the wire.
    pub version: u8,
    /// Command code (may be unknown to this build).
    pub command: u16,
}

impl Header {
    /// Create an outbound header for `command` with the given total length.
    pub fn new(command: Command, length: u16) -> Self {
        Self {
            length,
            marker: HEADER_MARKER,
            version: PROTOCOL_VERSION,
            command: command.code(),
        }
    }

    /// Encode header to bytes (Big Endian).
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.length.to_be_bytes());
        buf[2] = self.marker;
        buf[3] = self.version;
        buf[4..6].copy_from_slice(&self.command.to_be_bytes());
        buf
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if the buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            length: u16::from_be_bytes([buf[0], buf[1]]),
            marker: buf[2],
            version: buf[3],
            command: u16::from_be_bytes([buf[4], buf[5]]),
        })
    }

    /// Validate marker, version and declared length.
    ///
    /// Any violation here is connection-fatal: the peer either speaks a
    /// different protocol version or the stream has lost framing.
    pub fn validate(&self) -> Result<()> {
        if self.marker != HEADER_MARKER || self.version != PROTOCOL_VERSION {
            return Err(ZwireError::Protocol(format!(
                "version mismatch, marker {}, version {}",
                self.marker, self.version
            )));
        }
        if (self.length as usize) < HEADER_SIZE {
            return Err(ZwireError::Protocol(format!(
                "message length {} is less than {}",
                self.length, HEADER_SIZE
            )));
        }
        Ok(())
    }

    /// Body length of the frame this header announces.
    #[inline]
    pub fn body_len(&self) -> usize {
        (self.length as usize).saturating_sub(HEADER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::new(Command::Hello, 7);
        let encoded = original.encode();
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = Header::new(Command::Hello, 0x0102);
        let bytes = header.encode();

        // Length: 0x0102 in BE
        assert_eq!(bytes[0], 0x01);
        assert_eq!(bytes[1], 0x02);

        // Marker and version
        assert_eq!(bytes[2], 0xFF);
        assert_eq!(bytes[3], 2);

        // Command: 23 = 0x0017 in BE
        assert_eq!(bytes[4], 0x00);
        assert_eq!(bytes[5], 0x17);
    }

    #[test]
    fn test_header_size_is_exactly_six() {
        assert_eq!(HEADER_SIZE, 6);
        let header = Header::new(Command::RouterIdAdd, 6);
        assert_eq!(header.encode().len(), 6);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; 5];
        assert!(Header::decode(&buf).is_none());
    }

    #[test]
    fn test_validate_accepts_wellformed() {
        let header = Header::new(Command::InterfaceAdd, 6);
        assert!(header.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_marker() {
        let mut header = Header::new(Command::InterfaceAdd, 6);
        header.marker = 0x00;
        let err = header.validate().unwrap_err();
        assert!(err.to_string().contains("version mismatch"));
    }

    #[test]
    fn test_validate_rejects_bad_version() {
        let mut header = Header::new(Command::InterfaceAdd, 6);
        header.version = 1;
        assert!(header.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_short_length() {
        let mut header = Header::new(Command::InterfaceAdd, 6);
        header.length = 5;
        let err = header.validate().unwrap_err();
        assert!(err.to_string().contains("less than"));
    }

    #[test]
    fn test_command_code_roundtrip() {
        for code in 1..=23u16 {
            let cmd = Command::from_code(code).unwrap();
            assert_eq!(cmd.code(), code);
        }
        assert_eq!(Command::from_code(0), None);
        assert_eq!(Command::from_code(24), None);
        assert_eq!(Command::Hello.code(), 0x0017);
        assert_eq!(Command::RouterIdAdd.code(), 20);
        assert_eq!(Command::InterfaceAdd.code(), 1);
    }

    #[test]
    fn test_route_type_code_roundtrip() {
        for code in 0..ROUTE_TYPE_MAX as u8 {
            let rt = RouteType::from_code(code).unwrap();
            assert_eq!(rt.code(), code);
        }
        assert_eq!(RouteType::from_code(11), None);
        assert_eq!(RouteType::Bgp.code(), 9);
    }

    #[test]
    fn test_route_type_all_ascending() {
        let codes: Vec<u8> = RouteType::all().map(RouteType::code).collect();
        assert_eq!(codes, (0..11).collect::<Vec<u8>>());
    }

    #[test]
    fn test_flag_helpers() {
        assert!(zebra_flags::has_flag(
            zebra_flags::BLACKHOLE | zebra_flags::SELECTED,
            zebra_flags::BLACKHOLE
        ));
        assert!(!zebra_flags::has_flag(
            zebra_flags::SELECTED,
            zebra_flags::BLACKHOLE
        ));
        assert!(message_flags::has_flag(
            message_flags::NEXTHOP | message_flags::METRIC,
            message_flags::METRIC
        ));
    }
}
