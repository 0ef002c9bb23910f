//! Route install/withdraw message bodies.
//!
//! Layout, after the common header:
//!
//! ```text
//! route_type:u8  zebra_flags:u8  message_flags:u8  safi:u16
//! prefix_len:u8  prefix_bytes:[⌈prefix_len/8⌉]
//! [nexthop section]   when message_flags.NEXTHOP
//! [distance:u8]       when message_flags.DISTANCE
//! [metric:u32]        when message_flags.METRIC
//! ```
//!
//! The nexthop section is a count byte followed by typed entries. An IPv4
//! route whose zebra flags carry BLACKHOLE degenerates to a single
//! sentinel entry with no address bytes.

use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::Bytes;

use crate::error::{Result, ZwireError};
use crate::protocol::{message_flags, nexthop_type, zebra_flags, Command, FrameBuilder};
use crate::protocol::RouteType;

use super::{psize, BodyReader, Ipv4Prefix, Ipv6Prefix};

/// Attributes of one IPv4 route, as handed over by the embedding daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Route {
    pub route_type: RouteType,
    /// `zebra_flags` bitset.
    pub flags: u8,
    /// `message_flags` bitset selecting the optional sections.
    pub message: u8,
    pub safi: u16,
    pub nexthops: Vec<Ipv4Addr>,
    pub ifindexes: Vec<u32>,
    pub distance: u8,
    pub metric: u32,
}

impl Ipv4Route {
    /// Encode a full frame for `command` (route add or delete).
    pub fn encode(&self, command: Command, prefix: &Ipv4Prefix) -> Bytes {
        let mut frame = FrameBuilder::new(command);
        frame.put_u8(self.route_type.code());
        frame.put_u8(self.flags);
        frame.put_u8(self.message);
        frame.put_u16(self.safi);

        frame.put_u8(prefix.len);
        frame.put_slice(&prefix.addr.octets()[..psize(prefix.len)]);

        if message_flags::has_flag(self.message, message_flags::NEXTHOP) {
            if zebra_flags::has_flag(self.flags, zebra_flags::BLACKHOLE) {
                frame.put_u8(1);
                frame.put_u8(nexthop_type::BLACKHOLE);
            } else {
                frame.put_u8((self.nexthops.len() + self.ifindexes.len()) as u8);
                for nexthop in &self.nexthops {
                    frame.put_u8(nexthop_type::IPV4);
                    frame.put_ipv4(*nexthop);
                }
                for ifindex in &self.ifindexes {
                    frame.put_u8(nexthop_type::IFINDEX);
                    frame.put_u32(*ifindex);
                }
            }
        }

        if message_flags::has_flag(self.message, message_flags::DISTANCE) {
            frame.put_u8(self.distance);
        }
        if message_flags::has_flag(self.message, message_flags::METRIC) {
            frame.put_u32(self.metric);
        }

        frame.finish()
    }

    /// Decode a route body (header already stripped).
    pub fn decode(body: &[u8]) -> Result<(Ipv4Prefix, Ipv4Route)> {
        let mut r = BodyReader::new(body);

        let type_code = r.get_u8()?;
        let route_type = RouteType::from_code(type_code)
            .ok_or_else(|| ZwireError::Protocol(format!("unknown route type {type_code}")))?;
        let flags = r.get_u8()?;
        let message = r.get_u8()?;
        let safi = r.get_u16()?;

        let prefix_len = r.get_u8()?;
        let mut octets = [0u8; 4];
        let raw = r.get_slice(psize(prefix_len))?;
        octets[..raw.len()].copy_from_slice(raw);
        let prefix = Ipv4Prefix {
            addr: Ipv4Addr::from(octets),
            len: prefix_len,
        };

        let mut route = Ipv4Route {
            route_type,
            flags,
            message,
            safi,
            nexthops: Vec::new(),
            ifindexes: Vec::new(),
            distance: 0,
            metric: 0,
        };

        if message_flags::has_flag(message, message_flags::NEXTHOP) {
            let count = r.get_u8()?;
            for _ in 0..count {
                match r.get_u8()? {
                    nexthop_type::IPV4 => route.nexthops.push(r.get_ipv4()?),
                    nexthop_type::IFINDEX => route.ifindexes.push(r.get_u32()?),
                    nexthop_type::BLACKHOLE => {}
                    other => {
                        return Err(ZwireError::Protocol(format!(
                            "unknown nexthop type {other}"
                        )))
                    }
                }
            }
        }

        if message_flags::has_flag(message, message_flags::DISTANCE) {
            route.distance = r.get_u8()?;
        }
        if message_flags::has_flag(message, message_flags::METRIC) {
            route.metric = r.get_u32()?;
        }

        Ok((prefix, route))
    }
}

/// Attributes of one IPv6 route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Route {
    pub route_type: RouteType,
    pub flags: u8,
    pub message: u8,
    pub safi: u16,
    pub nexthops: Vec<Ipv6Addr>,
    pub ifindexes: Vec<u32>,
    pub distance: u8,
    pub metric: u32,
}

impl Ipv6Route {
    /// Encode a full frame for `command` (route add or delete).
    pub fn encode(&self, command: Command, prefix: &Ipv6Prefix) -> Bytes {
        let mut frame = FrameBuilder::new(command);
        frame.put_u8(self.route_type.code());
        frame.put_u8(self.flags);
        frame.put_u8(self.message);
        frame.put_u16(self.safi);

        frame.put_u8(prefix.len);
        frame.put_slice(&prefix.addr.octets()[..psize(prefix.len)]);

        if message_flags::has_flag(self.message, message_flags::NEXTHOP) {
            frame.put_u8((self.nexthops.len() + self.ifindexes.len()) as u8);
            for nexthop in &self.nexthops {
                frame.put_u8(nexthop_type::IPV6);
                frame.put_ipv6(*nexthop);
            }
            for ifindex in &self.ifindexes {
                frame.put_u8(nexthop_type::IFINDEX);
                frame.put_u32(*ifindex);
            }
        }

        if message_flags::has_flag(self.message, message_flags::DISTANCE) {
            frame.put_u8(self.distance);
        }
        if message_flags::has_flag(self.message, message_flags::METRIC) {
            frame.put_u32(self.metric);
        }

        frame.finish()
    }

    /// Decode a route body (header already stripped).
    pub fn decode(body: &[u8]) -> Result<(Ipv6Prefix, Ipv6Route)> {
        let mut r = BodyReader::new(body);

        let type_code = r.get_u8()?;
        let route_type = RouteType::from_code(type_code)
            .ok_or_else(|| ZwireError::Protocol(format!("unknown route type {type_code}")))?;
        let flags = r.get_u8()?;
        let message = r.get_u8()?;
        let safi = r.get_u16()?;

        let prefix_len = r.get_u8()?;
        let mut octets = [0u8; 16];
        let raw = r.get_slice(psize(prefix_len))?;
        octets[..raw.len()].copy_from_slice(raw);
        let prefix = Ipv6Prefix {
            addr: Ipv6Addr::from(octets),
            len: prefix_len,
        };

        let mut route = Ipv6Route {
            route_type,
            flags,
            message,
            safi,
            nexthops: Vec::new(),
            ifindexes: Vec::new(),
            distance: 0,
            metric: 0,
        };

        if message_flags::has_flag(message, message_flags::NEXTHOP) {
            let count = r.get_u8()?;
            for _ in 0..count {
                match r.get_u8()? {
                    nexthop_type::IPV6 => route.nexthops.push(r.get_ipv6()?),
                    nexthop_type::IFINDEX => route.ifindexes.push(r.get_u32()?),
                    other => {
                        return Err(ZwireError::Protocol(format!(
                            "unknown nexthop type {other}"
                        )))
                    }
                }
            }
        }

        if message_flags::has_flag(message, message_flags::DISTANCE) {
            route.distance = r.get_u8()?;
        }
        if message_flags::has_flag(message, message_flags::METRIC) {
            route.metric = r.get_u32()?;
        }

        Ok((prefix, route))
    }
}
