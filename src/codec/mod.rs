//! Message-body codecs.
//!
//! Bodies are packed big-endian bytes with no self-description; every
//! decoder here is the mirror of a fixed layout. Inbound decoders return
//! owned structs for the embedder's registries to consume.

mod interface;
mod route;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::Buf;

pub use interface::{
    interface_add_read, interface_address_read, interface_set_value, interface_state_read,
    router_id_update_read, InterfaceAddress, InterfaceInfo, LinkAddrFormat, INTERFACE_NAME_SIZE,
};
pub use route::{Ipv4Route, Ipv6Route};

use crate::error::{Result, ZwireError};

/// Address-family codes used on the wire.
pub mod address_family {
    pub const INET: u8 = 2;
    pub const INET6: u8 = 10;
}

/// Bytes needed to carry a prefix of `prefix_len` bits.
#[inline]
pub fn psize(prefix_len: u8) -> usize {
    (prefix_len as usize + 7) / 8
}

/// An IPv4 destination prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Prefix {
    pub addr: Ipv4Addr,
    pub len: u8,
}

/// An IPv6 destination prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Prefix {
    pub addr: Ipv6Addr,
    pub len: u8,
}

/// A family-tagged prefix as carried by router-id and address messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefix {
    V4(Ipv4Prefix),
    V6(Ipv6Prefix),
}

impl Prefix {
    /// Wire family code.
    pub fn family(&self) -> u8 {
        match self {
            Prefix::V4(_) => address_family::INET,
            Prefix::V6(_) => address_family::INET6,
        }
    }

    /// Full address length in bytes for this family.
    pub fn address_len(&self) -> usize {
        match self {
            Prefix::V4(_) => 4,
            Prefix::V6(_) => 16,
        }
    }

    /// Prefix length in bits.
    pub fn len(&self) -> u8 {
        match self {
            Prefix::V4(p) => p.len,
            Prefix::V6(p) => p.len,
        }
    }

    /// The bare address.
    pub fn address(&self) -> IpAddr {
        match self {
            Prefix::V4(p) => IpAddr::V4(p.addr),
            Prefix::V6(p) => IpAddr::V6(p.addr),
        }
    }
}

/// Checked big-endian reader over a message body.
///
/// Thin bounds-checking wrapper around [`bytes::Buf`] on the body slice:
/// `Buf`'s getters panic on underflow, so every read verifies the
/// remaining length first and reports the shortfall as
/// [`ZwireError::Truncated`].
pub(crate) struct BodyReader<'a> {
    buf: &'a [u8],
}

impl<'a> BodyReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(ZwireError::Truncated {
                needed: n - self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub(crate) fn get_u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn get_u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    pub(crate) fn get_u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    pub(crate) fn get_u64(&mut self) -> Result<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64())
    }

    /// Borrow `n` raw bytes out of the body without copying.
    pub(crate) fn get_slice(&mut self, n: usize) -> Result<&'a [u8]> {
        self.need(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    pub(crate) fn get_ipv4(&mut self) -> Result<Ipv4Addr> {
        self.need(4)?;
        Ok(Ipv4Addr::from(self.buf.get_u32()))
    }

    pub(crate) fn get_ipv6(&mut self) -> Result<Ipv6Addr> {
        self.need(16)?;
        Ok(Ipv6Addr::from(self.buf.get_u128()))
    }
}
