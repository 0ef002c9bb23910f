//! Interface and router-id notification bodies.
//!
//! These messages arrive asynchronously from the route manager; handlers
//! call the decoders here and feed the owned results into the embedder's
//! interface registry.

use std::net::IpAddr;

use crate::error::{Result, ZwireError};

use super::{address_family, BodyReader, Ipv4Prefix, Ipv6Prefix, Prefix};

/// Fixed width of the NUL-padded interface name field.
pub const INTERFACE_NAME_SIZE: usize = 20;

/// How the manager encodes the link-layer address tail of INTERFACE_ADD.
///
/// The wire is not self-describing here; which variant is in use depends on
/// how the manager was built, so the embedder must configure the match
/// out-of-band. The default is the length-prefixed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAddrFormat {
    /// `hw_addr_len:u32` followed by that many address bytes.
    LengthPrefixed,
    /// A fixed-size raw `sockaddr_dl` blob of the given length.
    SockaddrDl(usize),
}

impl Default for LinkAddrFormat {
    fn default() -> Self {
        LinkAddrFormat::LengthPrefixed
    }
}

/// Decoded interface description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub ifindex: u32,
    pub status: u8,
    /// Interface flags. Read big-endian like every other multi-byte
    /// field, even where older speakers emitted host order.
    pub flags: u64,
    pub metric: u32,
    pub mtu: u32,
    pub mtu6: u32,
    pub bandwidth: u32,
    /// Link-layer address; empty when the message carried none.
    pub hw_addr: Vec<u8>,
}

/// Decoded interface address (connected prefix).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub ifindex: u32,
    pub flags: u8,
    pub prefix: Prefix,
    /// Peer/broadcast destination; all-zero bytes on the wire mean "no
    /// destination" and decode to `None`.
    pub destination: Option<IpAddr>,
}

/// Decode a ROUTER_ID_UPDATE body.
pub fn router_id_update_read(body: &[u8]) -> Result<Prefix> {
    let mut r = BodyReader::new(body);
    let family = r.get_u8()?;
    read_prefix_tail(&mut r, family)
}

fn read_prefix_tail(r: &mut BodyReader<'_>, family: u8) -> Result<Prefix> {
    match family {
        address_family::INET => {
            let addr = r.get_ipv4()?;
            let len = r.get_u8()?;
            Ok(Prefix::V4(Ipv4Prefix { addr, len }))
        }
        address_family::INET6 => {
            let addr = r.get_ipv6()?;
            let len = r.get_u8()?;
            Ok(Prefix::V6(Ipv6Prefix { addr, len }))
        }
        other => Err(ZwireError::Protocol(format!(
            "unknown address family {other}"
        ))),
    }
}

fn read_name(r: &mut BodyReader<'_>) -> Result<String> {
    let raw = r.get_slice(INTERFACE_NAME_SIZE)?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
}

fn read_values(r: &mut BodyReader<'_>, ifp: &mut InterfaceInfo) -> Result<()> {
    ifp.ifindex = r.get_u32()?;
    ifp.status = r.get_u8()?;
    ifp.flags = r.get_u64()?;
    ifp.metric = r.get_u32()?;
    ifp.mtu = r.get_u32()?;
    ifp.mtu6 = r.get_u32()?;
    ifp.bandwidth = r.get_u32()?;
    Ok(())
}

/// Decode an INTERFACE_ADD body, including the link-layer address tail.
pub fn interface_add_read(body: &[u8], link_addr: LinkAddrFormat) -> Result<InterfaceInfo> {
    let mut r = BodyReader::new(body);
    let mut ifp = InterfaceInfo {
        name: read_name(&mut r)?,
        ifindex: 0,
        status: 0,
        flags: 0,
        metric: 0,
        mtu: 0,
        mtu6: 0,
        bandwidth: 0,
        hw_addr: Vec::new(),
    };
    read_values(&mut r, &mut ifp)?;

    ifp.hw_addr = match link_addr {
        LinkAddrFormat::SockaddrDl(len) => r.get_slice(len)?.to_vec(),
        LinkAddrFormat::LengthPrefixed => {
            let len = r.get_u32()? as usize;
            r.get_slice(len)?.to_vec()
        }
    };

    Ok(ifp)
}

/// Decode an INTERFACE_UP/DOWN/DELETE body (no link-layer tail).
pub fn interface_state_read(body: &[u8]) -> Result<InterfaceInfo> {
    let mut r = BodyReader::new(body);
    let mut ifp = InterfaceInfo {
        name: read_name(&mut r)?,
        ifindex: 0,
        status: 0,
        flags: 0,
        metric: 0,
        mtu: 0,
        mtu6: 0,
        bandwidth: 0,
        hw_addr: Vec::new(),
    };
    read_values(&mut r, &mut ifp)?;
    Ok(ifp)
}

/// Refresh an already-known interface from a state body, starting at the
/// ifindex field (the name has been consumed by the caller's lookup).
pub fn interface_set_value(body: &[u8], ifp: &mut InterfaceInfo) -> Result<()> {
    let mut r = BodyReader::new(body);
    read_values(&mut r, ifp)
}

/// Decode an INTERFACE_ADDRESS_ADD/DELETE body.
pub fn interface_address_read(body: &[u8]) -> Result<InterfaceAddress> {
    let mut r = BodyReader::new(body);

    let ifindex = r.get_u32()?;
    let flags = r.get_u8()?;
    let family = r.get_u8()?;
    let prefix = read_prefix_tail(&mut r, family)?;

    let dest_raw = r.get_slice(prefix.address_len())?;
    let destination = if dest_raw.iter().all(|&b| b == 0) {
        None
    } else {
        Some(match prefix {
            Prefix::V4(_) => {
                let mut octets = [0u8; 4];
                octets.copy_from_slice(dest_raw);
                IpAddr::from(octets)
            }
            Prefix::V6(_) => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(dest_raw);
                IpAddr::from(octets)
            }
        })
    };

    Ok(InterfaceAddress {
        ifindex,
        flags,
        prefix,
        destination,
    })
}
