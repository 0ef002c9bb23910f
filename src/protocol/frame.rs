//! Outbound frame assembly.
//!
//! Every outbound message starts with a header whose length field is a
//! placeholder; the body is appended with explicit big-endian writers and
//! the real length is patched back into offset 0 when the frame is
//! finished. This mirrors the wire rule that the length spans the entire
//! frame, header included.
//!
//! # Example
//!
//! ```
//! use zwire_client::protocol::{Command, FrameBuilder, HEADER_SIZE};
//!
//! let mut frame = FrameBuilder::new(Command::Hello);
//! frame.put_u8(9);
//! let bytes = frame.finish();
//! assert_eq!(bytes.len(), HEADER_SIZE + 1);
//! assert_eq!(&bytes[..2], &[0x00, 0x07]); // patched length
//! ```

use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{Command, Header, HEADER_SIZE};

/// Builder for one outbound frame.
#[derive(Debug)]
pub struct FrameBuilder {
    buf: BytesMut,
}

impl FrameBuilder {
    /// Start a frame for `command` with a placeholder length.
    pub fn new(command: Command) -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.extend_from_slice(&Header::new(command, HEADER_SIZE as u16).encode());
        Self { buf }
    }

    /// Append a single byte.
    #[inline]
    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    /// Append a big-endian u16.
    #[inline]
    pub fn put_u16(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    /// Append a big-endian u32.
    #[inline]
    pub fn put_u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    /// Append a big-endian u64.
    #[inline]
    pub fn put_u64(&mut self, v: u64) {
        self.buf.put_u64(v);
    }

    /// Append raw bytes.
    #[inline]
    pub fn put_slice(&mut self, v: &[u8]) {
        self.buf.put_slice(v);
    }

    /// Append an IPv4 address in network byte order.
    #[inline]
    pub fn put_ipv4(&mut self, addr: Ipv4Addr) {
        self.buf.put_slice(&addr.octets());
    }

    /// Append an IPv6 address in network byte order.
    #[inline]
    pub fn put_ipv6(&mut self, addr: Ipv6Addr) {
        self.buf.put_slice(&addr.octets());
    }

    /// Bytes written so far, header included.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True only before the header placeholder is written; kept for
    /// container-API symmetry.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Patch the length field at offset 0 and freeze the frame.
    ///
    /// # Panics
    ///
    /// Panics if the frame outgrows the 16-bit length field; no protocol
    /// message comes anywhere near that.
    pub fn finish(mut self) -> Bytes {
        let len = self.buf.len();
        assert!(len <= u16::MAX as usize, "frame length {len} overflows u16");
        self.buf[0..2].copy_from_slice(&(len as u16).to_be_bytes());
        self.buf.freeze()
    }
}

/// Build a body-less frame (the very simple command-only messages).
pub fn simple_frame(command: Command) -> Bytes {
    FrameBuilder::new(command).finish()
}
