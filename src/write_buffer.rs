//! Outbound FIFO buffer with partial-drain semantics.
//!
//! Frames are queued as chunks; every enqueue attempts an immediate drain
//! to the socket. When the socket would block mid-chunk the remaining
//! bytes stay queued and the caller arms write-readiness to resume via
//! [`WriteBuffer::flush_available`]. Short writes are normal, never errors.

use std::collections::VecDeque;
use std::io::{self, Write};

use bytes::{Buf, Bytes};

use crate::error::{Result, ZwireError};

/// Drain outcome: did everything go out, or is data still pending?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// The queue is empty; write-readiness can be disarmed.
    Empty,
    /// Bytes remain queued; arm write-readiness to continue.
    Pending,
}

/// FIFO queue of bytes awaiting socket write.
#[derive(Debug, Default)]
pub struct WriteBuffer {
    chunks: VecDeque<Bytes>,
}

impl WriteBuffer {
    /// Create an empty write buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes pending.
    pub fn pending(&self) -> usize {
        self.chunks.iter().map(Bytes::len).sum()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Queue `frame` and attempt an immediate drain.
    pub fn write<W: Write>(&mut self, w: &mut W, frame: Bytes) -> Result<FlushStatus> {
        if !frame.is_empty() {
            self.chunks.push_back(frame);
        }
        self.flush_available(w)
    }

    /// Drain as much as the socket accepts without new input.
    ///
    /// A zero-length write or a non-would-block error is connection-fatal
    /// and reported as `Err`; the caller tears the connection down.
    pub fn flush_available<W: Write>(&mut self, w: &mut W) -> Result<FlushStatus> {
        while let Some(front) = self.chunks.front_mut() {
            match w.write(front) {
                Ok(0) => return Err(ZwireError::ConnectionClosed),
                Ok(n) => {
                    front.advance(n);
                    if front.is_empty() {
                        self.chunks.pop_front();
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(FlushStatus::Pending)
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(FlushStatus::Empty)
    }

    /// Discard everything queued.
    pub fn clear(&mut self) {
        self.chunks.clear();
    }
}
