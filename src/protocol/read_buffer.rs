//! Read buffer for accumulating partial frames.
//!
//! The dispatcher pulls bytes from a non-blocking socket in two phases
//! (header, then body); short reads leave the cursor where it stopped and
//! the buffer picks up on the next readiness event. Storage is a single
//! `BytesMut`: completed frames are split off and frozen, so the payload
//! handed to a handler shares the buffer instead of copying. The buffer
//! starts at [`MAX_PACKET_SIZE`](super::MAX_PACKET_SIZE) and grows when a
//! frame declares a larger length, keeping the bytes already read.

use std::io::{self, Read};

use bytes::{Bytes, BytesMut};

use crate::error::Result;

use super::wire_format::MAX_PACKET_SIZE;

/// Outcome of one non-blocking fill attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `k` bytes arrived, `0 < k ≤ requested`.
    Data(usize),
    /// The socket had nothing ready; re-arm and try later.
    WouldBlock,
    /// The peer closed the connection.
    Closed,
}

/// Accumulates inbound bytes until a full frame is present.
#[derive(Debug)]
pub struct ReadBuffer {
    buf: BytesMut,
    /// Largest frame the buffer currently admits.
    limit: usize,
}

impl ReadBuffer {
    /// Create a buffer with the default packet capacity.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(MAX_PACKET_SIZE),
            limit: MAX_PACKET_SIZE,
        }
    }

    /// Current capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.limit
    }

    /// Bytes received for the current frame.
    #[inline]
    pub fn written(&self) -> usize {
        self.buf.len()
    }

    /// Received bytes of the current frame.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Attempt to read up to `want` more bytes from `r`.
    ///
    /// Performs a single read; a result shorter than `want` is normal and
    /// simply leaves the frame incomplete. `Ok(0)` from the reader maps to
    /// [`ReadOutcome::Closed`], would-block to [`ReadOutcome::WouldBlock`];
    /// other I/O errors propagate and are connection-fatal to the caller.
    pub fn fill_from<R: Read>(&mut self, r: &mut R, want: usize) -> Result<ReadOutcome> {
        debug_assert!(self.buf.len() + want <= self.limit);
        let start = self.buf.len();
        self.buf.resize(start + want, 0);
        loop {
            match r.read(&mut self.buf[start..]) {
                Ok(0) => {
                    self.buf.truncate(start);
                    return Ok(ReadOutcome::Closed);
                }
                Ok(n) => {
                    self.buf.truncate(start + n);
                    return Ok(ReadOutcome::Data(n));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.buf.truncate(start);
                    return Ok(ReadOutcome::WouldBlock);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buf.truncate(start);
                    return Err(e.into());
                }
            }
        }
    }

    /// Grow the buffer so a frame of `frame_len` bytes fits, keeping the
    /// bytes already read (the header included).
    pub fn ensure_capacity(&mut self, frame_len: usize) {
        if frame_len <= self.limit {
            return;
        }
        self.buf.reserve(frame_len - self.buf.len());
        self.limit = frame_len;
    }

    /// Split off a completed frame without copying.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `frame_len` bytes have been received.
    pub fn take_frame(&mut self, frame_len: usize) -> Bytes {
        self.buf.split_to(frame_len).freeze()
    }

    /// Discard the current frame; the next fill starts a new one.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

impl Default for ReadBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reader that yields scripted results.
    struct Script {
        steps: Vec<io::Result<Vec<u8>>>,
    }

    impl Script {
        fn new(steps: Vec<io::Result<Vec<u8>>>) -> Self {
            let mut steps = steps;
            steps.reverse();
            Self { steps }
        }
    }

    impl Read for Script {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop() {
                Some(Ok(data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn test_fill_accumulates_across_short_reads() {
        let mut rb = ReadBuffer::new();
        let mut r = Script::new(vec![Ok(vec![1, 2, 3]), Ok(vec![4, 5])]);

        assert_eq!(rb.fill_from(&mut r, 5).unwrap(), ReadOutcome::Data(3));
        assert_eq!(rb.written(), 3);
        assert_eq!(rb.fill_from(&mut r, 2).unwrap(), ReadOutcome::Data(2));
        assert_eq!(rb.as_slice(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_fill_translates_would_block() {
        let mut rb = ReadBuffer::new();
        let mut r = Script::new(vec![Err(io::Error::from(io::ErrorKind::WouldBlock))]);

        assert_eq!(rb.fill_from(&mut r, 6).unwrap(), ReadOutcome::WouldBlock);
        assert_eq!(rb.written(), 0);
    }

    #[test]
    fn test_fill_translates_eof_to_closed() {
        let mut rb = ReadBuffer::new();
        let mut r = Script::new(vec![]);

        assert_eq!(rb.fill_from(&mut r, 6).unwrap(), ReadOutcome::Closed);
    }

    #[test]
    fn test_fill_retries_interrupted() {
        let mut rb = ReadBuffer::new();
        let mut r = Script::new(vec![
            Err(io::Error::from(io::ErrorKind::Interrupted)),
            Ok(vec![9]),
        ]);

        assert_eq!(rb.fill_from(&mut r, 1).unwrap(), ReadOutcome::Data(1));
        assert_eq!(rb.as_slice(), &[9]);
    }

    #[test]
    fn test_fill_propagates_fatal_errors() {
        let mut rb = ReadBuffer::new();
        let mut r = Script::new(vec![Err(io::Error::from(io::ErrorKind::ConnectionReset))]);

        assert!(rb.fill_from(&mut r, 6).is_err());
    }

    #[test]
    fn test_take_frame_is_zero_copy() {
        let mut rb = ReadBuffer::new();
        let mut r = Script::new(vec![Ok(vec![1, 2, 3, 4, 5, 6])]);
        rb.fill_from(&mut r, 6).unwrap();
        let start = rb.as_slice().as_ptr();

        let frame = rb.take_frame(6);
        assert_eq!(&frame[..], &[1, 2, 3, 4, 5, 6]);
        // The frozen frame shares the buffer's memory.
        assert_eq!(frame.as_ptr(), start);
        assert_eq!(rb.written(), 0);
    }

    #[test]
    fn test_fill_continues_after_take_frame() {
        let mut rb = ReadBuffer::new();
        let mut r = Script::new(vec![Ok(vec![0xAA; 4]), Ok(vec![0xBB; 3])]);

        rb.fill_from(&mut r, 4).unwrap();
        let first = rb.take_frame(4);
        assert_eq!(&first[..], &[0xAA; 4]);

        rb.fill_from(&mut r, 3).unwrap();
        assert_eq!(rb.as_slice(), &[0xBB; 3]);
    }

    #[test]
    fn test_grow_preserves_read_bytes() {
        let mut rb = ReadBuffer::new();
        let mut r = Script::new(vec![Ok(vec![0xAA; 6])]);
        rb.fill_from(&mut r, 6).unwrap();

        rb.ensure_capacity(2 * MAX_PACKET_SIZE);
        assert_eq!(rb.capacity(), 2 * MAX_PACKET_SIZE);
        assert_eq!(rb.as_slice(), &[0xAA; 6]);
    }

    #[test]
    fn test_grow_is_noop_when_frame_fits() {
        let mut rb = ReadBuffer::new();
        rb.ensure_capacity(100);
        assert_eq!(rb.capacity(), MAX_PACKET_SIZE);
    }

    #[test]
    fn test_oversized_frame_fills_after_grow() {
        let big = MAX_PACKET_SIZE + 512;
        let mut rb = ReadBuffer::new();
        let mut r = Script::new(vec![Ok(vec![0xCC; big])]);

        rb.ensure_capacity(big);
        assert_eq!(rb.fill_from(&mut r, big).unwrap(), ReadOutcome::Data(big));
        assert_eq!(rb.take_frame(big).len(), big);
    }

    #[test]
    fn test_reset_zeroes_cursor() {
        let mut rb = ReadBuffer::new();
        let mut r = Script::new(vec![Ok(vec![1, 2, 3])]);
        rb.fill_from(&mut r, 3).unwrap();

        rb.reset();
        assert_eq!(rb.written(), 0);
        assert!(rb.as_slice().is_empty());
    }
}
