//! Stream-socket transport to the route manager.
//!
//! The manager listens on a UNIX stream socket by default, or on loopback
//! TCP at the well-known port for deployments without a shared filesystem.
//! The endpoint is fixed at handle construction; path overrides are
//! validated up front so a typo shows up at configuration time, not on
//! the first connect attempt.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use crate::error::{Result, ZwireError};

/// Compiled-in default location of the manager's UNIX socket.
pub const DEFAULT_SERV_PATH: &str = "/var/run/zwire/zserv.api";

/// Well-known loopback TCP port of the route manager.
pub const TCP_PORT: u16 = 2600;

/// Where to find the route manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// UNIX stream socket at the given filesystem path.
    Unix(PathBuf),
    /// TCP to the given address (normally loopback).
    Tcp(SocketAddr),
}

impl Endpoint {
    /// Loopback TCP endpoint on the well-known port.
    pub fn tcp_loopback() -> Self {
        Endpoint::Tcp(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::LOCALHOST,
            TCP_PORT,
        )))
    }

    /// UNIX endpoint at `path`, validated to exist and be a socket file.
    ///
    /// On rejection the caller keeps whatever endpoint it had; a warning
    /// is logged so an operator can spot the bad override.
    pub fn unix_checked<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let meta = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!("server socket `{}` does not exist", path.display());
                return Err(e.into());
            }
        };
        if !meta.file_type().is_socket() {
            tracing::warn!("`{}` is not a unix socket", path.display());
            return Err(ZwireError::NotASocket(path.to_path_buf()));
        }
        Ok(Endpoint::Unix(path.to_path_buf()))
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Unix(PathBuf::from(DEFAULT_SERV_PATH))
    }
}

enum Stream {
    Unix(UnixStream),
    Tcp(TcpStream),
}

/// A connected stream to the route manager.
pub struct Transport {
    stream: Stream,
}

impl Transport {
    /// Connect to `endpoint`.
    ///
    /// The socket is left in blocking mode; the caller switches it to
    /// non-blocking once it is registered with a reactor. The lookup
    /// sub-mode keeps it blocking for synchronous request/reply use.
    pub fn connect(endpoint: &Endpoint) -> io::Result<Self> {
        let stream = match endpoint {
            Endpoint::Unix(path) => Stream::Unix(UnixStream::connect(path)?),
            Endpoint::Tcp(addr) => Stream::Tcp(TcpStream::connect(addr)?),
        };
        Ok(Self { stream })
    }

    /// Toggle non-blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        match &self.stream {
            Stream::Unix(s) => s.set_nonblocking(nonblocking),
            Stream::Tcp(s) => s.set_nonblocking(nonblocking),
        }
    }
}

impl AsRawFd for Transport {
    fn as_raw_fd(&self) -> RawFd {
        match &self.stream {
            Stream::Unix(s) => s.as_raw_fd(),
            Stream::Tcp(s) => s.as_raw_fd(),
        }
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.stream {
            Stream::Unix(s) => s.read(buf),
            Stream::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.stream {
            Stream::Unix(s) => s.write(buf),
            Stream::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.stream {
            Stream::Unix(s) => s.flush(),
            Stream::Tcp(s) => s.flush(),
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("fd", &self.as_raw_fd())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    #[test]
    fn test_default_endpoint_is_unix() {
        assert_eq!(
            Endpoint::default(),
            Endpoint::Unix(PathBuf::from(DEFAULT_SERV_PATH))
        );
    }

    #[test]
    fn test_tcp_loopback_uses_well_known_port() {
        let Endpoint::Tcp(addr) = Endpoint::tcp_loopback() else {
            panic!("expected tcp endpoint");
        };
        assert_eq!(addr.port(), TCP_PORT);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn test_unix_checked_rejects_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such.sock");
        assert!(Endpoint::unix_checked(&missing).is_err());
    }

    #[test]
    fn test_unix_checked_rejects_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, b"not a socket").unwrap();

        match Endpoint::unix_checked(&file) {
            Err(ZwireError::NotASocket(p)) => assert_eq!(p, file),
            other => panic!("expected NotASocket, got {other:?}"),
        }
    }

    #[test]
    fn test_unix_checked_accepts_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zserv.sock");
        let _listener = UnixListener::bind(&path).unwrap();

        assert_eq!(
            Endpoint::unix_checked(&path).unwrap(),
            Endpoint::Unix(path)
        );
    }

    #[test]
    fn test_connect_and_roundtrip_unix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zserv.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let mut client = Transport::connect(&Endpoint::Unix(path)).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        client.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn test_connect_and_roundtrip_tcp() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = Transport::connect(&Endpoint::Tcp(addr)).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        client.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn test_connect_refused_surfaces_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.sock");
        assert!(Transport::connect(&Endpoint::Unix(path)).is_err());
    }

    #[test]
    fn test_nonblocking_read_would_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zserv.sock");
        let _listener = UnixListener::bind(&path).unwrap();

        let mut client = Transport::connect(&Endpoint::Unix(path)).unwrap();
        client.set_nonblocking(true).unwrap();

        let mut buf = [0u8; 8];
        let err = client.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }
}
