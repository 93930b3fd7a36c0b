use std::io::{ErrorKind, Read, Write};

use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Adapts a non-blocking `Read + Write` stream to [`Transport`].
///
/// `WouldBlock` and `Interrupted` become zero-byte transfers. A byte stream
/// cannot be probed for readiness without consuming data, so both probes
/// report `true` until the peer closes the stream; the engine then simply
/// sees short counts.
#[derive(Debug)]
pub struct StreamTransport<S> {
    inner: S,
    closed: bool,
}

impl<S: Read + Write> StreamTransport<S> {
    /// Wrap a stream that is already in non-blocking mode.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    /// Whether the peer has closed the stream.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consume the transport and return the inner stream.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn mark_closed(&mut self) -> TransportError {
        if !self.closed {
            debug!("stream closed by peer");
            self.closed = true;
        }
        TransportError::Closed
    }
}

impl<S: Read + Write> Transport for StreamTransport<S> {
    fn can_write(&self) -> bool {
        !self.closed
    }

    fn can_read(&self) -> bool {
        !self.closed
    }

    fn write_some(&mut self, buf: &[u8]) -> Result<usize> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        match self.inner.write(buf) {
            Ok(0) => Err(self.mark_closed()),
            Ok(n) => {
                trace!(requested = buf.len(), written = n, "stream write");
                Ok(n)
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                Ok(0)
            }
            Err(err) if err.kind() == ErrorKind::BrokenPipe => Err(self.mark_closed()),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        match self.inner.read(buf) {
            Ok(0) => Err(self.mark_closed()),
            Ok(n) => {
                trace!(requested = buf.len(), read = n, "stream read");
                Ok(n)
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                Ok(0)
            }
            Err(err) => Err(TransportError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    struct WouldBlockStream;

    impl Read for WouldBlockStream {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }
    }

    impl Write for WouldBlockStream {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn would_block_is_zero_progress() {
        let mut t = StreamTransport::new(WouldBlockStream);
        let mut buf = [0u8; 4];
        assert_eq!(t.write_some(b"data").unwrap(), 0);
        assert_eq!(t.read_some(&mut buf).unwrap(), 0);
        assert!(!t.is_closed());
    }

    #[test]
    fn eof_marks_closed() {
        let mut t = StreamTransport::new(Cursor::new(Vec::<u8>::new()));
        let mut buf = [0u8; 4];
        assert!(matches!(t.read_some(&mut buf), Err(TransportError::Closed)));
        assert!(t.is_closed());
        assert!(!t.can_read());
        assert!(!t.can_write());
    }

    #[test]
    fn reads_and_writes_pass_through() {
        let mut t = StreamTransport::new(Cursor::new(b"wire".to_vec()));
        let mut buf = [0u8; 2];
        assert_eq!(t.read_some(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"wi");

        assert_eq!(t.write_some(b"XY").unwrap(), 2);
        assert_eq!(t.into_inner().into_inner(), b"wiXY".to_vec());
    }

    #[test]
    #[cfg(unix)]
    fn nonblocking_socket_pair_roundtrip() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        left.set_nonblocking(true).unwrap();
        right.set_nonblocking(true).unwrap();

        let mut a = StreamTransport::new(left);
        let mut b = StreamTransport::new(right);

        let mut buf = [0u8; 8];
        assert_eq!(b.read_some(&mut buf).unwrap(), 0);

        assert_eq!(a.write_some(b"hello").unwrap(), 5);
        let n = b.read_some(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }
}
