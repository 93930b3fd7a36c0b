use crate::error::Result;

/// A duplex byte transport that never blocks.
///
/// Writes and reads are partial: an implementation moves as many bytes as it
/// can right now and reports the count, which may be zero. An `Err` means the
/// call made no progress; callers decide whether to retry.
pub trait Transport {
    /// Whether a write could currently make progress.
    fn can_write(&self) -> bool;

    /// Whether a read could currently make progress.
    fn can_read(&self) -> bool;

    /// Write up to `buf.len()` bytes, returning how many were accepted.
    fn write_some(&mut self, buf: &[u8]) -> Result<usize>;

    /// Read up to `buf.len()` bytes into `buf`, returning how many arrived.
    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn can_write(&self) -> bool {
        (**self).can_write()
    }

    fn can_read(&self) -> bool {
        (**self).can_read()
    }

    fn write_some(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write_some(buf)
    }

    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read_some(buf)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn can_write(&self) -> bool {
        (**self).can_write()
    }

    fn can_read(&self) -> bool {
        (**self).can_read()
    }

    fn write_some(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write_some(buf)
    }

    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read_some(buf)
    }
}
