pub mod file;
pub mod mapped;
pub mod memory;


use std::io;
use std::path::Path;

pub use file::FileSource;
pub use mapped::MappedSource;
pub use memory::MemorySource;

/// What a stream source can do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub readable: bool,
    pub writable: bool,
    pub seekable: bool,
}

/// A seekable byte medium of known length.
///
/// The engine only ever talks to this trait, so a file handle, a mapped file
/// and a plain buffer are interchangeable behind it. Writes never insert:
/// `write_at` overwrites (extending the medium when it runs past the end) and
/// `set_len` truncates or extends.
pub trait StreamSource: Send {
    fn len(&self) -> u64;

    fn capabilities(&self) -> Capabilities;

    /// Read as many bytes as fit in `buf` starting at `offset`.
    /// Returns fewer than `buf.len()` only at end of stream.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;

    fn set_len(&mut self, len: u64) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Backing path, if the medium is a file
    fn path(&self) -> Option<&Path> {
        None
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn can_write(&self) -> bool {
        self.capabilities().writable
    }
}

pub(crate) fn read_only_error() -> io::Error {
    io::Error::new(io::ErrorKind::PermissionDenied, "stream is read-only")
}
