use memmap2::Mmap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use super::{read_only_error, Capabilities, StreamSource};

/// Read-only memory mapping of a file.
///
/// Used when a file can't be opened for writing (locked, or permissions) and
/// the caller accepted read-only access.
#[derive(Debug)]
pub struct MappedSource {
    // Empty files can't be mapped on every platform, so they have no map.
    map: Option<Mmap>,
    path: PathBuf,
}

impl MappedSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let map = if file.metadata()?.len() == 0 {
            None
        } else {
            // SAFETY: the map is only read through; a concurrent truncation by
            // another process is outside what the engine can defend against.
            Some(unsafe { Mmap::map(&file)? })
        };
        Ok(Self {
            map,
            path: path.to_path_buf(),
        })
    }

    fn bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }
}

impl StreamSource for MappedSource {
    fn len(&self) -> u64 {
        self.bytes().len() as u64
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            readable: true,
            writable: false,
            seekable: true,
        }
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let bytes = self.bytes();
        if offset >= bytes.len() as u64 {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(bytes.len() - start);
        buf[..n].copy_from_slice(&bytes[start..start + n]);
        Ok(n)
    }

    fn write_at(&mut self, _offset: u64, _data: &[u8]) -> io::Result<()> {
        Err(read_only_error())
    }

    fn set_len(&mut self, _len: u64) -> io::Result<()> {
        Err(read_only_error())
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}
