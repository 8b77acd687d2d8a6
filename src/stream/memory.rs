use std::io;

use super::{read_only_error, Capabilities, StreamSource};

/// Caller-supplied buffer used as a stream
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Vec<u8>,
    writable: bool,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, writable: true }
    }

    pub fn read_only(data: Vec<u8>) -> Self {
        Self { data, writable: false }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl StreamSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            readable: true,
            writable: self.writable,
            seekable: true,
        }
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.data.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        if !self.writable {
            return Err(read_only_error());
        }
        let start = offset as usize;
        let end = start + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        if !self.writable {
            return Err(read_only_error());
        }
        self.data.resize(len as usize, 0);
        Ok(())
    }
}
