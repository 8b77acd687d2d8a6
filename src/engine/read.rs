use std::io;
use tracing::warn;

use super::Engine;
use crate::edit::{EditKind, EditStore, KindFilter};
use crate::stream::StreamSource;

impl Engine {
    /// Byte a reader sees at `offset` once pending edits are applied.
    ///
    /// `None` means the byte is deleted, out of range, or the stream is
    /// closed or unreadable. Pending insertions are not materialized, so an
    /// `Added` record leaves the raw byte visible.
    pub fn effective_byte(&mut self, offset: u64) -> Option<u8> {
        match self.edits.lookup(offset, KindFilter::Any) {
            Some(record) if record.kind == EditKind::Modified => return record.value,
            Some(record) if record.kind == EditKind::Deleted => return None,
            _ => {}
        }
        self.raw_byte(offset)
    }

    /// Byte stored in the stream at `offset`, ignoring edits
    pub fn raw_byte(&mut self, offset: u64) -> Option<u8> {
        let source = self.source.as_mut()?;
        let mut byte = [0u8; 1];
        match source.read_at(offset, &mut byte) {
            Ok(1) => Some(byte[0]),
            Ok(_) => None,
            Err(e) => {
                warn!(offset, "read failed: {}", e);
                None
            }
        }
    }

    /// Bytes of the inclusive range `[start, end]` (either order).
    ///
    /// With `include_edits`, modified bytes are substituted and deleted bytes
    /// are dropped, so the result can be shorter than the range. Size buffers
    /// from the returned length.
    pub fn effective_range(&mut self, start: u64, end: u64, include_edits: bool) -> Vec<u8> {
        let Some((lo, hi)) = self.clamp_range(start, end) else {
            return Vec::new();
        };
        let Some(source) = self.source.as_mut() else {
            return Vec::new();
        };

        let chunk = self.config.copy_chunk_size as u64;
        let mut out = Vec::with_capacity((hi - lo + 1).min(chunk * 16) as usize);
        let mut chunk_lo = lo;
        while chunk_lo <= hi {
            let chunk_hi = chunk_lo.saturating_add(chunk - 1).min(hi);
            if let Err(e) = compose(
                source.as_mut(),
                &self.edits,
                chunk_lo,
                chunk_hi,
                include_edits,
                &mut out,
            ) {
                warn!(offset = chunk_lo, "range read failed: {}", e);
                break;
            }
            if chunk_hi == u64::MAX {
                break;
            }
            chunk_lo = chunk_hi + 1;
        }
        out
    }

    /// Raw bytes of `[start, end]`
    pub fn raw_range(&mut self, start: u64, end: u64) -> Vec<u8> {
        self.effective_range(start, end, false)
    }
}

/// Append the bytes of `[lo, hi]` to `out`, resolving edits when asked.
pub(crate) fn compose(
    source: &mut dyn StreamSource,
    edits: &EditStore,
    lo: u64,
    hi: u64,
    include_edits: bool,
    out: &mut Vec<u8>,
) -> io::Result<()> {
    let mut raw = vec![0u8; (hi - lo + 1) as usize];
    let mut filled = 0;
    while filled < raw.len() {
        let n = source.read_at(lo + filled as u64, &mut raw[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    raw.truncate(filled);

    if !include_edits {
        out.extend_from_slice(&raw);
        return Ok(());
    }

    let mut cursor = 0;
    for record in edits.in_range(lo, hi) {
        let at = (record.offset - lo) as usize;
        if at >= raw.len() {
            break;
        }
        out.extend_from_slice(&raw[cursor..at]);
        match record.kind {
            EditKind::Modified => out.push(record.value.unwrap_or(raw[at])),
            EditKind::Deleted => {}
            EditKind::Added => out.push(raw[at]),
        }
        cursor = at + 1;
    }
    out.extend_from_slice(&raw[cursor..]);
    Ok(())
}
