use tracing::{debug, warn};

use super::Engine;
use crate::edit::{EditKind, KindFilter};
use crate::event::{EngineEvent, LongProcess};
use crate::progress::Outcome;

impl Engine {
    /// Set every byte of `[start, start + length)` to `value`.
    ///
    /// Bytes that already read as `value` are left alone, deleted bytes are
    /// skipped, and the recorded edits undo as one action. Returns how many
    /// edits were recorded. A closed stream records nothing.
    pub fn fill(&mut self, start: u64, length: u64, value: u8) -> Outcome<u64> {
        self.overwrite_where(LongProcess::Fill, start, length, value, |current| current != value)
    }

    /// Turn every `original` byte of `[start, start + length)` into
    /// `replacement`, with the same rules as [`Engine::fill`].
    pub fn replace(
        &mut self,
        start: u64,
        length: u64,
        original: u8,
        replacement: u8,
    ) -> Outcome<u64> {
        self.overwrite_where(LongProcess::Replace, start, length, replacement, |current| {
            current == original
        })
    }

    fn overwrite_where(
        &mut self,
        process: LongProcess,
        start: u64,
        length: u64,
        value: u8,
        should_write: impl Fn(u8) -> bool,
    ) -> Outcome<u64> {
        let len = self.len();
        let end = start.saturating_add(length).min(len);
        if !self.is_open() || start >= end {
            return Outcome::Completed(0);
        }

        debug!(?process, start, end, "overwrite started");
        self.progress.begin(process);
        let mut block = vec![0u8; self.config.copy_chunk_size];
        let mut recorded = 0u64;
        let mut cancelled = false;
        let mut pos = start;

        while pos < end {
            if self.progress.should_stop() {
                cancelled = true;
                break;
            }
            let Some(source) = self.source.as_mut() else {
                break;
            };
            let want = (end - pos).min(block.len() as u64) as usize;
            let n = match source.read_at(pos, &mut block[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!(offset = pos, "read failed: {}", e);
                    break;
                }
            };

            for (i, &raw) in block[..n].iter().enumerate() {
                let offset = pos + i as u64;
                let current = match self.edits.lookup(offset, KindFilter::Any) {
                    Some(record) if record.kind == EditKind::Deleted => continue,
                    Some(record) if record.kind == EditKind::Modified => {
                        record.value.unwrap_or(raw)
                    }
                    _ => raw,
                };
                if should_write(current) {
                    self.edits.record_modify(offset, value, 1);
                    recorded += 1;
                }
            }
            pos += n as u64;
            self.progress.step(&mut self.events, pos - start, end - start);
        }

        if recorded > 0 {
            self.edits.regroup_tail(recorded as usize);
        }
        self.progress.finish();

        if cancelled {
            self.events.emit(EngineEvent::ProcessCancelled(process));
            return Outcome::Cancelled(recorded);
        }
        let completed = match process {
            LongProcess::Replace => EngineEvent::ReplaceCompleted { edits: recorded },
            _ => EngineEvent::FillCompleted { edits: recorded },
        };
        self.events.emit(completed);
        Outcome::Completed(recorded)
    }
}
