use tracing::warn;

use super::Engine;
use crate::event::{EngineEvent, LongProcess};

impl Engine {
    /// Lazily scan the raw stream for `needle`, starting at `start`.
    ///
    /// Matches come back in ascending order and never overlap. The iterator
    /// is forward-only; scanning again means calling `find_all` again. Edits
    /// are not applied to the scanned bytes.
    pub fn find_all(&mut self, needle: &[u8], start: u64) -> FindMatches<'_> {
        let pos = start.min(self.len());
        let block = vec![0u8; self.config.find_block_size.max(needle.len())];
        FindMatches {
            engine: self,
            needle: needle.to_vec(),
            pos,
            block,
            block_start: 0,
            filled: 0,
            confirm: vec![0u8; needle.len()],
            started: false,
            done: false,
            cancelled: false,
        }
    }
}

enum Scan {
    Match(u64),
    Continue,
    End,
    Cancelled,
}

/// Iterator returned by [`Engine::find_all`]
pub struct FindMatches<'a> {
    engine: &'a mut Engine,
    needle: Vec<u8>,
    pos: u64,
    /// Raw bytes `[block_start, block_start + filled)` of the stream
    block: Vec<u8>,
    block_start: u64,
    filled: usize,
    confirm: Vec<u8>,
    started: bool,
    done: bool,
    cancelled: bool,
}

impl FindMatches<'_> {
    /// Whether the scan stopped on a cancel request
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    fn scan_block(&mut self) -> Scan {
        let FindMatches {
            engine,
            needle,
            pos,
            block,
            block_start,
            filled,
            confirm,
            ..
        } = self;
        let Engine {
            source,
            progress,
            events,
            ..
        } = &mut **engine;

        let Some(source) = source.as_mut() else {
            return Scan::End;
        };
        let len = source.len();
        if needle.is_empty() || *pos + needle.len() as u64 > len {
            return Scan::End;
        }
        if progress.should_stop() {
            return Scan::Cancelled;
        }

        // Only go back to the source once the loaded block is used up
        if *pos < *block_start || *pos >= *block_start + *filled as u64 {
            match source.read_at(*pos, block) {
                Ok(0) => return Scan::End,
                Ok(n) => {
                    *block_start = *pos;
                    *filled = n;
                }
                Err(e) => {
                    warn!(offset = *pos, "find read failed: {}", e);
                    return Scan::End;
                }
            }
        }

        let from = (*pos - *block_start) as usize;
        let Some(found) = block[from..*filled].iter().position(|&b| b == needle[0]) else {
            *pos = *block_start + *filled as u64;
            progress.step(events, *pos, len);
            return Scan::Continue;
        };

        let i = from + found;
        let candidate = *block_start + i as u64;
        if candidate + needle.len() as u64 > len {
            return Scan::End;
        }
        let matched = if i + needle.len() <= *filled {
            block[i..i + needle.len()] == needle[..]
        } else {
            // Candidate straddles the block edge
            match source.read_at(candidate, confirm) {
                Ok(read) => read == needle.len() && confirm[..] == needle[..],
                Err(e) => {
                    warn!(offset = candidate, "find read failed: {}", e);
                    return Scan::End;
                }
            }
        };

        *pos = if matched {
            candidate + needle.len() as u64
        } else {
            candidate + 1
        };
        progress.step(events, *pos, len);
        if matched {
            Scan::Match(candidate)
        } else {
            Scan::Continue
        }
    }

    fn stop(&mut self, cancelled: bool) {
        self.done = true;
        self.cancelled = cancelled;
        if self.started {
            if cancelled {
                self.engine
                    .events
                    .emit(EngineEvent::ProcessCancelled(LongProcess::Find));
            }
            self.engine.progress.finish();
        }
    }
}

impl Iterator for FindMatches<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            self.engine.progress.begin(LongProcess::Find);
        }
        loop {
            match self.scan_block() {
                Scan::Match(offset) => return Some(offset),
                Scan::Continue => continue,
                Scan::End => {
                    self.stop(false);
                    return None;
                }
                Scan::Cancelled => {
                    self.stop(true);
                    return None;
                }
            }
        }
    }
}

impl Drop for FindMatches<'_> {
    fn drop(&mut self) {
        if self.started && !self.done {
            self.engine.progress.finish();
        }
    }
}
