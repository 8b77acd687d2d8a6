use tracing::warn;

use super::Engine;
use crate::event::{EngineEvent, LongProcess};

impl Engine {
    /// Count occurrences of every byte value in the raw stream.
    ///
    /// Returns `None` when no stream is open, a read fails, or the scan is
    /// cancelled. Pending edits are not counted; commit first for post-edit
    /// figures.
    pub fn byte_histogram(&mut self) -> Option<[u64; 256]> {
        let len = self.source.as_ref()?.len();
        self.progress.begin(LongProcess::Histogram);

        let mut counts = [0u64; 256];
        let mut block = vec![0u8; self.config.histogram_block_size];
        let mut pos = 0u64;
        let result = loop {
            if pos >= len {
                break Some(counts);
            }
            if self.progress.should_stop() {
                self.events
                    .emit(EngineEvent::ProcessCancelled(LongProcess::Histogram));
                break None;
            }
            let Some(source) = self.source.as_mut() else {
                break None;
            };
            match source.read_at(pos, &mut block) {
                Ok(0) => break Some(counts),
                Ok(n) => {
                    for &byte in &block[..n] {
                        counts[byte as usize] += 1;
                    }
                    pos += n as u64;
                }
                Err(e) => {
                    warn!(offset = pos, "histogram read failed: {}", e);
                    break None;
                }
            }
            self.progress.step(&mut self.events, pos, len);
        };

        self.progress.finish();
        result
    }
}
