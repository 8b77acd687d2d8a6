pub mod commit;
pub mod fill;
pub mod find;
pub mod histogram;
pub mod read;

use crossbeam::channel::{Receiver, Sender};
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::edit::{EditKind, EditStore};
use crate::error::{EngineError, Result};
use crate::event::{EngineEvent, EventBus, LongProcess};
use crate::progress::{CancelToken, ProgressController};
use crate::stream::{FileSource, MappedSource, MemorySource, StreamSource};

pub use commit::{CommitOutcome, CommitReport, CommitState, CommitStrategy};
pub use find::FindMatches;

/// What to do when a file can't be opened for writing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOnlyFallback {
    Refuse,
    Accept,
}

/// Length of an inclusive selection `[start, stop]`, in either order.
/// A negative end marks an unset selection.
pub fn selection_len(start: i64, stop: i64) -> u64 {
    if start < 0 || stop < 0 {
        return 0;
    }
    start.abs_diff(stop) + 1
}

/// Edit-tracking view over a byte stream.
///
/// Edits are kept in an [`EditStore`] on top of the untouched stream until
/// [`Engine::commit`] or [`Engine::commit_to`] writes them out. All operations
/// run synchronously on the caller's thread; long ones poll the
/// [`CancelToken`] and publish progress through the event bus.
pub struct Engine {
    source: Option<Box<dyn StreamSource>>,
    edits: EditStore,
    progress: ProgressController,
    events: EventBus,
    config: EngineConfig,
    read_only: bool,
    undo_enabled: bool,
    position: u64,
    commit_state: CommitState,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let config = config.sanitized();
        Self {
            source: None,
            edits: EditStore::new(),
            progress: ProgressController::new(config.progress_interval),
            events: EventBus::new(),
            undo_enabled: config.undo_enabled,
            config,
            read_only: false,
            position: 0,
            commit_state: CommitState::Idle,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open an existing file read-write.
    ///
    /// When the file refuses write access, `fallback` decides between failing
    /// with [`EngineError::Locked`] and opening a read-only mapping instead.
    pub fn open_path(&mut self, path: impl AsRef<Path>, fallback: ReadOnlyFallback) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(EngineError::NotFound(path.to_path_buf()));
        }

        match FileSource::open(path) {
            Ok(source) => {
                self.attach(Box::new(source), false);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => match fallback {
                ReadOnlyFallback::Refuse => Err(EngineError::Locked(path.to_path_buf())),
                ReadOnlyFallback::Accept => {
                    warn!("{} is not writable, opening read-only", path.display());
                    self.open_read_only(path)
                }
            },
            Err(e) => Err(e.into()),
        }
    }

    pub fn open_read_only(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(EngineError::NotFound(path.to_path_buf()));
        }
        let source = MappedSource::open(path)?;
        self.attach(Box::new(source), true);
        Ok(())
    }

    /// Use a caller-supplied buffer as the stream.
    pub fn open_buffer(&mut self, data: Vec<u8>) {
        self.attach(Box::new(MemorySource::new(data)), false);
    }

    /// Use any stream source.
    pub fn open_source(&mut self, source: Box<dyn StreamSource>) {
        self.attach(source, false);
    }

    fn attach(&mut self, source: Box<dyn StreamSource>, read_only: bool) {
        self.close();
        let len = source.len();
        self.read_only = read_only || !source.can_write();
        info!(len, read_only = self.read_only, "stream opened");
        self.source = Some(source);
        self.events.emit(EngineEvent::StreamOpened {
            len,
            read_only: self.read_only,
        });
    }

    /// Release the stream and drop every pending edit.
    pub fn close(&mut self) {
        let source = self.source.take();
        self.edits.clear();
        self.progress.reset();
        self.read_only = false;
        self.position = 0;
        self.commit_state = CommitState::Idle;

        if let Some(mut source) = source {
            if let Err(e) = source.flush() {
                warn!("flush on close failed: {}", e);
            }
            info!("stream closed");
            self.events.emit(EngineEvent::Closed);
        }
    }

    /// Detach the stream and hand it back, dropping pending edits.
    pub fn take_source(&mut self) -> Option<Box<dyn StreamSource>> {
        let mut source = self.source.take()?;
        self.close();
        if let Err(e) = source.flush() {
            warn!("flush on detach failed: {}", e);
        }
        self.events.emit(EngineEvent::Closed);
        Some(source)
    }

    pub fn is_open(&self) -> bool {
        self.source.is_some()
    }

    /// Raw length of the stream, ignoring pending edits
    pub fn len(&self) -> u64 {
        self.source.as_ref().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length the stream will have once pending deletions are committed
    pub fn effective_len(&self) -> u64 {
        let len = self.len();
        if len == 0 {
            return 0;
        }
        let deleted = self
            .edits
            .in_range(0, len - 1)
            .filter(|r| r.kind == EditKind::Deleted)
            .count() as u64;
        len - deleted
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source.as_ref().and_then(|s| s.path())
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Toggle the read-only override. A medium that can't be written stays
    /// read-only.
    pub fn set_read_only(&mut self, read_only: bool) -> Result<()> {
        let source = self.source.as_ref().ok_or(EngineError::NotOpen)?;
        if !read_only && !source.can_write() {
            return Err(EngineError::WriteNotPermitted("medium is not writable"));
        }
        if self.read_only != read_only {
            self.read_only = read_only;
            self.events.emit(EngineEvent::ReadOnlyChanged(read_only));
        }
        Ok(())
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn set_position(&mut self, position: u64) {
        let position = position.min(self.len());
        if position != self.position {
            self.position = position;
            self.events.emit(EngineEvent::PositionChanged(position));
        }
    }

    pub fn edits(&self) -> &EditStore {
        &self.edits
    }

    pub fn has_changes(&self) -> bool {
        !self.edits.is_empty()
    }

    pub fn modify_byte(&mut self, offset: u64, value: u8) {
        self.edits.record_modify(offset, value, 1);
    }

    /// Overwrite one byte as part of a `group_length`-byte user action.
    pub fn modify_byte_grouped(&mut self, offset: u64, value: u8, group_length: u64) {
        self.edits.record_modify(offset, value, group_length);
    }

    pub fn delete_bytes(&mut self, start: u64, length: u64) {
        debug!(start, length, "delete");
        self.edits.record_delete(start, length);
    }

    /// Record an insertion. Commits refuse to run while one is pending.
    pub fn insert_byte(&mut self, offset: u64, value: u8) {
        self.edits.record_insert(offset, value);
    }

    /// Overwrite bytes starting at `offset` as one undoable action, clipped to
    /// the end of the stream. Returns the number of bytes recorded.
    pub fn paste(&mut self, offset: u64, data: &[u8]) -> u64 {
        let len = self.len();
        if offset >= len {
            return 0;
        }
        let count = (data.len() as u64).min(len - offset);
        for (i, &value) in data.iter().take(count as usize).enumerate() {
            self.edits.record_modify(offset + i as u64, value, count);
        }
        self.events.emit(EngineEvent::DataPasted { offset, len: count });
        count
    }

    pub fn undo_enabled(&self) -> bool {
        self.undo_enabled
    }

    pub fn set_undo_enabled(&mut self, enabled: bool) {
        self.undo_enabled = enabled;
    }

    pub fn can_undo(&self) -> bool {
        self.undo_enabled && !self.edits.is_empty()
    }

    /// Revert the most recent action. Returns the offsets it touched.
    pub fn undo(&mut self) -> Vec<u64> {
        if !self.can_undo() {
            return Vec::new();
        }
        let reverted = self.edits.undo();
        debug!(count = reverted.len(), "undo");
        self.events.emit(EngineEvent::EditUndone(reverted.clone()));
        reverted
    }

    /// Bytes of `[start, end]` for a clipboard-style copy.
    pub fn copy(&mut self, start: u64, end: u64, include_edits: bool) -> Vec<u8> {
        let data = self.effective_range(start, end, include_edits);
        self.events.emit(EngineEvent::DataCopied {
            len: data.len() as u64,
        });
        data
    }

    /// Stream `[start, end]` into `writer` one chunk at a time.
    /// Returns the number of bytes written.
    pub fn copy_to_writer<W: Write>(
        &mut self,
        start: u64,
        end: u64,
        include_edits: bool,
        writer: &mut W,
    ) -> Result<u64> {
        let Some((lo, hi)) = self.clamp_range(start, end) else {
            return Ok(0);
        };
        let source = self.source.as_mut().ok_or(EngineError::NotOpen)?;
        let chunk = self.config.copy_chunk_size as u64;

        let mut written = 0u64;
        let mut buf = Vec::with_capacity(self.config.copy_chunk_size);
        let mut chunk_lo = lo;
        while chunk_lo <= hi {
            let chunk_hi = chunk_lo.saturating_add(chunk - 1).min(hi);
            buf.clear();
            read::compose(
                source.as_mut(),
                &self.edits,
                chunk_lo,
                chunk_hi,
                include_edits,
                &mut buf,
            )?;
            writer.write_all(&buf)?;
            written += buf.len() as u64;
            if chunk_hi == u64::MAX {
                break;
            }
            chunk_lo = chunk_hi + 1;
        }
        writer.flush()?;

        self.events.emit(EngineEvent::DataCopiedToStream { len: written });
        Ok(written)
    }

    pub fn subscribe(&mut self) -> Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_with(&mut self, tx: Sender<EngineEvent>) {
        self.events.subscribe_with(tx);
    }

    /// Handle that stops the running long process from any thread
    pub fn cancel_token(&self) -> CancelToken {
        self.progress.token()
    }

    pub fn in_long_process(&self) -> bool {
        self.progress.in_long_process()
    }

    pub fn long_process(&self) -> Option<LongProcess> {
        self.progress.process()
    }

    /// Fraction of the current (or last) long process
    pub fn progress(&self) -> f64 {
        self.progress.progress()
    }

    pub fn commit_state(&self) -> CommitState {
        self.commit_state
    }

    /// Normalize an inclusive range to `(lo, hi)` inside the stream.
    fn clamp_range(&self, start: u64, end: u64) -> Option<(u64, u64)> {
        let len = self.len();
        if !self.is_open() || len == 0 {
            return None;
        }
        let lo = start.min(end);
        let hi = start.max(end).min(len - 1);
        (lo <= hi).then_some((lo, hi))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
