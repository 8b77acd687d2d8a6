use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::Engine;
use crate::edit::{EditKind, EditRecord, KindFilter};
use crate::error::{EngineError, Result};
use crate::event::{EngineEvent, EventBus, LongProcess};
use crate::progress::ProgressController;
use crate::stream::{FileSource, StreamSource};

/// How a commit writes pending edits out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStrategy {
    /// Overwrite modified bytes where they are
    InPlace,
    /// Rewrite the whole stream in offset order
    Rebuild,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub strategy: CommitStrategy,
    pub edits_applied: usize,
    pub new_len: u64,
    /// Set when the commit wrote to a new path
    pub destination: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Completed(CommitReport),
    /// Stopped on a cancel request; the stream is unchanged
    Cancelled,
    /// Save-as target exists and overwriting wasn't allowed; nothing was done
    DestinationExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitState {
    #[default]
    Idle,
    InProgress,
    Completed,
    Cancelled,
}

impl Engine {
    /// Make every pending edit permanent in the open stream.
    ///
    /// Modify-only edit sets are written in place; any deletion forces a full
    /// rebuild. Only the rebuild honours cancellation, and it touches the
    /// stream only after the rebuilt content is complete.
    pub fn commit(&mut self) -> Result<CommitOutcome> {
        let source = self
            .source
            .as_ref()
            .ok_or(EngineError::WriteNotPermitted("no stream is open"))?;
        if self.read_only || !source.can_write() {
            return Err(EngineError::WriteNotPermitted("stream is read-only"));
        }
        self.reject_insertions()?;

        let strategy = if self.edits.count(EditKind::Deleted) == 0 {
            CommitStrategy::InPlace
        } else {
            CommitStrategy::Rebuild
        };
        self.run_commit(strategy, None)
    }

    /// Write the edited content to `path` and continue on that file.
    ///
    /// An existing `path` is only replaced when `overwrite` is set; otherwise
    /// the call returns [`CommitOutcome::DestinationExists`] and changes
    /// nothing. The source itself may be read-only.
    pub fn commit_to(&mut self, path: impl AsRef<Path>, overwrite: bool) -> Result<CommitOutcome> {
        let path = path.as_ref();
        let source = self
            .source
            .as_ref()
            .ok_or(EngineError::WriteNotPermitted("no stream is open"))?;

        if let Some(current) = source.path() {
            if same_file(current, path) {
                return self.commit();
            }
        }
        if path.exists() && !overwrite {
            info!("{} exists, commit not performed", path.display());
            return Ok(CommitOutcome::DestinationExists);
        }
        self.reject_insertions()?;
        self.run_commit(CommitStrategy::Rebuild, Some(path.to_path_buf()))
    }

    fn reject_insertions(&self) -> Result<()> {
        match self.edits.by_kind(EditKind::Added).first() {
            Some(record) => Err(EngineError::InsertionUnsupported(record.offset)),
            None => Ok(()),
        }
    }

    fn run_commit(
        &mut self,
        strategy: CommitStrategy,
        destination: Option<PathBuf>,
    ) -> Result<CommitOutcome> {
        info!(?strategy, edits = self.edits.len(), "commit started");
        self.commit_state = CommitState::InProgress;
        self.progress.begin(LongProcess::Commit);
        self.events.emit(EngineEvent::CommitStarted(strategy));

        let result = match strategy {
            CommitStrategy::InPlace => self.write_in_place(),
            CommitStrategy::Rebuild => self.rebuild(destination.as_deref()),
        };
        self.progress.finish();
        self.conclude_commit(result)
    }

    /// Move out of `InProgress` and publish the terminal event, whatever the
    /// result. A save-as whose file was written but can't be reopened still
    /// completes; the old stream stays open with its edits and the reopen
    /// error is returned.
    fn conclude_commit(&mut self, result: Result<Option<CommitReport>>) -> Result<CommitOutcome> {
        match result {
            Ok(Some(report)) => {
                let reopened = match &report.destination {
                    Some(path) => match FileSource::open(path) {
                        Ok(source) => {
                            self.attach(Box::new(source), false);
                            Ok(())
                        }
                        Err(e) => {
                            warn!("reopening {} failed: {}", path.display(), e);
                            Err(EngineError::from(e))
                        }
                    },
                    None => {
                        self.edits.clear();
                        Ok(())
                    }
                };
                info!(new_len = report.new_len, "commit completed");
                self.commit_state = CommitState::Completed;
                self.events.emit(EngineEvent::CommitCompleted(report.clone()));
                reopened.map(|()| CommitOutcome::Completed(report))
            }
            Ok(None) => {
                info!("commit cancelled");
                self.commit_state = CommitState::Cancelled;
                self.events.emit(EngineEvent::CommitCancelled);
                Ok(CommitOutcome::Cancelled)
            }
            Err(e) => {
                self.commit_state = CommitState::Cancelled;
                self.events.emit(EngineEvent::CommitCancelled);
                Err(e)
            }
        }
    }

    /// Fast path: overwrite modified bytes, coalescing adjacent offsets into
    /// one write. Runs to completion once started.
    fn write_in_place(&mut self) -> Result<Option<CommitReport>> {
        if self.progress.should_stop() {
            return Ok(None);
        }
        let source = self.source.as_mut().ok_or(EngineError::NotOpen)?;
        let modified = self.edits.by_kind(EditKind::Modified);
        let total = modified.len() as u64;

        let mut run: Vec<u8> = Vec::new();
        let mut run_start = 0u64;
        for (i, record) in modified.iter().enumerate() {
            let Some(value) = record.value else { continue };
            if !run.is_empty() && record.offset != run_start + run.len() as u64 {
                source.write_at(run_start, &run)?;
                run.clear();
            }
            if run.is_empty() {
                run_start = record.offset;
            }
            run.push(value);
            self.progress.step(&mut self.events, i as u64 + 1, total);
        }
        if !run.is_empty() {
            source.write_at(run_start, &run)?;
        }
        source.flush()?;

        Ok(Some(CommitReport {
            strategy: CommitStrategy::InPlace,
            edits_applied: modified.len(),
            new_len: source.len(),
            destination: None,
        }))
    }

    /// Rebuild path: stream original bytes and edits, in offset order, into a
    /// scratch destination, then swap it in.
    fn rebuild(&mut self, destination: Option<&Path>) -> Result<Option<CommitReport>> {
        let source = self.source.as_mut().ok_or(EngineError::NotOpen)?;
        let src_len = source.len();
        let records: Vec<EditRecord> = self
            .edits
            .by_kind(KindFilter::Any)
            .into_iter()
            .filter(|r| !(r.kind == EditKind::Deleted && r.offset >= src_len))
            .collect();
        let total = records.len() as u64;

        // Keep the temp file on the target's file system
        let scratch_dir = match destination {
            Some(path) => path.parent(),
            None => source.path().and_then(Path::parent),
        }
        .filter(|dir| !dir.as_os_str().is_empty());
        let mut out = Scratch::new(src_len, self.config.memory_threshold, scratch_dir)?;
        let mut chunk = vec![0u8; self.config.copy_chunk_size];
        let mut cursor = 0u64;

        for (i, record) in records.iter().enumerate() {
            if self.progress.should_stop() {
                return Ok(None);
            }
            let (from, to) = (cursor, record.offset);
            if !copy_forward(source.as_mut(), &mut out, &mut chunk, from, to, &self.progress)? {
                return Ok(None);
            }
            match record.kind {
                EditKind::Modified => {
                    if let Some(value) = record.value {
                        out.write(&[value])?;
                    }
                    cursor = record.offset + 1;
                }
                EditKind::Deleted => cursor = record.offset + 1,
                // Rejected before a commit starts
                EditKind::Added => cursor = record.offset,
            }
            self.progress.step(&mut self.events, i as u64 + 1, total);
        }
        if !copy_forward(source.as_mut(), &mut out, &mut chunk, cursor, src_len, &self.progress)? {
            return Ok(None);
        }

        let new_len = out.len();
        debug!(new_len, scratch = out.kind(), "rebuild complete, swapping");
        match destination {
            Some(path) => {
                out.save_as(path, &mut chunk, &mut self.progress, &mut self.events)?;
            }
            None => {
                out.copy_into(source.as_mut(), &mut chunk, &mut self.progress, &mut self.events)?;
                source.set_len(new_len)?;
                source.flush()?;
            }
        }

        Ok(Some(CommitReport {
            strategy: CommitStrategy::Rebuild,
            edits_applied: records.len(),
            new_len,
            destination: destination.map(Path::to_path_buf),
        }))
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Copy raw bytes `[from, to)` of `source` into `out`, zero-filling anything
/// past the end of the source. Returns `false` if cancelled.
fn copy_forward(
    source: &mut dyn StreamSource,
    out: &mut Scratch,
    chunk: &mut [u8],
    from: u64,
    to: u64,
    progress: &ProgressController,
) -> io::Result<bool> {
    let src_len = source.len();
    let mut pos = from;
    while pos < to {
        if progress.should_stop() {
            return Ok(false);
        }
        let want = (to - pos).min(chunk.len() as u64) as usize;
        if pos >= src_len {
            chunk[..want].fill(0);
            out.write(&chunk[..want])?;
            pos += want as u64;
            continue;
        }
        let want = want.min((src_len - pos) as usize);
        let n = source.read_at(pos, &mut chunk[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ended at {} before its reported length {}", pos, src_len),
            ));
        }
        out.write(&chunk[..n])?;
        pos += n as u64;
    }
    Ok(true)
}

/// Where a rebuild collects its output before the swap.
///
/// Small outputs stay in memory; anything above the threshold goes to a
/// temporary file so a huge stream never exists twice in memory. Dropping a
/// `Scratch` releases the temporary file.
enum Scratch {
    Memory(Vec<u8>),
    Temp { file: BufWriter<NamedTempFile>, len: u64 },
}

impl Scratch {
    fn new(expected_len: u64, threshold: u64, dir: Option<&Path>) -> io::Result<Self> {
        if expected_len <= threshold {
            return Ok(Scratch::Memory(Vec::with_capacity(expected_len as usize)));
        }
        let temp = match dir {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };
        Ok(Scratch::Temp {
            file: BufWriter::new(temp),
            len: 0,
        })
    }

    fn kind(&self) -> &'static str {
        match self {
            Scratch::Memory(_) => "memory",
            Scratch::Temp { .. } => "tempfile",
        }
    }

    fn len(&self) -> u64 {
        match self {
            Scratch::Memory(buf) => buf.len() as u64,
            Scratch::Temp { len, .. } => *len,
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Scratch::Memory(buf) => buf.extend_from_slice(data),
            Scratch::Temp { file, len } => {
                file.write_all(data)?;
                *len += data.len() as u64;
            }
        }
        Ok(())
    }

    /// Overwrite `target` from offset 0 with the scratch content.
    fn copy_into(
        self,
        target: &mut dyn StreamSource,
        chunk: &mut [u8],
        progress: &mut ProgressController,
        events: &mut EventBus,
    ) -> io::Result<()> {
        let total = self.len();
        match self {
            Scratch::Memory(buf) => {
                let mut written = 0u64;
                for piece in buf.chunks(chunk.len()) {
                    target.write_at(written, piece)?;
                    written += piece.len() as u64;
                    progress.step(events, written, total);
                }
            }
            Scratch::Temp { file, .. } => {
                let mut temp = file.into_inner().map_err(|e| e.into_error())?;
                let reader = temp.as_file_mut();
                reader.seek(SeekFrom::Start(0))?;
                let mut written = 0u64;
                loop {
                    let n = reader.read(chunk)?;
                    if n == 0 {
                        break;
                    }
                    target.write_at(written, &chunk[..n])?;
                    written += n as u64;
                    progress.step(events, written, total);
                }
            }
        }
        Ok(())
    }

    /// Create (or replace) `path` with the scratch content.
    fn save_as(
        self,
        path: &Path,
        chunk: &mut [u8],
        progress: &mut ProgressController,
        events: &mut EventBus,
    ) -> io::Result<()> {
        let total = self.len();
        match self {
            Scratch::Memory(buf) => {
                let mut file = File::create(path)?;
                file.set_len(total)?;
                let mut written = 0u64;
                for piece in buf.chunks(chunk.len()) {
                    file.write_all(piece)?;
                    written += piece.len() as u64;
                    progress.step(events, written, total);
                }
                file.sync_all()?;
            }
            Scratch::Temp { file, .. } => {
                let temp = file.into_inner().map_err(|e| e.into_error())?;
                temp.as_file().sync_all()?;
                if path.exists() {
                    fs::remove_file(path)?;
                }
                // Clones the blocks on copy-on-write file systems
                reflink_copy::reflink_or_copy(temp.path(), path)?;
                progress.step(events, total, total);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn small_chunks() -> EngineConfig {
        EngineConfig {
            copy_chunk_size: 2,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_fast_path_for_modify_only() {
        let mut engine = Engine::new();
        engine.open_buffer(vec![0; 4]);
        engine.modify_byte(3, 1);
        engine.modify_byte(0, 2);
        engine.modify_byte(1, 3);

        let outcome = engine.commit().unwrap();
        let CommitOutcome::Completed(report) = outcome else {
            panic!("commit did not complete");
        };
        assert_eq!(report.strategy, CommitStrategy::InPlace);
        assert_eq!(report.edits_applied, 3);
        assert_eq!(engine.raw_range(0, 3), vec![2, 3, 0, 1]);
        assert!(!engine.has_changes());
        assert_eq!(engine.commit_state(), CommitState::Completed);
    }

    #[test]
    fn test_rebuild_interleaves_sparse_edits() {
        let mut engine = Engine::with_config(small_chunks());
        engine.open_buffer(b"abcdefghij".to_vec());
        engine.modify_byte(8, b'I');
        engine.delete_bytes(1, 2);
        engine.modify_byte(5, b'F');
        engine.delete_bytes(9, 1);

        let outcome = engine.commit().unwrap();
        let CommitOutcome::Completed(report) = outcome else {
            panic!("commit did not complete");
        };
        assert_eq!(report.strategy, CommitStrategy::Rebuild);
        assert_eq!(report.new_len, 7);
        assert_eq!(engine.len(), 7);
        assert_eq!(engine.raw_range(0, 6), b"adeFghI");
    }

    #[test]
    fn test_rebuild_through_temp_file() {
        let config = EngineConfig {
            copy_chunk_size: 3,
            memory_threshold: 0,
            ..EngineConfig::default()
        };
        let mut engine = Engine::with_config(config);
        engine.open_buffer(b"0123456789".to_vec());
        engine.delete_bytes(0, 5);

        engine.commit().unwrap();
        assert_eq!(engine.raw_range(0, 9), b"56789");
    }

    #[test]
    fn test_commit_refuses_read_only() {
        let mut engine = Engine::new();
        engine.open_buffer(vec![0; 2]);
        engine.set_read_only(true).unwrap();
        engine.modify_byte(0, 1);

        assert!(matches!(engine.commit(), Err(EngineError::WriteNotPermitted(_))));
        assert!(engine.has_changes());
    }

    #[test]
    fn test_commit_refuses_closed_stream() {
        let mut engine = Engine::new();
        assert!(matches!(engine.commit(), Err(EngineError::WriteNotPermitted(_))));
        assert!(matches!(
            engine.commit_to("/nonexistent/out.bin", true),
            Err(EngineError::WriteNotPermitted(_))
        ));
    }

    #[test]
    fn test_pending_insert_blocks_commit() {
        let mut engine = Engine::new();
        engine.open_buffer(b"abc".to_vec());
        engine.modify_byte(0, b'z');
        engine.insert_byte(2, b'!');

        assert!(matches!(engine.commit(), Err(EngineError::InsertionUnsupported(2))));
        assert_eq!(engine.raw_range(0, 2), b"abc");
        assert_eq!(engine.commit_state(), CommitState::Idle);
    }

    #[test]
    fn test_cancel_before_start_leaves_stream_untouched() {
        let mut engine = Engine::with_config(small_chunks());
        engine.open_buffer(b"abcdef".to_vec());
        engine.delete_bytes(2, 2);
        let rx = engine.subscribe();

        engine.cancel_token().cancel();
        assert_eq!(engine.commit().unwrap(), CommitOutcome::Cancelled);

        assert_eq!(engine.raw_range(0, 5), b"abcdef");
        assert!(engine.has_changes());
        assert_eq!(engine.commit_state(), CommitState::Cancelled);
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.last(), Some(&EngineEvent::CommitCancelled));
        // The request is consumed by the cancelled commit
        assert!(matches!(engine.commit().unwrap(), CommitOutcome::Completed(_)));
    }

    #[test]
    fn test_modify_past_end_extends_with_zeros() {
        let mut engine = Engine::new();
        engine.open_buffer(vec![1, 2]);
        engine.modify_byte(4, 9);
        engine.delete_bytes(0, 1);

        engine.commit().unwrap();
        assert_eq!(engine.raw_range(0, 10), vec![2, 0, 0, 9]);
    }

    #[test]
    fn test_failed_reopen_after_save_as_still_concludes() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new();
        engine.open_buffer(b"abc".to_vec());
        engine.modify_byte(0, b'x');
        let rx = engine.subscribe();
        engine.commit_state = CommitState::InProgress;

        let report = CommitReport {
            strategy: CommitStrategy::Rebuild,
            edits_applied: 1,
            new_len: 3,
            destination: Some(dir.path().join("gone").join("out.bin")),
        };
        let result = engine.conclude_commit(Ok(Some(report)));

        assert!(matches!(result, Err(EngineError::Io(_))));
        assert_eq!(engine.commit_state(), CommitState::Completed);
        assert!(matches!(
            rx.try_iter().last(),
            Some(EngineEvent::CommitCompleted(ref r)) if r.new_len == 3
        ));
        assert!(engine.is_open());
        assert!(engine.has_changes());
    }
}
