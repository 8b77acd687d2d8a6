pub mod undo;

use std::collections::BTreeMap;

/// What a pending edit does to the byte at its offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditKind {
    Modified,
    Deleted,
    /// Recorded but never spliced in by a commit
    Added,
}

/// Kind selector for lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindFilter {
    Any,
    Only(EditKind),
}

impl KindFilter {
    pub fn matches(self, kind: EditKind) -> bool {
        match self {
            KindFilter::Any => true,
            KindFilter::Only(wanted) => wanted == kind,
        }
    }
}

impl From<EditKind> for KindFilter {
    fn from(kind: EditKind) -> Self {
        KindFilter::Only(kind)
    }
}

/// Position of a record in the edit arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EditId(usize);

/// A single byte-level change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditRecord {
    /// Absolute offset in the stream
    pub offset: u64,
    /// Replacement byte; `None` for deletions
    pub value: Option<u8>,
    pub kind: EditKind,
    /// Number of records making up the user action this record belongs to
    pub group_length: u64,
    /// The record this one replaced at the same offset
    supersedes: Option<EditId>,
}

impl EditRecord {
    pub fn supersedes(&self) -> Option<EditId> {
        self.supersedes
    }
}

/// Pending edits, held as two views over one arena.
///
/// The arena is the undo log: records are appended in application order and
/// only ever removed from the top. The index maps each offset to the arena
/// slot of its current record, so there is at most one live edit per offset
/// and a superseded record is never consulted for reads.
#[derive(Debug, Clone, Default)]
pub struct EditStore {
    log: Vec<EditRecord>,
    index: BTreeMap<u64, EditId>,
}

impl EditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an overwrite of one byte. Returns the id of the record it
    /// replaced, if the offset already had one.
    pub fn record_modify(&mut self, offset: u64, value: u8, group_length: u64) -> Option<EditId> {
        self.push(offset, Some(value), EditKind::Modified, group_length)
    }

    /// Mark `[start, start + length)` deleted as one undoable action.
    /// A span running past `u64::MAX` is cut short there.
    pub fn record_delete(&mut self, start: u64, length: u64) {
        let end = start.saturating_add(length);
        let pushed = end - start;
        for offset in start..end {
            self.push(offset, None, EditKind::Deleted, pushed);
        }
    }

    /// Record a pending insertion before `offset`.
    pub fn record_insert(&mut self, offset: u64, value: u8) -> Option<EditId> {
        self.push(offset, Some(value), EditKind::Added, 1)
    }

    fn push(
        &mut self,
        offset: u64,
        value: Option<u8>,
        kind: EditKind,
        group_length: u64,
    ) -> Option<EditId> {
        let id = EditId(self.log.len());
        let supersedes = self.index.insert(offset, id);
        self.log.push(EditRecord {
            offset,
            value,
            kind,
            group_length: group_length.max(1),
            supersedes,
        });
        supersedes
    }

    /// Re-label the newest `count` records as a single undo group.
    pub(crate) fn regroup_tail(&mut self, count: usize) {
        let start = self.log.len().saturating_sub(count);
        for record in &mut self.log[start..] {
            record.group_length = count as u64;
        }
    }

    /// Current record at `offset`, if it matches `filter`
    pub fn lookup(&self, offset: u64, filter: impl Into<KindFilter>) -> Option<&EditRecord> {
        let filter = filter.into();
        self.index
            .get(&offset)
            .map(|id| &self.log[id.0])
            .filter(|record| filter.matches(record.kind))
    }

    /// Current records matching `filter`, ascending by offset
    pub fn by_kind(&self, filter: impl Into<KindFilter>) -> Vec<EditRecord> {
        let filter = filter.into();
        self.index
            .values()
            .map(|id| self.log[id.0])
            .filter(|record| filter.matches(record.kind))
            .collect()
    }

    /// Current records with offsets in `[start, end]`, ascending.
    /// `start` must not exceed `end`.
    pub fn in_range(&self, start: u64, end: u64) -> impl Iterator<Item = &EditRecord> + '_ {
        self.index.range(start..=end).map(|(_, id)| &self.log[id.0])
    }

    pub fn count(&self, filter: impl Into<KindFilter>) -> usize {
        let filter = filter.into();
        self.index
            .values()
            .filter(|id| filter.matches(self.log[id.0].kind))
            .count()
    }

    /// Number of live edits (one per touched offset)
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Depth of the undo log, superseded records included
    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    pub fn clear(&mut self) {
        self.log.clear();
        self.index.clear();
    }
}
