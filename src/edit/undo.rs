use super::{EditId, EditStore};

impl EditStore {
    /// Undo the most recent user action.
    ///
    /// Pops the top record, then `group_length - 1` more so a multi-byte paste
    /// or delete reverts as one step. Each popped record that is still current
    /// at its offset hands the offset back to the record it superseded (or to
    /// the raw byte). Returns the reverted offsets in pop order.
    pub fn undo(&mut self) -> Vec<u64> {
        let Some(top) = self.log.last().copied() else {
            return Vec::new();
        };

        let mut reverted = Vec::with_capacity(top.group_length.min(4096) as usize);
        for _ in 0..top.group_length {
            match self.pop() {
                Some(offset) => reverted.push(offset),
                None => break,
            }
        }
        reverted
    }

    fn pop(&mut self) -> Option<u64> {
        let record = self.log.pop()?;
        let id = EditId(self.log.len());

        if self.index.get(&record.offset) == Some(&id) {
            match record.supersedes {
                Some(previous) => {
                    self.index.insert(record.offset, previous);
                }
                None => {
                    self.index.remove(&record.offset);
                }
            }
        }
        Some(record.offset)
    }
}

#[cfg(test)]
mod tests {
    use crate::edit::{EditKind, EditStore, KindFilter};

    #[test]
    fn test_undo_single_modify() {
        let mut store = EditStore::new();
        store.record_modify(1, 0x58, 1);

        assert_eq!(store.undo(), vec![1]);
        assert!(store.is_empty());
        assert_eq!(store.log_len(), 0);
    }

    #[test]
    fn test_undo_delete_group_atomically() {
        let mut store = EditStore::new();
        store.record_modify(0, 0x11, 1);
        store.record_delete(2, 3);

        let mut reverted = store.undo();
        reverted.sort();
        assert_eq!(reverted, vec![2, 3, 4]);
        assert_eq!(store.len(), 1);
        assert!(store.lookup(0, EditKind::Modified).is_some());
    }

    #[test]
    fn test_undo_restores_superseded_record() {
        let mut store = EditStore::new();
        store.record_modify(7, 0xAA, 1);
        store.record_modify(7, 0xBB, 1);

        store.undo();
        assert_eq!(store.lookup(7, KindFilter::Any).unwrap().value, Some(0xAA));
        store.undo();
        assert!(store.lookup(7, KindFilter::Any).is_none());
    }

    #[test]
    fn test_undo_delete_over_modify_restores_modify() {
        let mut store = EditStore::new();
        store.record_modify(3, 0x42, 1);
        store.record_delete(2, 2);

        store.undo();
        let record = store.lookup(3, KindFilter::Any).unwrap();
        assert_eq!(record.kind, EditKind::Modified);
        assert_eq!(record.value, Some(0x42));
    }

    #[test]
    fn test_group_longer_than_log_stops_at_bottom() {
        let mut store = EditStore::new();
        store.record_modify(0, 1, 1);
        // A paste group that claims more records than were recorded
        store.record_modify(1, 2, 5);

        assert_eq!(store.undo(), vec![1, 0]);
        assert!(store.is_empty());
        assert!(store.undo().is_empty());
    }

    #[test]
    fn test_undo_on_empty_store() {
        let mut store = EditStore::new();
        assert!(store.undo().is_empty());
    }

    #[test]
    fn test_delete_cut_short_at_end_of_offsets_undoes_alone() {
        let mut store = EditStore::new();
        store.record_modify(0, 1, 1);
        store.record_modify(1, 1, 1);
        store.record_delete(u64::MAX - 1, 5);

        assert_eq!(store.undo(), vec![u64::MAX - 1]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.undo(), vec![1]);
    }
}
