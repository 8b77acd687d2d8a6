use bytepatch::{CommitOutcome, CommitStrategy, Engine, EngineConfig, ReadOnlyFallback};
use proptest::prelude::*;
use std::fs;

#[derive(Debug, Clone)]
enum Op {
    Modify(u64, u8),
    Delete(u64, u64),
}

fn op_strategy(len: u64) -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..len, any::<u8>()).prop_map(|(offset, value)| Op::Modify(offset, value)),
        (0..len, 1..8u64).prop_map(|(start, length)| Op::Delete(start, length)),
    ]
}

fn small_config() -> EngineConfig {
    EngineConfig {
        copy_chunk_size: 7,
        find_block_size: 5,
        ..EngineConfig::default()
    }
}

proptest! {
    #[test]
    fn undo_everything_restores_raw_bytes(
        data in proptest::collection::vec(any::<u8>(), 1..64),
        ops in proptest::collection::vec(op_strategy(64), 0..20),
    ) {
        let mut engine = Engine::with_config(small_config());
        engine.open_buffer(data.clone());
        for op in &ops {
            match *op {
                Op::Modify(offset, value) => engine.modify_byte(offset, value),
                Op::Delete(start, length) => engine.delete_bytes(start, length),
            }
        }

        // One undo per recorded action
        for _ in 0..ops.len() {
            engine.undo();
        }

        prop_assert!(!engine.has_changes());
        for (offset, &raw) in data.iter().enumerate() {
            prop_assert_eq!(engine.effective_byte(offset as u64), Some(raw));
        }
    }

    #[test]
    fn deletions_shorten_range_by_their_count(
        data in proptest::collection::vec(any::<u8>(), 1..100),
        deletes in proptest::collection::vec((0..100u64, 1..10u64), 0..8),
        bounds in (0..100u64, 0..100u64),
    ) {
        let mut engine = Engine::with_config(small_config());
        engine.open_buffer(data.clone());
        for &(start, length) in &deletes {
            engine.delete_bytes(start, length);
        }

        let len = data.len() as u64;
        let lo = bounds.0.min(bounds.1).min(len - 1);
        let hi = bounds.0.max(bounds.1).min(len - 1);
        let deleted = (lo..=hi)
            .filter(|&offset| engine.effective_byte(offset).is_none())
            .count() as u64;

        let bytes = engine.effective_range(lo, hi, true);
        prop_assert_eq!(bytes.len() as u64, hi - lo + 1 - deleted);
    }

    #[test]
    fn fast_and_rebuild_commits_agree(
        data in proptest::collection::vec(any::<u8>(), 1..200),
        edits in proptest::collection::vec((0..200u64, any::<u8>()), 1..30),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let in_place = dir.path().join("in_place.bin");
        let original = dir.path().join("original.bin");
        let rebuilt = dir.path().join("rebuilt.bin");
        fs::write(&in_place, &data).unwrap();
        fs::write(&original, &data).unwrap();

        let len = data.len() as u64;
        let edits: Vec<(u64, u8)> = edits.into_iter().map(|(o, v)| (o % len, v)).collect();

        let mut fast = Engine::with_config(small_config());
        fast.open_path(&in_place, ReadOnlyFallback::Refuse).unwrap();
        let mut slow = Engine::with_config(small_config());
        slow.open_path(&original, ReadOnlyFallback::Refuse).unwrap();
        for &(offset, value) in &edits {
            fast.modify_byte(offset, value);
            slow.modify_byte(offset, value);
        }

        let fast_outcome = fast.commit().unwrap();
        let slow_outcome = slow.commit_to(&rebuilt, false).unwrap();
        prop_assert!(matches!(
            fast_outcome,
            CommitOutcome::Completed(ref r) if r.strategy == CommitStrategy::InPlace
        ));
        prop_assert!(matches!(
            slow_outcome,
            CommitOutcome::Completed(ref r) if r.strategy == CommitStrategy::Rebuild
        ));
        prop_assert_eq!(fs::read(&in_place).unwrap(), fs::read(&rebuilt).unwrap());
    }

    #[test]
    fn find_reports_every_planted_needle(
        gaps in proptest::collection::vec(0..20usize, 1..10),
    ) {
        let needle = b"\xDE\xAD\xBE\xEF";
        let mut data = Vec::new();
        let mut planted = Vec::new();
        for gap in &gaps {
            data.extend(std::iter::repeat(0u8).take(*gap));
            planted.push(data.len() as u64);
            data.extend_from_slice(needle);
        }

        let mut engine = Engine::with_config(small_config());
        engine.open_buffer(data);
        let found: Vec<u64> = engine.find_all(needle, 0).collect();
        prop_assert_eq!(found, planted);
        prop_assert!(engine.find_all(b"\xFF\xFF", 0).next().is_none());
    }
}
