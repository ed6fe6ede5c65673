//! Tests for compaction
//!
//! These tests verify:
//! - Sorting, merging and splitting of unsorted and sorted bases
//! - Superseded records and obsolete tombstones are dropped
//! - Tombstones survive while an older copy exists outside the inputs
//! - Clean sorted bases are replaced by views
//! - Input selection: the current base is never rewritten
//! - Failures leave the store untouched
//! - Readers and writers keep working while a compaction runs

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use basalt::base::{Base, BaseKind};
use basalt::defrag::commit;
use basalt::index::{IndexSlot, IndexUpdate, Location, RamControl, RecordIndex};
use basalt::record::{DiskHeader, RecordFlags};
use basalt::registry::BaseRegistry;
use basalt::{BasaltError, CompactReport, CompactTarget, Engine};
use tempfile::TempDir;

#[path = "../common/mod.rs"]
mod common;

use common::{
    expected, fill_bases, init_tracing, key_of, live_records, seeded_rng, setup_engine,
    test_config, Item,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn assert_lookups(engine: &Engine, items: &[Item]) {
    for item in items {
        assert_eq!(
            engine.lookup(&item.key).unwrap().as_ref(),
            &item.data[..],
            "key {:?}",
            item.key
        );
    }
}

fn assert_removed(engine: &Engine, items: &[Item]) {
    for item in items {
        assert!(
            matches!(engine.lookup(&item.key), Err(BasaltError::KeyNotFound)),
            "key {:?} should be gone",
            item.key
        );
    }
}

fn kinds(engine: &Engine) -> Vec<BaseKind> {
    engine.stats().bases.iter().map(|b| b.kind).collect()
}

fn file_names(temp: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(temp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// =============================================================================
// Sort / Merge Tests
// =============================================================================

#[test]
fn test_sort_single_unsorted_base() {
    let (_temp, engine) = setup_engine(100);
    let mut rng = seeded_rng();
    let items = fill_bases(&engine, &mut rng, 2, 100);

    let report = engine.compact(CompactTarget::Bases(vec![1])).unwrap();

    assert_eq!(report.inputs, vec![1]);
    assert_eq!(report.outputs, vec![3]);
    assert!(!report.used_view);
    assert_eq!(report.records_in, 100);
    assert_eq!(report.records_out, 100);
    assert!(report.bytes_written > 0);
    assert_eq!(engine.base_ids(), vec![3, 2]);
    assert_eq!(kinds(&engine), vec![BaseKind::Sorted, BaseKind::Unsorted]);
    assert_lookups(&engine, &items[0]);
    assert_eq!(live_records(&engine), expected(items.iter().flatten()));
}

#[test]
fn test_merge_sorted_and_unsorted() {
    let (_temp, engine) = setup_engine(100);
    let mut rng = seeded_rng();
    let items = fill_bases(&engine, &mut rng, 3, 100);

    engine.compact(CompactTarget::Bases(vec![1])).unwrap();
    assert_eq!(engine.base_ids(), vec![4, 2, 3]);
    let report = engine.compact(CompactTarget::Bases(vec![4, 2])).unwrap();

    // 200 records at 100 per base
    assert_eq!(report.outputs, vec![5, 6]);
    assert_eq!(report.records_out, 200);
    assert_eq!(engine.base_ids(), vec![5, 6, 3]);
    assert_eq!(
        kinds(&engine),
        vec![BaseKind::Sorted, BaseKind::Sorted, BaseKind::Unsorted]
    );
    assert_lookups(&engine, &items[0]);
    assert_lookups(&engine, &items[1]);
    assert_eq!(live_records(&engine), expected(items.iter().flatten()));
}

#[test]
fn test_merge_unsorted_then_sorted_order() {
    let (_temp, engine) = setup_engine(100);
    let mut rng = seeded_rng();
    let items = fill_bases(&engine, &mut rng, 3, 100);

    // Sort the second base, then merge it with the still unsorted first
    engine.compact(CompactTarget::Bases(vec![2])).unwrap();
    assert_eq!(engine.base_ids(), vec![1, 4, 3]);
    let report = engine.compact(CompactTarget::Bases(vec![1, 4])).unwrap();

    assert_eq!(report.inputs, vec![1, 4]);
    assert_eq!(report.records_out, 200);
    assert_eq!(engine.base_ids()[2], 3);
    assert_eq!(live_records(&engine), expected(items.iter().flatten()));
}

#[test]
fn test_merge_two_sorted_bases() {
    let (_temp, engine) = setup_engine(100);
    let mut rng = seeded_rng();
    let items = fill_bases(&engine, &mut rng, 3, 100);

    engine.compact(CompactTarget::Bases(vec![1])).unwrap();
    engine.compact(CompactTarget::Bases(vec![2])).unwrap();
    assert_eq!(engine.base_ids(), vec![4, 5, 3]);

    let report = engine.compact(CompactTarget::Bases(vec![4, 5])).unwrap();

    assert!(!report.used_view);
    assert_eq!(report.records_out, 200);
    assert_lookups(&engine, &items[0]);
    assert_lookups(&engine, &items[1]);
    assert_eq!(live_records(&engine), expected(items.iter().flatten()));
}

#[test]
fn test_merge_drops_superseded_records() {
    let (_temp, engine) = setup_engine(100);
    let mut rng = seeded_rng();
    let mut items = fill_bases(&engine, &mut rng, 3, 100);

    // Rewrites land in a fourth base
    for item in items[0].iter_mut().take(20) {
        item.data = b"rewritten".to_vec();
        engine.insert(&item.key, &item.data).unwrap();
    }

    let report = engine.compact(CompactTarget::Bases(vec![1, 2])).unwrap();

    assert_eq!(report.records_in, 200);
    assert_eq!(report.records_out, 180);
    assert_lookups(&engine, &items[0]);
    assert_eq!(live_records(&engine), expected(items.iter().flatten()));
}

#[test]
fn test_merge_keeps_newest_write_within_base() {
    let (_temp, engine) = setup_engine(100);
    let mut rng = seeded_rng();
    let first = fill_bases(&engine, &mut rng, 1, 97);
    let key = first[0][0].key;
    engine.insert(&key, b"second").unwrap();
    engine.insert(&key, b"third").unwrap();
    engine.insert(&key, b"fourth").unwrap();
    fill_bases(&engine, &mut rng, 1, 100);

    let report = engine.compact(CompactTarget::Bases(vec![1])).unwrap();

    assert_eq!(report.records_in, 100);
    assert_eq!(report.records_out, 97);
    assert_eq!(engine.lookup(&key).unwrap().as_ref(), b"fourth");
}

#[test]
fn test_removed_keys_disappear() {
    let (_temp, engine) = setup_engine(100);
    let mut rng = seeded_rng();
    let items = fill_bases(&engine, &mut rng, 3, 100);
    for item in &items[0][..30] {
        engine.remove(&item.key).unwrap();
    }

    let report = engine.compact(CompactTarget::Bases(vec![1, 2])).unwrap();

    assert_eq!(report.records_out, 170);
    assert_removed(&engine, &items[0][..30]);
    assert_lookups(&engine, &items[0][30..]);
    assert_eq!(
        live_records(&engine),
        expected(items[0][30..].iter().chain(&items[1]).chain(&items[2]))
    );
}

// =============================================================================
// Tombstone Tests
// =============================================================================

#[test]
fn test_tombstone_kept_while_older_copy_exists() {
    let (_temp, engine) = setup_engine(100);
    let mut rng = seeded_rng();
    let items = fill_bases(&engine, &mut rng, 3, 100);
    for item in &items[0][..10] {
        engine.remove(&item.key).unwrap();
    }
    // Seal the base holding the tombstones
    let extra = fill_bases(&engine, &mut rng, 1, 91);
    assert_eq!(engine.base_ids(), vec![1, 2, 3, 4, 5]);

    // Base 1 still holds the removed values: the tombstones must stay
    let report = engine.compact(CompactTarget::Bases(vec![4])).unwrap();
    assert_eq!(report.tombstones_dropped, 0);
    assert_eq!(report.records_out, 100);
    let sorted = report.outputs[0];
    assert_eq!(engine.stats().bases[3].tombstones, 10);
    assert_removed(&engine, &items[0][..10]);

    // Merged together with base 1 they have nothing left to hide
    let report = engine.compact(CompactTarget::Bases(vec![1, sorted])).unwrap();
    assert_eq!(report.tombstones_dropped, 10);
    assert_eq!(report.records_out, 180);
    assert_removed(&engine, &items[0][..10]);
    assert_eq!(
        live_records(&engine),
        expected(
            items[0][10..]
                .iter()
                .chain(&items[1])
                .chain(&items[2])
                .chain(&extra[0])
        )
    );
    let tombstones: u64 = engine.stats().bases.iter().map(|b| b.tombstones).sum();
    assert_eq!(tombstones, 0);
    assert_eq!(engine.stats().keys, 381);
}

#[test]
fn test_all_tombstoned_inputs_leave_no_output() {
    let (_temp, engine) = setup_engine(100);
    let mut rng = seeded_rng();
    let items = fill_bases(&engine, &mut rng, 2, 100);
    for item in &items[0] {
        engine.remove(&item.key).unwrap();
    }
    // Tombstones in base 3 are sealed by the next rotation
    fill_bases(&engine, &mut rng, 1, 1);
    assert_eq!(engine.base_ids(), vec![1, 2, 3, 4]);

    let report = engine.compact(CompactTarget::Bases(vec![1, 3])).unwrap();

    assert!(report.outputs.is_empty());
    assert_eq!(report.tombstones_dropped, 100);
    assert_eq!(engine.base_ids(), vec![2, 4]);
    assert_removed(&engine, &items[0]);
}

#[test]
fn test_defrag_all_revisits_sorted_base_holding_tombstones() {
    let (_temp, engine) = setup_engine(100);
    let mut rng = seeded_rng();
    let items = fill_bases(&engine, &mut rng, 1, 100);
    for item in &items[0][..40] {
        engine.remove(&item.key).unwrap();
    }
    // 40 tombstones + 60 records seal base 2; one more rotates to base 3
    let extra = fill_bases(&engine, &mut rng, 1, 61);
    assert_eq!(engine.base_ids(), vec![1, 2, 3]);

    // Base 1 still holds the removed values, so the sorted copy keeps them
    let report = engine.compact(CompactTarget::Bases(vec![2])).unwrap();
    assert_eq!(report.tombstones_dropped, 0);
    assert_eq!(report.outputs, vec![4]);
    let sorted = engine.stats().bases[1].clone();
    assert_eq!(sorted.tombstones, 40);
    assert_eq!(sorted.reclaimable, 40);

    engine.compact(CompactTarget::Bases(vec![1])).unwrap();
    assert_eq!(engine.base_ids(), vec![5, 4, 3]);
    assert_eq!(engine.stats().keys, 161);

    // Nothing older is left behind the tombstones now
    let report = engine.defrag().unwrap();
    assert_eq!(report.inputs, vec![4]);
    assert_eq!(report.tombstones_dropped, 40);
    assert_eq!(report.records_out, 60);

    let tombstones: u64 = engine.stats().bases.iter().map(|b| b.tombstones).sum();
    assert_eq!(tombstones, 0);
    assert_eq!(engine.stats().keys, 121);
    assert_eq!(engine.stats().live_keys, 121);
    assert_removed(&engine, &items[0][..40]);
    assert_eq!(
        live_records(&engine),
        expected(items[0][40..].iter().chain(&extra[0]))
    );
    assert!(engine.defrag().unwrap().is_noop());
}

#[test]
fn test_commit_counts_only_drops_that_win() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path()).build();
    let sealed = Arc::new(Base::create(temp.path(), 1, &config).unwrap());
    let current = Arc::new(Base::create(temp.path(), 2, &config).unwrap());

    let forgotten = sealed
        .append(&DiskHeader::tombstone(key_of(1), 1), &[], &config)
        .unwrap();
    let stale = sealed
        .append(&DiskHeader::tombstone(key_of(2), 2), &[], &config)
        .unwrap();
    sealed.seal().unwrap();
    // Key 2 is written again before the commit runs
    let rewritten = current
        .append(&DiskHeader::new(key_of(2), RecordFlags::NONE, 3, 3), b"new", &config)
        .unwrap();

    let index = RecordIndex::new();
    index.upsert(key_of(1), IndexSlot::for_control(RamControl::new(1, &forgotten)));
    index.upsert(key_of(2), IndexSlot::for_control(RamControl::new(2, &rewritten)));
    let registry = BaseRegistry::new(
        temp.path(),
        vec![Arc::clone(&sealed), Arc::clone(&current)],
        3,
    );

    let updates = [
        IndexUpdate::Drop {
            key: key_of(1),
            expected: Location { base_id: 1, offset: forgotten.offset },
        },
        IndexUpdate::Drop {
            key: key_of(2),
            expected: Location { base_id: 1, offset: stale.offset },
        },
    ];
    let outcome = commit::commit(&registry, &index, &[1], &[], &updates).unwrap();

    assert_eq!(outcome.dropped_slots, 1);
    assert_eq!(outcome.lost_races, 1);
    assert!(index.lookup(&key_of(1)).is_none());
    assert!(index.lookup(&key_of(2)).unwrap().is_present());
    assert_eq!(registry.base_ids(), vec![2]);
}

// =============================================================================
// View Tests
// =============================================================================

#[test]
fn test_scenario_sort_remove_resort_uses_view() {
    let (_temp, engine) = setup_engine(100);
    let mut rng = seeded_rng();
    let items = fill_bases(&engine, &mut rng, 2, 100);

    engine.compact(CompactTarget::Bases(vec![1])).unwrap();
    assert_eq!(engine.base_ids(), vec![3, 2]);
    for item in &items[0][..50] {
        engine.remove(&item.key).unwrap();
    }
    assert_eq!(engine.base_ids(), vec![3, 2, 4]);

    let report = engine.compact(CompactTarget::Bases(vec![3])).unwrap();

    assert!(report.used_view);
    assert_eq!(report.outputs, vec![5]);
    assert_eq!(report.records_out, 50);
    assert_eq!(report.bytes_written, 0);
    assert_eq!(engine.base_ids(), vec![5, 2, 4]);
    assert_eq!(engine.stats().bases[0].kind, BaseKind::View { owner: 3 });

    let live = live_records(&engine);
    assert_eq!(live.len(), 150);
    assert_eq!(live, expected(items[0][50..].iter().chain(&items[1])));
    assert_removed(&engine, &items[0][..50]);
}

#[test]
fn test_view_of_view_borrows_from_root_owner() {
    let (_temp, engine) = setup_engine(100);
    let mut rng = seeded_rng();
    let items = fill_bases(&engine, &mut rng, 2, 100);
    engine.compact(CompactTarget::Bases(vec![1])).unwrap();
    for item in &items[0][..50] {
        engine.remove(&item.key).unwrap();
    }
    let first_view = engine.compact(CompactTarget::Bases(vec![3])).unwrap().outputs[0];
    for item in &items[0][50..70] {
        engine.remove(&item.key).unwrap();
    }

    let report = engine.compact(CompactTarget::Bases(vec![first_view])).unwrap();

    assert!(report.used_view);
    assert_eq!(report.records_out, 30);
    assert_eq!(engine.stats().bases[0].kind, BaseKind::View { owner: 3 });
    assert_lookups(&engine, &items[0][70..]);
    assert_removed(&engine, &items[0][..70]);
}

#[test]
fn test_views_disabled_rewrites_base() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let engine = Engine::open(
        test_config(temp.path())
            .max_records_per_base(100)
            .enable_views(false)
            .build(),
    )
    .unwrap();
    let mut rng = seeded_rng();
    let items = fill_bases(&engine, &mut rng, 2, 100);
    engine.compact(CompactTarget::Bases(vec![1])).unwrap();
    for item in &items[0][..50] {
        engine.remove(&item.key).unwrap();
    }

    let report = engine.compact(CompactTarget::Bases(vec![3])).unwrap();

    assert!(!report.used_view);
    assert_eq!(engine.stats().bases[0].kind, BaseKind::Sorted);
    assert_eq!(
        live_records(&engine),
        expected(items[0][50..].iter().chain(&items[1]))
    );
}

#[test]
fn test_compacting_clean_sorted_base_is_idempotent() {
    let (_temp, engine) = setup_engine(100);
    let mut rng = seeded_rng();
    let items = fill_bases(&engine, &mut rng, 2, 100);
    let sorted = engine.compact(CompactTarget::Bases(vec![1])).unwrap().outputs[0];
    let before = live_records(&engine);

    let report = engine.compact(CompactTarget::Bases(vec![sorted])).unwrap();

    // Same bytes, re-exposed rather than copied
    assert!(report.used_view);
    assert_eq!(report.bytes_written, 0);
    assert_eq!(report.records_out, 100);
    assert_eq!(live_records(&engine), before);
    assert_lookups(&engine, &items[0]);
}

// =============================================================================
// Defrag-All Tests
// =============================================================================

#[test]
fn test_scenario_remove_two_sorted_bases_then_defrag_all() {
    let (_temp, engine) = setup_engine(100);
    let mut rng = seeded_rng();
    let items = fill_bases(&engine, &mut rng, 3, 100);

    engine.compact(CompactTarget::Bases(vec![1])).unwrap();
    engine.compact(CompactTarget::Bases(vec![2])).unwrap();
    assert_eq!(engine.base_ids(), vec![4, 5, 3]);
    for item in items[0].iter().chain(&items[1]) {
        engine.remove(&item.key).unwrap();
    }
    assert_eq!(engine.base_ids(), vec![4, 5, 3, 6, 7]);
    let untouched = engine.stats().bases[2].clone();

    let report = engine.defrag().unwrap();

    assert_eq!(report.inputs, vec![4, 5, 6]);
    assert!(report.outputs.is_empty());
    assert_eq!(engine.base_ids(), vec![3, 7]);
    assert_eq!(engine.stats().bases[0], untouched);

    let live = live_records(&engine);
    assert_eq!(live.len(), 100);
    assert_eq!(live, expected(&items[2]));
}

#[test]
fn test_defrag_all_skips_current_base() {
    let (_temp, engine) = setup_engine(100);
    let mut rng = seeded_rng();
    let items = fill_bases(&engine, &mut rng, 1, 50);
    for item in &items[0] {
        engine.remove(&item.key).unwrap();
    }

    let report = engine.defrag().unwrap();

    assert!(report.is_noop());
    assert_eq!(engine.base_ids(), vec![1]);
}

#[test]
fn test_defrag_all_respects_trigger_percentage() {
    let (_temp, engine) = setup_engine(100);
    let mut rng = seeded_rng();
    let items = fill_bases(&engine, &mut rng, 3, 100);
    // 10% of base 1 and 30% of base 2; the default trigger is 25%
    for item in items[0][..10].iter().chain(&items[1][..30]) {
        engine.remove(&item.key).unwrap();
    }

    let report = engine.defrag().unwrap();

    assert_eq!(report.inputs, vec![2]);
    assert_eq!(report.records_out, 70);
    assert_eq!(engine.base_ids()[0], 1);
    assert_removed(&engine, &items[0][..10]);
    assert_removed(&engine, &items[1][..30]);
}

#[test]
fn test_defrag_all_twice_is_noop() {
    let (_temp, engine) = setup_engine(100);
    let mut rng = seeded_rng();
    let items = fill_bases(&engine, &mut rng, 3, 100);
    for item in &items[1] {
        engine.remove(&item.key).unwrap();
    }
    fill_bases(&engine, &mut rng, 1, 1);
    engine.defrag().unwrap();
    let ids = engine.base_ids();

    let report = engine.defrag().unwrap();

    assert!(report.is_noop());
    assert_eq!(engine.base_ids(), ids);
}

// =============================================================================
// Target Selection Tests
// =============================================================================

#[test]
fn test_explicit_current_base_is_skipped() {
    let (_temp, engine) = setup_engine(100);
    let mut rng = seeded_rng();
    fill_bases(&engine, &mut rng, 2, 100);

    let report = engine.compact(CompactTarget::Bases(vec![2])).unwrap();

    assert!(report.is_noop());
    assert_eq!(engine.base_ids(), vec![1, 2]);
}

#[test]
fn test_unknown_base_rejected() {
    let (_temp, engine) = setup_engine(100);
    let mut rng = seeded_rng();
    fill_bases(&engine, &mut rng, 2, 100);

    let err = engine.compact(CompactTarget::Bases(vec![1, 99])).unwrap_err();

    assert!(matches!(err, BasaltError::UnknownBase(99)));
    assert_eq!(engine.base_ids(), vec![1, 2]);
}

#[test]
fn test_empty_target_is_noop() {
    let (_temp, engine) = setup_engine(100);

    let report = engine.compact(CompactTarget::Bases(Vec::new())).unwrap();

    assert!(report.is_noop());
    assert_eq!(report, CompactReport::default());
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_corrupt_input_aborts_without_changes() {
    let (temp, engine) = setup_engine(100);
    let mut rng = seeded_rng();
    let items = fill_bases(&engine, &mut rng, 2, 100);
    let before = file_names(&temp);

    // First payload byte of the first record in base 1
    let mut file = OpenOptions::new()
        .write(true)
        .open(temp.path().join("data-000001.blob"))
        .unwrap();
    file.seek(SeekFrom::Start(16 + 96)).unwrap();
    file.write_all(&[!items[0][0].data[0]]).unwrap();
    drop(file);

    let err = engine.compact(CompactTarget::Bases(vec![1])).unwrap_err();

    assert!(matches!(err, BasaltError::DefragAborted(_)));
    assert_eq!(engine.base_ids(), vec![1, 2]);
    assert_eq!(file_names(&temp), before);
    assert_lookups(&engine, &items[0][1..]);
    assert_lookups(&engine, &items[1]);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_readers_during_compaction() {
    let (_temp, engine) = setup_engine(100);
    let engine = Arc::new(engine);
    let mut rng = seeded_rng();
    let items = Arc::new(fill_bases(&engine, &mut rng, 4, 100));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let items = Arc::clone(&items);
            thread::spawn(move || {
                for _ in 0..5 {
                    for item in items.iter().flatten() {
                        assert_eq!(engine.lookup(&item.key).unwrap().as_ref(), &item.data[..]);
                    }
                }
            })
        })
        .collect();

    engine.compact(CompactTarget::Bases(vec![1])).unwrap();
    engine.compact(CompactTarget::Bases(vec![2, 3])).unwrap();
    let ids = engine.base_ids();
    engine.compact(CompactTarget::Bases(ids[..2].to_vec())).unwrap();

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(live_records(&engine), expected(items.iter().flatten()));
}

#[test]
fn test_writer_during_compaction() {
    let (_temp, engine) = setup_engine(100);
    let engine = Arc::new(engine);
    let mut rng = seeded_rng();
    let items = fill_bases(&engine, &mut rng, 3, 100);

    let writer = {
        let engine = Arc::clone(&engine);
        let targets: Vec<Item> = items[0].iter().chain(&items[1]).step_by(3).cloned().collect();
        thread::spawn(move || {
            for item in &targets {
                engine.insert(&item.key, b"concurrent").unwrap();
            }
            targets
        })
    };

    let report = engine.compact(CompactTarget::Bases(vec![1, 2])).unwrap();
    let rewritten = writer.join().unwrap();

    let mut want = expected(items.iter().flatten());
    for item in &rewritten {
        want.insert(item.key, b"concurrent".to_vec());
    }
    assert_eq!(live_records(&engine), want);
    assert!(report.records_out <= 200);
}

#[test]
fn test_periodic_defrag_runs() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let engine = Engine::open(
        test_config(temp.path())
            .max_records_per_base(100)
            .defrag_timeout(Duration::from_millis(20))
            .defrag_splay(Duration::ZERO)
            .build(),
    )
    .unwrap();
    let mut rng = seeded_rng();
    let items = fill_bases(&engine, &mut rng, 3, 100);
    for item in &items[0] {
        engine.remove(&item.key).unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    while engine.base_ids().contains(&1) {
        assert!(Instant::now() < deadline, "periodic defrag never ran");
        thread::sleep(Duration::from_millis(10));
    }

    assert_removed(&engine, &items[0]);
    assert_eq!(
        live_records(&engine),
        expected(items[1].iter().chain(&items[2]))
    );
    engine.close().unwrap();
}
