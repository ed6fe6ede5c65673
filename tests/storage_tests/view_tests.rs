//! Tests for views
//!
//! These tests verify:
//! - View bases serve reads out of their owner's file
//! - Owner reference counting and ViewConflict
//! - Views over views resolve to the owning base
//! - Retired owners outlive their views
//! - View bases reload from their trailer

use std::path::Path;
use std::sync::Arc;

use basalt::base::{Base, BaseKind, RawRecord, SortedBaseBuilder, View};
use basalt::key::{Key, KEY_SIZE};
use basalt::record::{DiskHeader, RecordFlags};
use basalt::{BasaltError, Config};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn key_of(b: u8) -> Key {
    Key::from_bytes([b; KEY_SIZE])
}

fn build_sorted(dir: &Path, id: u64, count: u8, config: &Config) -> Arc<Base> {
    let mut builder = SortedBaseBuilder::create(dir, id, config).unwrap();
    for b in 1..=count {
        let header = DiskHeader::new(key_of(b), RecordFlags::NONE, 4, b as u64);
        builder.add(&RawRecord::new(header, &[b; 4]).unwrap()).unwrap();
    }
    Arc::new(Base::from_built(builder.finish().unwrap()).unwrap())
}

fn setup() -> (TempDir, Config) {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .index_block_size(4)
        .build();
    (temp, config)
}

// =============================================================================
// View Base Tests
// =============================================================================

#[test]
fn test_view_base_reads_through_owner() {
    let (temp, config) = setup();
    let owner = build_sorted(temp.path(), 1, 10, &config);
    let kept: Vec<_> = owner.entries()[3..7].to_vec();

    let view = Base::create_view(temp.path(), 2, Arc::clone(&owner), kept.clone(), &config).unwrap();

    assert_eq!(view.kind(), BaseKind::View { owner: 1 });
    assert_eq!(view.record_count(), 4);
    assert_eq!(owner.view_refs(), 1);
    for entry in &kept {
        let found = view.find(&entry.key).unwrap();
        assert_eq!(found.offset, entry.offset);
        assert_eq!(view.read(found.offset, found.data_size).unwrap(), owner.read(entry.offset, 4).unwrap());
    }
    assert!(view.find(&key_of(1)).is_none());
}

#[test]
fn test_view_refuses_reads_outside_range() {
    let (temp, config) = setup();
    let owner = build_sorted(temp.path(), 1, 10, &config);
    let entries = owner.entries();

    let view = Base::create_view(temp.path(), 2, Arc::clone(&owner), entries[2..4].to_vec(), &config).unwrap();

    let outside = entries[8];
    assert!(matches!(
        view.read(outside.offset, outside.data_size),
        Err(BasaltError::CorruptRecord(_))
    ));
}

#[test]
fn test_owner_destroy_refused_while_viewed() {
    let (temp, config) = setup();
    let owner = build_sorted(temp.path(), 1, 5, &config);
    let view = Base::create_view(temp.path(), 2, Arc::clone(&owner), owner.entries(), &config).unwrap();

    let err = owner.destroy().unwrap_err();
    assert!(matches!(err, BasaltError::ViewConflict { base_id: 1, refs: 1 }));
    assert!(owner.path().exists());

    drop(view);
    assert_eq!(owner.view_refs(), 0);
    owner.destroy().unwrap();
    assert!(!owner.path().exists());
}

#[test]
fn test_view_over_view_resolves_to_root_owner() {
    let (temp, config) = setup();
    let owner = build_sorted(temp.path(), 1, 10, &config);
    let first = Arc::new(
        Base::create_view(temp.path(), 2, Arc::clone(&owner), owner.entries()[2..8].to_vec(), &config)
            .unwrap(),
    );

    let second = Base::create_view(
        temp.path(),
        3,
        Arc::clone(&first),
        first.entries()[1..3].to_vec(),
        &config,
    )
    .unwrap();

    assert_eq!(second.kind(), BaseKind::View { owner: 1 });
    assert_eq!(owner.view_refs(), 2);
    assert_eq!(first.view_refs(), 0);
    let entry = second.entries()[0];
    assert_eq!(second.read(entry.offset, entry.data_size).unwrap().as_ref(), &[4u8; 4]);
}

#[test]
fn test_retired_owner_outlives_view() {
    let (temp, config) = setup();
    let owner = build_sorted(temp.path(), 1, 5, &config);
    let owner_path = owner.path().to_path_buf();
    let view = Base::create_view(temp.path(), 2, Arc::clone(&owner), owner.entries(), &config).unwrap();

    owner.retire();
    drop(owner);
    assert!(owner_path.exists());
    let entry = view.entries()[4];
    assert_eq!(view.read(entry.offset, entry.data_size).unwrap().as_ref(), &[5u8; 4]);

    view.retire();
    drop(view);
    assert!(!owner_path.exists());
}

#[test]
fn test_open_view_keeps_retired_owner_file() {
    let (temp, config) = setup();
    let owner = build_sorted(temp.path(), 1, 5, &config);
    let owner_path = owner.path().to_path_buf();
    let view = Base::create_view(temp.path(), 2, Arc::clone(&owner), owner.entries(), &config).unwrap();

    owner.retire();
    drop(owner);
    // Closing a view that is still registered is not the same as retiring it
    drop(view);

    assert!(owner_path.exists());
}

#[test]
fn test_view_base_reopens_from_trailer() {
    let (temp, config) = setup();
    let owner = build_sorted(temp.path(), 1, 10, &config);
    let kept = owner.entries()[5..].to_vec();
    drop(Base::create_view(temp.path(), 2, Arc::clone(&owner), kept.clone(), &config).unwrap());
    assert_eq!(owner.view_refs(), 0);

    let view = Base::open(
        temp.path(),
        2,
        BaseKind::View { owner: 1 },
        Some(Arc::clone(&owner)),
        &config,
        false,
    )
    .unwrap();

    assert_eq!(view.entries(), kept);
    assert_eq!(owner.view_refs(), 1);
    assert_eq!(view.stats().index_blocks, 2);
}

#[test]
fn test_view_requires_entries() {
    let (temp, config) = setup();
    let owner = build_sorted(temp.path(), 1, 3, &config);

    assert!(Base::create_view(temp.path(), 2, Arc::clone(&owner), Vec::new(), &config).is_err());
    assert_eq!(owner.view_refs(), 0);
}

// =============================================================================
// Raw View Tests
// =============================================================================

#[test]
fn test_raw_view_range_checks() {
    let (temp, config) = setup();
    let owner = build_sorted(temp.path(), 1, 3, &config);

    assert!(View::new(Arc::clone(&owner), 16, owner.byte_size() + 1).is_err());
    assert!(View::new(Arc::clone(&owner), 20, 10).is_err());

    let view = View::new(Arc::clone(&owner), 16, 116).unwrap();
    assert_eq!(view.len(), 100);
    assert_eq!(view.owner_id(), 1);
    assert_eq!(owner.view_refs(), 1);
    drop(view);
    assert_eq!(owner.view_refs(), 0);
}
