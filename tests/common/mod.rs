//! Shared fixtures for the integration test targets

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use basalt::config::ConfigBuilder;
use basalt::{Config, Engine, IterateFlags, Key, KeyRange};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

/// Seed used by every generated data set
pub const SEED: u64 = 42;

/// Route engine logs to the test harness (`RUST_LOG=basalt=debug`)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config for tests: periodic defrag off, everything else default
pub fn test_config(dir: &Path) -> ConfigBuilder {
    Config::builder()
        .data_dir(dir)
        .defrag_timeout(Duration::ZERO)
}

/// Engine whose bases hold `records_per_base` records each
pub fn setup_engine(records_per_base: u64) -> (TempDir, Engine) {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path())
        .max_records_per_base(records_per_base)
        .build();
    let engine = Engine::open(config).unwrap();
    (temp_dir, engine)
}

/// One generated record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub key: Key,
    pub data: Vec<u8>,
}

/// `count` items with random keys and 1..=256 byte payloads
pub fn generate_items(rng: &mut StdRng, count: usize) -> Vec<Item> {
    (0..count)
        .map(|_| {
            let mut key = [0u8; basalt::key::KEY_SIZE];
            rng.fill(&mut key[..]);
            let len = rng.gen_range(1..=256);
            let data = (0..len).map(|_| rng.gen()).collect();
            Item {
                key: Key::from_bytes(key),
                data,
            }
        })
        .collect()
}

pub fn seeded_rng() -> StdRng {
    StdRng::seed_from_u64(SEED)
}

/// Insert `per_base` fresh items per base; with `max_records_per_base ==
/// per_base` this fills exactly `bases` bases. Returns the items by base.
pub fn fill_bases(engine: &Engine, rng: &mut StdRng, bases: usize, per_base: usize) -> Vec<Vec<Item>> {
    (0..bases)
        .map(|_| {
            let items = generate_items(rng, per_base);
            for item in &items {
                engine.insert(&item.key, &item.data).unwrap();
            }
            items
        })
        .collect()
}

/// Every live record as key → payload, read through the iterator
pub fn live_records(engine: &Engine) -> BTreeMap<Key, Vec<u8>> {
    let mut out = BTreeMap::new();
    engine
        .iterate(KeyRange::full(), IterateFlags::LIVE_ONLY, |record| {
            let data = record.read_data()?;
            assert!(
                out.insert(*record.key(), data.to_vec()).is_none(),
                "key {:?} delivered twice",
                record.key()
            );
            Ok(())
        })
        .unwrap();
    out
}

pub fn expected<'a>(items: impl IntoIterator<Item = &'a Item>) -> BTreeMap<Key, Vec<u8>> {
    items
        .into_iter()
        .map(|item| (item.key, item.data.clone()))
        .collect()
}

/// Key with every byte set to `b`
pub fn key_of(b: u8) -> Key {
    Key::from_bytes([b; basalt::key::KEY_SIZE])
}
