// Common test utilities and helpers
#![allow(dead_code)]

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use unikv::prelude::*;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Create a temporary directory for one test's on-disk stores
pub fn temp_dir() -> TempDir {
    init_logging();
    TempDir::new().expect("create temp dir")
}

/// File config under `dir` without per-write fsync, to keep tests fast
pub fn file_config(dir: &TempDir, name: &str) -> FileConfig {
    FileConfig::builder()
        .path(dir.path().join(name))
        .use_fsync(false)
        .build()
}

pub fn snapshot_path(dir: &TempDir) -> PathBuf {
    dir.path().join("snapshot")
}

/// All entries, ordered by the stringified key so backends compare equal
pub fn sorted_items<A: Access>(store: &Store<A>) -> Vec<(Value, Value)> {
    let mut items: Vec<(Value, Value)> = store
        .items(&Filter::All, None)
        .expect("scan store")
        .collect::<UnikvResult<_>>()
        .expect("decode entries");
    items.sort_by_key(|(key, _)| key.to_string());
    items
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub tags: Vec<String>,
}

/// Scenarios every backend must pass unchanged
pub mod contract {
    use super::*;

    pub fn set_then_get<A: Access>(store: &mut Store<A>) {
        assert!(store.is_empty().unwrap());
        store.set("x", "y").unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.get("x").unwrap(), Some(Value::from("y")));
        assert_eq!(store.get_or("missing", "d").unwrap(), Value::from("d"));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    pub fn update_on_empty<A: Access>(store: &mut Store<A>) {
        store.update([("a", 1), ("b", 2)]).unwrap();
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(
            sorted_items(store),
            vec![
                (Value::from("a"), Value::from(1)),
                (Value::from("b"), Value::from(2)),
            ]
        );
    }

    pub fn update_is_last_write_wins<A: Access>(store: &mut Store<A>) {
        store.update([("k", 1), ("k", 2), ("k", 3)]).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.require("k").unwrap(), Value::from(3));
    }

    pub fn batch_of_a_thousand<A: Access>(store: &mut Store<A>) {
        assert!(store.set_batch(0..1000, 0..1000).unwrap());
        assert_eq!(store.len().unwrap(), 1000);
        let first = store.get_batch(0..10, Value::Null).unwrap();
        assert_eq!(first, (0..10).map(Value::from).collect::<Vec<_>>());
    }

    pub fn pop_missing_returns_default<A: Access>(store: &mut Store<A>) {
        assert_eq!(store.pop_or("missing", "default").unwrap(), Value::from("default"));
        assert_eq!(store.pop("missing").unwrap(), None);

        store.set("k", 5).unwrap();
        assert_eq!(store.pop("k").unwrap(), Some(Value::from(5)));
        assert_eq!(store.pop("k").unwrap(), None);
        assert!(store.is_empty().unwrap());
    }

    pub fn popitem_on_empty_fails<A: Access>(store: &mut Store<A>) {
        assert!(matches!(store.popitem(), Err(UnikvError::EmptyStore)));

        store.update([("a", 1), ("b", 2)]).unwrap();
        let (key, value) = store.popitem().unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert!(!store.contains(key.clone()).unwrap());
        assert_eq!(
            value,
            if key == Value::from("a") { Value::from(1) } else { Value::from(2) }
        );
    }

    pub fn save_flush_load<A: Access>(store: &mut Store<A>, dir: &TempDir) {
        store.update((0..50).map(|i| (format!("key{i}"), i * 3))).unwrap();
        store.set("record", Value::record([("n", 1)])).unwrap();
        let before = sorted_items(store);

        let path = snapshot_path(dir);
        store.save(&path).unwrap();
        assert_eq!(store.flush().unwrap(), 51);
        assert!(store.is_empty().unwrap());

        store.load(&path).unwrap();
        assert_eq!(store.len().unwrap(), 51);
        assert_eq!(sorted_items(store), before);
    }

    pub fn load_own_snapshot_twice<A: Access>(store: &mut Store<A>, dir: &TempDir) {
        store.update([("a", 1), ("b", 2)]).unwrap();
        let path = snapshot_path(dir);
        store.save(&path).unwrap();
        store.save(&path).unwrap();
        store.set("c", 3).unwrap();
        store.load(&path).unwrap();
        assert_eq!(store.len().unwrap(), 2);
        assert!(!store.contains("c").unwrap());
    }

    pub fn filter_uses_and_semantics<A: Access>(store: &mut Store<A>) {
        store
            .update([
                ("p1", Value::record([("a", Value::from(1)), ("b", Value::from("25"))])),
                ("p2", Value::record([("a", Value::from(1)), ("b", Value::from("32"))])),
                ("p3", Value::record([("a", Value::from(2)), ("b", Value::from("2"))])),
                ("p4", Value::record([("a", Value::from(1))])),
                ("s", Value::from("2x")),
            ])
            .unwrap();

        let filter = Filter::field("a", 1).and("b", "2");
        let hits: Vec<Value> = store
            .items(&filter, None)
            .unwrap()
            .map(|entry| entry.map(|(key, _)| key))
            .collect::<UnikvResult<_>>()
            .unwrap();
        assert_eq!(hits, vec![Value::from("p1")]);

        let scalars: Vec<Value> = store
            .items(&Filter::value("2"), None)
            .unwrap()
            .map(|entry| entry.map(|(key, _)| key))
            .collect::<UnikvResult<_>>()
            .unwrap();
        assert_eq!(scalars, vec![Value::from("s")]);
    }

    pub fn limit_truncates_passing_entries<A: Access>(store: &mut Store<A>) {
        store.update((0..20).map(|i| (i, i % 2))).unwrap();
        let odd = store.items(&Filter::value(1), Some(3)).unwrap().count();
        assert_eq!(odd, 3);
        assert_eq!(store.values(Some(5)).unwrap().count(), 5);
        assert_eq!(store.items(&Filter::All, Some(0)).unwrap().count(), 0);
    }

    pub fn delete_is_idempotent<A: Access>(store: &mut Store<A>) {
        store.set("k", "v").unwrap();
        store.set("other", "v").unwrap();
        store.delete("k").unwrap();
        let once = sorted_items(store);
        store.delete("k").unwrap();
        assert_eq!(sorted_items(store), once);
        assert_eq!(store.len().unwrap(), 1);
        assert!(!store.contains("k").unwrap());
        store.delete("never-there").unwrap();
    }

    pub fn count_stays_consistent<A: Access>(store: &mut Store<A>) {
        store.set("a", 1).unwrap();
        let before = store.len().unwrap();
        store.set("b", 1).unwrap();
        assert_eq!(store.len().unwrap(), before + 1);
        store.set("b", 2).unwrap();
        assert_eq!(store.len().unwrap(), before + 1);
        let keys = store.keys(None, None).unwrap().count();
        assert_eq!(keys, store.len().unwrap());
    }

    pub fn values_follow_requested_order<A: Access>(store: &mut Store<A>) {
        store.set("k1", "v1").unwrap();
        store.set("k3", "v3").unwrap();
        let values = store.values_of(["k1", "k2", "k3"], None, "D").unwrap();
        assert_eq!(values, vec![Value::from("v1"), Value::from("D"), Value::from("v3")]);
    }

    pub fn keys_match_patterns<A: Access>(store: &mut Store<A>) {
        store.set_batch(0..20, 0..20).unwrap();
        let ones = store
            .keys(Some("1"), None)
            .unwrap()
            .collect::<UnikvResult<Vec<_>>>()
            .unwrap();
        assert_eq!(ones.len(), 11);
        assert!(ones.iter().all(|key| key.to_string().starts_with('1')));
        assert_eq!(store.keys(Some("1"), Some(3)).unwrap().count(), 3);
        assert_eq!(store.keys(None, None).unwrap().count(), 20);

        let scanned = store
            .scan("1[5-9]", None)
            .unwrap()
            .collect::<UnikvResult<Vec<_>>>()
            .unwrap();
        assert_eq!(scanned.len(), 5);
        assert!(scanned.iter().all(|(key, value)| key == value));
    }

    pub fn bad_pattern_is_reported<A: Access>(store: &mut Store<A>) {
        store.set("k", "v").unwrap();
        assert!(matches!(store.keys(Some("("), None), Err(UnikvError::InvalidFilter(_))));
        assert!(matches!(
            store.items(&Filter::field("k", "["), None),
            Err(UnikvError::InvalidFilter(_))
        ));
    }

    pub fn flush_reports_removed<A: Access>(store: &mut Store<A>) {
        assert_eq!(store.flush().unwrap(), 0);
        store.set_batch(0..7, 0..7).unwrap();
        assert_eq!(store.flush().unwrap(), 7);
        assert!(store.is_empty().unwrap());
        assert_eq!(store.keys(None, None).unwrap().count(), 0);
    }

    pub fn structured_values_round_trip<A: Access>(store: &mut Store<A>) {
        let value = Value::record([
            ("name", Value::from("alice")),
            ("scores", Value::list([1.5, 2.25])),
            ("raw", Value::from(vec![0u8, 159, 146, 150])),
            ("nested", Value::record([("ok", true)])),
            ("none", Value::Null),
        ]);
        store.set(Value::list([1, 2]), value.clone()).unwrap();
        store.set(Value::from(vec![0xffu8, 0x00]), "bytes key").unwrap();
        assert_eq!(store.get(Value::list([1, 2])).unwrap(), Some(value));
        assert_eq!(
            store.get(Value::from(vec![0xffu8, 0x00])).unwrap(),
            Some(Value::from("bytes key"))
        );
    }

    pub fn require_misses_are_errors<A: Access>(store: &mut Store<A>) {
        assert!(matches!(store.require("ghost"), Err(UnikvError::KeyNotFound(_))));
        store.set("ghost", 1).unwrap();
        assert_eq!(store.require("ghost").unwrap(), Value::from(1));
    }

    pub fn typed_values<A: Access>(store: &mut Store<A>) {
        let user = User {
            id: 7,
            name: "ann".into(),
            tags: vec!["admin".into()],
        };
        store.set_as("user:7", &user).unwrap();
        assert_eq!(store.get_as::<User>("user:7").unwrap(), Some(user));
        assert_eq!(store.get_as::<User>("user:8").unwrap(), None);

        let users = store
            .items(&Filter::field("name", "an"), None)
            .unwrap()
            .count();
        assert_eq!(users, 1);
    }

    pub fn copy_and_compare<A: Access>(store: &mut Store<A>) {
        let mut reference = MemoryStore::memory(CodecConfig::default());
        reference.update([("a", 1), ("b", 2), ("c", 3)]).unwrap();

        store.set("stale", 0).unwrap();
        assert_eq!(store.copy_from(&reference).unwrap(), 3);
        assert!(store.equals(&reference).unwrap());
        assert!(*store == reference);

        store.set("c", 4).unwrap();
        assert!(!store.equals(&reference).unwrap());
    }

    pub fn long_keys_round_trip<A: Access>(store: &mut Store<A>) {
        let long = "k".repeat(300);
        store.set(long.as_str(), 1).unwrap();
        store.set("short", 2).unwrap();
        assert_eq!(store.get(long.as_str()).unwrap(), Some(Value::from(1)));
        assert!(store.contains(long.as_str()).unwrap());
        assert_eq!(store.len().unwrap(), 2);

        let keys: Vec<Value> = store
            .keys(Some("kkk"), None)
            .unwrap()
            .collect::<UnikvResult<_>>()
            .unwrap();
        assert_eq!(keys, vec![Value::from(long.as_str())]);

        store.delete(long.as_str()).unwrap();
        assert!(!store.contains(long.as_str()).unwrap());
        assert_eq!(store.len().unwrap(), 1);
    }
}
