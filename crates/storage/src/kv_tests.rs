// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn put_then_get() {
    let dir = tempfile::tempdir().unwrap();
    let store = KvStore::open(dir.path()).unwrap();

    store.put("task:a", b"{\"n\":1}").unwrap();
    assert_eq!(store.get("task:a").unwrap(), Some(b"{\"n\":1}".to_vec()));
    assert_eq!(store.get("task:b").unwrap(), None);
}

#[test]
fn put_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let store = KvStore::open(dir.path()).unwrap();

    store.put("k", b"old").unwrap();
    store.put("k", b"new").unwrap();
    assert_eq!(store.get("k").unwrap(), Some(b"new".to_vec()));
}

#[test]
fn values_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = KvStore::open(dir.path()).unwrap();
        store.put("run:t:00000000000000000001", b"1").unwrap();
    }
    let store = KvStore::open(dir.path()).unwrap();
    assert_eq!(
        store.get("run:t:00000000000000000001").unwrap(),
        Some(b"1".to_vec())
    );
}

#[test]
fn delete_reports_existence() {
    let dir = tempfile::tempdir().unwrap();
    let store = KvStore::open(dir.path()).unwrap();

    store.put("k", b"v").unwrap();
    assert!(store.delete("k").unwrap());
    assert!(!store.delete("k").unwrap());
    assert_eq!(store.get("k").unwrap(), None);
}

#[test]
fn scan_filters_by_prefix_and_sorts() {
    let dir = tempfile::tempdir().unwrap();
    let store = KvStore::open(dir.path()).unwrap();

    store.put("run:t:2", b"2").unwrap();
    store.put("task:t", b"t").unwrap();
    store.put("run:t:1", b"1").unwrap();
    store.put("run:u:1", b"u").unwrap();

    let keys: Vec<String> = store
        .scan("run:t:")
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(keys, vec!["run:t:1", "run:t:2"]);
}

#[test]
fn interrupted_writes_are_discarded_on_open() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = KvStore::open(dir.path()).unwrap();
        store.put("task:a", b"committed").unwrap();
    }
    // Simulate a crash between writing the temp file and renaming it
    let temp = dir.path().join(format!("{}~tmp", encode_key("task:a")));
    std::fs::write(&temp, b"half").unwrap();

    let store = KvStore::open(dir.path()).unwrap();
    assert!(!temp.exists());
    assert_eq!(store.get("task:a").unwrap(), Some(b"committed".to_vec()));
    assert_eq!(store.scan("").unwrap().len(), 1);
}

#[test]
fn scan_skips_temp_files_left_while_open() {
    let dir = tempfile::tempdir().unwrap();
    let store = KvStore::open(dir.path()).unwrap();
    store.put("task:a", b"a").unwrap();
    std::fs::write(dir.path().join("task%3Ab~tmp"), b"partial").unwrap();

    let entries = store.scan("task:").unwrap();
    assert_eq!(entries, vec![("task:a".to_string(), b"a".to_vec())]);
}

#[test]
fn keys_are_escaped_into_safe_file_names() {
    assert_eq!(encode_key("task:abc-1.x_y"), "task%3Aabc-1.x_y");
    assert_eq!(encode_key("a/b c~"), "a%2Fb%20c%7E");
    assert_eq!(decode_key("a%2Fb%20c%7E").unwrap(), "a/b c~");
}

#[test]
fn non_ascii_keys_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = KvStore::open(dir.path()).unwrap();

    store.put("task:café", b"v").unwrap();
    let entries = store.scan("task:").unwrap();
    assert_eq!(entries[0].0, "task:café");
}

#[test]
fn malformed_file_name_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let store = KvStore::open(dir.path()).unwrap();
    std::fs::write(dir.path().join("task%Z1"), b"x").unwrap();

    let err = store.scan("task:").unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }));
}
