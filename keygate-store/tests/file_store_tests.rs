use keygate_crypto::PayloadKey;
use keygate_store::{FileStore, Loaded, StateStore, StateStoreExt};
use std::fs;

fn open_store(dir: &tempfile::TempDir) -> FileStore {
    FileStore::open(dir.path(), PayloadKey::from_bytes([7u8; 32])).unwrap()
}

// ── Basic operations ─────────────────────────────────────────────

#[test]
fn absent_key_is_absent() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    assert_eq!(store.get("proj/nonce").unwrap(), Loaded::Absent);
}

#[test]
fn put_get_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store.put("proj/nonce", b"n-123").unwrap();
    assert_eq!(store.get("proj/nonce").unwrap(), Loaded::Value(b"n-123".to_vec()));
}

#[test]
fn overwrite_replaces_value() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store.put("proj/nonce", b"old").unwrap();
    store.put("proj/nonce", b"new").unwrap();
    assert_eq!(store.get("proj/nonce").unwrap(), Loaded::Value(b"new".to_vec()));
}

#[test]
fn delete_then_absent() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store.put("proj/nonce", b"n").unwrap();
    store.delete("proj/nonce").unwrap();
    assert_eq!(store.get("proj/nonce").unwrap(), Loaded::Absent);
    // Deleting again is a no-op.
    store.delete("proj/nonce").unwrap();
}

#[test]
fn clear_removes_only_the_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store.put("proj-a/nonce", b"a").unwrap();
    store.put("proj-b/nonce", b"b").unwrap();
    store.clear("proj-a").unwrap();
    assert_eq!(store.get("proj-a/nonce").unwrap(), Loaded::Absent);
    assert_eq!(store.get("proj-b/nonce").unwrap(), Loaded::Value(b"b".to_vec()));
}

// ── Tamper evidence ──────────────────────────────────────────────

#[test]
fn edited_value_file_reads_tampered() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store.put("proj/snapshot", b"state").unwrap();

    let path = dir.path().join("proj/snapshot");
    let mut on_disk = fs::read_to_string(&path).unwrap();
    on_disk.push('A');
    fs::write(&path, on_disk).unwrap();

    assert_eq!(store.get("proj/snapshot").unwrap(), Loaded::Tampered);
}

#[test]
fn missing_marker_reads_tampered() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store.put("proj/snapshot", b"state").unwrap();
    fs::remove_file(dir.path().join("proj/snapshot.mark")).unwrap();
    assert_eq!(store.get("proj/snapshot").unwrap(), Loaded::Tampered);
}

#[test]
fn marker_from_other_entry_does_not_verify() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store.put("proj/a", b"one").unwrap();
    store.put("proj/b", b"two").unwrap();

    // Splice entry b's value under entry a — both marker and key binding
    // must catch the swap.
    let b_value = fs::read_to_string(dir.path().join("proj/b")).unwrap();
    fs::write(dir.path().join("proj/a"), b_value).unwrap();

    assert_eq!(store.get("proj/a").unwrap(), Loaded::Tampered);
}

#[test]
fn values_are_encrypted_at_rest() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store.put("proj/key", b"LICENSE-KEY-ABCD").unwrap();
    let on_disk = fs::read(dir.path().join("proj/key")).unwrap();
    assert!(!on_disk
        .windows(b"LICENSE-KEY-ABCD".len())
        .any(|w| w == b"LICENSE-KEY-ABCD"));
}

#[test]
fn put_leaves_no_intermediate_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store.put("proj/snapshot", b"old").unwrap();
    store.put("proj/snapshot", b"new").unwrap();

    // Writes go through a rename, so only the entry and its marker remain.
    let mut names: Vec<String> = fs::read_dir(dir.path().join("proj"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, ["snapshot", "snapshot.mark"]);
    assert_eq!(store.get("proj/snapshot").unwrap(), Loaded::Value(b"new".to_vec()));
}

#[test]
fn marker_without_value_reads_absent() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store.put("proj/snapshot", b"state").unwrap();

    // A write that stopped after the marker must not look like tampering.
    fs::remove_file(dir.path().join("proj/snapshot")).unwrap();
    assert_eq!(store.get("proj/snapshot").unwrap(), Loaded::Absent);
}

// ── Key validation ───────────────────────────────────────────────

#[test]
fn path_escape_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    assert!(store.put("../outside", b"x").is_err());
    assert!(store.put("/abs", b"x").is_err());
    assert!(store.put("a//b", b"x").is_err());
    assert!(store.put("", b"x").is_err());
    assert!(store.put("proj/evil.mark", b"x").is_err());
    assert!(store.put("proj/evil.tmp", b"x").is_err());
}

// ── Typed helpers ────────────────────────────────────────────────

#[test]
fn json_helpers_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store.put_json("proj/last_sync", &1_700_000_000_i64).unwrap();
    let loaded: Loaded<i64> = store.get_json("proj/last_sync").unwrap();
    assert_eq!(loaded, Loaded::Value(1_700_000_000));
}
