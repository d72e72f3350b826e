use addendum_triage::checkpoint::{
    CheckpointState, CheckpointStore, FileCheckpointStore, LoadStatus, MemoryCheckpointStore,
    NO_ROW,
};
use std::path::Path;

fn state_at(index: i64, total: usize) -> CheckpointState {
    let mut s = CheckpointState::fresh(Path::new("out/final.csv"));
    s.last_completed_index = index;
    s.total_row_count = total;
    s
}

#[test]
fn save_then_load_returns_the_same_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ckpt").join("checkpoint.json");
    let mut store = FileCheckpointStore::new(&path);
    assert!(!store.exists());

    let state = state_at(3, 10);
    store.save(&state).unwrap();

    let loaded = store.load(Path::new("unused.csv"));
    assert_eq!(loaded.status, LoadStatus::Loaded);
    assert_eq!(loaded.state, state);
    assert!(!dir.path().join("ckpt").join("checkpoint.json.tmp").exists());
}

#[test]
fn overwrite_keeps_only_latest() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoint.json");
    let mut store = FileCheckpointStore::new(&path);
    store.save(&state_at(0, 5)).unwrap();
    store.save(&state_at(1, 5)).unwrap();

    let loaded = store.load(Path::new("x.csv"));
    assert_eq!(loaded.state.last_completed_index, 1);
    assert_eq!(loaded.state.next_index(), 2);
}

#[test]
fn missing_file_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCheckpointStore::new(&dir.path().join("none.json"));
    let loaded = store.load(Path::new("final.csv"));
    assert_eq!(loaded.status, LoadStatus::Missing);
    assert_eq!(loaded.state.last_completed_index, NO_ROW);
    assert_eq!(loaded.state.next_index(), 0);
    assert_eq!(loaded.state.output_file, "final.csv");
}

#[test]
fn empty_or_garbage_file_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoint.json");
    let store = FileCheckpointStore::new(&path);

    for raw in ["", "   \n", "{not json", "[1,2,3]"] {
        std::fs::write(&path, raw).unwrap();
        let loaded = store.load(Path::new("final.csv"));
        assert!(
            matches!(loaded.status, LoadStatus::Corrupt(_)),
            "{raw:?} should be rejected"
        );
        assert_eq!(loaded.state.next_index(), 0);
    }
}

#[test]
fn structurally_invalid_states_are_rejected() {
    let below = br#"{"last_completed_index":-5,"total_row_count":3,"output_file":"a.csv","mode":"production","timestamp":"t"}"#;
    let past_end = br#"{"last_completed_index":3,"total_row_count":3,"output_file":"a.csv","mode":"production","timestamp":"t"}"#;
    let test_mode = br#"{"last_completed_index":0,"total_row_count":3,"output_file":"a.csv","mode":"test","timestamp":"t"}"#;

    for raw in [&below[..], &past_end[..], &test_mode[..]] {
        let store = MemoryCheckpointStore::with_raw(raw.to_vec());
        let loaded = store.load(Path::new("a.csv"));
        assert!(matches!(loaded.status, LoadStatus::Corrupt(_)));
        assert_eq!(loaded.state.last_completed_index, NO_ROW);
    }
}

#[test]
fn older_checkpoint_without_fingerprint_loads() {
    let raw = br#"{"last_completed_index":2,"total_row_count":3,"output_file":"a.csv","mode":"production","timestamp":"t"}"#;
    let store = MemoryCheckpointStore::with_raw(raw.to_vec());
    let loaded = store.load(Path::new("a.csv"));
    assert_eq!(loaded.status, LoadStatus::Loaded);
    assert_eq!(loaded.state.input_sha256, None);
    assert_eq!(loaded.state.committed_rows(), 3);
}

#[test]
fn memory_store_records_saves() {
    let mut store = MemoryCheckpointStore::new();
    store.save(&state_at(0, 2)).unwrap();
    store.save(&state_at(1, 2)).unwrap();
    assert_eq!(store.saves().len(), 2);
    assert_eq!(store.current().map(|s| s.last_completed_index), Some(1));

    let mut broken = MemoryCheckpointStore::failing();
    assert!(broken.save(&state_at(0, 2)).is_err());
    assert!(broken.saves().is_empty());
}
