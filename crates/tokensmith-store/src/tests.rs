use super::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tokensmith_core::PatchOperation;

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_store_root() -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time must be after unix epoch")
        .subsec_nanos();
    let counter = TEST_DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "tokensmith-store-test-{}-{nanos}-{counter}",
        std::process::id()
    ))
}

fn write_registry(root: &Path) -> PathBuf {
    fs::create_dir_all(root).expect("must create test root");
    let registry_path = root.join("registry.json");
    fs::write(
        &registry_path,
        r#"{ "components": [{ "name": "Button" }], "tokens": {} }"#,
    )
    .expect("must write registry");
    registry_path
}

fn session_record(session_id: &str) -> SessionRecord {
    SessionRecord {
        session_id: session_id.to_string(),
        timestamp_unix: 1_700_000_000,
        prompt: "add ghost variant".to_string(),
        success: true,
        mutations_applied: true,
        completed_steps: 5,
        failed_steps: 0,
        duration_ms: 42,
        steps: vec![StepRecord {
            name: "apply_mutations".to_string(),
            status: StepStatus::Completed,
            detail: None,
            error: None,
            started_at_unix: 1_700_000_000,
            duration_ms: 7,
        }],
        mutations: MutationSummary {
            planned: 1,
            applied: 1,
            failed: 0,
            risk_level: Some(tokensmith_core::RiskLevel::Low),
            components_affected: vec!["Button".to_string()],
        },
        approval: Some(ApprovalSummary {
            approved: true,
            method: ApprovalMethod::Automatic,
            reason: "risk level low within auto-approve threshold".to_string(),
        }),
        backup: Some(BackupSummary {
            created: true,
            path: Some("backups/registry-0000000001.json".to_string()),
        }),
    }
}

#[test]
fn create_backup_copies_registry_and_records_digest() {
    let root = test_store_root();
    let registry_path = write_registry(&root);
    let layout = StoreLayout::new(root.join("state"));
    let store = BackupStore::new(&layout);

    let backup = store.create_backup(&registry_path).expect("must create backup");
    assert!(backup.path.exists());
    assert!(backup.file_name.starts_with("registry-"));
    assert_eq!(
        fs::read(&backup.path).expect("must read backup"),
        fs::read(&registry_path).expect("must read registry")
    );
    assert_eq!(
        store.verify_backup(&backup).expect("must verify"),
        Some(true)
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn backup_name_collision_appends_sequence_suffix() {
    let root = test_store_root();
    let registry_path = write_registry(&root);
    let layout = StoreLayout::new(root.join("state"));
    let store = BackupStore::new(&layout);

    let first = store.create_backup(&registry_path).expect("must create backup");
    let second = store.create_backup(&registry_path).expect("must create backup");
    assert_ne!(first.path, second.path);
    assert!(first.path.exists());
    assert!(second.path.exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn list_backups_returns_newest_first() {
    let root = test_store_root();
    let registry_path = write_registry(&root);
    let layout = StoreLayout::new(root.join("state"));
    let store = BackupStore::new(&layout);

    for _ in 0..3 {
        store.create_backup(&registry_path).expect("must create backup");
    }

    let backups = store.list_backups().expect("must list backups");
    assert_eq!(backups.len(), 3);
    for pair in backups.windows(2) {
        assert!(
            (pair[0].created_at_unix, pair[0].sequence)
                >= (pair[1].created_at_unix, pair[1].sequence)
        );
    }

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn resolve_last_without_backups_names_the_failure() {
    let root = test_store_root();
    let layout = StoreLayout::new(root.join("state"));
    let store = BackupStore::new(&layout);

    let err = store.resolve_last().expect_err("must fail with no backups");
    assert!(err.to_string().contains("no backup found"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn prune_keeps_exactly_the_newest_backups() {
    let root = test_store_root();
    let registry_path = write_registry(&root);
    let layout = StoreLayout::new(root.join("state"));
    let store = BackupStore::new(&layout);

    for _ in 0..5 {
        store.create_backup(&registry_path).expect("must create backup");
    }
    let before = store.list_backups().expect("must list backups");
    let expected_survivors: Vec<_> = before.iter().take(2).map(|b| b.file_name.clone()).collect();

    let outcome = store.prune(2).expect("must prune");
    assert_eq!(outcome.removed, 3);
    assert_eq!(outcome.retained, 2);
    assert!(outcome.failures.is_empty());

    let after = store.list_backups().expect("must list backups");
    let survivors: Vec<_> = after.iter().map(|b| b.file_name.clone()).collect();
    assert_eq!(survivors, expected_survivors);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn prune_counts_undeletable_backups_as_retained() {
    let root = test_store_root();
    let registry_path = write_registry(&root);
    let layout = StoreLayout::new(root.join("state"));
    let store = BackupStore::new(&layout);

    for _ in 0..3 {
        store.create_backup(&registry_path).expect("must create backup");
    }
    // remove_file fails on a directory, so this backup-named entry cannot be
    // pruned and must still be reported as retained.
    let stuck = layout.backups_dir().join("registry-0000000001.json");
    fs::create_dir_all(&stuck).expect("must create stuck entry");

    let outcome = store.prune(2).expect("must prune");
    assert_eq!(outcome.removed, 1);
    assert_eq!(outcome.retained, 3);
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.failures[0].contains("registry-0000000001.json"));
    assert!(stuck.exists());
    assert_eq!(
        outcome.removed + outcome.retained,
        store.list_backups().expect("must list").len() + outcome.removed
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn prune_with_fewer_backups_than_keep_removes_nothing() {
    let root = test_store_root();
    let registry_path = write_registry(&root);
    let layout = StoreLayout::new(root.join("state"));
    let store = BackupStore::new(&layout);

    store.create_backup(&registry_path).expect("must create backup");
    let outcome = store.prune(10).expect("must prune");
    assert_eq!(outcome.removed, 0);
    assert_eq!(outcome.retained, 1);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn session_log_appends_one_line_per_record() {
    let root = test_store_root();
    let log = SessionLog::new(root.join("state").join("sessions.log"));

    for index in 0..3 {
        log.append(&session_record(&format!("session-{index}")))
            .expect("must append");
    }

    let raw = fs::read_to_string(log.path()).expect("must read log");
    assert_eq!(raw.lines().count(), 3);
    for line in raw.lines() {
        let _: SessionRecord = serde_json::from_str(line).expect("each line must parse");
    }

    let records = log.read_all().expect("must read records");
    assert_eq!(records.len(), 3);
    assert_eq!(records[2].session_id, "session-2");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn session_log_read_all_reports_corrupt_line_number() {
    let root = test_store_root();
    let log = SessionLog::new(root.join("state").join("sessions.log"));
    log.append(&session_record("session-0")).expect("must append");
    fs::write(
        log.path(),
        format!(
            "{}\nnot json\n",
            fs::read_to_string(log.path()).expect("must read log").trim_end()
        ),
    )
    .expect("must rewrite log");

    let err = log.read_all().expect_err("must reject corrupt line");
    assert!(err.to_string().contains("line 2"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn undo_store_round_trips_patch_by_session_id() {
    let root = test_store_root();
    let layout = StoreLayout::new(root.join("state"));
    let undo_store = UndoStore::new(&layout);

    let patch = vec![PatchOperation::remove("/components/0/props/variant/values/2")];
    let path = undo_store.write("session-abc", &patch).expect("must write undo");
    assert!(path.exists());

    let loaded = undo_store
        .read("session-abc")
        .expect("must read undo")
        .expect("undo must exist");
    assert_eq!(loaded, patch);
    assert_eq!(undo_store.read("session-missing").expect("must read"), None);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn undo_store_lists_sessions() {
    let root = test_store_root();
    let layout = StoreLayout::new(root.join("state"));
    let undo_store = UndoStore::new(&layout);

    undo_store
        .write("session-a", &vec![PatchOperation::remove("/x")])
        .expect("must write undo");
    undo_store
        .write("session-b", &vec![PatchOperation::remove("/y")])
        .expect("must write undo");

    let entries = undo_store.list().expect("must list undo entries");
    let ids: Vec<_> = entries.iter().map(|entry| entry.session_id.clone()).collect();
    assert_eq!(entries.len(), 2);
    assert!(ids.contains(&"session-a".to_string()));
    assert!(ids.contains(&"session-b".to_string()));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn store_layout_derives_state_root_next_to_registry() {
    let layout = StoreLayout::for_registry(Path::new("./dist/registry.json"));
    assert_eq!(layout.root(), Path::new("./dist/.tokensmith"));

    let bare = StoreLayout::for_registry(Path::new("registry.json"));
    assert_eq!(bare.root(), Path::new("./.tokensmith"));
}
