//! End-to-end tests for backup and restore runs against a scripted pod and
//! an in-memory object store

mod common;

use std::io::Cursor;
use std::sync::Arc;

use common::FakePod;
use influxdb_operator::config::OperatorConfig;
use influxdb_operator::error::Error;
use influxdb_operator::orchestrator::{
    BackupOptions, BackupRequest, Orchestrator, RestoreOptions, RestoreRequest,
};
use influxdb_operator::storage::{S3Storage, StorageProvider};
use object_store::memory::InMemory;
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

const BACKUP_DIR: &str = "/var/lib/influxdb/backup";
const RESTORE_DIR: &str = "/var/lib/influxdb/restore";

fn influx_pod() -> FakePod {
    FakePod::new().with_pod("db", "influxdb-0", "Running", &["influxdb"])
}

fn orchestrator(pod: &Arc<FakePod>, staging: &TempDir) -> Orchestrator {
    let config = OperatorConfig {
        staging_dir: Some(staging.path().to_path_buf()),
        ..OperatorConfig::default()
    };
    Orchestrator::new(config, pod.clone())
}

fn s3() -> StorageProvider {
    StorageProvider::S3(S3Storage::with_store(Arc::new(InMemory::new()), "bucket", "prod"))
}

fn backup_request() -> BackupRequest {
    BackupRequest {
        namespace: "db".to_string(),
        pod: "influxdb-0".to_string(),
        container: None,
        options: BackupOptions {
            database: "telegraf".to_string(),
            host: "127.0.0.1:8088".to_string(),
            ..Default::default()
        },
    }
}

fn restore_request(backup_id: &str) -> RestoreRequest {
    RestoreRequest {
        namespace: "db".to_string(),
        pod: "influxdb-0".to_string(),
        container: None,
        backup_id: backup_id.to_string(),
        options: RestoreOptions {
            database: "telegraf".to_string(),
            ..Default::default()
        },
    }
}

// ============================================================================
// Backup Tests
// ============================================================================

#[tokio::test]
async fn backup_to_s3_uploads_every_file() {
    let pod = Arc::new(influx_pod().with_backup_output(&[
        ("20240301T100000Z.meta", b"meta"),
        ("20240301T100000Z.s1.tar.gz", b"shard-one"),
    ]));
    let staging = TempDir::new().unwrap();
    let storage = s3();

    let outcome = orchestrator(&pod, &staging)
        .run_backup(&backup_request(), &storage)
        .await
        .unwrap();

    assert_eq!(outcome.backup_id.len(), 14);
    assert_eq!(outcome.files, 2);
    assert_eq!(outcome.bytes, 13);
    assert_eq!(outcome.location, format!("s3://bucket/prod/{}", outcome.backup_id));
    assert!(outcome.completed_at >= outcome.started_at);

    let remote_dir = format!("{}/{}", BACKUP_DIR, outcome.backup_id);
    let commands = pod.commands();
    let backup = &commands[0];
    assert_eq!(&backup[..3], &["influxd", "backup", "-portable"]);
    assert_eq!(backup.last(), Some(&remote_dir));
    assert_eq!(commands[1], vec!["tar", "cf", "-", remote_dir.as_str()]);

    let mut keys = storage
        .list_directory(&storage.backup_prefix(&outcome.backup_id))
        .await
        .unwrap();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            format!("prod/{}/20240301T100000Z.meta", outcome.backup_id),
            format!("prod/{}/20240301T100000Z.s1.tar.gz", outcome.backup_id),
        ]
    );

    // staging directories are removed once the upload finishes
    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn backup_to_pv_stays_in_pod() {
    let pod = Arc::new(influx_pod().with_backup_output(&[("meta", b"m")]));
    let staging = TempDir::new().unwrap();

    let outcome = orchestrator(&pod, &staging)
        .run_backup(&backup_request(), &StorageProvider::Pv)
        .await
        .unwrap();

    assert_eq!(outcome.location, format!("{}/{}", BACKUP_DIR, outcome.backup_id));
    assert_eq!(outcome.files, 0);
    assert_eq!(pod.commands().len(), 1);
}

#[tokio::test]
async fn backup_command_failure_uploads_nothing() {
    let pod = Arc::new(influx_pod().failing("influxd"));
    let staging = TempDir::new().unwrap();
    let storage = s3();

    let err = orchestrator(&pod, &staging)
        .run_backup(&backup_request(), &storage)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RemoteExecution(_)));
    assert!(storage.list_directory("prod").await.unwrap().is_empty());
}

#[tokio::test]
async fn backup_of_terminated_pod_is_refused() {
    let pod = Arc::new(FakePod::new().with_pod("db", "influxdb-0", "Failed", &["influxdb"]));
    let staging = TempDir::new().unwrap();

    let err = orchestrator(&pod, &staging)
        .run_backup(&backup_request(), &s3())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::PodNotRunning { .. }));
    assert!(pod.commands().is_empty());
}

// ============================================================================
// Restore Tests
// ============================================================================

#[tokio::test]
async fn restore_from_s3_copies_files_then_restores() {
    let pod = Arc::new(influx_pod());
    let staging = TempDir::new().unwrap();
    let storage = s3();
    storage
        .store("prod/20240301100000/meta.00", Cursor::new(b"meta".to_vec()))
        .await
        .unwrap();
    storage
        .store("prod/20240301100000/s1.tar.gz", Cursor::new(b"shard-one".to_vec()))
        .await
        .unwrap();

    let outcome = orchestrator(&pod, &staging)
        .run_restore(&restore_request("20240301100000"), &storage)
        .await
        .unwrap();

    let dir = format!("{}/20240301100000", RESTORE_DIR);
    assert_eq!(outcome.source_dir, dir);
    assert_eq!(outcome.files, 2);
    assert_eq!(outcome.bytes, 13);
    assert_eq!(pod.file(&format!("{}/meta.00", dir)), Some(b"meta".to_vec()));
    assert_eq!(pod.file(&format!("{}/s1.tar.gz", dir)), Some(b"shard-one".to_vec()));

    let commands = pod.commands();
    assert_eq!(
        commands.last().unwrap(),
        &vec!["influxd", "restore", "-portable", "-db", "telegraf", dir.as_str()]
    );
}

#[tokio::test]
async fn restore_of_unknown_backup_is_no_such_entry() {
    let pod = Arc::new(influx_pod());
    let staging = TempDir::new().unwrap();

    let err = orchestrator(&pod, &staging)
        .run_restore(&restore_request("20990101000000"), &s3())
        .await
        .unwrap_err();

    assert!(matches!(err.root(), Error::NoSuchEntry(location) if location == "s3://bucket/prod/20990101000000"));
    assert!(pod.commands().is_empty());
}

#[tokio::test]
async fn restore_from_pv_uses_backup_directory() {
    let pod = Arc::new(influx_pod());
    let staging = TempDir::new().unwrap();

    let outcome = orchestrator(&pod, &staging)
        .run_restore(&restore_request("20240301100000"), &StorageProvider::Pv)
        .await
        .unwrap();

    assert_eq!(outcome.source_dir, format!("{}/20240301100000", BACKUP_DIR));
    assert_eq!(outcome.files, 0);
    assert_eq!(pod.commands().len(), 1);
}

#[tokio::test]
async fn restore_rejects_path_like_backup_id() {
    let pod = Arc::new(influx_pod());
    let staging = TempDir::new().unwrap();

    let err = orchestrator(&pod, &staging)
        .run_restore(&restore_request("../etc"), &s3())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
}
