//! Integration tests for copying files into and out of pods

mod common;

use std::fs;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use common::{tracked_source, FakePod};
use influxdb_operator::error::{CopyPhase, Error};
use influxdb_operator::remote::PodCopier;
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

fn running_pod() -> FakePod {
    FakePod::new().with_pod("ns", "pod", "Running", &["influxdb", "sidecar"])
}

fn copier(pod: &Arc<FakePod>) -> PodCopier {
    PodCopier::new(pod.clone())
}

fn phase_of(err: &Error) -> Option<CopyPhase> {
    match err {
        Error::Copy { phase, .. } => Some(*phase),
        _ => None,
    }
}

// ============================================================================
// Copy Out Of Pod Tests
// ============================================================================

#[tokio::test]
async fn copy_from_pod_unpacks_directory() {
    let pod = Arc::new(running_pod().with_file("/data/manifest.json", br#"{"ok":true}"#));
    let dest = TempDir::new().unwrap();

    let entries = copier(&pod)
        .copy_from_pod("ns/pod:/data", dest.path(), None)
        .await
        .unwrap();

    assert!(entries >= 1);
    assert_eq!(
        fs::read(dest.path().join("manifest.json")).unwrap(),
        br#"{"ok":true}"#
    );

    let calls = pod.calls();
    assert_eq!(calls[0].0.container, "influxdb");
    assert_eq!(calls[0].1, vec!["tar", "cf", "-", "/data"]);
}

#[tokio::test]
async fn copy_from_pod_uses_default_namespace() {
    let pod = Arc::new(
        FakePod::new()
            .with_pod("monitoring", "pod", "Running", &["influxdb"])
            .with_file("/data/a", b"a"),
    );
    let dest = TempDir::new().unwrap();

    copier(&pod)
        .with_default_namespace("monitoring")
        .copy_from_pod("pod:/data", dest.path(), None)
        .await
        .unwrap();

    assert_eq!(pod.calls()[0].0.namespace, "monitoring");
}

#[tokio::test]
async fn copy_from_pod_missing_path_is_no_such_entry() {
    let pod = Arc::new(running_pod());
    let dest = TempDir::new().unwrap();

    let err = copier(&pod)
        .copy_from_pod("ns/pod:/nothing/here", dest.path(), None)
        .await
        .unwrap_err();

    assert!(matches!(err.root(), Error::NoSuchEntry(_)));
}

#[tokio::test]
async fn copy_from_terminated_pod_fails_lookup() {
    let pod = Arc::new(FakePod::new().with_pod("ns", "pod", "Succeeded", &["influxdb"]));
    let dest = TempDir::new().unwrap();

    let err = copier(&pod)
        .copy_from_pod("ns/pod:/data", dest.path(), None)
        .await
        .unwrap_err();

    assert_eq!(phase_of(&err), Some(CopyPhase::Lookup));
    assert!(matches!(err.root(), Error::PodNotRunning { phase, .. } if phase == "Succeeded"));
    assert!(pod.calls().is_empty());
}

#[tokio::test]
async fn copy_from_pod_rejects_local_spec() {
    let pod = Arc::new(running_pod());
    let dest = TempDir::new().unwrap();

    let err = copier(&pod)
        .copy_from_pod("/just/a/path", dest.path(), None)
        .await
        .unwrap_err();

    assert!(matches!(err.root(), Error::FileSpec(_)));
}

// ============================================================================
// Copy Into Pod Tests
// ============================================================================

#[tokio::test]
async fn copy_to_pod_creates_parent_and_extracts() {
    let pod = Arc::new(running_pod());
    let body = b"0123456789".to_vec();

    let sent = copier(&pod)
        .copy_to_pod(Cursor::new(body.clone()), 10, "ns/pod:/restore/1/meta.00", Some("sidecar"))
        .await
        .unwrap();

    assert_eq!(sent, 10);
    assert_eq!(pod.file("/restore/1/meta.00"), Some(body));

    let calls = pod.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].1, vec!["mkdir", "-p", "/restore/1"]);
    assert_eq!(calls[1].1, vec!["tar", "-xf", "-", "-C", "/restore/1"]);
    assert!(calls.iter().all(|(target, _)| target.container == "sidecar"));
}

#[tokio::test]
async fn copy_to_pod_with_zero_size_is_noop() {
    let pod = Arc::new(running_pod());

    let sent = copier(&pod)
        .copy_to_pod(Cursor::new(Vec::new()), 0, "ns/pod:/restore/empty", None)
        .await
        .unwrap();

    assert_eq!(sent, 0);
    assert!(pod.calls().is_empty());
}

#[tokio::test]
async fn copy_to_pod_rejects_directory_destination() {
    let pod = Arc::new(running_pod());

    let err = copier(&pod)
        .copy_to_pod(Cursor::new(b"x".to_vec()), 1, "ns/pod:/restore/", None)
        .await
        .unwrap_err();

    assert_eq!(phase_of(&err), Some(CopyPhase::Lookup));
}

#[tokio::test]
async fn copy_to_pod_short_source_fails_encoding() {
    let pod = Arc::new(running_pod());

    let err = copier(&pod)
        .copy_to_pod(Cursor::new(b"abc".to_vec()), 100, "ns/pod:/restore/file", None)
        .await
        .unwrap_err();

    assert_eq!(phase_of(&err), Some(CopyPhase::Encode));
}

#[tokio::test]
async fn copy_to_pod_mkdir_failure_is_tagged() {
    let pod = Arc::new(running_pod().failing("mkdir"));

    let err = copier(&pod)
        .copy_to_pod(Cursor::new(b"abc".to_vec()), 3, "ns/pod:/restore/file", None)
        .await
        .unwrap_err();

    assert_eq!(phase_of(&err), Some(CopyPhase::Mkdir));
    assert!(matches!(err.root(), Error::RemoteExecution(_)));
}

#[tokio::test]
async fn copy_to_pod_remote_tar_failure_is_tagged_exec() {
    let pod = Arc::new(running_pod().failing("tar"));
    let body = vec![b'x'; 256 * 1024];

    let err = copier(&pod)
        .copy_to_pod(Cursor::new(body), 256 * 1024, "ns/pod:/restore/file", None)
        .await
        .unwrap_err();

    assert_eq!(phase_of(&err), Some(CopyPhase::Exec));
    assert!(matches!(err.root(), Error::RemoteExecution(msg) if msg.contains("exited with status 1")));
}

// ============================================================================
// Cancellation Tests
// ============================================================================

#[tokio::test]
async fn timed_out_copy_to_pod_releases_encoder() {
    let pod = Arc::new(running_pod().hanging("tar"));
    let copier = copier(&pod);
    let (source, released) = tracked_source(vec![7u8; 256 * 1024]);

    let copy = copier.copy_to_pod(source, 256 * 1024, "ns/pod:/restore/file", None);
    assert!(tokio::time::timeout(Duration::from_millis(200), copy).await.is_err());
    assert!(pod.cancelled());

    // the encoder task drops its source once it sees the closed pipe
    tokio::time::timeout(Duration::from_secs(5), released)
        .await
        .expect("encoder task still running after the copy was cancelled")
        .unwrap();
}

#[tokio::test]
async fn timed_out_copy_from_pod_closes_exec_session() {
    let pod = Arc::new(running_pod().with_file("/data/a", b"a").hanging("tar"));
    let copier = copier(&pod);
    let dest = TempDir::new().unwrap();

    let copy = copier.copy_from_pod("ns/pod:/data", dest.path(), None);
    assert!(tokio::time::timeout(Duration::from_millis(200), copy).await.is_err());
    assert!(pod.cancelled());

    // the runtime joins blocking tasks on shutdown, so a decoder left waiting
    // on the pipe would hang this test here
}
