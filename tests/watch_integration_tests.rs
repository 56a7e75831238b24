//! Integration tests for the inotify-backed change source
//!
//! These run against real files in a temporary directory and need no
//! privileges.

use libwgsync::{ChangeSource, NotifySource};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);
const SETTLE: Duration = Duration::from_millis(300);

/// Wait until a content write is reported, skipping other events
async fn wait_for_write(source: &mut NotifySource) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match timeout(remaining, source.next_event()).await {
            Ok(Some(Ok(event))) if event.is_write() => return true,
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => return false,
        }
    }
}

/// Discard everything already queued
async fn drain(source: &mut NotifySource) {
    while let Ok(Some(_)) = timeout(SETTLE, source.next_event()).await {}
}

fn config_file(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("wg0.conf");
    std::fs::write(&path, "[Interface]\nListenPort = 51820\n").unwrap();
    path
}

fn append(path: &Path, line: &str) {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(line.as_bytes()).unwrap();
}

#[tokio::test]
async fn test_write_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = config_file(&dir);

    let mut source = NotifySource::new().unwrap();
    source.arm(&path).unwrap();

    append(&path, "\n[Peer]\nPublicKey = xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=\n");

    assert!(wait_for_write(&mut source).await, "expected a write event");
}

#[tokio::test]
async fn test_rearming_an_unchanged_file_keeps_reporting() {
    let dir = tempfile::tempdir().unwrap();
    let path = config_file(&dir);

    let mut source = NotifySource::new().unwrap();
    source.arm(&path).unwrap();

    for round in 0..3 {
        append(&path, &format!("# edit {}\n", round));
        assert!(wait_for_write(&mut source).await, "expected a write event in round {}", round);
        drain(&mut source).await;
        source.arm(&path).unwrap();
    }
}

#[tokio::test]
async fn test_replaced_file_is_followed_after_rearm() {
    let dir = tempfile::tempdir().unwrap();
    let path = config_file(&dir);

    let mut source = NotifySource::new().unwrap();
    source.arm(&path).unwrap();

    // Safe-write: new content goes to a temporary name, then replaces the target
    let tmp = dir.path().join("wg0.conf.tmp");
    std::fs::write(&tmp, "[Interface]\nListenPort = 51821\n").unwrap();
    std::fs::rename(&tmp, &path).unwrap();

    tokio::time::sleep(SETTLE).await;
    drain(&mut source).await;
    source.arm(&path).unwrap();

    append(&path, "# edited after replace\n");

    assert!(wait_for_write(&mut source).await, "writes to the new file must be reported");
}

#[tokio::test]
async fn test_arming_a_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();

    let mut source = NotifySource::new().unwrap();
    let err = source.arm(&dir.path().join("absent.conf")).unwrap_err();

    assert_eq!(err.kind(), "watch");
}
