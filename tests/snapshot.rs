use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use tempfile::tempdir;

use revault::common::CancelToken;
use revault::snapshot::restore_snapshot;
use revault::RestoreError;

/// Lay out `<root>/vault/{manifests,objects}` and return the manifest path
/// plus the objects directory.
fn make_vault(root: &Path) -> (PathBuf, PathBuf) {
    let manifests = root.join("vault/manifests");
    let objects = root.join("vault/objects");
    fs::create_dir_all(&manifests).unwrap();
    fs::create_dir_all(&objects).unwrap();
    (manifests.join("snapshot.json"), objects)
}

fn put_object(objects: &Path, hash: &str, content: &[u8]) {
    fs::write(objects.join(hash), content).unwrap();
}

#[test]
fn restores_version_1_snapshot() {
    let dir = tempdir().unwrap();
    let (manifest, objects) = make_vault(dir.path());
    put_object(&objects, "aaa111", b"first file");
    put_object(&objects, "bbb222", b"second file");
    fs::write(
        &manifest,
        r#"{"files": {"a.txt": "aaa111", "sub/dir/b.txt": "bbb222"}}"#,
    )
    .unwrap();

    let dest = dir.path().join("dest");
    let summary = restore_snapshot(&manifest, &dest, &CancelToken::new()).unwrap();

    assert_eq!(summary.restored, 2);
    assert_eq!(summary.skipped, 0);
    assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"first file");
    assert_eq!(fs::read(dest.join("sub/dir/b.txt")).unwrap(), b"second file");
}

#[test]
fn restores_version_2_metadata() {
    let dir = tempdir().unwrap();
    let (manifest, objects) = make_vault(dir.path());
    put_object(&objects, "ccc333", b"with metadata");
    fs::write(
        &manifest,
        r#"{
            "version": 2,
            "files": {
                "meta.txt": {"hash": "ccc333", "mode": 384, "mtime": 1700000000}
            }
        }"#,
    )
    .unwrap();

    let dest = dir.path().join("dest");
    let summary = restore_snapshot(&manifest, &dest, &CancelToken::new()).unwrap();
    assert_eq!(summary.restored, 1);

    let target = dest.join("meta.txt");
    assert_eq!(fs::read(&target).unwrap(), b"with metadata");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // mode 384 == 0o600
        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
    assert_eq!(
        fs::metadata(&target).unwrap().modified().unwrap(),
        UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    );
}

#[test]
fn missing_object_is_skipped_not_fatal() {
    let dir = tempdir().unwrap();
    let (manifest, objects) = make_vault(dir.path());
    put_object(&objects, "ddd444", b"present");
    fs::write(
        &manifest,
        r#"{"files": {"gone.txt": "000000", "here.txt": "ddd444"}}"#,
    )
    .unwrap();

    let dest = dir.path().join("dest");
    let summary = restore_snapshot(&manifest, &dest, &CancelToken::new()).unwrap();

    // the walk continued past the missing object
    assert_eq!(summary.restored, 1);
    assert_eq!(summary.skipped, 1);
    assert!(!dest.join("gone.txt").exists());
    assert_eq!(fs::read(dest.join("here.txt")).unwrap(), b"present");
}

#[test]
fn compressed_objects_are_decoded() {
    let dir = tempdir().unwrap();
    let (manifest, objects) = make_vault(dir.path());
    let mut enc = flate2::write::GzEncoder::new(
        File::create(objects.join("eee555")).unwrap(),
        flate2::Compression::default(),
    );
    enc.write_all(b"was gzipped in the vault").unwrap();
    enc.finish().unwrap();
    fs::write(&manifest, r#"{"files": {"doc.txt": "eee555"}}"#).unwrap();

    let dest = dir.path().join("dest");
    restore_snapshot(&manifest, &dest, &CancelToken::new()).unwrap();
    assert_eq!(
        fs::read(dest.join("doc.txt")).unwrap(),
        b"was gzipped in the vault"
    );
}

#[test]
fn traversal_keys_are_counted_skipped() {
    let dir = tempdir().unwrap();
    let (manifest, objects) = make_vault(dir.path());
    put_object(&objects, "fff666", b"payload");
    fs::write(
        &manifest,
        r#"{"files": {
            "../outside.txt": "fff666",
            "nested/../../outside2.txt": "fff666",
            "ok.txt": "fff666"
        }}"#,
    )
    .unwrap();

    let dest = dir.path().join("dest");
    let summary = restore_snapshot(&manifest, &dest, &CancelToken::new()).unwrap();

    assert_eq!(summary.restored, 1);
    assert_eq!(summary.skipped, 2);
    assert!(!dir.path().join("outside.txt").exists());
    assert!(!dir.path().join("outside2.txt").exists());
}

#[test]
fn path_shaped_hash_is_skipped() {
    let dir = tempdir().unwrap();
    let (manifest, _objects) = make_vault(dir.path());
    // a hash that tries to escape the object store
    fs::write(dir.path().join("vault/secret"), b"not an object").unwrap();
    fs::write(&manifest, r#"{"files": {"x.txt": "../secret"}}"#).unwrap();

    let dest = dir.path().join("dest");
    let summary = restore_snapshot(&manifest, &dest, &CancelToken::new()).unwrap();
    assert_eq!(summary.restored, 0);
    assert_eq!(summary.skipped, 1);
    assert!(!dest.join("x.txt").exists());
}

#[test]
fn metadata_failure_does_not_mark_skipped() {
    // an mtime far outside range is ignored with a warning; the entry still
    // counts as restored because its content reached the destination
    let dir = tempdir().unwrap();
    let (manifest, objects) = make_vault(dir.path());
    put_object(&objects, "abc999", b"content first");
    fs::write(
        &manifest,
        r#"{"version": 2, "files": {"f.txt": {"hash": "abc999", "mtime": -5.0}}}"#,
    )
    .unwrap();

    let dest = dir.path().join("dest");
    let summary = restore_snapshot(&manifest, &dest, &CancelToken::new()).unwrap();
    assert_eq!(summary.restored, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(fs::read(dest.join("f.txt")).unwrap(), b"content first");
}

#[test]
fn malformed_manifest_aborts() {
    let dir = tempdir().unwrap();
    let (manifest, _objects) = make_vault(dir.path());
    fs::write(&manifest, b"]]]").unwrap();

    let err =
        restore_snapshot(&manifest, &dir.path().join("dest"), &CancelToken::new()).unwrap_err();
    assert!(matches!(err, RestoreError::BadManifest { .. }));
    assert!(!dir.path().join("dest").exists());
}

#[test]
fn cancelled_walk_keeps_applied_prefix() {
    let dir = tempdir().unwrap();
    let (manifest, objects) = make_vault(dir.path());
    put_object(&objects, "aaa000", b"x");
    fs::write(&manifest, r#"{"files": {"a.txt": "aaa000"}}"#).unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = restore_snapshot(&manifest, &dir.path().join("dest"), &cancel).unwrap_err();
    assert!(matches!(err, RestoreError::Cancelled));
}
