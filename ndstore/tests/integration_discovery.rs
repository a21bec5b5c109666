//! Integration tests for recursive dataset discovery.

use ndstore::{list_datasets, StorageError};
use std::fs;
use tempfile::tempdir;

/// Lays out a small tree with datasets at several depths plus decoys.
fn make_tree(root: &std::path::Path) {
    fs::create_dir_all(root.join("run1/pos0")).unwrap();
    fs::create_dir_all(root.join("run2")).unwrap();
    fs::write(root.join("a.tif"), b"x").unwrap();
    fs::write(root.join("run1/b.TIFF"), b"x").unwrap();
    fs::write(root.join("run1/pos0/c.tf8"), b"x").unwrap();
    fs::write(root.join("run2/notes.txt"), b"x").unwrap();
    fs::write(root.join("run2/d.tiff"), b"x").unwrap();
}

#[test]
fn test_recursive_extension_filtered_listing() {
    let dir = tempdir().unwrap();
    make_tree(dir.path());

    let mut out = Vec::new();
    list_datasets(dir.path(), 64, 4096, &mut out).unwrap();

    assert_eq!(out.len(), 4, "expected the 4 dataset files, got {out:?}");
    assert!(out.iter().all(|p| !p.ends_with("notes.txt")));
    assert!(out.iter().any(|p| p.ends_with("c.tf8")));
    // Results are absolute paths.
    assert!(out.iter().all(|p| std::path::Path::new(p).is_absolute()));
}

#[test]
fn test_max_items_returns_prefix_and_signals() {
    let dir = tempdir().unwrap();
    make_tree(dir.path());

    let mut out = Vec::new();
    let err = list_datasets(dir.path(), 2, 4096, &mut out).unwrap_err();
    match err {
        StorageError::SequenceTooLarge { copied, total } => {
            assert_eq!(copied, 2);
            assert_eq!(total, 4);
        }
        other => panic!("expected SequenceTooLarge, got: {other:?}"),
    }
    // The collected prefix is still delivered.
    assert_eq!(out.len(), 2);
}

#[test]
fn test_long_entries_truncated_and_signaled() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("dataset.tif"), b"x").unwrap();

    let mut out = Vec::new();
    let err = list_datasets(dir.path(), 16, 10, &mut out).unwrap_err();
    assert!(matches!(err, StorageError::SequenceTooLarge { .. }));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].len(), 10);
}

#[test]
fn test_invalid_roots_rejected() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("not_a_dir.tif");
    fs::write(&file, b"x").unwrap();

    let mut out = Vec::new();
    assert!(matches!(
        list_datasets(dir.path().join("missing"), 16, 4096, &mut out),
        Err(StorageError::InvalidInput { .. })
    ));
    assert!(matches!(
        list_datasets(&file, 16, 4096, &mut out),
        Err(StorageError::InvalidInput { .. })
    ));
}

#[test]
fn test_empty_tree_is_ok() {
    let dir = tempdir().unwrap();
    let mut out = Vec::new();
    list_datasets(dir.path(), 16, 4096, &mut out).unwrap();
    assert!(out.is_empty());
}
