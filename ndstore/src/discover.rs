//! Recursive discovery of candidate dataset files.
//!
//! Walks a directory tree and collects absolute paths of files whose
//! extension is in the supported set, with the same truncate-and-signal
//! contract the metadata getters use: hitting `max_items` stops collection
//! but the walk keeps counting so the overflow signal is exact, and
//! over-long path entries are truncated per-entry.

use std::path::Path;

use walkdir::WalkDir;

use crate::error::{Result, StorageError};

/// File extensions recognized as datasets (matched case-insensitively).
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["tif", "tiff", "tf8"];

/// Returns `true` if the path carries a supported dataset extension.
fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

/// Recursively lists dataset files under `path`, appending absolute paths
/// to `out`.
///
/// Collection stops at `max_items`; entries longer than `max_item_length`
/// bytes are truncated at a character boundary. Either condition delivers
/// the collected prefix and signals [`StorageError::SequenceTooLarge`]
/// (with item counts in `copied`/`total`) rather than silently dropping or
/// cutting results.
///
/// # Errors
///
/// - [`StorageError::InvalidInput`] if `path` does not exist, is not a
///   directory, or a limit is zero.
/// - [`StorageError::SequenceTooLarge`] on overflow or per-entry truncation.
/// - [`StorageError::Internal`] if the walk itself fails.
pub fn list_datasets(
    path: impl AsRef<Path>,
    max_items: usize,
    max_item_length: usize,
    out: &mut Vec<String>,
) -> Result<()> {
    let path = path.as_ref();
    if max_items == 0 || max_item_length == 0 {
        return Err(StorageError::invalid_input(
            "max_items and max_item_length must be greater than zero",
        ));
    }
    if !path.exists() || !path.is_dir() {
        return Err(StorageError::invalid_input(format!(
            "'{}' is not an existing directory",
            path.display()
        )));
    }

    let mut skipped = 0usize;
    let mut truncated_entry = false;
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry
            .map_err(|e| StorageError::internal_io("directory walk failed", e.into()))?;
        if !entry.file_type().is_file() || !is_supported(entry.path()) {
            continue;
        }
        if out.len() >= max_items {
            skipped += 1;
            continue;
        }

        let absolute = std::path::absolute(entry.path())
            .map_err(|e| StorageError::internal_io("cannot resolve absolute path", e))?;
        let mut item = absolute.to_string_lossy().into_owned();
        if item.len() > max_item_length {
            let mut end = max_item_length;
            while !item.is_char_boundary(end) {
                end -= 1;
            }
            item.truncate(end);
            truncated_entry = true;
        }
        out.push(item);
    }

    if skipped > 0 || truncated_entry {
        return Err(StorageError::SequenceTooLarge {
            copied: out.len(),
            total: out.len() + skipped,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_matching_is_case_insensitive() {
        assert!(is_supported(Path::new("/a/b.tif")));
        assert!(is_supported(Path::new("/a/b.TIFF")));
        assert!(is_supported(Path::new("/a/b.Tf8")));
        assert!(!is_supported(Path::new("/a/b.zarr")));
        assert!(!is_supported(Path::new("/a/tif")));
        assert!(!is_supported(Path::new("/a/noext")));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut out = Vec::new();
        assert!(matches!(
            list_datasets(".", 0, 10, &mut out),
            Err(StorageError::InvalidInput { .. })
        ));
        assert!(matches!(
            list_datasets(".", 10, 0, &mut out),
            Err(StorageError::InvalidInput { .. })
        ));
    }
}
