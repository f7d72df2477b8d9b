use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// Create the parent directory of `path` if it has one.
pub(crate) fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(StoreError::io(parent))
        }
        _ => Ok(()),
    }
}

/// Sibling temp path used while replacing `path`.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp-{}", std::process::id()))
}

/// Replace `path` with `contents` via a temp file and rename in the same
/// directory. Readers see either the old or the new file, never a mix.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    ensure_parent(path)?;
    let tmp = temp_sibling(path);

    let result = (|| {
        let mut file = File::create(&tmp).map_err(StoreError::io(&tmp))?;
        file.write_all(contents).map_err(StoreError::io(&tmp))?;
        file.sync_all().map_err(StoreError::io(&tmp))?;
        fs::rename(&tmp, path).map_err(StoreError::io(path))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
