//! Whole-file writes: content lands in a sibling temp file first and is
//! renamed over the target, so readers never see a half-written artifact.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::FleetError;

/// Write `contents` to `path` atomically. On unix, `mode` is applied to the
/// temp file before it is renamed into place.
pub fn write_atomic(path: &Path, contents: &[u8], mode: Option<u32>) -> Result<(), FleetError> {
    let tmp = temp_sibling(path);

    if let Err(e) = fs::write(&tmp, contents) {
        let _ = fs::remove_file(&tmp);
        return Err(FleetError::io(&tmp, e));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Some(mode) = mode {
            if let Err(e) = fs::set_permissions(&tmp, fs::Permissions::from_mode(mode)) {
                let _ = fs::remove_file(&tmp);
                return Err(FleetError::io(&tmp, e));
            }
        }
    }
    #[cfg(not(unix))]
    let _ = mode;

    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        FleetError::io(path, e)
    })
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".tmp{}", std::process::id()));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_and_replaces_whole_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.yml");
        write_atomic(&path, b"first", None).unwrap();
        write_atomic(&path, b"second", None).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_parent_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("absent").join("out.yml");
        let err = write_atomic(&path, b"x", None).unwrap_err();
        assert!(matches!(err, FleetError::Io { .. }));
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn applies_mode() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("secret.json");
        write_atomic(&path, b"{}", Some(0o600)).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
