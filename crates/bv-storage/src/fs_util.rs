//! File helpers shared by the orchestrator, the writer and migrations.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use bv_common::{Error, Result};
use tracing::{debug, warn, Level};
use uuid::Uuid;

use crate::logging::{log_internal, LogTarget, MAINTAINER_TARGET};

/// Append `bytes` to `path`, creating the file if needed.
pub fn append(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(bytes)?;
    Ok(())
}

/// Replace the content of `path` with `bytes`.
pub fn overwrite(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes)?;
    Ok(())
}

pub fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    Ok(fs::read(path)?)
}

/// Size of `path` in bytes, 0 if it cannot be stat'ed.
pub fn file_len(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Delete `path`, logging failures instead of returning them.
///
/// Returns true only if this call removed the file.
pub fn delete_logged(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "deleted");
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "already gone");
            false
        }
        Err(e) => {
            warn!(target: MAINTAINER_TARGET, path = %path.display(), error = %e, "failed to delete file");
            false
        }
    }
}

/// Make sure `dir` exists, is a directory and is writable.
pub fn ensure_writable_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| {
            Error::RootUnavailable(format!("cannot create {}: {}", dir.display(), e))
        })?;
    }
    let metadata = fs::metadata(dir)?;
    if !metadata.is_dir() {
        return Err(Error::RootUnavailable(format!(
            "{} is not a directory",
            dir.display()
        )));
    }
    if metadata.permissions().readonly() {
        return Err(Error::RootUnavailable(format!(
            "{} is not writable",
            dir.display()
        )));
    }
    Ok(())
}

/// Move `src` to `dst`.
///
/// A rename is tried first. When it fails (typically across filesystems),
/// the content is copied into a temp file next to `dst`, which is then
/// renamed into place, so `dst` never exists half-written. If the source
/// cannot be removed afterwards the copy is undone and the error returned,
/// so the file is never left at both paths.
pub fn move_file(src: &Path, dst: &Path) -> Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(e.into()),
        Err(e) => {
            debug!(src = %src.display(), error = %e, "rename failed, falling back to copy");
        }
    }
    copy_then_remove(src, dst, |path| fs::remove_file(path))
}

fn copy_then_remove<F>(src: &Path, dst: &Path, remove_src: F) -> Result<()>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    let parent = dst
        .parent()
        .ok_or_else(|| Error::Config(format!("{} has no parent", dst.display())))?;
    let tmp = parent.join(format!(".tmp-{}", Uuid::new_v4()));

    if let Err(e) = fs::copy(src, &tmp).and_then(|_| fs::rename(&tmp, dst)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    if let Err(e) = remove_src(src) {
        if let Err(undo) = fs::remove_file(dst) {
            log_internal(
                Level::ERROR,
                &[LogTarget::Maintainer, LogTarget::Telemetry],
                &format!(
                    "Could not remove {} nor undo its copy at {}: {}",
                    src.display(),
                    dst.display(),
                    undo
                ),
            );
        }
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        append(&path, b"ab").unwrap();
        append(&path, b"cd").unwrap();
        assert_eq!(read_bytes(&path).unwrap(), b"abcd");
        overwrite(&path, b"x").unwrap();
        assert_eq!(read_bytes(&path).unwrap(), b"x");
        assert_eq!(file_len(&path), 1);
    }

    #[test]
    fn test_file_len_missing_is_zero() {
        let dir = TempDir::new().unwrap();
        assert_eq!(file_len(&dir.path().join("missing")), 0);
    }

    #[test]
    fn test_delete_logged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"x").unwrap();
        assert!(delete_logged(&path));
        assert!(!path.exists());
        assert!(!delete_logged(&path));
    }

    #[test]
    fn test_ensure_writable_dir_creates_missing() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_writable_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_ensure_writable_dir_rejects_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, b"x").unwrap();
        let err = ensure_writable_dir(&file).unwrap_err();
        assert_eq!(err.code(), 30);
    }

    #[test]
    fn test_move_file() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dst_dir = dir.path().join("out");
        fs::create_dir(&dst_dir).unwrap();
        let dst = dst_dir.join("dst");
        fs::write(&src, b"payload").unwrap();

        move_file(&src, &dst).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).unwrap(), b"payload");
    }

    #[test]
    fn test_move_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let result = move_file(&dir.path().join("nope"), &dir.path().join("dst"));
        assert!(result.is_err());
    }

    #[test]
    fn test_copy_move_undone_when_source_cannot_be_removed() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::write(&src, b"batch").unwrap();

        let result = copy_then_remove(&src, &dst, |_| {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
        });
        assert!(result.is_err());
        assert_eq!(fs::read(&src).unwrap(), b"batch");
        assert!(!dst.exists());
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_copy_move_removes_source() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::write(&src, b"batch").unwrap();

        copy_then_remove(&src, &dst, |path| fs::remove_file(path)).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).unwrap(), b"batch");
    }
}
