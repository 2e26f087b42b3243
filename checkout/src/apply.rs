//! Client-side application of a checkout/edit stream (§4.7): once the
//! caller has decoded a `FileToDelete` or a `FileHeader` + assembled
//! content, these functions touch the filesystem. Symlinks fail verbatim
//! on platforms that can't create them (notably Windows without developer
//! mode) rather than silently falling back to a regular file.

use std::fs;
use std::path::Path;

use pogo_errors::{ErrorKind, ToErrorKind};
use pogo_types::{FileEntry, RepoPath};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("delete {path}: {source}")]
    Delete {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("create symlink {path}: {source}")]
    Symlink {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ToErrorKind for ApplyError {
    fn error_kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

pub type Result<T> = std::result::Result<T, ApplyError>;

pub fn delete(root: &Path, path: &RepoPath) -> Result<()> {
    let full = root.join(path.as_str());
    match fs::remove_file(&full) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ApplyError::Delete {
            path: path.as_str().to_string(),
            source,
        }),
    }
}

/// Writes a tracked entry's content to disk. `content` is ignored for
/// symlinks — the target string in `entry.symlink_target` is what gets
/// linked, matching §4.6's "no blob is uploaded" rule for symlinks.
pub fn write(root: &Path, entry: &FileEntry, content: &[u8]) -> Result<()> {
    let full = root.join(entry.path.as_str());
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent).map_err(|source| ApplyError::Write {
            path: entry.path.as_str().to_string(),
            source,
        })?;
    }

    if let Some(target) = &entry.symlink_target {
        if full.symlink_metadata().is_ok() {
            fs::remove_file(&full).map_err(|source| ApplyError::Symlink {
                path: entry.path.as_str().to_string(),
                source,
            })?;
        }
        create_symlink(target, &full).map_err(|source| ApplyError::Symlink {
            path: entry.path.as_str().to_string(),
            source,
        })?;
        return Ok(());
    }

    fs::write(&full, content).map_err(|source| ApplyError::Write {
        path: entry.path.as_str().to_string(),
        source,
    })?;
    set_executable(&full, entry.executable).map_err(|source| ApplyError::Write {
        path: entry.path.as_str().to_string(),
        source,
    })?;
    Ok(())
}

#[cfg(unix)]
fn create_symlink(target: &str, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &str, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(not(any(unix, windows)))]
fn create_symlink(_target: &str, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symlinks are not supported on this platform",
    ))
}

#[cfg(unix)]
fn set_executable(path: &Path, executable: bool) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    let mode = perms.mode();
    let next = if executable { mode | 0o111 } else { mode & !0o111 };
    perms.set_mode(next);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn set_executable(_path: &Path, _executable: bool) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use pogo_types::BlobHash;

    fn entry(path: &str, executable: bool, symlink_target: Option<&str>) -> FileEntry {
        FileEntry {
            path: RepoPath::new(path).unwrap(),
            blob_hash: BlobHash::of(path.as_bytes()),
            executable,
            symlink_target: symlink_target.map(|s| s.to_string()),
            has_conflicts: false,
        }
    }

    #[test]
    fn write_creates_parent_dirs_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let e = entry("sub/deep/file.txt", false, None);
        write(dir.path(), &e, b"hello").unwrap();
        let contents = fs::read(dir.path().join("sub/deep/file.txt")).unwrap();
        assert_eq!(contents, b"hello");
    }

    #[test]
    fn delete_of_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = RepoPath::new("never-existed.txt").unwrap();
        assert!(delete(dir.path(), &path).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn executable_bit_is_applied() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let e = entry("run.sh", true, None);
        write(dir.path(), &e, b"#!/bin/sh\n").unwrap();
        let mode = fs::metadata(dir.path().join("run.sh")).unwrap().permissions().mode();
        assert_ne!(mode & 0o111, 0);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_target_is_written_without_using_content() {
        let dir = tempfile::tempdir().unwrap();
        let e = entry("link", false, Some("dest.txt"));
        write(dir.path(), &e, &[]).unwrap();
        let target = fs::read_link(dir.path().join("link")).unwrap();
        assert_eq!(target.to_string_lossy(), "dest.txt");
    }
}
