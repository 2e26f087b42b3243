//! Working-tree walk (§4.6 steps 1-2): build the ignore matcher from every
//! `.gitignore`/`.pogoignore` encountered, then enumerate every non-ignored
//! entry into a declared `(path, hash, executable, symlink_target)` list,
//! consulting the local hash cache before hashing file content.

use std::fs;
use std::path::Path;

use pogo_errors::{ErrorKind, ToErrorKind};
use pogo_types::{BlobHash, RepoPath};
use thiserror::Error;

use hash_cache::{FileStat, HashCache};
use ignore_match::IgnoreMatcher;

const IGNORE_FILE_NAMES: &[&str] = &[".gitignore", ".pogoignore"];

#[derive(Debug, Error)]
pub enum WalkError {
    #[error("read working tree entry: {0}")]
    Io(#[source] std::io::Error),
    #[error("consult local hash cache: {0}")]
    Cache(#[source] anyhow::Error),
    #[error("symlink at {0} targets outside the repository")]
    SymlinkEscape(String),
}

impl ToErrorKind for WalkError {
    fn error_kind(&self) -> ErrorKind {
        match self {
            WalkError::Io(_) => ErrorKind::Internal,
            WalkError::Cache(_) => ErrorKind::Internal,
            WalkError::SymlinkEscape(_) => ErrorKind::SymlinkEscape,
        }
    }
}

pub type Result<T> = std::result::Result<T, WalkError>;

/// One entry the push pipeline will declare to the server: either a regular
/// file (content hash, no symlink target) or a symlink (hash of the
/// normalized target string, no uploaded content).
#[derive(Debug, Clone)]
pub struct DeclaredFile {
    pub path: RepoPath,
    pub hash: BlobHash,
    pub executable: bool,
    pub symlink_target: Option<String>,
}

/// First pass: every `.gitignore`/`.pogoignore` found anywhere in the tree,
/// each scoped to the directory it lives in, layered over the built-in
/// defaults.
pub fn collect_ignore_matcher(root: &Path) -> Result<IgnoreMatcher> {
    let mut matcher = IgnoreMatcher::new();
    for entry in walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !IGNORE_FILE_NAMES.contains(&name.as_ref()) {
            continue;
        }
        let domain = relative_dir(root, entry.path());
        let contents = fs::read_to_string(entry.path()).map_err(WalkError::Io)?;
        matcher.add_file(&domain, &contents);
    }
    Ok(matcher)
}

/// Second pass: every non-ignored file and symlink, hashed via the cache.
pub fn walk_working_tree(
    root: &Path,
    matcher: &IgnoreMatcher,
    cache: &HashCache,
) -> Result<Vec<DeclaredFile>> {
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored_entry(root, e, matcher))
    {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if entry.depth() == 0 {
            continue;
        }
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        let repo_path_str = relative_path(root, entry.path());
        let repo_path = match RepoPath::new(&repo_path_str) {
            Ok(p) => p,
            Err(_) => continue,
        };

        if file_type.is_symlink() {
            let raw_target = fs::read_link(entry.path())
                .map_err(WalkError::Io)?
                .to_string_lossy()
                .into_owned();
            let normalized = normalize_symlink_target(&repo_path_str, &raw_target)?;
            out.push(DeclaredFile {
                path: repo_path,
                hash: BlobHash::of(normalized.as_bytes()),
                executable: false,
                symlink_target: Some(normalized),
            });
            continue;
        }

        let meta = entry.metadata().map_err(|e| {
            WalkError::Io(e.into_io_error().unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::Other, "walkdir metadata error")
            }))
        })?;
        let stat = FileStat::from_metadata(&meta);
        let hash = match cache.lookup(&repo_path_str, &stat).map_err(WalkError::Cache)? {
            Some(hash) => hash,
            None => {
                let content = fs::read(entry.path()).map_err(WalkError::Io)?;
                let hash = BlobHash::of(&content);
                cache
                    .update(&repo_path_str, &stat, hash)
                    .map_err(WalkError::Cache)?;
                hash
            }
        };

        out.push(DeclaredFile {
            path: repo_path,
            hash,
            executable: is_executable(&meta),
            symlink_target: None,
        });
    }
    Ok(out)
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    false
}

fn is_ignored_entry(root: &Path, entry: &walkdir::DirEntry, matcher: &IgnoreMatcher) -> bool {
    let path = relative_path(root, entry.path());
    matcher.is_ignored(&path, entry.file_type().is_dir())
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn relative_dir(root: &Path, file_path: &Path) -> String {
    let parent = file_path.parent().unwrap_or(root);
    relative_path(root, parent)
}

/// Joins `raw_target` against the directory containing `link_repo_path`,
/// resolving `.`/`..`, and rejects the result if it would walk above the
/// repository root.
fn normalize_symlink_target(link_repo_path: &str, raw_target: &str) -> Result<String> {
    if raw_target.starts_with('/') {
        return Err(WalkError::SymlinkEscape(link_repo_path.to_string()));
    }
    let raw_target = raw_target.replace('\\', "/");
    let parent = link_repo_path.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
    let mut stack: Vec<&str> = parent.split('/').filter(|s| !s.is_empty()).collect();
    for component in raw_target.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if stack.pop().is_none() {
                    return Err(WalkError::SymlinkEscape(link_repo_path.to_string()));
                }
            }
            c => stack.push(c),
        }
    }
    Ok(stack.join("/"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sibling_target_normalizes_to_repo_relative() {
        let normalized = normalize_symlink_target("sub/link", "../other/target.txt").unwrap();
        assert_eq!(normalized, "other/target.txt");
    }

    #[test]
    fn escaping_target_is_rejected() {
        let err = normalize_symlink_target("link", "../outside.txt").unwrap_err();
        assert!(matches!(err, WalkError::SymlinkEscape(_)));
    }

    #[test]
    fn walk_skips_ignored_files_and_hashes_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "*.log\n").unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("debug.log"), b"noise").unwrap();

        let matcher = collect_ignore_matcher(dir.path()).unwrap();
        let cache = HashCache::open_in_memory().unwrap();
        let files = walk_working_tree(dir.path(), &matcher, &cache).unwrap();

        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert!(paths.contains(&"keep.txt"));
        assert!(!paths.contains(&"debug.log"));
        assert!(!paths.contains(&".gitignore"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_is_declared_without_reading_file_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("target.txt"), b"x").unwrap();
        std::os::unix::fs::symlink("target.txt", dir.path().join("link")).unwrap();

        let matcher = IgnoreMatcher::new();
        let cache = HashCache::open_in_memory().unwrap();
        let files = walk_working_tree(dir.path(), &matcher, &cache).unwrap();

        let link = files.iter().find(|f| f.path.as_str() == "link").unwrap();
        assert_eq!(link.symlink_target.as_deref(), Some("target.txt"));
        assert_eq!(link.hash, BlobHash::of(b"target.txt"));
    }

    #[test]
    fn second_hash_of_unchanged_file_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"content").unwrap();
        let matcher = IgnoreMatcher::new();
        let cache = HashCache::open_in_memory().unwrap();

        let first = walk_working_tree(dir.path(), &matcher, &cache).unwrap();
        // Mutate the on-disk content without updating mtime semantics the
        // cache tracks, to prove the second walk trusts the cache: rewrite
        // with identical content so the hash is unaffected either way, but
        // the cache row must exist after one walk.
        std::fs::write(dir.path().join("a.txt"), b"content").unwrap();
        let second = walk_working_tree(dir.path(), &matcher, &cache).unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].hash, second[0].hash);
    }
}
