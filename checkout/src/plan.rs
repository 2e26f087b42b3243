//! Server-side enumeration (§4.7): given a revision's file set and the
//! client's current list of paths, decide what to delete and what to
//! (re)write. Ignore evaluation uses the revision's own ignore files, not
//! the client's, so a checkout of the same revision always produces the
//! same plan regardless of what ignore rules happen to be on disk locally.

use std::collections::HashSet;

use anyhow::Result;
use ignore_match::IgnoreMatcher;
use object_store::ObjectStore;
use pogo_types::{FileEntry, RepoPath};

#[derive(Debug, Clone)]
pub enum CheckoutOp {
    Delete(RepoPath),
    Write(FileEntry),
}

/// Builds an `IgnoreMatcher` from whichever `.gitignore`/`.pogoignore`
/// blobs are part of the revision's own file set (§4.7: "the revision's
/// own ignore files, not the client's").
pub async fn revision_ignore_matcher(
    store: &ObjectStore,
    entries: &[FileEntry],
) -> Result<IgnoreMatcher> {
    let mut matcher = IgnoreMatcher::new();
    for entry in entries {
        let path = entry.path.as_str();
        let name = path.rsplit('/').next().unwrap_or(path);
        if name != ".gitignore" && name != ".pogoignore" {
            continue;
        }
        let (content, _) = store.open(&entry.blob_hash).await?;
        let domain = path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        matcher.add_file(domain, &String::from_utf8_lossy(&content));
    }
    Ok(matcher)
}

/// `client_paths` are the paths the client currently has on disk, already
/// repository-relative and forward-slash separated.
pub fn plan(
    revision_entries: &[FileEntry],
    revision_ignore: &IgnoreMatcher,
    client_paths: &[String],
) -> Vec<CheckoutOp> {
    let tracked: HashSet<&str> = revision_entries.iter().map(|e| e.path.as_str()).collect();
    let mut ops = Vec::new();

    for client_path in client_paths {
        if tracked.contains(client_path.as_str()) {
            continue;
        }
        if revision_ignore.is_ignored(client_path, false) {
            continue;
        }
        if let Ok(path) = RepoPath::new(client_path.clone()) {
            ops.push(CheckoutOp::Delete(path));
        }
    }

    for entry in revision_entries {
        if revision_ignore.is_ignored(entry.path.as_str(), false) {
            continue;
        }
        ops.push(CheckoutOp::Write(entry.clone()));
    }

    ops
}
