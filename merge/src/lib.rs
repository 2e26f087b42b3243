//! Three-way merge (§4.8): the seven-case truth table over (exists in O, A,
//! B), executable-bit resolution, and binary-conflict sibling-file
//! persistence. Operates on the file-list `change_graph` enumerates and the
//! blob content `object_store` holds; produces the file entries a new merge
//! change should be committed with. The caller (the RPC handler behind
//! `new-change` with two parents) is responsible for actually creating that
//! change and writing its file set.

mod diff3;

use std::io::Read;

use context::CoreContext;
use change_graph::MergeFileCase;
use file_type::{CanonicalizingReader, LineEnding, TypeReader};
use object_store::ObjectStore;
use pogo_errors::{ErrorKind, ToErrorKind};
use pogo_types::{FileEntry, RepoPath};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] object_store::Error),
    #[error(transparent)]
    Path(#[from] anyhow::Error),
}

impl ToErrorKind for Error {
    fn error_kind(&self) -> ErrorKind {
        match self {
            Error::Store(e) => e.error_kind(),
            Error::Path(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Merges every path `change_graph::merge_file_list` enumerated, returning
/// the flattened file set for the new merge change.
pub async fn merge_changes(
    ctx: &CoreContext,
    store: &ObjectStore,
    cases: &[MergeFileCase],
    a_name: &str,
    b_name: &str,
) -> Result<Vec<FileEntry>> {
    let mut out = Vec::new();
    for case in cases {
        out.extend(merge_file(ctx, store, case, a_name, b_name).await?);
    }
    Ok(out)
}

/// Resolves one path's three-way case to zero, one, or three file entries
/// (three only for binary-conflict persistence).
pub async fn merge_file(
    ctx: &CoreContext,
    store: &ObjectStore,
    case: &MergeFileCase,
    a_name: &str,
    b_name: &str,
) -> Result<Vec<FileEntry>> {
    match (&case.o, &case.a, &case.b) {
        (None, Some(a), None) => Ok(vec![entry(case.path.clone(), a, false)]),
        (None, None, Some(b)) => Ok(vec![entry(case.path.clone(), b, false)]),
        (None, None, None) => Ok(Vec::new()),
        (Some(_), None, None) => Ok(Vec::new()),

        (Some(o), Some(a), None) => {
            if a.blob_hash == o.blob_hash && a.symlink_target == o.symlink_target {
                Ok(Vec::new())
            } else {
                Ok(binary_conflict(case, Some(o), Some(a), None, a_name, b_name))
            }
        }
        (Some(o), None, Some(b)) => {
            if b.blob_hash == o.blob_hash && b.symlink_target == o.symlink_target {
                Ok(Vec::new())
            } else {
                Ok(binary_conflict(case, Some(o), None, Some(b), a_name, b_name))
            }
        }

        (o, Some(a), Some(b)) => {
            if a.blob_hash == b.blob_hash && a.symlink_target == b.symlink_target {
                let executable = resolve_executable(o.as_ref(), a, Some(b));
                return Ok(vec![entry_with_executable(case.path.clone(), a, executable)]);
            }
            if is_symlink_or_binary(store, a).await? || is_symlink_or_binary(store, b).await? {
                return Ok(binary_conflict(case, o.as_ref(), Some(a), Some(b), a_name, b_name));
            }
            let (base_content, base_info) = match o {
                Some(o) => store.open(&o.blob_hash).await?,
                None => (Vec::new(), file_type::classify(&[])),
            };
            let (a_content, a_info) = store.open(&a.blob_hash).await?;
            let (b_content, b_info) = store.open(&b.blob_hash).await?;

            let base_text = canonicalize(&base_content);
            let a_text = canonicalize(&a_content);
            let b_text = canonicalize(&b_content);
            let result = diff3::merge(&base_text, &a_text, &b_text, a_name, b_name);

            let target_ending = file_type::resolve_three_way(base_info, a_info, b_info).line_ending;
            let merged_bytes = expand(&result.merged, target_ending);
            let (hash, _) = store.store_bytes(ctx, &merged_bytes).await?;
            let executable = resolve_executable(o.as_ref(), a, Some(b));
            Ok(vec![FileEntry {
                path: case.path.clone(),
                blob_hash: hash,
                executable,
                symlink_target: None,
                has_conflicts: result.has_conflicts,
            }])
        }
    }
}

/// Rewrites CRLF to LF so `diff3::split_lines` (which splits only on bare
/// `\n`) never sees an embedded `\r`, then decodes to text for diffing.
fn canonicalize(content: &[u8]) -> String {
    let mut reader = CanonicalizingReader::new(content);
    let mut out = Vec::with_capacity(content.len());
    reader.read_to_end(&mut out).expect("reading from a byte slice cannot fail");
    String::from_utf8_lossy(&out).into_owned()
}

/// Re-expands canonical-LF merge output to the line ending the three-way
/// type resolution picked.
fn expand(merged: &str, target: LineEnding) -> Vec<u8> {
    let mut reader = TypeReader::new(merged.as_bytes(), target);
    let mut out = Vec::with_capacity(merged.len());
    reader.read_to_end(&mut out).expect("reading from a byte slice cannot fail");
    out
}

async fn is_symlink_or_binary(store: &ObjectStore, side: &change_graph::Side) -> Result<bool> {
    if side.symlink_target.is_some() {
        return Ok(true);
    }
    let (_, info) = store.open(&side.blob_hash).await?;
    Ok(info.binary)
}

fn entry(path: RepoPath, side: &change_graph::Side, has_conflicts: bool) -> FileEntry {
    FileEntry {
        path,
        blob_hash: side.blob_hash,
        executable: side.executable,
        symlink_target: side.symlink_target.clone(),
        has_conflicts,
    }
}

fn entry_with_executable(
    path: RepoPath,
    side: &change_graph::Side,
    executable: bool,
) -> FileEntry {
    FileEntry {
        path,
        blob_hash: side.blob_hash,
        executable,
        symlink_target: side.symlink_target.clone(),
        has_conflicts: false,
    }
}

/// Executable-bit resolution (§4.8 point 3): start from O's bit (false if
/// absent); if A differs, take A's; else if B differs, take B's; else O's.
fn resolve_executable(
    o: Option<&change_graph::Side>,
    a: &change_graph::Side,
    b: Option<&change_graph::Side>,
) -> bool {
    let o_bit = o.map(|s| s.executable).unwrap_or(false);
    if a.executable != o_bit {
        return a.executable;
    }
    if let Some(b) = b {
        if b.executable != o_bit {
            return b.executable;
        }
    }
    o_bit
}

/// Writes the LCA content (if it existed) at `path`, A's content at
/// `path.<a_name>`, and B's content at `path.<b_name>`, all marked
/// conflicted. No new blobs are written: each sibling reuses its source
/// side's existing hash, just indexed under a new path.
fn binary_conflict(
    case: &MergeFileCase,
    o: Option<&change_graph::Side>,
    a: Option<&change_graph::Side>,
    b: Option<&change_graph::Side>,
    a_name: &str,
    b_name: &str,
) -> Vec<FileEntry> {
    let mut out = Vec::new();
    if let Some(o) = o {
        out.push(entry(case.path.clone(), o, true));
    }
    if let Some(a) = a {
        out.push(entry(case.path.with_suffix(a_name), a, true));
    }
    if let Some(b) = b {
        out.push(entry(case.path.with_suffix(b_name), b, true));
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use change_graph::Side;
    use pogo_types::{BlobHash, RepoPath};

    fn ctx() -> CoreContext {
        CoreContext::test_mock()
    }

    fn path(s: &str) -> RepoPath {
        RepoPath::new(s).unwrap()
    }

    fn side(hash: &BlobHash) -> Side {
        Side {
            blob_hash: *hash,
            executable: false,
            symlink_target: None,
        }
    }

    async fn put(store: &ObjectStore, content: &[u8]) -> BlobHash {
        store.store_bytes(&ctx(), content).await.unwrap().0
    }

    #[tokio::test]
    async fn added_only_in_a_is_taken() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let hash = put(&store, b"new file").await;
        let case = MergeFileCase {
            path: path("new.txt"),
            o: None,
            a: Some(side(&hash)),
            b: None,
        };
        let result = merge_file(&ctx(), &store, &case, "alice", "bob")
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].path, path("new.txt"));
        assert!(!result[0].has_conflicts);
    }

    #[tokio::test]
    async fn deleted_in_a_when_unchanged_in_b_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let hash = put(&store, b"original").await;
        let case = MergeFileCase {
            path: path("gone.txt"),
            o: Some(side(&hash)),
            a: None,
            b: Some(side(&hash)),
        };
        let result = merge_file(&ctx(), &store, &case, "alice", "bob")
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn both_absent_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let case = MergeFileCase {
            path: path("never.txt"),
            o: None,
            a: None,
            b: None,
        };
        let result = merge_file(&ctx(), &store, &case, "alice", "bob")
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn identical_edits_on_both_sides_are_not_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let o_hash = put(&store, b"a\nb\nc\n").await;
        let ab_hash = put(&store, b"A\nb\nc\n").await;
        let case = MergeFileCase {
            path: path("f.txt"),
            o: Some(side(&o_hash)),
            a: Some(side(&ab_hash)),
            b: Some(side(&ab_hash)),
        };
        let result = merge_file(&ctx(), &store, &case, "alice", "bob")
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert!(!result[0].has_conflicts);
        assert_eq!(result[0].blob_hash, ab_hash);
    }

    #[tokio::test]
    async fn non_overlapping_text_edits_merge_without_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let o_hash = put(&store, b"a\nb\nc\n").await;
        let a_hash = put(&store, b"A\nb\nc\n").await;
        let b_hash = put(&store, b"a\nb\nC\n").await;
        let case = MergeFileCase {
            path: path("f.txt"),
            o: Some(side(&o_hash)),
            a: Some(side(&a_hash)),
            b: Some(side(&b_hash)),
        };
        let result = merge_file(&ctx(), &store, &case, "alice", "bob")
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert!(!result[0].has_conflicts);
        let (content, _) = store.open(&result[0].blob_hash).await.unwrap();
        assert_eq!(content, b"A\nb\nC\n");
    }

    #[tokio::test]
    async fn overlapping_text_edits_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let o_hash = put(&store, b"a\nb\nc\n").await;
        let a_hash = put(&store, b"A\nb\nc\n").await;
        let b_hash = put(&store, b"AA\nb\nc\n").await;
        let case = MergeFileCase {
            path: path("f.txt"),
            o: Some(side(&o_hash)),
            a: Some(side(&a_hash)),
            b: Some(side(&b_hash)),
        };
        let result = merge_file(&ctx(), &store, &case, "alice", "bob")
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert!(result[0].has_conflicts);
        let (content, _) = store.open(&result[0].blob_hash).await.unwrap();
        let content = String::from_utf8(content).unwrap();
        assert!(content.contains("<<<<<<< alice"));
        assert!(content.contains(">>>>>>> bob"));
    }

    #[tokio::test]
    async fn binary_divergence_persists_three_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let o_hash = put(&store, &[0u8, 1, 2, 255]).await;
        let a_hash = put(&store, &[0u8, 1, 2, 254]).await;
        let b_hash = put(&store, &[0u8, 1, 2, 253]).await;
        let case = MergeFileCase {
            path: path("bin.dat"),
            o: Some(side(&o_hash)),
            a: Some(side(&a_hash)),
            b: Some(side(&b_hash)),
        };
        let result = merge_file(&ctx(), &store, &case, "alice", "bob")
            .await
            .unwrap();
        assert_eq!(result.len(), 3);
        assert!(result.iter().all(|e| e.has_conflicts));
        assert!(result.iter().any(|e| e.path == path("bin.dat")));
        assert!(result.iter().any(|e| e.path == path("bin.dat.alice")));
        assert!(result.iter().any(|e| e.path == path("bin.dat.bob")));
        // no new blobs: each sibling reuses its source side's existing hash
        assert!(result.iter().any(|e| e.blob_hash == o_hash));
        assert!(result.iter().any(|e| e.blob_hash == a_hash));
        assert!(result.iter().any(|e| e.blob_hash == b_hash));
    }

    #[tokio::test]
    async fn executable_bit_follows_the_side_that_changed_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let o_hash = put(&store, b"same content\n").await;
        let mut a_side = side(&o_hash);
        a_side.executable = true;
        let b_side = side(&o_hash);
        let case = MergeFileCase {
            path: path("run.sh"),
            o: Some(side(&o_hash)),
            a: Some(a_side),
            b: Some(b_side),
        };
        let result = merge_file(&ctx(), &store, &case, "alice", "bob")
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert!(result[0].executable);
    }
}
