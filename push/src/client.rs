//! Push orchestration (§4.6 steps 3-9): given the declared file list from
//! `walk`, ask the server what it's missing, upload those blobs with bounded
//! concurrency, and commit the new file set. The actual wire calls are
//! abstracted behind `PushTransport` so this crate stays independent of the
//! transport (`rpc`/HTTP) and can be exercised with an in-memory fake.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use pogo_errors::{ErrorKind, ToErrorKind};
use pogo_types::{BlobHash, ChangeId};
use thiserror::Error;

use crate::walk::DeclaredFile;

/// Blob uploads run with this many requests in flight at once (§4.6 step 4,
/// §5), matching the server's own blob-upload concurrency cap.
pub const UPLOAD_CONCURRENCY: usize = 8;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("check needed files: {0}")]
    CheckNeeded(#[source] anyhow::Error),
    #[error("upload blob: {0}")]
    Upload(#[source] anyhow::Error),
    #[error("commit push: {0}")]
    Commit(#[source] anyhow::Error),
}

impl ToErrorKind for PushError {
    fn error_kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

pub type Result<T> = std::result::Result<T, PushError>;

/// What the push pipeline needs from the network. A real implementation
/// (in `pogo_client`) wraps `rpc`'s framed transport and the blob PUT
/// endpoint; tests wrap an in-memory server double.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn check_needed(&self, hashes: &[BlobHash]) -> anyhow::Result<Vec<BlobHash>>;
    async fn upload_blob(&self, hash: BlobHash, content: Vec<u8>) -> anyhow::Result<()>;
    async fn commit(&self, change_id: ChangeId, force: bool, files: &[DeclaredFile]) -> anyhow::Result<()>;
}

/// Reads a declared file's content from disk by path, used to supply bytes
/// for blobs the server reports missing. Symlinks never reach here: their
/// "content" is the normalized target string already hashed in `walk`, and
/// §4.6 step 1 says no blob is uploaded for them.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn read(&self, path: &str) -> anyhow::Result<Vec<u8>>;
}

pub struct PushSummary {
    pub declared: usize,
    pub uploaded: usize,
}

/// Runs steps 3-9 of the push pipeline against an already-walked file list.
pub async fn push(
    transport: &(dyn PushTransport),
    content: &(dyn ContentSource),
    change_id: ChangeId,
    force: bool,
    files: Vec<DeclaredFile>,
) -> Result<PushSummary> {
    let declared_hashes: Vec<BlobHash> = files
        .iter()
        .filter(|f| f.symlink_target.is_none())
        .map(|f| f.hash)
        .collect();

    let needed = transport
        .check_needed(&declared_hashes)
        .await
        .map_err(PushError::CheckNeeded)?;
    let needed: std::collections::HashSet<BlobHash> = needed.into_iter().collect();

    let by_hash: std::collections::HashMap<BlobHash, &DeclaredFile> = files
        .iter()
        .filter(|f| f.symlink_target.is_none())
        .map(|f| (f.hash, f))
        .collect();

    let uploaded = Arc::new(tokio::sync::Mutex::new(0usize));
    let mut in_flight = FuturesUnordered::new();
    let mut pending: Vec<BlobHash> = needed.into_iter().collect();

    loop {
        while in_flight.len() < UPLOAD_CONCURRENCY {
            let Some(hash) = pending.pop() else { break };
            let Some(file) = by_hash.get(&hash) else { continue };
            let path = file.path.as_str().to_string();
            let uploaded = Arc::clone(&uploaded);
            in_flight.push(async move {
                let bytes = content.read(&path).await?;
                transport.upload_blob(hash, bytes).await?;
                *uploaded.lock().await += 1;
                Ok::<(), anyhow::Error>(())
            });
        }
        match in_flight.next().await {
            Some(Ok(())) => continue,
            Some(Err(e)) => return Err(PushError::Upload(e)),
            None => {
                if pending.is_empty() {
                    break;
                }
            }
        }
    }

    transport
        .commit(change_id, force, &files)
        .await
        .map_err(PushError::Commit)?;

    let uploaded = *uploaded.lock().await;
    Ok(PushSummary {
        declared: files.len(),
        uploaded,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use pogo_types::RepoPath;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Mutex;

    struct FakeTransport {
        missing: Vec<BlobHash>,
        uploaded: Mutex<Vec<BlobHash>>,
        committed: Mutex<Option<(ChangeId, bool, usize)>>,
    }

    #[async_trait]
    impl PushTransport for FakeTransport {
        async fn check_needed(&self, _hashes: &[BlobHash]) -> anyhow::Result<Vec<BlobHash>> {
            Ok(self.missing.clone())
        }
        async fn upload_blob(&self, hash: BlobHash, _content: Vec<u8>) -> anyhow::Result<()> {
            self.uploaded.lock().await.push(hash);
            Ok(())
        }
        async fn commit(&self, change_id: ChangeId, force: bool, files: &[DeclaredFile]) -> anyhow::Result<()> {
            *self.committed.lock().await = Some((change_id, force, files.len()));
            Ok(())
        }
    }

    struct FakeContent(StdMutex<Vec<String>>);

    #[async_trait]
    impl ContentSource for FakeContent {
        async fn read(&self, path: &str) -> anyhow::Result<Vec<u8>> {
            self.0.lock().unwrap().push(path.to_string());
            Ok(b"data".to_vec())
        }
    }

    fn file(path: &str, hash: BlobHash) -> DeclaredFile {
        DeclaredFile {
            path: RepoPath::new(path).unwrap(),
            hash,
            executable: false,
            symlink_target: None,
        }
    }

    #[tokio::test]
    async fn uploads_only_missing_blobs_then_commits() {
        let h1 = BlobHash::of(b"one");
        let h2 = BlobHash::of(b"two");
        let transport = FakeTransport {
            missing: vec![h2],
            uploaded: Mutex::new(Vec::new()),
            committed: Mutex::new(None),
        };
        let content = FakeContent(StdMutex::new(Vec::new()));
        let files = vec![file("a.txt", h1), file("b.txt", h2)];

        let summary = push(&transport, &content, ChangeId(1), false, files)
            .await
            .unwrap();

        assert_eq!(summary.declared, 2);
        assert_eq!(summary.uploaded, 1);
        assert_eq!(*transport.uploaded.lock().await, vec![h2]);
        assert_eq!(*transport.committed.lock().await, Some((ChangeId(1), false, 2)));
    }

    #[tokio::test]
    async fn symlinks_are_never_uploaded() {
        let transport = FakeTransport {
            missing: Vec::new(),
            uploaded: Mutex::new(Vec::new()),
            committed: Mutex::new(None),
        };
        let content = FakeContent(StdMutex::new(Vec::new()));
        let files = vec![DeclaredFile {
            path: RepoPath::new("link").unwrap(),
            hash: BlobHash::of(b"target"),
            executable: false,
            symlink_target: Some("target".to_string()),
        }];

        let summary = push(&transport, &content, ChangeId(1), false, files)
            .await
            .unwrap();
        assert_eq!(summary.uploaded, 0);
    }
}
