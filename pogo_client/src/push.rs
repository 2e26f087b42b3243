//! Client-side wiring for §4.6: a `push::PushTransport`/`ContentSource`
//! pair backed by a real `PushFull` connection and the blob HTTP endpoint,
//! plus the `CheckNeededFiles` round trip push needs before uploading.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

use pogo_types::{BlobHash, ChangeId};
use push::{push as run_push, ContentSource, DeclaredFile, PushSummary, PushTransport};
use rpc::{CallKind, CheckNeededFilesReply, CheckNeededFilesRequest, PushFrame, PushReply};

use crate::connection;
use crate::workspace::WorkspaceConfig;

pub struct ServerTransport {
    config: WorkspaceConfig,
}

impl ServerTransport {
    pub fn new(config: WorkspaceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PushTransport for ServerTransport {
    async fn check_needed(&self, hashes: &[BlobHash]) -> Result<Vec<BlobHash>> {
        let mut transport = connection::connect(&self.config.server_addr, CallKind::CheckNeededFiles).await?;
        let request = CheckNeededFilesRequest {
            token: self.config.token.clone(),
            hashes: hashes.iter().map(|h| h.to_base64url()).collect(),
        };
        rpc::send(&mut transport, &request).await.context("send CheckNeededFilesRequest")?;
        let reply: CheckNeededFilesReply = rpc::recv_required(&mut transport).await?;
        match reply {
            CheckNeededFilesReply::Ok(response) => response
                .needed
                .iter()
                .map(|raw| raw.parse().context("decode needed hash"))
                .collect(),
            CheckNeededFilesReply::Err(err) => {
                Err(anyhow!("server rejected CheckNeededFiles ({:?}): {}", err.kind, err.message))
            }
        }
    }

    async fn upload_blob(&self, hash: BlobHash, content: Vec<u8>) -> Result<()> {
        crate::http_blob::upload(&self.config.blob_http_addr, self.config.token.as_deref(), hash, content).await
    }

    async fn commit(&self, change_id: ChangeId, force: bool, files: &[DeclaredFile]) -> Result<()> {
        let mut transport = connection::connect(&self.config.server_addr, CallKind::PushFull).await?;

        let token = self.config.token.clone().unwrap_or_default();
        rpc::send(&mut transport, &PushFrame::Auth { token }).await?;
        rpc::send(&mut transport, &PushFrame::ChangeId { change_id }).await?;
        rpc::send(&mut transport, &PushFrame::Force { force }).await?;

        for file in files {
            rpc::send(
                &mut transport,
                &PushFrame::FileHeader {
                    path: file.path.as_str().to_string(),
                    hash: file.hash.to_base64url(),
                    has_content: file.symlink_target.is_none(),
                    executable: file.executable,
                    symlink_target: file.symlink_target.clone(),
                },
            )
            .await?;
            rpc::send(&mut transport, &PushFrame::FileEof).await?;
        }
        rpc::send(&mut transport, &PushFrame::EndOfFiles).await?;

        let reply: PushReply = rpc::recv_required(&mut transport).await?;
        match reply {
            PushReply::Ok => Ok(()),
            PushReply::Err(err) => Err(anyhow!("server rejected push ({:?}): {}", err.kind, err.message)),
        }
    }
}

/// Reads declared file content from the working tree by repository-relative
/// path, for blobs the server reports missing.
pub struct WorkingTreeContent {
    root: PathBuf,
}

impl WorkingTreeContent {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl ContentSource for WorkingTreeContent {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.root.join(path);
        tokio::fs::read(&full)
            .await
            .with_context(|| format!("read {}", full.display()))
    }
}

/// Runs the full client-side push pipeline against an open workspace: walk
/// the tree, consult the hash cache, and push the declared files to the
/// change currently checked out.
pub async fn push_working_tree(
    config: WorkspaceConfig,
    root: PathBuf,
    change_id: ChangeId,
    force: bool,
) -> Result<PushSummary> {
    let cache = hash_cache::HashCache::open(&root.join(".pogo").join("hash_cache.sqlite3"))?;
    let matcher = push::collect_ignore_matcher(&root).context("collect ignore matcher")?;
    let files = push::walk_working_tree(&root, &matcher, &cache).context("walk working tree")?;

    let transport = ServerTransport::new(config);
    let content = WorkingTreeContent::new(root);
    run_push(&transport, &content, change_id, force, files)
        .await
        .context("push pipeline")
}
