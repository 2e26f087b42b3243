//! Client-side wiring for §4.7: open an edit/checkout stream, apply each
//! frame to the working tree as it arrives, and record the resolved
//! change id in the workspace once `EndOfFiles` closes the stream.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};

use pogo_types::{BlobHash, ChangeId, FileEntry, RepoPath};
use rpc::{CallKind, CheckoutFrame, CheckoutRequest};

use crate::connection;
use crate::workspace::WorkspaceConfig;

pub struct CheckoutSummary {
    pub deleted: usize,
    pub written: usize,
    pub change_id: ChangeId,
}

/// Checks out `revision` into `root`, streaming deletions and writes as
/// the server emits them rather than buffering the whole plan first.
pub async fn checkout(config: &WorkspaceConfig, root: &Path, revision: &str, client_paths: Vec<String>) -> Result<CheckoutSummary> {
    let mut transport = connection::connect(&config.server_addr, CallKind::Checkout).await?;
    let request = CheckoutRequest {
        token: config.token.clone(),
        repository: config.repository.clone(),
        revision: revision.to_string(),
        client_paths,
    };
    rpc::send(&mut transport, &request).await.context("send CheckoutRequest")?;

    let mut deleted = 0usize;
    let mut written = 0usize;
    let mut pending_header: Option<(RepoPath, bool, Option<String>)> = None;
    let mut pending_content: Vec<u8> = Vec::new();

    loop {
        match rpc::recv_required(&mut transport).await? {
            CheckoutFrame::FileToDelete { path } => {
                let path = RepoPath::new(path)?;
                checkout::delete(root, &path).context("apply delete")?;
                deleted += 1;
            }
            CheckoutFrame::FileHeader { path, executable, symlink_target } => {
                if pending_header.is_some() {
                    bail!("FileHeader received before the previous file's FileEof");
                }
                pending_header = Some((RepoPath::new(path)?, executable, symlink_target));
                pending_content.clear();
            }
            CheckoutFrame::Content { chunk } => {
                if pending_header.is_none() {
                    bail!("Content frame with no open FileHeader");
                }
                pending_content.extend_from_slice(&chunk);
            }
            CheckoutFrame::FileEof => {
                let (path, executable, symlink_target) = pending_header
                    .take()
                    .ok_or_else(|| anyhow!("FileEof with no open FileHeader"))?;
                let entry = FileEntry {
                    path,
                    blob_hash: BlobHash::of(&pending_content),
                    executable,
                    symlink_target,
                    has_conflicts: false,
                };
                checkout::write(root, &entry, &pending_content).context("apply write")?;
                written += 1;
            }
            CheckoutFrame::EndOfFiles { change_id } => {
                if pending_header.is_some() {
                    bail!("checkout stream ended with an unterminated file");
                }
                return Ok(CheckoutSummary { deleted, written, change_id });
            }
        }
    }
}
