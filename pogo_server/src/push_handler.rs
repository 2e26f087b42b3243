//! Server side of `PushFull` (§4.6 steps 5-9): receive the per-file frame
//! sequence, verify every regular file's blob is actually present (already
//! uploaded via the HTTP PUT side-channel in steps 3-4), enforce the
//! readonly guard, compute `has_conflicts`, and commit the new file set.

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use context::CoreContext;
use pogo_types::{BlobHash, ChangeId, FileEntry, RepoPath};
use rpc::{PushFrame, PushReply};

use crate::app::AppContext;

struct PendingFile {
    path: RepoPath,
    hash: BlobHash,
    has_content: bool,
    executable: bool,
    symlink_target: Option<String>,
    inline: Vec<u8>,
}

/// Runs the full `PushFull` exchange and always tries to leave the client
/// with a `PushReply`, success or classified failure, before returning. A
/// transport error that kills the connection outright (the `?` inside
/// `process` already bubbled one) just means the final `send` is a no-op.
pub async fn handle<S>(app: &AppContext, transport: &mut Framed<S, LengthDelimitedCodec>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = process(app, transport).await;
    let reply = match &result {
        Ok(()) => PushReply::Ok,
        Err(err) => PushReply::Err(rpc::to_rpc_error(err)),
    };
    let _ = rpc::send(transport, &reply).await;
    result
}

async fn process<S>(app: &AppContext, transport: &mut Framed<S, LengthDelimitedCodec>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let token = match rpc::recv_required(transport).await? {
        PushFrame::Auth { token } => token,
        other => bail!("expected Auth frame, got {other:?}"),
    };
    let ctx = CoreContext::new(app.logger.clone(), None);
    let ctx = rpc::authenticate(&ctx, &app.db, &token)?;

    let change_id = match rpc::recv_required(transport).await? {
        PushFrame::ChangeId { change_id } => change_id,
        other => bail!("expected ChangeId frame, got {other:?}"),
    };
    let force = match rpc::recv_required(transport).await? {
        PushFrame::Force { force } => force,
        other => bail!("expected Force frame, got {other:?}"),
    };

    let change = app.graph.get(change_id).context("resolve change")?;
    rpc::require_write(&app.db, change.repository_id, ctx.user()).context("push authorization")?;
    app.graph
        .require_writable(change_id, ctx.user(), force)
        .context("push readonly guard")?;

    let previous = app.graph.file_entries(change_id).context("read previous file entries")?;

    let mut entries = Vec::new();
    let mut current: Option<PendingFile> = None;
    loop {
        match rpc::recv_required(transport).await? {
            PushFrame::FileHeader {
                path,
                hash,
                has_content,
                executable,
                symlink_target,
            } => {
                if current.is_some() {
                    bail!("FileHeader received before the previous file's FileEof");
                }
                current = Some(PendingFile {
                    path: RepoPath::new(path)?,
                    hash: hash.parse().context("decode declared file hash")?,
                    has_content,
                    executable,
                    symlink_target,
                    inline: Vec::new(),
                });
            }
            PushFrame::Content { chunk } => {
                let pending = current
                    .as_mut()
                    .ok_or_else(|| anyhow!("Content frame with no open FileHeader"))?;
                pending.inline.extend_from_slice(&chunk);
            }
            PushFrame::FileEof => {
                let pending = current
                    .take()
                    .ok_or_else(|| anyhow!("FileEof with no open FileHeader"))?;
                entries.push(finish_file(app, &ctx, &pending).await?);
            }
            PushFrame::EndOfFiles => break,
            other => bail!("unexpected frame in push stream: {other:?}"),
        }
    }
    if current.is_some() {
        bail!("push stream ended with an unterminated file");
    }

    app.graph
        .set_file_entries(change_id, &entries)
        .context("commit file entries")?;

    let _permit = app.gc_lock.writer_permit().await;
    let report = gc::online_cleanup(&ctx, &app.db, &app.store, &previous)
        .await
        .context("online gc cleanup")?;
    slog::info!(app.logger, "push: collected blobs"; "change_id" => change_id.0, "count" => report.blobs_deleted);

    Ok(())
}

/// Symlinks carry no uploaded blob (their hash is of the target string, not
/// of any stored content); regular files must already be in the object
/// store by the time `FileEof` arrives, or inline content was supplied as a
/// fallback for the (currently unused) small-file fast path.
async fn finish_file(app: &AppContext, ctx: &CoreContext, pending: &PendingFile) -> Result<FileEntry> {
    let has_conflicts = if pending.symlink_target.is_some() {
        false
    } else if !pending.inline.is_empty() {
        let (actual, _) = app.store.store_bytes(ctx, &pending.inline).await?;
        if actual != pending.hash {
            return Err(object_store::Error::HashMismatch {
                expected: pending.hash,
                actual,
            }
            .into());
        }
        detect_has_conflicts(&pending.path, &pending.inline)
    } else if pending.has_content {
        if !app.store.contains(&pending.hash) {
            return Err(object_store::Error::StorageMissing(pending.hash).into());
        }
        let (content, info) = app.store.open(&pending.hash).await?;
        detect_has_conflicts(&pending.path, if info.is_text() { &content } else { &[] })
    } else {
        false
    };

    Ok(FileEntry {
        path: pending.path.clone(),
        blob_hash: pending.hash,
        executable: pending.executable,
        symlink_target: pending.symlink_target.clone(),
        has_conflicts,
    })
}

const CONFLICT_MARKERS: [&str; 3] = ["<<<<<<< ", "=======", ">>>>>>> "];

/// `has_conflicts` (§4.8, §6.1): true if the path is a binary-conflict
/// sibling file (`<path>.<change-name>`) or the text content contains
/// unresolved diff3 markers.
fn detect_has_conflicts(path: &RepoPath, content: &[u8]) -> bool {
    if is_binary_conflict_suffix(path) {
        return true;
    }
    let Ok(text) = std::str::from_utf8(content) else {
        return false;
    };
    CONFLICT_MARKERS.iter().all(|marker| text.lines().any(|line| line.starts_with(marker)))
}

fn is_binary_conflict_suffix(path: &RepoPath) -> bool {
    path.as_str()
        .rsplit_once('.')
        .map(|(_, suffix)| pogo_types::ChangeName::new(suffix).is_ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn plain_path_is_not_a_conflict_suffix() {
        let p = RepoPath::new("src/main.rs").unwrap();
        assert!(!is_binary_conflict_suffix(&p));
    }

    #[test]
    fn change_name_suffix_is_a_conflict_suffix() {
        let p = RepoPath::new("img.bin.abcdefhkmnprwxyA").unwrap();
        assert!(is_binary_conflict_suffix(&p));
    }

    #[test]
    fn conflict_markers_are_detected() {
        let p = RepoPath::new("f.txt").unwrap();
        let text = "<<<<<<< alice\nmine\n=======\ntheirs\n>>>>>>> bob\n";
        assert!(detect_has_conflicts(&p, text.as_bytes()));
    }

    #[test]
    fn ordinary_text_has_no_conflicts() {
        let p = RepoPath::new("f.txt").unwrap();
        assert!(!detect_has_conflicts(&p, b"hello\nworld\n"));
    }
}
