//! Server side of the edit/checkout stream (§4.7): resolve the requested
//! revision, diff it against the client's current paths using the
//! revision's own ignore rules, and stream the resulting deletions and
//! writes back.

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use checkout::{plan, revision_ignore_matcher, CheckoutOp};
use context::CoreContext;
use rpc::{CheckoutFrame, CheckoutRequest};

use crate::app::AppContext;

pub async fn handle<S>(app: &AppContext, transport: &mut Framed<S, LengthDelimitedCodec>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request: CheckoutRequest = rpc::recv_required(transport).await?;
    let ctx = CoreContext::new(app.logger.clone(), None);
    let ctx = match request.token {
        Some(token) => rpc::authenticate(&ctx, &app.db, &token)?,
        None => ctx,
    };

    let (repo, public) = app
        .db
        .find_repository_by_name(&request.repository)?
        .ok_or_else(|| anyhow::anyhow!("no such repository '{}'", request.repository))?;
    rpc::require_read(&app.db, repo, public, ctx.user()).context("checkout authorization")?;

    let change_id = app.graph.resolve(repo, &request.revision).context("resolve revision")?;
    let entries = app.graph.file_entries(change_id).context("read file entries")?;
    let matcher = revision_ignore_matcher(&app.store, &entries)
        .await
        .context("build revision ignore matcher")?;
    let ops = plan(&entries, &matcher, &request.client_paths);

    for op in ops {
        match op {
            CheckoutOp::Delete(path) => {
                rpc::send(transport, &CheckoutFrame::FileToDelete { path: path.as_str().to_string() }).await?;
            }
            CheckoutOp::Write(entry) => {
                rpc::send(
                    transport,
                    &CheckoutFrame::FileHeader {
                        path: entry.path.as_str().to_string(),
                        executable: entry.executable,
                        symlink_target: entry.symlink_target.clone(),
                    },
                )
                .await?;
                if entry.symlink_target.is_none() {
                    let (content, _) = app.store.open(&entry.blob_hash).await.with_context(|| {
                        format!("read blob for {}", entry.path.as_str())
                    })?;
                    for chunk in content.chunks(CHUNK_SIZE) {
                        rpc::send(transport, &CheckoutFrame::Content { chunk: chunk.to_vec() }).await?;
                    }
                }
                rpc::send(transport, &CheckoutFrame::FileEof).await?;
            }
        }
    }

    rpc::send(transport, &CheckoutFrame::EndOfFiles { change_id }).await?;
    Ok(())
}

const CHUNK_SIZE: usize = 256 * 1024;
