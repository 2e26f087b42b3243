//! The RPC TCP listener (§4.10): every connection opens with a `CallKind`
//! frame selecting which of the four call protocols the rest of the
//! connection speaks, then is handed off to the matching handler.

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use context::CoreContext;
use rpc::{CallKind, CheckNeededFilesReply, CheckNeededFilesRequest, CheckNeededFilesResponse, MetadataCall, MetadataReply};

use crate::app::AppContext;
use crate::{checkout_handler, metadata, push_handler};

pub async fn serve(app: AppContext) -> Result<()> {
    let listener = TcpListener::bind(app.config.listen_addr)
        .await
        .with_context(|| format!("bind rpc listener on {}", app.config.listen_addr))?;
    slog::info!(app.logger, "rpc listener bound"; "addr" => %app.config.listen_addr);

    loop {
        let (socket, peer) = listener.accept().await?;
        let app = app.clone();
        tokio::spawn(async move {
            let mut transport = rpc::wire(socket);
            if let Err(e) = dispatch(&app, &mut transport).await {
                slog::warn!(app.logger, "rpc connection ended with an error"; "peer" => %peer, "error" => %e);
            }
        });
    }
}

async fn dispatch<S>(app: &AppContext, transport: &mut Framed<S, LengthDelimitedCodec>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let kind: CallKind = rpc::recv_required(transport).await?;
    match kind {
        CallKind::PushFull => push_handler::handle(app, transport).await,
        CallKind::Checkout => checkout_handler::handle(app, transport).await,
        CallKind::Metadata => handle_metadata(app, transport).await,
        CallKind::CheckNeededFiles => handle_check_needed(app, transport).await,
    }
}

async fn handle_metadata<S>(app: &AppContext, transport: &mut Framed<S, LengthDelimitedCodec>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let call: MetadataCall = rpc::recv_required(transport).await?;
    let ctx = CoreContext::new(app.logger.clone(), None);
    let result = async {
        let ctx = match call.token {
            Some(token) => rpc::authenticate(&ctx, &app.db, &token)?,
            None => ctx,
        };
        metadata::handle(app, &ctx, call.request).await
    }
    .await;

    let reply = match result {
        Ok(response) => MetadataReply::Ok(response),
        Err(err) => MetadataReply::Err(rpc::to_rpc_error(&err)),
    };
    rpc::send(transport, &reply).await?;
    Ok(())
}

async fn handle_check_needed<S>(app: &AppContext, transport: &mut Framed<S, LengthDelimitedCodec>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request: CheckNeededFilesRequest = rpc::recv_required(transport).await?;
    let ctx = CoreContext::new(app.logger.clone(), None);
    let result = async {
        let _ctx = match request.token {
            Some(token) => rpc::authenticate(&ctx, &app.db, &token)?,
            None => ctx,
        };
        let mut needed = Vec::new();
        for raw in &request.hashes {
            let hash: pogo_types::BlobHash = raw.parse()?;
            if !app.store.contains(&hash) {
                needed.push(raw.clone());
            }
        }
        Ok::<_, anyhow::Error>(CheckNeededFilesResponse { needed })
    }
    .await;

    let reply = match result {
        Ok(response) => CheckNeededFilesReply::Ok(response),
        Err(err) => CheckNeededFilesReply::Err(rpc::to_rpc_error(&err)),
    };
    rpc::send(transport, &reply).await?;
    Ok(())
}
