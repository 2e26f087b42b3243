//! Length-delimited framing for the streaming RPCs (§4.10, §6). Each frame
//! is a `serde_json`-encoded `PushFrame`/`CheckoutFrame`, length-prefixed by
//! `tokio_util::codec::LengthDelimitedCodec` the way the workspace's
//! `tokio-util` dependency is meant to be used for this; `serde_json` keeps
//! frames human-inspectable in logs and tests, which matters more here than
//! wire compactness.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use pogo_errors::{ErrorKind, ToErrorKind};
use thiserror::Error;

/// 64 MiB: generous enough for any single push/checkout frame's content
/// chunk while still bounding a malicious or corrupt length prefix.
const MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed frame: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("peer closed the connection mid-stream")]
    Closed,
}

impl ToErrorKind for TransportError {
    fn error_kind(&self) -> ErrorKind {
        match self {
            TransportError::Io(_) => ErrorKind::Internal,
            TransportError::Protocol(_) => ErrorKind::ProtocolError,
            TransportError::Closed => ErrorKind::ProtocolError,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

pub fn wire<S>(io: S) -> Framed<S, LengthDelimitedCodec>
where
    S: AsyncRead + AsyncWrite,
{
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_framed(io)
}

pub async fn send<S, T>(transport: &mut Framed<S, LengthDelimitedCodec>, frame: &T) -> Result<()>
where
    S: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = serde_json::to_vec(frame)?;
    transport.send(Bytes::from(bytes)).await?;
    Ok(())
}

/// `Ok(None)` means the peer closed the stream cleanly (used to detect the
/// end of a sequence that has no explicit terminator frame).
pub async fn recv<S, T>(transport: &mut Framed<S, LengthDelimitedCodec>) -> Result<Option<T>>
where
    S: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match transport.next().await {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes?)?)),
        None => Ok(None),
    }
}

/// Like `recv`, but a closed stream is a protocol error: callers use this
/// when a terminator frame (`EndOfFiles`) is mandatory.
pub async fn recv_required<S, T>(transport: &mut Framed<S, LengthDelimitedCodec>) -> Result<T>
where
    S: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    recv(transport).await?.ok_or(TransportError::Closed)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::frame::PushFrame;
    use tokio::io::duplex;

    #[tokio::test]
    async fn frames_round_trip_over_a_duplex_pipe() {
        let (client_io, server_io) = duplex(4096);
        let mut client = wire(client_io);
        let mut server = wire(server_io);

        send(&mut client, &PushFrame::Force { force: true })
            .await
            .unwrap();
        let received: PushFrame = recv_required(&mut server).await.unwrap();
        assert!(matches!(received, PushFrame::Force { force: true }));
    }

    #[tokio::test]
    async fn closed_stream_yields_none_for_recv() {
        let (client_io, server_io) = duplex(4096);
        drop(client_io);
        let mut server = wire(server_io);
        let frame: Option<PushFrame> = recv(&mut server).await.unwrap();
        assert!(frame.is_none());
    }
}
