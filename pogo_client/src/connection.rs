//! Opens a framed TCP connection to the server and writes the `CallKind`
//! prefix frame every connection must start with (§4.10). Everything after
//! that point is call-specific and handled by `push`/`checkout`.

use anyhow::{Context, Result};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use rpc::CallKind;

pub type Transport = Framed<TcpStream, LengthDelimitedCodec>;

pub async fn connect(server_addr: &str, kind: CallKind) -> Result<Transport> {
    let stream = TcpStream::connect(server_addr)
        .await
        .with_context(|| format!("connect to {server_addr}"))?;
    let mut transport = rpc::wire(stream);
    rpc::send(&mut transport, &kind).await.context("send CallKind")?;
    Ok(transport)
}
