//! Blob upload over the HTTP PUT side-channel (§4.6 step 4, §6): `curl`
//! bound into a `push::ContentSource`/upload helper. Runs on a blocking
//! task since `curl::easy` is synchronous. Retries are bounded and only
//! ever applied to this idempotent PUT, never to the streaming RPCs.

use anyhow::{anyhow, Context, Result};
use curl::easy::{Easy, List};

use pogo_types::BlobHash;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(1);

/// Uploads `content` to `PUT {blob_http_addr}/v1/objects/{base64url(hash)}`,
/// retrying idempotently on transport failure with linear backoff.
pub async fn upload(blob_http_addr: &str, token: Option<&str>, hash: BlobHash, content: Vec<u8>) -> Result<()> {
    let url = format!("http://{blob_http_addr}/v1/objects/{}", hash.to_base64url());
    let token = token.map(|t| t.to_string());

    for attempt in 1..=MAX_ATTEMPTS {
        let url = url.clone();
        let token = token.clone();
        let content = content.clone();
        let result = tokio::task::spawn_blocking(move || put_once(&url, token.as_deref(), &content))
            .await
            .context("blob upload task panicked")?;

        match result {
            Ok(()) => return Ok(()),
            Err(e) if attempt < MAX_ATTEMPTS => {
                tokio::time::sleep(RETRY_DELAY).await;
                let _ = e;
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!("loop always returns by the final attempt")
}

fn put_once(url: &str, token: Option<&str>, content: &[u8]) -> Result<()> {
    let mut handle = Easy::new();
    handle.url(url).context("set curl URL")?;
    handle.put(true).context("set curl PUT method")?;
    handle.post_field_size(content.len() as u64).context("set content length")?;

    let mut headers = List::new();
    if let Some(token) = token {
        headers
            .append(&format!("Authorization: Bearer {token}"))
            .context("set auth header")?;
    }
    handle.http_headers(headers).context("attach headers")?;

    let mut body = content;
    {
        let mut transfer = handle.transfer();
        transfer
            .read_function(move |into| {
                let n = body.len().min(into.len());
                into[..n].copy_from_slice(&body[..n]);
                body = &body[n..];
                Ok(n)
            })
            .context("set curl read callback")?;
        transfer.perform().context("perform blob upload")?;
    }
    let status = handle.response_code().context("read response status")?;

    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(anyhow!("blob upload failed with HTTP status {status}"))
    }
}
