//! Wire-protocol frames (§4.6, §4.7, §6): discriminated unions carried over
//! the length-delimited transport in `transport.rs`. Variants are mutually
//! exclusive per frame; an unrecognized tag is a `ProtocolError`, surfaced
//! by `serde_json` failing to deserialize a known variant.

use serde::{Deserialize, Serialize};

use pogo_types::ChangeId;

use crate::status::RpcError;

/// Client → server, in strict order: `Auth`, `ChangeId`, `Force`, then for
/// each file `FileHeader` → optional `Content*` → `FileEof`, finally
/// `EndOfFiles`. The server must not commit until `EndOfFiles` arrives.
///
/// `hash` is always the file's declared content hash (or, for a symlink,
/// the hash of its normalized target string) — the same value already
/// handed to `CheckNeededFiles` and, for `has_content = true`, already
/// uploaded to the blob HTTP endpoint under that hash. `FileHeader` itself
/// never carries the bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PushFrame {
    Auth { token: String },
    ChangeId { change_id: ChangeId },
    Force { force: bool },
    FileHeader {
        path: String,
        hash: String,
        has_content: bool,
        executable: bool,
        symlink_target: Option<String>,
    },
    Content { chunk: Vec<u8> },
    FileEof,
    EndOfFiles,
}

/// The one frame the server sends back on a `PushFull` connection, after
/// `EndOfFiles` has been processed: commit succeeded, or a classified
/// failure (readonly, missing blob, auth, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PushReply {
    Ok,
    Err(RpcError),
}

/// Server → client, for both edit and checkout (§4.7): deletions first (in
/// any order), then for each kept/added path a header, content, and EOF,
/// finally `EndOfFiles` and the resolved change id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CheckoutFrame {
    FileToDelete { path: String },
    FileHeader {
        path: String,
        executable: bool,
        symlink_target: Option<String>,
    },
    Content { chunk: Vec<u8> },
    FileEof,
    EndOfFiles { change_id: ChangeId },
}

/// `CheckNeededFiles` (§4.6 step 3): the client declares every hash it has
/// locally; the server replies with the subset it still needs uploaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckNeededFilesRequest {
    pub token: Option<String>,
    pub hashes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckNeededFilesResponse {
    pub needed: Vec<String>,
}

/// The single reply frame every unary call (`Metadata`, `CheckNeededFiles`)
/// sends: either the call's own response or a classified wire error,
/// rather than signaling failure by dropping the connection the way the
/// streaming calls do.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CheckNeededFilesReply {
    Ok(CheckNeededFilesResponse),
    Err(RpcError),
}

/// The very first frame on every connection: which of the four call
/// protocols the rest of the connection will speak. `PushFull` is the only
/// one where the frames that follow are *not* prefixed by a dedicated
/// per-call request struct — they're the raw `PushFrame` sequence from
/// §4.6 step 5, starting with its own `PushFrame::Auth`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CallKind {
    PushFull,
    Checkout,
    Metadata,
    CheckNeededFiles,
}

/// Opens a checkout/edit stream (§4.7): the revision to resolve and the
/// client's current on-disk paths, so the server can compute deletions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub token: Option<String>,
    pub repository: String,
    pub revision: String,
    pub client_paths: Vec<String>,
}

/// The unary metadata calls (§4.10): everything that isn't push or
/// checkout gets a single request/response round trip on its own
/// connection rather than a dedicated streaming protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataCall {
    pub token: Option<String>,
    pub request: MetadataRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MetadataRequest {
    Init {
        repository: String,
        public: bool,
    },
    NewChange {
        repository: String,
        parents: Vec<String>,
        description: Option<String>,
    },
    SetBookmark {
        repository: String,
        name: String,
        revision: String,
        force: bool,
    },
    RemoveChange {
        repository: String,
        revision: String,
        keep_children: bool,
    },
    Resolve {
        repository: String,
        revision: String,
    },
    ListBookmarks {
        repository: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub change_id: String,
    pub name: String,
    pub depth: u64,
    pub readonly: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookmarkSummary {
    pub name: String,
    pub change_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MetadataResponse {
    Change(ChangeSummary),
    Bookmarks(Vec<BookmarkSummary>),
    Resolved { change_id: String },
    Ack,
}

/// Mirrors `CheckNeededFilesReply`: the one frame a `Metadata` call sends
/// back, success or classified failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MetadataReply {
    Ok(MetadataResponse),
    Err(RpcError),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn call_kind_round_trips_through_json() {
        for kind in [
            CallKind::PushFull,
            CallKind::Checkout,
            CallKind::Metadata,
            CallKind::CheckNeededFiles,
        ] {
            let encoded = serde_json::to_string(&kind).unwrap();
            let decoded: CallKind = serde_json::from_str(&encoded).unwrap();
            assert!(matches!(
                (kind, decoded),
                (CallKind::PushFull, CallKind::PushFull)
                    | (CallKind::Checkout, CallKind::Checkout)
                    | (CallKind::Metadata, CallKind::Metadata)
                    | (CallKind::CheckNeededFiles, CallKind::CheckNeededFiles)
            ));
        }
    }

    #[test]
    fn unrecognized_tag_is_a_deserialize_error() {
        let err = serde_json::from_str::<CallKind>("{\"type\":\"Bogus\"}").unwrap_err();
        assert!(err.is_data());
    }
}
