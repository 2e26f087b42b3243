//! The wire-protocol edge (§7): the one place `anyhow::Error` chains are
//! downcast to a flat `ErrorKind` for a response envelope. Every component
//! crate's local error type implements `pogo_errors::ToErrorKind`; this is
//! simply the list of "known" error types an RPC handler's `anyhow::Error`
//! might actually be chaining, tried in turn.

use serde::{Deserialize, Serialize};

use pogo_errors::{classify, ErrorKind};

use crate::auth::AuthError;
use crate::transport::TransportError;

/// What a handler sends back on failure. `kind` drives client-side retry
/// and CLI exit-code decisions; `message` is the outermost context string,
/// for operator-facing display only — never matched on by callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub kind: WireErrorKind,
    pub message: String,
}

/// `ErrorKind` mirrored as a serializable wire type; kept distinct from
/// `pogo_errors::ErrorKind` so that crate isn't forced to take a serde
/// dependency just for this one RPC-facing concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireErrorKind {
    AuthRequired,
    AuthInvalid,
    AccessDenied,
    NotFound,
    AmbiguousRevision,
    Readonly,
    Conflict,
    ProtocolError,
    StorageMissing,
    StorageWrite,
    HashMismatch,
    SymlinkEscape,
    CycleDetected,
    BookmarkReferenced,
    CheckedOutReferenced,
    Internal,
}

impl From<ErrorKind> for WireErrorKind {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::AuthRequired => WireErrorKind::AuthRequired,
            ErrorKind::AuthInvalid => WireErrorKind::AuthInvalid,
            ErrorKind::AccessDenied => WireErrorKind::AccessDenied,
            ErrorKind::NotFound => WireErrorKind::NotFound,
            ErrorKind::AmbiguousRevision => WireErrorKind::AmbiguousRevision,
            ErrorKind::Readonly => WireErrorKind::Readonly,
            ErrorKind::Conflict => WireErrorKind::Conflict,
            ErrorKind::ProtocolError => WireErrorKind::ProtocolError,
            ErrorKind::StorageMissing => WireErrorKind::StorageMissing,
            ErrorKind::StorageWrite => WireErrorKind::StorageWrite,
            ErrorKind::HashMismatch => WireErrorKind::HashMismatch,
            ErrorKind::SymlinkEscape => WireErrorKind::SymlinkEscape,
            ErrorKind::CycleDetected => WireErrorKind::CycleDetected,
            ErrorKind::BookmarkReferenced => WireErrorKind::BookmarkReferenced,
            ErrorKind::CheckedOutReferenced => WireErrorKind::CheckedOutReferenced,
            ErrorKind::Internal => WireErrorKind::Internal,
        }
    }
}

/// Tries every component error type an RPC handler might have produced, in
/// the order a handler's call stack would actually encounter them, and
/// falls back to `Internal` for anything unrecognized (a bug, not a
/// client-correctable condition).
pub fn to_rpc_error(err: &anyhow::Error) -> RpcError {
    let kind = classify::<AuthError>(err)
        .or_else(|| classify::<TransportError>(err))
        .or_else(|| classify::<change_graph::Error>(err))
        .or_else(|| classify::<merge::Error>(err))
        .or_else(|| classify::<object_store::Error>(err))
        .unwrap_or(ErrorKind::Internal);
    RpcError {
        kind: kind.into(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn auth_error_classifies_through_the_chain() {
        let err: anyhow::Error = AuthError::AccessDenied.into();
        let err = err.context("push to repo");
        let wire = to_rpc_error(&err);
        assert_eq!(wire.kind, WireErrorKind::AccessDenied);
        assert!(wire.message.contains("push to repo"));
    }

    #[test]
    fn unrecognized_error_falls_back_to_internal() {
        let err = anyhow::anyhow!("something unexpected");
        let wire = to_rpc_error(&err);
        assert_eq!(wire.kind, WireErrorKind::Internal);
    }
}
