//! The wire-facing error vocabulary. Every component crate defines its own
//! `thiserror` error enum for its own failure modes; this crate only defines
//! the small, flat set of kinds a client ever sees, plus the conversion trait
//! each component implements to map its private errors onto one. Downcasting
//! an `anyhow::Error` chain to a concrete component error, and from there to
//! an `ErrorKind`, happens at the RPC edge, not here — this crate sits below
//! every component and cannot depend back on any of them.

use std::fmt;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ErrorKind {
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
    /// Catch-all for errors that never implemented `ToErrorKind`; the wire
    /// layer still needs to answer with something.
    Internal,
}

impl ErrorKind {
    /// The identifier sent over the wire and printed by CLI frontends.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AuthRequired => "AuthRequired",
            ErrorKind::AuthInvalid => "AuthInvalid",
            ErrorKind::AccessDenied => "AccessDenied",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AmbiguousRevision => "AmbiguousRevision",
            ErrorKind::Readonly => "Readonly",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::ProtocolError => "ProtocolError",
            ErrorKind::StorageMissing => "StorageMissing",
            ErrorKind::StorageWrite => "StorageWrite",
            ErrorKind::HashMismatch => "HashMismatch",
            ErrorKind::SymlinkEscape => "SymlinkEscape",
            ErrorKind::CycleDetected => "CycleDetected",
            ErrorKind::BookmarkReferenced => "BookmarkReferenced",
            ErrorKind::CheckedOutReferenced => "CheckedOutReferenced",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Implemented by every component's local error enum so the RPC layer can
/// classify a downcast error without matching on component-specific variants
/// itself.
pub trait ToErrorKind {
    fn error_kind(&self) -> ErrorKind;
}

/// Walk an `anyhow::Error`'s chain looking for a cause that implements
/// `ToErrorKind`, trying each candidate type in `downcast_order`. Intended
/// for the RPC layer, which knows every component error type; this helper
/// just factors out the "try them all, fall back to Internal" loop.
pub fn classify<T: ToErrorKind + std::error::Error + 'static>(
    err: &anyhow::Error,
) -> Option<ErrorKind> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<T>())
        .map(|e| e.error_kind())
}
