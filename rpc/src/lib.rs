//! The RPC surface (§4.10): authentication, wire framing, and the
//! error-classification edge shared by every transport the server exposes.
//! Unary calls (metadata), client-streaming (`PushFull`), and
//! server-streaming (edit/checkout/diff) all share this module; the actual
//! HTTP/TCP listener lives in `pogo_server`.

mod auth;
mod frame;
mod status;
mod transport;

pub use auth::{authenticate, hash_token, require_read, require_write, AuthError};
pub use frame::{
    BookmarkSummary, CallKind, ChangeSummary, CheckNeededFilesReply, CheckNeededFilesRequest,
    CheckNeededFilesResponse, CheckoutFrame, CheckoutRequest, MetadataCall, MetadataReply,
    MetadataRequest, MetadataResponse, PushFrame, PushReply,
};
pub use status::{to_rpc_error, RpcError, WireErrorKind};
pub use transport::{recv, recv_required, send, wire, TransportError};
