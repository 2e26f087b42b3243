//! Client-side library for the push/checkout protocol (§4.6, §4.7): the
//! working-copy metadata store, the framed TCP connection helper, the blob
//! HTTP upload path, and the `PushTransport`/`ContentSource` and
//! checkout-stream wiring that turn the protocol-agnostic `push`/`checkout`
//! crates into something that actually talks to a `pogo_server`. The
//! command-line surface that drives this library is a separate concern.

mod checkout;
mod connection;
mod http_blob;
mod push;
mod workspace;

pub use checkout::{checkout, CheckoutSummary};
pub use connection::{connect, Transport};
pub use push::{push_working_tree, ServerTransport, WorkingTreeContent};
pub use workspace::{Workspace, WorkspaceConfig, WorkspaceInit};
