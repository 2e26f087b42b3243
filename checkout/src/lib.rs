//! Edit/checkout pipeline (§4.7): the server-side plan of what changed
//! between a client's working copy and a target revision, and the
//! client-side application of that plan to the local filesystem.

mod apply;
mod plan;

pub use apply::{delete, write, ApplyError};
pub use plan::{plan, revision_ignore_matcher, CheckoutOp};
