//! Client-side push pipeline (§4.6): walk the working tree, consult the
//! local hash cache, and hand the server only the blobs it's missing before
//! committing the new file set.

mod client;
mod walk;

pub use client::{push, ContentSource, PushError, PushSummary, PushTransport, UPLOAD_CONCURRENCY};
pub use walk::{collect_ignore_matcher, walk_working_tree, DeclaredFile, WalkError};
