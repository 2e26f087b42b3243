//! Core data model shared by every component: ids, the content hash, change
//! names, repository-relative paths, and the DB-facing record types. Mirrors
//! the role `mononoke_types` plays in the teacher tree — every other crate
//! depends on this one and none of it depends back.

mod change_name;
mod hash;
mod ids;
mod model;
mod path;

pub use change_name::{unique_prefix, ChangeName, CHANGE_NAME_ALPHABET, CHANGE_NAME_LEN};
pub use hash::{decode_token, encode_token, BlobHash, HASH_BYTES};
pub use ids::{ChangeId, RepositoryId, UserId};
pub use model::{Bookmark, Change, FileEntry, Repository, User, DEFAULT_BOOKMARK};
pub use path::RepoPath;
