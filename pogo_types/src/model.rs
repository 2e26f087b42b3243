use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::change_name::ChangeName;
use crate::hash::BlobHash;
use crate::ids::{ChangeId, RepositoryId, UserId};
use crate::path::RepoPath;

/// Per-change record of a single tracked file, matching the §3 "File entry"
/// tuple (`path`, `blob_hash`, `executable`, `symlink_target?`, `has_conflicts`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: RepoPath,
    pub blob_hash: BlobHash,
    pub executable: bool,
    pub symlink_target: Option<String>,
    pub has_conflicts: bool,
}

impl FileEntry {
    pub fn is_symlink(&self) -> bool {
        self.symlink_target.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub id: ChangeId,
    pub repository_id: RepositoryId,
    pub name: ChangeName,
    pub description: Option<String>,
    pub author: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub depth: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub repository_id: RepositoryId,
    pub name: String,
    pub change_id: ChangeId,
}

pub const DEFAULT_BOOKMARK: &str = "main";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepositoryId,
    pub name: String,
    pub public: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
}
