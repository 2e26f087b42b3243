//! The relational schema (§6.1) and the connection handle shared by every
//! component that needs durable storage. Mirrors the role `dbbookmarks`
//! plays in the teacher tree: one small crate owning table definitions and
//! a `with_sqlite_in_memory` constructor for tests, with the graph-specific
//! queries (changes, parents, file entries) built on top in `change_graph`
//! rather than here, the way bookmark-movement logic sits above
//! `dbbookmarks` rather than inside it.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use pogo_types::{RepositoryId, UserId};
use rusqlite::{params, Connection, OptionalExtension};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS repositories (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    public INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    token_hash TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS repo_acl (
    repository_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    can_write INTEGER NOT NULL,
    PRIMARY KEY (repository_id, user_id)
);

CREATE TABLE IF NOT EXISTS changes (
    id INTEGER PRIMARY KEY,
    repository_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    author_user_id INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    depth INTEGER NOT NULL,
    UNIQUE (repository_id, name)
);

CREATE TABLE IF NOT EXISTS change_parents (
    child_id INTEGER NOT NULL,
    parent_id INTEGER NOT NULL,
    PRIMARY KEY (child_id, parent_id)
);

CREATE TABLE IF NOT EXISTS file_entries (
    change_id INTEGER NOT NULL,
    path TEXT NOT NULL,
    blob_hash BLOB NOT NULL,
    executable INTEGER NOT NULL,
    symlink_target TEXT,
    has_conflicts INTEGER NOT NULL,
    PRIMARY KEY (change_id, path)
);

CREATE TABLE IF NOT EXISTS bookmarks (
    repository_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    change_id INTEGER NOT NULL,
    PRIMARY KEY (repository_id, name)
);

CREATE TABLE IF NOT EXISTS secrets (
    repository_id INTEGER NOT NULL,
    key TEXT NOT NULL,
    value_encrypted TEXT NOT NULL,
    PRIMARY KEY (repository_id, key)
);
";

/// Shared handle to the server's SQLite connection. Callers perform actual
/// queries from inside `tokio::task::spawn_blocking`, the same pattern
/// `object_store` uses for filesystem I/O — `rusqlite::Connection` is
/// synchronous and the mutex is only ever held for the duration of one
/// query or transaction.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("open database")?;
        Self::from_connection(conn)
    }

    /// Mirrors the teacher's `SqlConstruct::with_sqlite_in_memory` test
    /// helper: an ephemeral, fully-migrated database for unit tests.
    pub fn with_sqlite_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).context("apply schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    pub fn create_repository(&self, name: &str, public: bool) -> Result<RepositoryId> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO repositories (name, public) VALUES (?1, ?2)",
            params![name, public],
        )?;
        Ok(RepositoryId(conn.last_insert_rowid()))
    }

    pub fn find_repository_by_name(&self, name: &str) -> Result<Option<(RepositoryId, bool)>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, public FROM repositories WHERE name = ?1",
            params![name],
            |row| Ok((RepositoryId(row.get(0)?), row.get(1)?)),
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn create_user(&self, username: &str, token_hash: &str) -> Result<UserId> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO users (username, token_hash) VALUES (?1, ?2)",
            params![username, token_hash],
        )?;
        Ok(UserId(conn.last_insert_rowid()))
    }

    pub fn find_user_by_token_hash(&self, token_hash: &str) -> Result<Option<UserId>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id FROM users WHERE token_hash = ?1",
            params![token_hash],
            |row| Ok(UserId(row.get(0)?)),
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn set_repo_acl(&self, repo: RepositoryId, user: UserId, can_write: bool) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO repo_acl (repository_id, user_id, can_write) VALUES (?1, ?2, ?3)
             ON CONFLICT(repository_id, user_id) DO UPDATE SET can_write = excluded.can_write",
            params![repo.0, user.0, can_write],
        )?;
        Ok(())
    }

    /// `None` means the user has no ACL row at all (no access to a private
    /// repo; reads still allowed if the repo is public).
    pub fn can_write(&self, repo: RepositoryId, user: UserId) -> Result<Option<bool>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT can_write FROM repo_acl WHERE repository_id = ?1 AND user_id = ?2",
            params![repo.0, user.0],
            |row| row.get(0),
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn set_secret(&self, repo: RepositoryId, key: &str, value_encrypted: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO secrets (repository_id, key, value_encrypted) VALUES (?1, ?2, ?3)
             ON CONFLICT(repository_id, key) DO UPDATE SET value_encrypted = excluded.value_encrypted",
            params![repo.0, key, value_encrypted],
        )?;
        Ok(())
    }

    pub fn get_secret(&self, repo: RepositoryId, key: &str) -> Result<Option<String>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT value_encrypted FROM secrets WHERE repository_id = ?1 AND key = ?2",
            params![repo.0, key],
            |row| row.get(0),
        )
        .optional()
        .map_err(Into::into)
    }
}

pub fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn repository_roundtrip() {
        let db = Database::with_sqlite_in_memory().unwrap();
        let id = db.create_repository("demo", true).unwrap();
        let found = db.find_repository_by_name("demo").unwrap().unwrap();
        assert_eq!(found, (id, true));
        assert!(db.find_repository_by_name("missing").unwrap().is_none());
    }

    #[test]
    fn acl_defaults_to_none_until_set() {
        let db = Database::with_sqlite_in_memory().unwrap();
        let repo = db.create_repository("demo", false).unwrap();
        let user = db.create_user("alice", "hash").unwrap();
        assert_eq!(db.can_write(repo, user).unwrap(), None);
        db.set_repo_acl(repo, user, true).unwrap();
        assert_eq!(db.can_write(repo, user).unwrap(), Some(true));
    }

    #[test]
    fn secret_roundtrip() {
        let db = Database::with_sqlite_in_memory().unwrap();
        let repo = db.create_repository("demo", false).unwrap();
        db.set_secret(repo, "deploy_key", "ciphertext").unwrap();
        assert_eq!(
            db.get_secret(repo, "deploy_key").unwrap(),
            Some("ciphertext".to_string())
        );
    }
}
