//! Per-working-copy local cache (§4.5) mapping a path to the stat fields
//! observed the last time it was hashed. A lookup is a hit only when every
//! field matches exactly; any mismatch — including an inode of 0 meeting an
//! inode of 0 on a platform that genuinely has no stable inodes — is
//! treated as a miss and forces a rehash, never a false positive.

use std::path::Path;

use anyhow::{Context, Result};
use pogo_types::BlobHash;
use rusqlite::{params, Connection};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct FileStat {
    pub size: u64,
    pub mtime_seconds: i64,
    pub mtime_nanos: u32,
    /// 0 on platforms without stable inodes (e.g. Windows).
    pub inode: u64,
}

impl FileStat {
    #[cfg(unix)]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            size: meta.size(),
            mtime_seconds: meta.mtime(),
            mtime_nanos: meta.mtime_nsec() as u32,
            inode: meta.ino(),
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok());
        Self {
            size: meta.len(),
            mtime_seconds: mtime.map(|d| d.as_secs() as i64).unwrap_or(0),
            mtime_nanos: mtime.map(|d| d.subsec_nanos()).unwrap_or(0),
            inode: 0,
        }
    }
}

pub struct HashCache {
    conn: Connection,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS hash_cache (
    path TEXT PRIMARY KEY,
    size INTEGER NOT NULL,
    mtime_seconds INTEGER NOT NULL,
    mtime_nanos INTEGER NOT NULL,
    inode INTEGER NOT NULL,
    hash BLOB NOT NULL
)";

impl HashCache {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("open hash cache database")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory hash cache")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).context("create hash cache schema")?;
        Ok(Self { conn })
    }

    /// Returns the cached hash only if every stat field matches exactly.
    pub fn lookup(&self, path: &str, stat: &FileStat) -> Result<Option<BlobHash>> {
        let mut stmt = self.conn.prepare(
            "SELECT size, mtime_seconds, mtime_nanos, inode, hash FROM hash_cache WHERE path = ?1",
        )?;
        let mut rows = stmt.query(params![path])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let size: i64 = row.get(0)?;
        let mtime_seconds: i64 = row.get(1)?;
        let mtime_nanos: i64 = row.get(2)?;
        let inode: i64 = row.get(3)?;
        let hash_bytes: Vec<u8> = row.get(4)?;

        let matches = size as u64 == stat.size
            && mtime_seconds == stat.mtime_seconds
            && mtime_nanos as u32 == stat.mtime_nanos
            && inode as u64 == stat.inode;
        if !matches {
            return Ok(None);
        }
        let mut bytes = [0u8; pogo_types::HASH_BYTES];
        if hash_bytes.len() != bytes.len() {
            return Ok(None);
        }
        bytes.copy_from_slice(&hash_bytes);
        Ok(Some(BlobHash::from_bytes(bytes)))
    }

    /// Records the stat-to-hash mapping observed after a miss-then-hash.
    pub fn update(&self, path: &str, stat: &FileStat, hash: BlobHash) -> Result<()> {
        self.conn.execute(
            "INSERT INTO hash_cache (path, size, mtime_seconds, mtime_nanos, inode, hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(path) DO UPDATE SET
                size = excluded.size,
                mtime_seconds = excluded.mtime_seconds,
                mtime_nanos = excluded.mtime_nanos,
                inode = excluded.inode,
                hash = excluded.hash",
            params![
                path,
                stat.size as i64,
                stat.mtime_seconds,
                stat.mtime_nanos as i64,
                stat.inode as i64,
                hash.as_bytes().to_vec(),
            ],
        )?;
        Ok(())
    }

    pub fn remove(&self, path: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM hash_cache WHERE path = ?1", params![path])?;
        Ok(())
    }
}
