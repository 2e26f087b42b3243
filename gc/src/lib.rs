//! Garbage collection (§4.9): blobs are never deleted by change mutation
//! directly, only by the two passes here. Mirrors the role a Mononoke
//! blobstore-GC walker plays relative to `dbbookmarks`/changesets: the
//! database is the single source of truth for reachability, the
//! filesystem holds content only.

mod lock;

pub use lock::GcLock;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use slog::info;

use context::CoreContext;
use object_store::ObjectStore;
use pogo_db::Database;
use pogo_types::{BlobHash, FileEntry};

/// Outcome of either GC mode: how many blobs were unreferenced and how many
/// bytes their on-disk representations occupied.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GcReport {
    pub blobs_deleted: u64,
    pub bytes_freed: u64,
}

impl GcReport {
    fn add(&mut self, bytes: u64) {
        self.blobs_deleted += 1;
        self.bytes_freed += bytes;
    }
}

/// Online push-time cleanup (§4.6 step 9, §4.9): given the file set a push
/// just replaced, delete any blob those entries referenced that no other
/// change still references. Call this after the push's database transaction
/// has committed and only the `gc_lock` write side is held around it.
pub async fn online_cleanup(
    ctx: &CoreContext,
    db: &Arc<Database>,
    store: &Arc<ObjectStore>,
    previous_entries: &[FileEntry],
) -> Result<GcReport> {
    let candidates: HashSet<BlobHash> = previous_entries
        .iter()
        .filter(|e| !e.is_symlink())
        .map(|e| e.blob_hash)
        .collect();
    if candidates.is_empty() {
        return Ok(GcReport::default());
    }

    let db = Arc::clone(db);
    let store = Arc::clone(store);
    let logger = ctx.logger().clone();
    tokio::task::spawn_blocking(move || {
        let mut report = GcReport::default();
        for hash in candidates {
            if reference_count(&db, &hash)? == 0 {
                let freed = store.delete(&hash)?;
                info!(logger, "gc: collected orphaned blob"; "hash" => hash.to_hex(), "bytes" => freed);
                report.add(freed);
            }
        }
        Ok(report)
    })
    .await?
}

/// Scheduled full GC (§4.9): enumerate every blob hash the database still
/// references, then delete every on-disk blob not in that set.
pub async fn full_gc(
    ctx: &CoreContext,
    db: &Arc<Database>,
    store: &Arc<ObjectStore>,
) -> Result<GcReport> {
    let db = Arc::clone(db);
    let store = Arc::clone(store);
    let logger = ctx.logger().clone();
    tokio::task::spawn_blocking(move || {
        let referenced = all_referenced_hashes(&db)?;
        let mut report = GcReport::default();
        for hash in store.list_all()? {
            if !referenced.contains(&hash) {
                let freed = store.delete(&hash)?;
                info!(logger, "gc: collected unreferenced blob"; "hash" => hash.to_hex(), "bytes" => freed);
                report.add(freed);
            }
        }
        Ok(report)
    })
    .await?
}

fn reference_count(db: &Database, hash: &BlobHash) -> Result<u64> {
    let conn = db.lock();
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM file_entries WHERE blob_hash = ?1",
        rusqlite::params![hash.as_bytes().to_vec()],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

fn all_referenced_hashes(db: &Database) -> Result<HashSet<BlobHash>> {
    let conn = db.lock();
    let mut stmt = conn.prepare("SELECT DISTINCT blob_hash FROM file_entries")?;
    let rows = stmt.query_map([], |row| {
        let bytes: Vec<u8> = row.get(0)?;
        Ok(bytes)
    })?;
    let mut out = HashSet::new();
    for bytes in rows {
        let bytes = bytes?;
        let mut hash = [0u8; pogo_types::HASH_BYTES];
        if bytes.len() == hash.len() {
            hash.copy_from_slice(&bytes);
            out.insert(BlobHash::from_bytes(hash));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use pogo_types::RepoPath;

    fn ctx() -> CoreContext {
        CoreContext::test_mock()
    }

    fn entry(path: &str, hash: BlobHash) -> FileEntry {
        FileEntry {
            path: RepoPath::new(path).unwrap(),
            blob_hash: hash,
            executable: false,
            symlink_target: None,
            has_conflicts: false,
        }
    }

    async fn seed_referenced(db: &Database, hash: BlobHash) {
        let conn = db.lock();
        conn.execute(
            "INSERT INTO repositories (name, public) VALUES ('r', 1)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO changes (repository_id, name, description, author_user_id, created_at, updated_at, depth)
             VALUES (1, 'root', NULL, NULL, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z', 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO file_entries (change_id, path, blob_hash, executable, symlink_target, has_conflicts)
             VALUES (1, 'kept.txt', ?1, 0, NULL, 0)",
            rusqlite::params![hash.as_bytes().to_vec()],
        )
        .unwrap();
    }

    #[tokio::test]
    async fn online_cleanup_deletes_only_unreferenced_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ObjectStore::new(dir.path()));
        let db = Arc::new(Database::with_sqlite_in_memory().unwrap());

        let kept_hash = store.store_bytes(&ctx(), b"kept").await.unwrap().0;
        let orphan_hash = store.store_bytes(&ctx(), b"orphan").await.unwrap().0;
        seed_referenced(&db, kept_hash).await;

        let previous = vec![entry("kept.txt", kept_hash), entry("gone.txt", orphan_hash)];
        let report = online_cleanup(&ctx(), &db, &store, &previous).await.unwrap();

        assert_eq!(report.blobs_deleted, 1);
        assert!(store.contains(&kept_hash));
        assert!(!store.contains(&orphan_hash));
    }

    #[tokio::test]
    async fn online_cleanup_with_no_previous_entries_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ObjectStore::new(dir.path()));
        let db = Arc::new(Database::with_sqlite_in_memory().unwrap());
        let report = online_cleanup(&ctx(), &db, &store, &[]).await.unwrap();
        assert_eq!(report, GcReport::default());
    }

    #[tokio::test]
    async fn full_gc_sweeps_every_unreferenced_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ObjectStore::new(dir.path()));
        let db = Arc::new(Database::with_sqlite_in_memory().unwrap());

        let kept_hash = store.store_bytes(&ctx(), b"kept").await.unwrap().0;
        let orphan_a = store.store_bytes(&ctx(), b"orphan a").await.unwrap().0;
        let orphan_b = store.store_bytes(&ctx(), b"orphan b").await.unwrap().0;
        seed_referenced(&db, kept_hash).await;

        let report = full_gc(&ctx(), &db, &store).await.unwrap();

        assert_eq!(report.blobs_deleted, 2);
        assert!(store.contains(&kept_hash));
        assert!(!store.contains(&orphan_a));
        assert!(!store.contains(&orphan_b));
    }
}
