//! Content-addressed blob storage (§4.1). Blobs live under a two-level
//! fan-out directory keyed by the first four base64url characters of their
//! hash, written atomically via rename-from-temp, and transparently
//! zstd-compressed when the content is textual and large enough to be worth
//! it. The compression choice never leaks into the hash: callers always see
//! uncompressed bytes.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use context::CoreContext;
use file_type::{classify, FileTypeInfo};
use pogo_errors::{ErrorKind, ToErrorKind};
use pogo_types::BlobHash;
use slog::debug;
use thiserror::Error;

/// Below this size, compression overhead isn't worth paying for.
const COMPRESSION_THRESHOLD: usize = 256;
const COMPRESSED_SUFFIX: &str = ".zst";

#[derive(Debug, Error)]
pub enum Error {
    #[error("write object store blob: {0}")]
    StorageWrite(#[source] io::Error),
    #[error("object store has no blob for {0}")]
    StorageMissing(BlobHash),
    #[error("uploaded content hashes to {actual}, expected {expected}")]
    HashMismatch { expected: BlobHash, actual: BlobHash },
}

impl ToErrorKind for Error {
    fn error_kind(&self) -> ErrorKind {
        match self {
            Error::StorageWrite(_) => ErrorKind::StorageWrite,
            Error::StorageMissing(_) => ErrorKind::StorageMissing,
            Error::HashMismatch { .. } => ErrorKind::HashMismatch,
        }
    }
}

type Result<T> = std::result::Result<T, Error>;

/// Outcome of `store`, distinguishing "already present" from "newly
/// written" the way the HTTP PUT endpoint needs to (200 vs 201, §8).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum StoreOutcome {
    AlreadyPresent,
    Created,
}

#[derive(Clone)]
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Two-level fan-out: `<root>/<first2>/<next2>/<full-base64url-hash>`,
    /// with a `.zst` suffix when the stored representation is compressed.
    /// Falls back to the uncompressed path for a hash with no on-disk
    /// representation yet.
    pub fn path_of(&self, hash: &BlobHash) -> PathBuf {
        self.existing_path(hash)
            .unwrap_or_else(|| self.uncompressed_path(hash))
    }

    fn encoded(hash: &BlobHash) -> String {
        hash.to_base64url()
    }

    fn fanout_dir(&self, encoded: &str) -> PathBuf {
        let first = &encoded[0..2.min(encoded.len())];
        let second_start = 2.min(encoded.len());
        let second_end = 4.min(encoded.len());
        let second = &encoded[second_start..second_end];
        self.root.join(first).join(second)
    }

    fn uncompressed_path(&self, hash: &BlobHash) -> PathBuf {
        let encoded = Self::encoded(hash);
        self.fanout_dir(&encoded).join(&encoded)
    }

    fn compressed_path(&self, hash: &BlobHash) -> PathBuf {
        let mut p = self.uncompressed_path(hash);
        p.set_extension("zst");
        p
    }

    fn existing_path(&self, hash: &BlobHash) -> Option<PathBuf> {
        let plain = self.uncompressed_path(hash);
        if plain.is_file() {
            return Some(plain);
        }
        let compressed = self.compressed_path(hash);
        if compressed.is_file() {
            return Some(compressed);
        }
        None
    }

    pub fn contains(&self, hash: &BlobHash) -> bool {
        self.existing_path(hash).is_some()
    }

    /// Hashes `temp_path` and moves it into the canonical location. If a
    /// blob with that hash already exists the temp file is discarded
    /// (unlinked) and `AlreadyPresent` is returned — `store` is idempotent.
    pub async fn store(&self, ctx: &CoreContext, temp_path: &Path) -> Result<(BlobHash, StoreOutcome)> {
        let root = self.root.clone();
        let temp_path = temp_path.to_path_buf();
        let logger = ctx.logger().clone();
        tokio::task::spawn_blocking(move || Self::store_blocking(&root, &temp_path, &logger))
            .await
            .expect("object store blocking task panicked")
    }

    /// Convenience for callers that already have the content in memory
    /// (merge output, symlink target hashing's text-only cousin) rather
    /// than a file on disk: spills to a temp file and delegates to `store`.
    pub async fn store_bytes(&self, ctx: &CoreContext, data: &[u8]) -> Result<(BlobHash, StoreOutcome)> {
        std::fs::create_dir_all(&self.root).map_err(Error::StorageWrite)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root).map_err(Error::StorageWrite)?;
        tmp.write_all(data).map_err(Error::StorageWrite)?;
        tmp.flush().map_err(Error::StorageWrite)?;
        let (_file, path) = tmp.keep().map_err(|e| Error::StorageWrite(e.error))?;
        self.store(ctx, &path).await
    }

    fn store_blocking(root: &Path, temp_path: &Path, logger: &slog::Logger) -> Result<(BlobHash, StoreOutcome)> {
        let mut file = std::fs::File::open(temp_path).map_err(Error::StorageWrite)?;
        let mut sample = [0u8; file_type::SAMPLE_BYTES];
        let sample_len = peek(&mut file, &mut sample).map_err(Error::StorageWrite)?;
        let info = classify(&sample[..sample_len]);

        file.seek(SeekFrom::Start(0)).map_err(Error::StorageWrite)?;
        let mut buf = Vec::new();
        {
            use sha2::Digest;
            let mut hasher = sha2::Sha256::new();
            let mut reader = std::io::BufReader::new(&file);
            let mut chunk = [0u8; 64 * 1024];
            loop {
                let n = reader.read(&mut chunk).map_err(Error::StorageWrite)?;
                if n == 0 {
                    break;
                }
                hasher.update(&chunk[..n]);
                buf.extend_from_slice(&chunk[..n]);
            }
            let digest = hasher.finalize();
            let mut out = [0u8; pogo_types::HASH_BYTES];
            out.copy_from_slice(&digest);
            drop(reader);
            let hash = BlobHash::from_bytes(out);

            let store = ObjectStore::new(root.to_path_buf());
            if let Some(_existing) = store.existing_path(&hash) {
                std::fs::remove_file(temp_path).ok();
                debug!(logger, "blob already present"; "hash" => hash.to_hex());
                return Ok((hash, StoreOutcome::AlreadyPresent));
            }

            let compress = info.is_text() && buf.len() >= COMPRESSION_THRESHOLD;
            let final_path = if compress {
                store.compressed_path(&hash)
            } else {
                store.uncompressed_path(&hash)
            };
            if let Some(parent) = final_path.parent() {
                std::fs::create_dir_all(parent).map_err(Error::StorageWrite)?;
            }

            let tmp_in_place = tempfile::NamedTempFile::new_in(final_path.parent().unwrap())
                .map_err(Error::StorageWrite)?;
            {
                let mut writer = std::io::BufWriter::new(tmp_in_place.as_file());
                if compress {
                    let mut encoder = zstd::Encoder::new(&mut writer, 0).map_err(Error::StorageWrite)?;
                    encoder.write_all(&buf).map_err(Error::StorageWrite)?;
                    encoder.finish().map_err(Error::StorageWrite)?;
                } else {
                    writer.write_all(&buf).map_err(Error::StorageWrite)?;
                }
                writer.flush().map_err(Error::StorageWrite)?;
            }
            match tmp_in_place.persist(&final_path) {
                Ok(_) => {}
                Err(e) if final_path.is_file() => {
                    // Lost a race with a concurrent store of the same hash; the
                    // winner's bytes are identical by content-addressing.
                    drop(e);
                }
                Err(e) => return Err(Error::StorageWrite(e.error)),
            }
            std::fs::remove_file(temp_path).ok();
            debug!(logger, "blob stored"; "hash" => hash.to_hex(), "compressed" => compress);
            Ok((hash, StoreOutcome::Created))
        }
    }

    /// Opens a blob for reading, transparently decompressing. Returns the
    /// file-type classification alongside so callers don't need a second
    /// pass over the content.
    pub async fn open(&self, hash: &BlobHash) -> Result<(Vec<u8>, FileTypeInfo)> {
        let path = self
            .existing_path(hash)
            .ok_or_else(|| Error::StorageMissing(*hash))?;
        let compressed = path.extension().map(|e| e == "zst").unwrap_or(false);
        let raw = tokio::fs::read(&path)
            .await
            .map_err(Error::StorageWrite)?;
        let data = if compressed {
            zstd::decode_all(&raw[..]).map_err(Error::StorageWrite)?
        } else {
            raw
        };
        let sample_len = data.len().min(file_type::SAMPLE_BYTES);
        let info = classify(&data[..sample_len]);
        Ok((data, info))
    }

    /// Recomputes the hash of the blob on disk and compares against `hash`.
    /// Used by PUT-by-hash uploads before they're accepted, and by GC
    /// audits to find corruption.
    pub async fn verify(&self, hash: &BlobHash) -> Result<bool> {
        let (data, _) = self.open(hash).await?;
        Ok(BlobHash::of(&data) == *hash)
    }

    /// All on-disk blob hashes; used by the scheduled full GC (§4.9) to
    /// compare the store's contents against referenced rows.
    pub fn list_all(&self) -> Result<Vec<BlobHash>> {
        let mut out = Vec::new();
        if !self.root.is_dir() {
            return Ok(out);
        }
        for entry in walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            let encoded = name.strip_suffix(COMPRESSED_SUFFIX).unwrap_or(&name);
            if let Ok(hash) = BlobHash::from_base64url(encoded) {
                out.push(hash);
            }
        }
        Ok(out)
    }

    /// Removes a blob's on-disk representation. Used by GC once a hash is
    /// confirmed unreferenced; a missing file is not an error (another GC
    /// pass, or a concurrent cleanup, may have already removed it).
    pub fn delete(&self, hash: &BlobHash) -> Result<u64> {
        match self.existing_path(hash) {
            Some(path) => {
                let len = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                std::fs::remove_file(&path).map_err(Error::StorageWrite)?;
                Ok(len)
            }
            None => Ok(0),
        }
    }
}

fn peek(file: &mut std::fs::File, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write as _;

    fn ctx() -> CoreContext {
        CoreContext::test_mock()
    }

    async fn write_temp(dir: &tempfile::TempDir, content: &[u8]) -> PathBuf {
        let path = dir.path().join("upload.tmp");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content).unwrap();
        path
    }

    #[tokio::test]
    async fn store_then_open_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let temp = write_temp(&dir, b"hello, world\n").await;
        let (hash, outcome) = store.store(&ctx(), &temp).await.unwrap();
        assert_eq!(outcome, StoreOutcome::Created);
        assert_eq!(hash, BlobHash::of(b"hello, world\n"));

        let (data, info) = store.open(&hash).await.unwrap();
        assert_eq!(data, b"hello, world\n");
        assert!(!info.binary);
    }

    #[tokio::test]
    async fn storing_existing_hash_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let temp1 = write_temp(&dir, b"same content").await;
        let (h1, o1) = store.store(&ctx(), &temp1).await.unwrap();
        assert_eq!(o1, StoreOutcome::Created);

        let temp2 = write_temp(&dir, b"same content").await;
        let (h2, o2) = store.store(&ctx(), &temp2).await.unwrap();
        assert_eq!(h1, h2);
        assert_eq!(o2, StoreOutcome::AlreadyPresent);
        assert!(!temp2.exists());
    }

    #[tokio::test]
    async fn empty_file_hashes_to_known_constant() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let temp = write_temp(&dir, b"").await;
        let (hash, _) = store.store(&ctx(), &temp).await.unwrap();
        assert_eq!(hash, BlobHash::of(b""));
    }

    #[tokio::test]
    async fn missing_hash_is_storage_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let err = store.open(&BlobHash::of(b"never stored")).await.unwrap_err();
        assert_eq!(err.error_kind(), pogo_errors::ErrorKind::StorageMissing);
    }

    #[tokio::test]
    async fn large_text_blob_is_compressed_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let content = "line\n".repeat(200);
        let temp = write_temp(&dir, content.as_bytes()).await;
        let (hash, _) = store.store(&ctx(), &temp).await.unwrap();
        let path = store.path_of(&hash);
        assert!(!path.is_file(), "uncompressed path should not exist");
        let compressed = store.compressed_path(&hash);
        assert!(compressed.is_file());
        let (data, _) = store.open(&hash).await.unwrap();
        assert_eq!(data, content.as_bytes());
    }

    #[tokio::test]
    async fn verify_detects_match() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let temp = write_temp(&dir, b"verify me").await;
        let (hash, _) = store.store(&ctx(), &temp).await.unwrap();
        assert!(store.verify(&hash).await.unwrap());
    }

    #[test]
    fn list_all_finds_stored_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let rt = tokio::runtime::Runtime::new().unwrap();
        let temp = rt.block_on(write_temp(&dir, b"listed"));
        let (hash, _) = rt.block_on(store.store(&ctx(), &temp)).unwrap();
        let all = store.list_all().unwrap();
        assert!(all.contains(&hash));
    }
}
