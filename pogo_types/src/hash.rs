//! SHA-256 content addressing, shared by the object store, file entries and
//! the symlink-target hashing rule (target strings are hashed exactly like
//! file content, just without a backing blob).

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::{URL_SAFE_NO_PAD, STANDARD_NO_PAD};
use base64::Engine;
use sha2::{Digest, Sha256 as Sha256Impl};

pub const HASH_BYTES: usize = 32;

#[derive(Copy, Clone, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BlobHash([u8; HASH_BYTES]);

impl BlobHash {
    pub fn from_bytes(bytes: [u8; HASH_BYTES]) -> Self {
        Self(bytes)
    }

    /// Hash of the empty byte string; used for empty-file content addressing.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256Impl::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut out = [0u8; HASH_BYTES];
        out.copy_from_slice(&digest);
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_BYTES] {
        &self.0
    }

    /// The path-safe form used for the object store's on-disk layout and the
    /// blob upload URL (`/v1/objects/{base64url(hash)}`).
    pub fn to_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    pub fn from_base64url(s: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .context("decode base64url hash")?;
        Self::from_slice(&bytes)
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HASH_BYTES {
            bail!("hash has {} bytes, expected {}", bytes.len(), HASH_BYTES);
        }
        let mut out = [0u8; HASH_BYTES];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    /// Two-level fan-out directory prefix used by the object store layout:
    /// the first two base64url characters of the hash.
    pub fn fanout_prefix(&self) -> String {
        let full = self.to_base64url();
        full.chars().take(2).collect()
    }
}

impl fmt::Debug for BlobHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobHash({})", self.to_hex())
    }
}

impl fmt::Display for BlobHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for BlobHash {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_base64url(s)
    }
}

/// A 32-byte personal access token. The decoder accepts both base64url and
/// standard base64 so that tokens pasted from different tools still work.
pub fn decode_token(raw: &str) -> Result<[u8; 32]> {
    let bytes = URL_SAFE_NO_PAD
        .decode(raw)
        .or_else(|_| STANDARD_NO_PAD.decode(raw.trim_end_matches('=')))
        .context("decode auth token")?;
    if bytes.len() != 32 {
        bail!("auth token has {} bytes, expected 32", bytes.len());
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

pub fn encode_token(token: &[u8; 32]) -> String {
    URL_SAFE_NO_PAD.encode(token)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_string_hash() {
        // sha256("") per RFC test vectors.
        let h = BlobHash::of(b"");
        assert_eq!(
            h.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
        );
    }

    #[test]
    fn base64url_roundtrip() {
        let h = BlobHash::of(b"hello, world");
        let encoded = h.to_base64url();
        let back = BlobHash::from_base64url(&encoded).unwrap();
        assert_eq!(h, back);
        assert_eq!(h.fanout_prefix().len(), 2);
    }

    #[test]
    fn symlink_target_hash_is_content_hash() {
        let target = "target.txt";
        let h = BlobHash::of(target.as_bytes());
        assert_eq!(h, BlobHash::of(b"target.txt"));
    }

    #[test]
    fn token_roundtrip_both_encodings() {
        let raw = [7u8; 32];
        let encoded = encode_token(&raw);
        assert_eq!(decode_token(&encoded).unwrap(), raw);
    }
}
