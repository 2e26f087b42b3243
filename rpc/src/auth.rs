//! Token authentication (§6): a 32-byte personal access token, presented as
//! `Authorization: Bearer <base64url>` on HTTP blob uploads and as an `Auth`
//! frame on the head of every streaming RPC. The same token grants access to
//! every repository the user is associated with; per-repository write
//! access is a separate ACL check against `pogo_db`'s `repo_acl` table.

use sha2::{Digest, Sha256};
use thiserror::Error;

use context::CoreContext;
use pogo_db::Database;
use pogo_errors::{ErrorKind, ToErrorKind};
use pogo_types::{RepositoryId, UserId};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no authentication token presented")]
    MissingToken,
    #[error("authentication token is not recognized")]
    InvalidToken,
    #[error("user does not have write access to this repository")]
    AccessDenied,
}

impl ToErrorKind for AuthError {
    fn error_kind(&self) -> ErrorKind {
        match self {
            AuthError::MissingToken => ErrorKind::AuthRequired,
            AuthError::InvalidToken => ErrorKind::AuthInvalid,
            AuthError::AccessDenied => ErrorKind::AccessDenied,
        }
    }
}

/// Tokens are stored hashed (`users.token_hash`); this is the one place that
/// turns a raw presented token into the lookup key, so creation and
/// verification can never drift apart.
pub fn hash_token(token: &[u8; 32]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Decodes and validates a bearer token, returning a context authenticated
/// as the matching user. Public-repo reads (§4.10) skip this call entirely.
pub fn authenticate(ctx: &CoreContext, db: &Database, raw_token: &str) -> Result<CoreContext, AuthError> {
    let token = pogo_types::decode_token(raw_token).map_err(|_| AuthError::InvalidToken)?;
    let hash = hash_token(&token);
    let user = db
        .find_user_by_token_hash(&hash)
        .map_err(|_| AuthError::InvalidToken)?
        .ok_or(AuthError::InvalidToken)?;
    Ok(ctx.with_user(user))
}

/// Per-repository write gate: a public repo still requires a real,
/// ACL-granted user for writes — publicness only relaxes reads.
pub fn require_write(db: &Database, repo: RepositoryId, user: Option<UserId>) -> Result<UserId, AuthError> {
    let user = user.ok_or(AuthError::MissingToken)?;
    match db.can_write(repo, user).map_err(|_| AuthError::AccessDenied)? {
        Some(true) => Ok(user),
        _ => Err(AuthError::AccessDenied),
    }
}

/// Per-repository read gate: a public repo allows anonymous reads; a
/// private one requires any ACL row at all (read or write).
pub fn require_read(
    db: &Database,
    repo: RepositoryId,
    public: bool,
    user: Option<UserId>,
) -> Result<(), AuthError> {
    if public {
        return Ok(());
    }
    let user = user.ok_or(AuthError::MissingToken)?;
    match db.can_write(repo, user).map_err(|_| AuthError::AccessDenied)? {
        Some(_) => Ok(()),
        None => Err(AuthError::AccessDenied),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn authenticate_round_trips_through_the_db() {
        let db = Database::with_sqlite_in_memory().unwrap();
        let token = [9u8; 32];
        let hash = hash_token(&token);
        let expected = db.create_user("alice", &hash).unwrap();

        let ctx = CoreContext::test_mock();
        let raw = pogo_types::encode_token(&token);
        let authed = authenticate(&ctx, &db, &raw).unwrap();
        assert_eq!(authed.user(), Some(expected));
    }

    #[test]
    fn unknown_token_is_invalid() {
        let db = Database::with_sqlite_in_memory().unwrap();
        let ctx = CoreContext::test_mock();
        let raw = pogo_types::encode_token(&[1u8; 32]);
        let err = authenticate(&ctx, &db, &raw).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[test]
    fn require_write_honors_acl() {
        let db = Database::with_sqlite_in_memory().unwrap();
        let repo = db.create_repository("r", false).unwrap();
        let user = db.create_user("bob", "h").unwrap();
        assert!(require_write(&db, repo, Some(user)).is_err());
        db.set_repo_acl(repo, user, true).unwrap();
        assert_eq!(require_write(&db, repo, Some(user)).unwrap(), user);
    }

    #[test]
    fn require_read_allows_anonymous_on_public_repo() {
        let db = Database::with_sqlite_in_memory().unwrap();
        let repo = db.create_repository("open", true).unwrap();
        assert!(require_read(&db, repo, true, None).is_ok());
    }

    #[test]
    fn require_read_rejects_anonymous_on_private_repo() {
        let db = Database::with_sqlite_in_memory().unwrap();
        let repo = db.create_repository("closed", false).unwrap();
        assert!(require_read(&db, repo, false, None).is_err());
    }
}
