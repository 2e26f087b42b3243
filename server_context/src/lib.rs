//! Request-scoped context threaded through every RPC handler, push step and
//! GC pass. Mirrors `eden/mononoke/server/context`'s `CoreContext`: a logger,
//! a session identifier, a start time, and (here) a cancellation token that
//! stands in for the teacher's request deadline plumbing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pogo_types::UserId;
use rand::RngCore;
use slog::Logger;
use tokio_util::sync::CancellationToken;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn generate() -> Self {
        Self(rand::thread_rng().next_u64())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Carries everything a handler needs that isn't specific to one call:
/// who's asking (once authenticated), how to log, and how to notice the
/// caller went away. Cheap to clone (an `Arc` inside).
#[derive(Clone)]
pub struct CoreContext {
    inner: Arc<Inner>,
}

struct Inner {
    logger: Logger,
    session_id: SessionId,
    started_at: DateTime<Utc>,
    user: Option<UserId>,
    cancel: CancellationToken,
}

impl CoreContext {
    pub fn new(logger: Logger, user: Option<UserId>) -> Self {
        let session_id = SessionId::generate();
        let logger = logger.new(slog::o!("session" => session_id.to_string()));
        Self {
            inner: Arc::new(Inner {
                logger,
                session_id,
                started_at: Utc::now(),
                user,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// A logger and no cancellation wiring; used by unit tests and one-shot
    /// tools (GC runs, `blobimport`-style bulk jobs).
    pub fn test_mock() -> Self {
        Self::new(test_logger(), None)
    }

    pub fn logger(&self) -> &Logger {
        &self.inner.logger
    }

    pub fn session_id(&self) -> SessionId {
        self.inner.session_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    pub fn user(&self) -> Option<UserId> {
        self.inner.user
    }

    /// A context identical to `self` but authenticated as `user`. Used once
    /// the auth middleware has validated a token.
    pub fn with_user(&self, user: UserId) -> Self {
        Self {
            inner: Arc::new(Inner {
                logger: self.inner.logger.clone(),
                session_id: self.inner.session_id,
                started_at: self.inner.started_at,
                user: Some(user),
                cancel: self.inner.cancel.clone(),
            }),
        }
    }

    /// Cancellation token for this request. Dropping the client connection,
    /// or an explicit deadline timer, calls `.cancel()` on the root token;
    /// every suspension point (§5) should race against `cancelled()`.
    pub fn cancellation(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }
}

pub fn test_logger() -> Logger {
    use slog::Drain;
    let decorator = slog_term::PlainDecorator::new(std::io::stdout());
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, slog::o!())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn session_ids_are_distinct() {
        let a = CoreContext::test_mock();
        let b = CoreContext::test_mock();
        assert_ne!(a.session_id(), b.session_id());
    }

    #[test]
    fn with_user_preserves_session_and_cancellation() {
        let ctx = CoreContext::test_mock();
        let authed = ctx.with_user(UserId(42));
        assert_eq!(ctx.session_id(), authed.session_id());
        assert_eq!(authed.user(), Some(UserId(42)));
        assert_eq!(ctx.user(), None);
        authed.cancellation().cancel();
        assert!(ctx.is_cancelled());
    }
}
