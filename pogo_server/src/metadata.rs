//! Handlers for the unary metadata calls (§4.10): everything that isn't
//! push or checkout. Each function takes the already-authenticated
//! `CoreContext` and the decoded request and returns either a response
//! frame or an `anyhow::Error` for `rpc::to_rpc_error` to classify. Like
//! `change_graph` itself, these stay synchronous calls into the mutex-
//! guarded connection rather than `spawn_blocking` — only the heavier,
//! genuinely slow paths (GC, blob I/O) get their own blocking task.

use anyhow::{anyhow, Context, Result};

use change_graph::Bookmark;
use context::CoreContext;
use pogo_types::RepositoryId;
use rpc::{BookmarkSummary, ChangeSummary, MetadataRequest, MetadataResponse};

use crate::app::AppContext;

pub async fn handle(
    app: &AppContext,
    ctx: &CoreContext,
    request: MetadataRequest,
) -> Result<MetadataResponse> {
    match request {
        MetadataRequest::Init { repository, public } => init(app, ctx, &repository, public),
        MetadataRequest::NewChange {
            repository,
            parents,
            description,
        } => new_change(app, ctx, &repository, &parents, description).await,
        MetadataRequest::SetBookmark {
            repository,
            name,
            revision,
            force,
        } => set_bookmark(app, ctx, &repository, &name, &revision, force),
        MetadataRequest::RemoveChange {
            repository,
            revision,
            keep_children,
        } => remove_change(app, ctx, &repository, &revision, keep_children).await,
        MetadataRequest::Resolve { repository, revision } => resolve(app, ctx, &repository, &revision),
        MetadataRequest::ListBookmarks { repository } => list_bookmarks(app, ctx, &repository),
    }
}

fn repo_id(app: &AppContext, name: &str) -> Result<RepositoryId> {
    app.db
        .find_repository_by_name(name)?
        .map(|(id, _)| id)
        .ok_or_else(|| anyhow!("no such repository '{name}'"))
}

fn repo_id_and_public(app: &AppContext, name: &str) -> Result<(RepositoryId, bool)> {
    app.db
        .find_repository_by_name(name)?
        .ok_or_else(|| anyhow!("no such repository '{name}'"))
}

/// Creating a repository just requires *any* valid token; the creator
/// becomes its first writer.
fn init(app: &AppContext, ctx: &CoreContext, repository: &str, public: bool) -> Result<MetadataResponse> {
    let user = ctx
        .user()
        .ok_or_else(|| anyhow!("authentication required to create a repository"))?;
    let id = app.db.create_repository(repository, public).context("create repository")?;
    app.db.set_repo_acl(id, user, true).context("grant creator write access")?;
    let root = app
        .graph
        .create_root(id, Some(user), None)
        .context("create root change")?;
    Ok(MetadataResponse::Change(summary(&app.graph, &root, ctx.user())?))
}

async fn new_change(
    app: &AppContext,
    ctx: &CoreContext,
    repository: &str,
    parents: &[String],
    description: Option<String>,
) -> Result<MetadataResponse> {
    let repo = repo_id(app, repository)?;
    rpc::require_write(&app.db, repo, ctx.user()).context("new-change authorization")?;
    let mut parent_ids = Vec::with_capacity(parents.len());
    for token in parents {
        parent_ids.push(app.graph.resolve(repo, token).context("resolve parent")?);
    }
    let change = app
        .graph
        .create(repo, &parent_ids, ctx.user(), description)
        .context("create change")?;

    if let [a_id, b_id] = parent_ids[..] {
        let a = app.graph.get(a_id).context("read merge parent a")?;
        let b = app.graph.get(b_id).context("read merge parent b")?;
        let lca = app.graph.lca(a_id, b_id).context("find merge base")?;
        let cases = app
            .graph
            .merge_file_list(lca, a_id, b_id)
            .context("build merge file list")?;
        let entries = merge::merge_changes(ctx, &app.store, &cases, a.name.as_str(), b.name.as_str())
            .await
            .context("run three-way merge")?;
        app.graph
            .set_file_entries(change.id, &entries)
            .context("commit merged file entries")?;
    }

    Ok(MetadataResponse::Change(summary(&app.graph, &change, ctx.user())?))
}

fn set_bookmark(
    app: &AppContext,
    ctx: &CoreContext,
    repository: &str,
    name: &str,
    revision: &str,
    force: bool,
) -> Result<MetadataResponse> {
    let repo = repo_id(app, repository)?;
    rpc::require_write(&app.db, repo, ctx.user()).context("set-bookmark authorization")?;
    let target = app.graph.resolve(repo, revision).context("resolve revision")?;
    if !force {
        if let Some(current) = app.graph.bookmark_target(repo, name).context("read bookmark")? {
            if app.graph.is_readonly(current, ctx.user()).context("readonly check")? {
                return Err(anyhow!(
                    "bookmark move rejected: current target is readonly (use force)"
                ));
            }
        }
    }
    app.graph.set_bookmark(repo, name, target).context("set bookmark")?;
    Ok(MetadataResponse::Bookmarks(vec![BookmarkSummary {
        name: name.to_string(),
        change_id: target.to_string(),
    }]))
}

/// Unlike push, `RemoveChange` has no "previous checkout" to protect
/// against, so it always passes `None` for the currently-checked-out
/// change — a client wishing to guard against removing its own checkout
/// should resolve and compare client-side before calling this.
async fn remove_change(
    app: &AppContext,
    ctx: &CoreContext,
    repository: &str,
    revision: &str,
    keep_children: bool,
) -> Result<MetadataResponse> {
    let repo = repo_id(app, repository)?;
    rpc::require_write(&app.db, repo, ctx.user()).context("remove-change authorization")?;
    let target = app.graph.resolve(repo, revision).context("resolve revision")?;
    let previous = app.graph.file_entries(target).context("read previous file entries")?;
    app.graph.remove(target, keep_children, None).context("remove change")?;

    let _permit = app.gc_lock.writer_permit().await;
    let report = gc::online_cleanup(ctx, &app.db, &app.store, &previous)
        .await
        .context("online gc cleanup")?;
    slog::info!(app.logger, "remove-change: collected blobs"; "count" => report.blobs_deleted);
    Ok(MetadataResponse::Ack)
}

fn resolve(app: &AppContext, ctx: &CoreContext, repository: &str, revision: &str) -> Result<MetadataResponse> {
    let (repo, public) = repo_id_and_public(app, repository)?;
    rpc::require_read(&app.db, repo, public, ctx.user()).context("resolve authorization")?;
    let id = app.graph.resolve(repo, revision).context("resolve revision")?;
    Ok(MetadataResponse::Resolved {
        change_id: id.to_string(),
    })
}

fn list_bookmarks(app: &AppContext, ctx: &CoreContext, repository: &str) -> Result<MetadataResponse> {
    let (repo, public) = repo_id_and_public(app, repository)?;
    rpc::require_read(&app.db, repo, public, ctx.user()).context("list-bookmarks authorization")?;
    let bookmarks: Vec<Bookmark> = app.graph.list_bookmarks(repo).context("list bookmarks")?;
    Ok(MetadataResponse::Bookmarks(
        bookmarks
            .into_iter()
            .map(|b| BookmarkSummary {
                name: b.name,
                change_id: b.change_id.to_string(),
            })
            .collect(),
    ))
}

fn summary(
    graph: &change_graph::ChangeGraph,
    change: &pogo_types::Change,
    user: Option<pogo_types::UserId>,
) -> Result<ChangeSummary> {
    let readonly = graph.is_readonly(change.id, user).context("readonly check")?;
    Ok(ChangeSummary {
        change_id: change.id.to_string(),
        name: change.name.as_str().to_string(),
        depth: change.depth,
        readonly,
    })
}
