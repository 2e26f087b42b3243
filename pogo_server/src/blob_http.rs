//! The blob HTTP endpoint (§6): `PUT /v1/objects/{base64url-hash}`. Blobs
//! are a single global content-addressed store (§3: "stored once
//! regardless of how many changes reference it"), so this endpoint only
//! needs a valid token — not a per-repository ACL check, which happens
//! later when `PushFull` actually references the hash from a change.
//! Grounded on `edenapi_service`'s choice of `hyper` for its HTTP surface.

use std::convert::Infallible;
use std::net::SocketAddr;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};

use context::CoreContext;
use object_store::StoreOutcome;
use pogo_types::BlobHash;
use slog::{error, warn};

use crate::app::AppContext;

const PATH_PREFIX: &str = "/v1/objects/";

pub async fn serve(app: AppContext) -> anyhow::Result<()> {
    let addr: SocketAddr = app.config.blob_http_addr;
    let make_svc = make_service_fn(move |_conn| {
        let app = app.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let app = app.clone();
                async move { Ok::<_, Infallible>(handle(app, req).await) }
            }))
        }
    });
    Server::bind(&addr).serve(make_svc).await?;
    Ok(())
}

async fn handle(app: AppContext, req: Request<Body>) -> Response<Body> {
    if req.method() != Method::PUT {
        return status_response(StatusCode::METHOD_NOT_ALLOWED);
    }
    let Some(encoded_hash) = req.uri().path().strip_prefix(PATH_PREFIX) else {
        return status_response(StatusCode::NOT_FOUND);
    };
    let Ok(expected) = BlobHash::from_base64url(encoded_hash) else {
        return status_response(StatusCode::BAD_REQUEST);
    };

    let token = bearer_token(&req);
    let ctx = CoreContext::new(app.logger.clone(), None);
    let ctx = match token {
        Some(raw) => match rpc::authenticate(&ctx, &app.db, &raw) {
            Ok(authed) => authed,
            Err(_) => return status_response(StatusCode::UNAUTHORIZED),
        },
        None => return status_response(StatusCode::UNAUTHORIZED),
    };

    let body = match hyper::body::to_bytes(req.into_body()).await {
        Ok(b) => b,
        Err(e) => {
            error!(app.logger, "blob http: failed to read request body"; "error" => %e);
            return status_response(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let _permit = app.gc_lock.writer_permit().await;
    match app.store.store_bytes(&ctx, &body).await {
        Ok((actual, outcome)) if actual == expected => match outcome {
            StoreOutcome::AlreadyPresent => status_response(StatusCode::OK),
            StoreOutcome::Created => status_response(StatusCode::CREATED),
        },
        Ok((actual, _)) => {
            warn!(app.logger, "blob http: hash mismatch"; "expected" => expected.to_hex(), "actual" => actual.to_hex());
            status_response(StatusCode::BAD_REQUEST)
        }
        Err(e) => {
            error!(app.logger, "blob http: storage write failed"; "error" => %e);
            status_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn bearer_token(req: &Request<Body>) -> Option<String> {
    let header = req.headers().get(hyper::header::AUTHORIZATION)?.to_str().ok()?;
    header.strip_prefix("Bearer ").map(|s| s.to_string())
}

fn status_response(status: StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::empty())
        .expect("building a bodyless response from a fixed status never fails")
}
