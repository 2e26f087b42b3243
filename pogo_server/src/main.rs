//! `pogo_server`: the centralized change-graph server (§4, §6). Binds the
//! RPC TCP listener, the blob HTTP endpoint, and the scheduled GC pass,
//! then runs until one of them exits.

mod app;
mod blob_http;
mod checkout_handler;
mod config;
mod gc_task;
mod listener;
mod metadata;
mod push_handler;

use slog::Drain;

use app::AppContext;

fn build_logger(level: slog::Level) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = slog::LevelFilter::new(drain, level).fuse();
    slog::Logger::root(drain, slog::o!())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::load()?;
    let logger = build_logger(config.log_level);
    slog::info!(logger, "starting pogo_server";
        "listen_addr" => %config.listen_addr,
        "blob_http_addr" => %config.blob_http_addr,
    );

    let app = AppContext::new(config, logger.clone())?;

    let rpc = tokio::spawn(listener::serve(app.clone()));
    let blob = tokio::spawn(blob_http::serve(app.clone()));
    let gc = tokio::spawn(gc_task::run(app.clone()));

    tokio::select! {
        res = rpc => res.map_err(anyhow::Error::from).and_then(|r| r)?,
        res = blob => res.map_err(anyhow::Error::from).and_then(|r| r)?,
        _ = gc => {}
    }

    Ok(())
}
