//! Scheduled full GC (§4.9): periodically sweeps every on-disk blob the
//! database no longer references. Runs for the lifetime of the process;
//! a failed pass is logged and retried on the next tick rather than
//! killing the server.

use context::CoreContext;

use crate::app::AppContext;

pub async fn run(app: AppContext) {
    let mut ticker = tokio::time::interval(app.config.gc_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let ctx = CoreContext::new(app.logger.clone(), None);
        let _permit = app.gc_lock.gc_permit().await;
        match gc::full_gc(&ctx, &app.db, &app.store).await {
            Ok(report) => {
                slog::info!(
                    app.logger,
                    "scheduled gc: swept unreferenced blobs";
                    "blobs_deleted" => report.blobs_deleted,
                    "bytes_freed" => report.bytes_freed,
                );
            }
            Err(e) => {
                slog::error!(app.logger, "scheduled gc: pass failed"; "error" => %e);
            }
        }
    }
}
