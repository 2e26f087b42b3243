//! The process-wide "application-context value" called for in §9's design
//! notes: one struct holding the database pool, the object store, the GC
//! lock, the change graph, and the resolved config, built once at startup
//! and cloned (cheaply — everything inside is an `Arc`) into every RPC
//! handler and the background GC task.

use std::sync::Arc;

use change_graph::ChangeGraph;
use gc::GcLock;
use object_store::ObjectStore;
use pogo_db::Database;
use slog::Logger;

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppContext {
    pub config: ServerConfig,
    pub db: Arc<Database>,
    pub store: Arc<ObjectStore>,
    pub gc_lock: Arc<GcLock>,
    pub graph: ChangeGraph,
    pub logger: Logger,
}

impl AppContext {
    pub fn new(config: ServerConfig, logger: Logger) -> anyhow::Result<Self> {
        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Arc::new(Database::open(&config.database_path)?);
        let store = Arc::new(ObjectStore::new(config.object_store_root.clone()));
        let graph = ChangeGraph::new(Arc::clone(&db));
        Ok(Self {
            config,
            db,
            store,
            gc_lock: Arc::new(GcLock::new()),
            graph,
            logger,
        })
    }
}
