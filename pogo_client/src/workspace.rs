//! Per-checkout workspace metadata (§4.5, §4.7): which server and
//! repository this working copy tracks, and which change it currently has
//! checked out. Lives alongside the working tree as a small sqlite file,
//! the same way `HashCache` keeps its own schema independent of the
//! database the server runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS workspace (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    server_addr TEXT NOT NULL,
    blob_http_addr TEXT NOT NULL,
    repository TEXT NOT NULL,
    token TEXT,
    checked_out_change TEXT
)";

/// What `workspace init` (or its programmatic equivalent) records before
/// the first checkout: enough to reach the server and identify the repo,
/// but no change checked out yet.
#[derive(Debug, Clone)]
pub struct WorkspaceInit {
    pub server_addr: String,
    pub blob_http_addr: String,
    pub repository: String,
    pub token: Option<String>,
}

pub struct Workspace {
    conn: Connection,
    root: PathBuf,
}

impl Workspace {
    /// Opens the metadata database under `root/.pogo/workspace.sqlite3`,
    /// creating the directory and schema if this is the first checkout.
    pub fn open(root: &Path) -> Result<Self> {
        let dir = root.join(".pogo");
        std::fs::create_dir_all(&dir).context("create .pogo directory")?;
        let conn = Connection::open(dir.join("workspace.sqlite3")).context("open workspace database")?;
        conn.execute_batch(SCHEMA).context("create workspace schema")?;
        Ok(Self {
            conn,
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn init(&self, init: &WorkspaceInit) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO workspace (id, server_addr, blob_http_addr, repository, token, checked_out_change)
                 VALUES (0, ?1, ?2, ?3, ?4, NULL)
                 ON CONFLICT(id) DO UPDATE SET
                    server_addr = excluded.server_addr,
                    blob_http_addr = excluded.blob_http_addr,
                    repository = excluded.repository,
                    token = excluded.token",
                params![init.server_addr, init.blob_http_addr, init.repository, init.token],
            )
            .context("write workspace row")?;
        Ok(())
    }

    pub fn config(&self) -> Result<WorkspaceConfig> {
        self.conn
            .query_row(
                "SELECT server_addr, blob_http_addr, repository, token, checked_out_change FROM workspace WHERE id = 0",
                [],
                |row| {
                    Ok(WorkspaceConfig {
                        server_addr: row.get(0)?,
                        blob_http_addr: row.get(1)?,
                        repository: row.get(2)?,
                        token: row.get(3)?,
                        checked_out_change: row.get(4)?,
                    })
                },
            )
            .optional()
            .context("read workspace row")?
            .context("workspace is not initialized; run init first")
    }

    pub fn set_checked_out_change(&self, change_id: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE workspace SET checked_out_change = ?1 WHERE id = 0",
                params![change_id],
            )
            .context("update checked-out change")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    pub server_addr: String,
    pub blob_http_addr: String,
    pub repository: String,
    pub token: Option<String>,
    pub checked_out_change: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> WorkspaceInit {
        WorkspaceInit {
            server_addr: "127.0.0.1:7420".to_string(),
            blob_http_addr: "127.0.0.1:7421".to_string(),
            repository: "demo".to_string(),
            token: Some("tok".to_string()),
        }
    }

    #[test]
    fn init_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        ws.init(&sample()).unwrap();

        let config = ws.config().unwrap();
        assert_eq!(config.repository, "demo");
        assert_eq!(config.checked_out_change, None);
    }

    #[test]
    fn reading_before_init_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        assert!(ws.config().is_err());
    }

    #[test]
    fn checked_out_change_persists() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        ws.init(&sample()).unwrap();
        ws.set_checked_out_change("abc123").unwrap();
        assert_eq!(ws.config().unwrap().checked_out_change, Some("abc123".to_string()));
    }

    #[test]
    fn reopening_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ws = Workspace::open(dir.path()).unwrap();
            ws.init(&sample()).unwrap();
            ws.set_checked_out_change("rev1").unwrap();
        }
        let ws = Workspace::open(dir.path()).unwrap();
        assert_eq!(ws.config().unwrap().checked_out_change, Some("rev1".to_string()));
    }
}
