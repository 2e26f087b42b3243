use pogo_types::{Bookmark, ChangeId, RepositoryId};
use rusqlite::{params, Connection, OptionalExtension};

use crate::Result;

pub fn list(conn: &Connection, repo: RepositoryId) -> Result<Vec<Bookmark>> {
    let mut stmt =
        conn.prepare("SELECT name, change_id FROM bookmarks WHERE repository_id = ?1")?;
    let rows = stmt
        .query_map(params![repo.0], |row| {
            Ok(Bookmark {
                repository_id: repo,
                name: row.get(0)?,
                change_id: ChangeId(row.get(1)?),
            })
        })?
        .collect::<std::result::Result<_, _>>()?;
    Ok(rows)
}

pub fn target(conn: &Connection, repo: RepositoryId, name: &str) -> Result<Option<ChangeId>> {
    conn.query_row(
        "SELECT change_id FROM bookmarks WHERE repository_id = ?1 AND name = ?2",
        params![repo.0, name],
        |row| Ok(ChangeId(row.get(0)?)),
    )
    .optional()
    .map_err(Into::into)
}
