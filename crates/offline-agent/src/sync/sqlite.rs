//! SQLite-backed note queue.
//!
//! Opens the database with WAL pragmas and applies versioned migrations
//! tracked in a `_migrations` table.

use super::queue::{NoteQueue, OfflineNote, QueueError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio_rusqlite::{params, Connection};

/// (version, SQL). Applied in order; each runs once.
const MIGRATIONS: &[(i64, &str)] = &[(
    1,
    "CREATE TABLE IF NOT EXISTS offline_notes (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        payload TEXT NOT NULL,
        created_at TEXT NOT NULL
    );",
)];

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;";

#[derive(Clone, Debug)]
pub struct SqliteNoteQueue {
    conn: Connection,
}

impl SqliteNoteQueue {
    /// Open (creating if needed) the queue database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| QueueError::Database(e.into()))?;
        Self::init(conn).await
    }

    /// In-memory queue, gone when dropped.
    pub async fn open_in_memory() -> Result<Self, QueueError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| QueueError::Database(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, QueueError> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(QueueError::Database)?;

        run_migrations(&conn).await?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    /// Number of pending notes.
    pub async fn len(&self) -> Result<usize, QueueError> {
        self.conn
            .call(|conn| -> Result<usize, QueueError> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM offline_notes", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
            .map_err(QueueError::from)
    }
}

async fn run_migrations(conn: &Connection) -> Result<(), QueueError> {
    conn.call(|conn| -> Result<(), QueueError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current: i64 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, sql) in MIGRATIONS {
            if *version > current {
                conn.execute_batch(sql)
                    .map_err(|e| QueueError::MigrationFailed(format!("v{version}: {e}")))?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                    params![version, Utc::now().to_rfc3339()],
                )?;
            }
        }
        Ok(())
    })
    .await
    .map_err(QueueError::from)
}

#[async_trait]
impl NoteQueue for SqliteNoteQueue {
    async fn enqueue(&self, note: OfflineNote) -> Result<(), QueueError> {
        let payload = serde_json::to_string(&note.payload)?;
        self.conn
            .call(move |conn| -> Result<(), QueueError> {
                conn.execute(
                    "INSERT INTO offline_notes (id, payload, created_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET payload = excluded.payload",
                    params![note.id, payload, note.created_at.to_rfc3339()],
                )?;
                Ok(())
            })
            .await
            .map_err(QueueError::from)
    }

    async fn list_pending(&self) -> Result<Vec<OfflineNote>, QueueError> {
        self.conn
            .call(|conn| -> Result<Vec<OfflineNote>, QueueError> {
                let mut stmt = conn
                    .prepare("SELECT id, payload, created_at FROM offline_notes ORDER BY seq ASC")?;
                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?;

                let mut notes = Vec::new();
                for row in rows {
                    let (id, payload, created_at) = row?;
                    let created_at = DateTime::parse_from_rfc3339(&created_at)
                        .map_err(|e| QueueError::Corrupt(format!("{id}: {e}")))?
                        .with_timezone(&Utc);
                    notes.push(OfflineNote {
                        payload: serde_json::from_str(&payload)?,
                        id,
                        created_at,
                    });
                }
                Ok(notes)
            })
            .await
            .map_err(QueueError::from)
    }

    async fn remove(&self, id: &str) -> Result<bool, QueueError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, QueueError> {
                let removed = conn.execute("DELETE FROM offline_notes WHERE id = ?1", params![id])?;
                Ok(removed > 0)
            })
            .await
            .map_err(QueueError::from)
    }
}
