//! SQLite collaborators: snapshot backups and venue metadata
//!
//! The memory store itself persists only to JSON. The scraper database is
//! used to back up generated insights into `memory_snapshots` and to read
//! venue metadata from the `venues` table, which is owned elsewhere.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::error::{MemoryError, Result};
use crate::types::{Venue, VenueId};

pub const LEARNING_INSIGHTS_SNAPSHOT: &str = "learning_insights";

/// A stored snapshot row
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: i64,
    pub timestamp: String,
    pub snapshot_type: String,
    pub snapshot_data: String,
}

/// Connection to the scraper database
#[derive(Clone)]
pub struct SnapshotStore {
    conn: Arc<Mutex<Connection>>,
}

impl SnapshotStore {
    /// Open the database at `path`, creating the snapshot table if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| MemoryError::io(parent, e))?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database, for tests and dry runs
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS memory_snapshots (
                id INTEGER PRIMARY KEY,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                snapshot_type TEXT,
                snapshot_data TEXT
            );
        "#,
        )?;
        Ok(())
    }

    /// Insert a snapshot, returning its row id
    pub async fn save_snapshot(&self, snapshot_type: &str, data: &str) -> Result<i64> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO memory_snapshots (snapshot_type, snapshot_data) VALUES (?1, ?2)",
            params![snapshot_type, data],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn latest_snapshot(&self, snapshot_type: &str) -> Result<Option<Snapshot>> {
        let conn = self.conn.lock().await;
        let snapshot = conn
            .query_row(
                r#"SELECT id, timestamp, snapshot_type, snapshot_data
                   FROM memory_snapshots WHERE snapshot_type = ?1
                   ORDER BY id DESC LIMIT 1"#,
                params![snapshot_type],
                |row| {
                    Ok(Snapshot {
                        id: row.get(0)?,
                        timestamp: row.get(1)?,
                        snapshot_type: row.get(2)?,
                        snapshot_data: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(snapshot)
    }

    pub async fn count(&self, snapshot_type: &str) -> Result<u64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memory_snapshots WHERE snapshot_type = ?1",
            params![snapshot_type],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Read-only view of the `venues` table on the same connection
    pub fn venues(&self) -> VenueCatalog {
        VenueCatalog {
            conn: self.conn.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) async fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.lock().await.execute_batch(sql)?;
        Ok(())
    }
}

/// Venue metadata lookups
#[derive(Clone)]
pub struct VenueCatalog {
    conn: Arc<Mutex<Connection>>,
}

const VENUE_COLUMNS: &str = "id, name, city, category, website, facebook_url, description";

fn venue_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Venue> {
    Ok(Venue {
        id: row.get(0)?,
        name: row.get(1)?,
        city: row.get(2)?,
        category: row.get(3)?,
        website: row.get(4)?,
        facebook_url: row.get(5)?,
        description: row.get(6)?,
    })
}

impl VenueCatalog {
    /// Active venues, highest priority first
    pub async fn active_venues(&self) -> Result<Vec<Venue>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM venues WHERE is_active = 1 ORDER BY priority DESC",
            VENUE_COLUMNS
        ))?;
        let venues = stmt
            .query_map([], venue_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(venues)
    }

    pub async fn venue(&self, id: VenueId) -> Result<Option<Venue>> {
        let conn = self.conn.lock().await;
        let venue = conn
            .query_row(
                &format!("SELECT {} FROM venues WHERE id = ?1", VENUE_COLUMNS),
                params![id],
                venue_from_row,
            )
            .optional()?;
        Ok(venue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const VENUES_TABLE: &str = r#"
        CREATE TABLE venues (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            city TEXT,
            category TEXT,
            website TEXT,
            facebook_url TEXT,
            description TEXT,
            priority INTEGER DEFAULT 0,
            is_active INTEGER DEFAULT 1
        );
        INSERT INTO venues (id, name, city, category, website, priority, is_active)
            VALUES (1, 'Jefferson Theatre', 'Beaumont', 'Theatre', 'https://jt.example.com', 5, 1);
        INSERT INTO venues (id, name, city, category, priority, is_active)
            VALUES (2, 'Ford Park', 'Beaumont', 'Arena', 9, 1);
        INSERT INTO venues (id, name, city, priority, is_active)
            VALUES (3, 'Closed Hall', 'Orange', 10, 0);
    "#;

    #[tokio::test]
    async fn test_save_and_read_snapshot() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("database.sqlite")).await.unwrap();

        assert!(store.latest_snapshot(LEARNING_INSIGHTS_SNAPSHOT).await.unwrap().is_none());
        store.save_snapshot(LEARNING_INSIGHTS_SNAPSHOT, "{\"a\":1}").await.unwrap();
        let id = store.save_snapshot(LEARNING_INSIGHTS_SNAPSHOT, "{\"a\":2}").await.unwrap();

        let latest = store.latest_snapshot(LEARNING_INSIGHTS_SNAPSHOT).await.unwrap().unwrap();
        assert_eq!(latest.id, id);
        assert_eq!(latest.snapshot_data, "{\"a\":2}");
        assert!(!latest.timestamp.is_empty());
        assert_eq!(store.count(LEARNING_INSIGHTS_SNAPSHOT).await.unwrap(), 2);
        assert_eq!(store.count("other").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_active_venues_by_priority() {
        let store = SnapshotStore::in_memory().unwrap();
        store.execute_batch(VENUES_TABLE).await.unwrap();

        let venues = store.venues().active_venues().await.unwrap();
        assert_eq!(venues.iter().map(|v| v.id).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(venues[1].website.as_deref(), Some("https://jt.example.com"));

        let closed = store.venues().venue(3).await.unwrap().unwrap();
        assert_eq!(closed.name, "Closed Hall");
        assert!(store.venues().venue(42).await.unwrap().is_none());
    }
}
