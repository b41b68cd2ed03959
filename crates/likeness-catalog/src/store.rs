//! SQLite storage for catalog rows.

use crate::error::CatalogError;
use likeness_core::Label;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    label INTEGER,
    name TEXT,
    photo BLOB
)";

/// Owned handle on the catalog database. The connection closes on drop.
pub struct CatalogStore {
    conn: Connection,
}

impl CatalogStore {
    /// Open (creating if needed) the database at `path` and ensure the
    /// `photos` table exists.
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "catalog store opened");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, CatalogError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CatalogError> {
        let store = Self { conn };
        store.create_table()?;
        Ok(store)
    }

    pub fn create_table(&self) -> Result<(), CatalogError> {
        self.conn.execute_batch(CREATE_TABLE)?;
        Ok(())
    }

    pub fn drop_table(&self) -> Result<(), CatalogError> {
        self.conn.execute_batch("DROP TABLE IF EXISTS photos")?;
        Ok(())
    }

    /// Insert all rows in one transaction; nothing is written if any insert fails.
    pub fn insert_photos<'r, I>(&self, rows: I) -> Result<usize, CatalogError>
    where
        I: IntoIterator<Item = (Label, &'r str, Vec<u8>)>,
    {
        self.write_photos(rows, false)
    }

    /// Delete every row and insert `rows` in one transaction. On failure the
    /// previous rows are kept.
    pub fn replace_photos<'r, I>(&self, rows: I) -> Result<usize, CatalogError>
    where
        I: IntoIterator<Item = (Label, &'r str, Vec<u8>)>,
    {
        self.write_photos(rows, true)
    }

    fn write_photos<'r, I>(&self, rows: I, clear: bool) -> Result<usize, CatalogError>
    where
        I: IntoIterator<Item = (Label, &'r str, Vec<u8>)>,
    {
        let tx = self.conn.unchecked_transaction()?;
        if clear {
            let removed = tx.execute("DELETE FROM photos", [])?;
            tracing::debug!(removed, "catalog rows cleared for replacement");
        }
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare("INSERT INTO photos (label, name, photo) VALUES (?1, ?2, ?3)")?;
            for (label, name, blob) in rows {
                stmt.execute(params![label, name, blob])?;
                inserted += 1;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn distinct_names(&self) -> Result<Vec<(Label, String)>, CatalogError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT label, name FROM photos ORDER BY label, name")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn name_for_label(&self, label: Label) -> Result<Option<String>, CatalogError> {
        let name = self
            .conn
            .query_row(
                "SELECT name FROM photos WHERE label = ?1 ORDER BY id LIMIT 1",
                [label],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    /// Every `(label, blob)` row in insertion order.
    pub fn photo_blobs(&self) -> Result<Vec<(Label, Vec<u8>)>, CatalogError> {
        let mut stmt = self.conn.prepare("SELECT label, photo FROM photos ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get::<_, Option<Vec<u8>>>(1)?.unwrap_or_default()))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count(&self) -> Result<u64, CatalogError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM photos", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}
