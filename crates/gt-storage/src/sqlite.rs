use crate::db::{BeadsDb, Dialect, Rows};
use crate::schema;
use crate::StorageError;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::Path;

/// SQLite-backed store (`beads.db`). Also the in-memory store used by tests.
pub struct SqliteDb {
    conn: Connection,
}

impl SqliteDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Opens (or creates) a store and makes sure the persisted tables exist.
    pub fn open_or_init(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Self::open(path)?;
        db.init_persisted_schema()?;
        Ok(db)
    }

    pub fn init_persisted_schema(&self) -> Result<(), StorageError> {
        self.conn
            .execute_batch(&schema::persisted_schema_ddl())
            .map_err(StorageError::from)
    }
}

impl BeadsDb for SqliteDb {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn version(&self) -> Result<String, StorageError> {
        Ok(self
            .conn
            .query_row("SELECT sqlite_version()", [], |row| row.get::<_, String>(0))?)
    }

    fn query(&self, sql: &str) -> Result<Rows, StorageError> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let width = columns.len();
        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut cells = Vec::with_capacity(width);
            for index in 0..width {
                cells.push(cell_to_string(row.get_ref(index)?));
            }
            rows.push(cells);
        }
        Ok(Rows { columns, rows })
    }

    fn execute(&self, sql: &str) -> Result<(), StorageError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn commit(&self, _message: &str) -> Result<(), StorageError> {
        // SQLite stores have no working set; every statement is already durable.
        Ok(())
    }
}

fn cell_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(v) => v.to_string(),
        ValueRef::Real(v) => v.to_string(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => String::from_utf8_lossy(bytes).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn round_trips_rows_as_strings() {
        let db = SqliteDb::open_in_memory().expect("open");
        db.init_persisted_schema().expect("schema");
        db.execute(
            "INSERT INTO issues (id, title, status, priority, issue_type, ephemeral) \
             VALUES ('gt-1', 'first', 'open', 2, 'task', 0)",
        )
        .expect("insert");
        let rows = db
            .query("SELECT id, priority, closed_at FROM issues")
            .expect("query");
        assert_eq!(rows.columns, vec!["id", "priority", "closed_at"]);
        assert_eq!(rows.rows, vec![vec!["gt-1", "2", ""]]);
        assert!(db.table_exists("issues").expect("exists"));
        assert!(!db.table_exists("wisps").expect("exists"));
    }

    #[test]
    fn header_survives_empty_result() {
        let file = NamedTempFile::new().expect("temp db");
        let db = SqliteDb::open_or_init(file.path()).expect("open");
        let rows = db.query("SELECT id, title FROM issues").expect("query");
        assert_eq!(rows.columns.len(), 2);
        assert!(rows.is_empty());
    }
}
