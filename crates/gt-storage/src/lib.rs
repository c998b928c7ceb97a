//! Access to the per-rig record stores.
//!
//! The database engine itself is external; this crate only speaks to it
//! through [`BeadsDb`], either by shelling out to `dolt` or by opening a
//! local SQLite file.

pub mod csv;
pub mod db;
pub mod dolt;
pub mod schema;
pub mod sqlite;
pub mod wisps;

pub use db::{BeadsDb, Dialect, Row, Rows};
pub use dolt::{DoltCli, DEFAULT_DOLT_BINARY};
pub use sqlite::SqliteDb;
pub use wisps::{MigrationOptions, MigrationReport, Selection, WispMigrator};

use gt_core::town::{DOLT_DIR, SQLITE_FILE};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("{command} failed: {stderr}")]
    Command { command: String, stderr: String },
    #[error("database binary not found: {0}")]
    BinaryMissing(String),
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("no database found under {0}")]
    NoBackend(PathBuf),
}

/// Opens the database behind a (canonical) store directory.
pub trait StoreOpener {
    fn open(&self, store_dir: &Path) -> Result<Box<dyn BeadsDb>, StorageError>;
}

/// Prefers a Dolt repository under `dolt/`, then a `beads.db` SQLite file.
#[derive(Debug, Clone)]
pub struct DefaultStoreOpener {
    dolt_binary: String,
}

impl DefaultStoreOpener {
    pub fn new(dolt_binary: impl Into<String>) -> Self {
        Self {
            dolt_binary: dolt_binary.into(),
        }
    }
}

impl Default for DefaultStoreOpener {
    fn default() -> Self {
        Self::new(DEFAULT_DOLT_BINARY)
    }
}

impl StoreOpener for DefaultStoreOpener {
    fn open(&self, store_dir: &Path) -> Result<Box<dyn BeadsDb>, StorageError> {
        if store_dir.join(DOLT_DIR).is_dir() {
            return Ok(Box::new(DoltCli::locate(&self.dolt_binary, store_dir)?));
        }
        let sqlite = store_dir.join(SQLITE_FILE);
        if sqlite.is_file() {
            return Ok(Box::new(SqliteDb::open(sqlite)?));
        }
        Err(StorageError::NoBackend(store_dir.to_path_buf()))
    }
}
