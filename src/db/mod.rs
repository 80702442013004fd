// Database module

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::error::{Result, ShelfError};

/// Open or create a database at the given path
pub fn open_db(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    migrations::run_migrations(&conn)?;

    Ok(conn)
}

/// Open a fresh in-memory database with all migrations applied.
pub fn open_memory_db() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    migrations::run_migrations(&conn)?;
    Ok(conn)
}

#[derive(Debug)]
enum Backing {
    File(PathBuf),
    Memory,
}

/// Shared handle to the metadata store.
///
/// Clones share one lazily opened connection. `init()` opens it on first use,
/// `close()` drops it; any later access reopens. In-memory stores lose their
/// contents on close.
#[derive(Debug, Clone)]
pub struct Store {
    backing: Arc<Backing>,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl Store {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Arc::new(Backing::File(db_path.into())),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    pub fn in_memory() -> Result<Self> {
        let store = Self {
            backing: Arc::new(Backing::Memory),
            conn: Arc::new(Mutex::new(None)),
        };
        store.init()?;
        Ok(store)
    }

    /// Open the connection if it is not open yet.
    pub fn init(&self) -> Result<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| ShelfError::Other("Store lock poisoned".to_string()))?;
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        Ok(())
    }

    pub fn close(&self) {
        if let Ok(mut guard) = self.conn.lock() {
            *guard = None;
        }
    }

    pub fn is_open(&self) -> bool {
        self.conn.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    /// Run `f` against the connection, opening it first if needed.
    pub fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| ShelfError::Other("Store lock poisoned".to_string()))?;
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        match guard.as_mut() {
            Some(conn) => f(conn),
            None => Err(ShelfError::Other("Store is not open".to_string())),
        }
    }

    fn open(&self) -> Result<Connection> {
        match self.backing.as_ref() {
            Backing::File(path) => open_db(path),
            Backing::Memory => open_memory_db(),
        }
    }
}
