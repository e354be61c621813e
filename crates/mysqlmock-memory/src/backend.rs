//! [`MemoryBackend`]: the catalog behind a lock, plus JSON snapshots.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use mysqlmock_core::{Backend, Error, NotFoundError, QueryError, QueryErrorKind, ResultSet};
use tracing::{debug, info, trace, warn};

use crate::catalog::{Catalog, Table};
use crate::parser::{self, Statement, TableRef};

/// An in-memory SQL backend shared by every connection.
///
/// Reads run concurrently; each mutating statement holds the write lock for
/// its whole execution, so statements are atomic with respect to each other.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    catalog: RwLock<Catalog>,
    snapshot_path: Option<PathBuf>,
    /// Serializes snapshot writers; they share one temp file name.
    save_lock: Mutex<()>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend holding `catalog`.
    pub fn from_catalog(catalog: Catalog) -> Self {
        Self {
            catalog: RwLock::new(catalog),
            snapshot_path: None,
            save_lock: Mutex::new(()),
        }
    }

    /// Rewrite the snapshot at `path` after every mutating statement.
    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Load the catalog from a JSON snapshot.
    pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let catalog: Catalog = serde_json::from_str(&text)?;
        info!(
            path = %path.display(),
            databases = catalog.databases.len(),
            "loaded snapshot"
        );
        Ok(Self::from_catalog(catalog))
    }

    /// Load `path` if it exists, start empty otherwise, and autosave to it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let backend = if path.exists() {
            Self::load_snapshot(&path)?
        } else {
            info!(path = %path.display(), "no snapshot yet, starting empty");
            Self::new()
        };
        Ok(backend.with_snapshot_path(path))
    }

    /// Write the whole catalog to `path` as JSON.
    ///
    /// The file is written next to `path` and renamed over it, so a reader
    /// never sees a half-written snapshot.
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let _saving = self.save_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let json = serde_json::to_string_pretty(&*self.read())?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "snapshot written");
        Ok(())
    }

    /// A copy of the current catalog.
    pub fn catalog(&self) -> Catalog {
        self.read().clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.catalog.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn autosave(&self) {
        if let Some(path) = &self.snapshot_path {
            if let Err(e) = self.save_snapshot(path) {
                warn!(path = %path.display(), error = %e, "failed to save snapshot");
            }
        }
    }

    fn run(&self, statement: Statement, database: Option<&str>) -> Result<ResultSet, QueryError> {
        match statement {
            Statement::Use { name } => {
                self.read().database(&name)?;
                Ok(ResultSet::affected(0))
            }
            Statement::ShowTables => {
                let db = current_database(database)?;
                let catalog = self.read();
                let mut result = ResultSet::new([format!("Tables_in_{}", db)]);
                for name in catalog.database(db)?.tables.keys() {
                    result.push_row([Some(name.as_str())]);
                }
                Ok(result)
            }
            Statement::Select {
                table,
                projection,
                filter,
                limit,
            } => {
                let db = resolve(&table, database)?;
                self.read()
                    .table(db, &table.name)?
                    .select(&projection, &filter, limit)
            }
            Statement::CreateDatabase {
                name,
                if_not_exists,
            } => self
                .write()
                .create_database(&name, if_not_exists)
                .map(ResultSet::affected),
            Statement::DropDatabase { name, if_exists } => self
                .write()
                .drop_database(&name, if_exists)
                .map(ResultSet::affected),
            Statement::CreateTable {
                table,
                if_not_exists,
                columns,
                primary_key,
            } => {
                let db = resolve(&table, database)?;
                let schema = Table::new(columns, primary_key)?;
                self.write()
                    .create_table(db, &table.name, schema, if_not_exists)
                    .map(ResultSet::affected)
            }
            Statement::DropTable { table, if_exists } => {
                let db = resolve(&table, database)?;
                self.write()
                    .drop_table(db, &table.name, if_exists)
                    .map(ResultSet::affected)
            }
            Statement::Insert {
                table,
                columns,
                rows,
            } => {
                let db = resolve(&table, database)?;
                self.write()
                    .table_mut(db, &table.name)?
                    .insert(columns.as_deref(), rows)
                    .map(ResultSet::affected)
            }
            Statement::Update {
                table,
                assignments,
                filter,
            } => {
                let db = resolve(&table, database)?;
                self.write()
                    .table_mut(db, &table.name)?
                    .update(&assignments, &filter)
                    .map(ResultSet::affected)
            }
            Statement::Delete { table, filter } => {
                let db = resolve(&table, database)?;
                self.write()
                    .table_mut(db, &table.name)?
                    .delete(&filter)
                    .map(ResultSet::affected)
            }
        }
    }
}

fn current_database(database: Option<&str>) -> Result<&str, QueryError> {
    database.ok_or_else(|| QueryError::new(QueryErrorKind::NotFound, "No database selected"))
}

/// The table's own qualifier wins over the session database.
fn resolve<'a>(table: &'a TableRef, database: Option<&'a str>) -> Result<&'a str, QueryError> {
    match &table.database {
        Some(db) => Ok(db),
        None => current_database(database),
    }
}

impl Backend for MemoryBackend {
    fn execute(
        &self,
        sql: &str,
        _capabilities: u32,
        database: Option<&str>,
    ) -> Result<ResultSet, QueryError> {
        trace!(sql = %sql, database = ?database, "memory backend execute");
        let statement = parser::parse(sql)?;
        let mutation = statement.is_mutation();
        let result = self.run(statement, database)?;
        if mutation {
            debug!(affected_rows = result.affected_rows(), "catalog changed");
            self.autosave();
        }
        Ok(result)
    }

    fn select_database(&self, name: &str) -> Result<(), NotFoundError> {
        if self.read().has_database(name) {
            Ok(())
        } else {
            Err(NotFoundError {
                name: name.to_string(),
            })
        }
    }

    fn databases(&self) -> Vec<String> {
        self.read().database_names()
    }
}
