//! Databases, tables and rows held in memory.
//!
//! Everything here is plain data plus the operations the executor needs.
//! Locking and persistence live in [`crate::MemoryBackend`].

use std::collections::BTreeMap;

use mysqlmock_core::{QueryError, QueryErrorKind, ResultSet, Value};
use serde::{Deserialize, Serialize};

/// Default length for a bare `VARCHAR`.
const DEFAULT_VARCHAR_LEN: u32 = 255;

/// Column types accepted by `CREATE TABLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Int,
    BigInt,
    Float,
    Double,
    VarChar(u32),
    Text,
    Date,
    DateTime,
    Boolean,
}

impl ColumnType {
    /// Parse a type name such as `INT`, `int(11)` or `VARCHAR(64)`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (name, len) = match text.split_once('(') {
            Some((name, rest)) => {
                let len = rest.trim_end().strip_suffix(')')?.trim().parse::<u32>().ok()?;
                (name.trim(), Some(len))
            }
            None => (text, None),
        };
        let ty = match name.to_ascii_uppercase().as_str() {
            "INT" | "INTEGER" | "TINYINT" | "SMALLINT" | "MEDIUMINT" => ColumnType::Int,
            "BIGINT" => ColumnType::BigInt,
            "FLOAT" | "REAL" => ColumnType::Float,
            "DOUBLE" | "DECIMAL" | "NUMERIC" => ColumnType::Double,
            "VARCHAR" | "CHAR" => ColumnType::VarChar(len.unwrap_or(DEFAULT_VARCHAR_LEN)),
            "TEXT" | "LONGTEXT" | "MEDIUMTEXT" => ColumnType::Text,
            "DATE" => ColumnType::Date,
            "DATETIME" | "TIMESTAMP" => ColumnType::DateTime,
            "BOOLEAN" | "BOOL" => ColumnType::Boolean,
            _ => return None,
        };
        Some(ty)
    }

    /// SQL spelling of the type.
    pub fn sql_name(&self) -> String {
        match self {
            ColumnType::Int => "INT".to_string(),
            ColumnType::BigInt => "BIGINT".to_string(),
            ColumnType::Float => "FLOAT".to_string(),
            ColumnType::Double => "DOUBLE".to_string(),
            ColumnType::VarChar(len) => format!("VARCHAR({})", len),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::DateTime => "DATETIME".to_string(),
            ColumnType::Boolean => "BOOLEAN".to_string(),
        }
    }

    /// Convert a literal to the value stored in a column of this type.
    #[allow(clippy::cast_possible_truncation)]
    pub fn coerce(&self, value: Value, column: &str) -> Result<Value, QueryError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let incorrect = |value: &Value| {
            QueryError::new(
                QueryErrorKind::Database,
                format!(
                    "Incorrect {} value: '{}' for column '{}'",
                    self.sql_name(),
                    value,
                    column
                ),
            )
        };
        match self {
            ColumnType::Int | ColumnType::BigInt => match &value {
                Value::BigInt(_) | Value::Bool(_) => Ok(Value::BigInt(value.as_i64().unwrap_or(0))),
                Value::Double(v) => Ok(Value::BigInt(v.round() as i64)),
                Value::Text(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::BigInt)
                    .map_err(|_| incorrect(&value)),
                Value::Null => Ok(Value::Null),
            },
            ColumnType::Float | ColumnType::Double => value
                .as_f64()
                .or_else(|| value.as_i64().map(|v| v as f64))
                .map(Value::Double)
                .ok_or_else(|| incorrect(&value)),
            ColumnType::Boolean => match &value {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::BigInt(v) => Ok(Value::Bool(*v != 0)),
                Value::Text(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
                Value::Text(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
                _ => Err(incorrect(&value)),
            },
            ColumnType::VarChar(len) => {
                let text = value.to_text().unwrap_or_default();
                if text.chars().count() > *len as usize {
                    return Err(QueryError::new(
                        QueryErrorKind::Database,
                        format!("Data too long for column '{}'", column),
                    ));
                }
                Ok(Value::Text(text))
            }
            ColumnType::Text | ColumnType::Date | ColumnType::DateTime => {
                Ok(Value::Text(value.to_text().unwrap_or_default()))
            }
        }
    }
}

/// A column declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// `column = literal`, as used by WHERE.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub value: Value,
}

/// One item of a select list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectItem {
    pub column: String,
    pub alias: Option<String>,
}

/// The select list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// `SELECT *`
    All,
    Columns(Vec<SelectItem>),
}

static NULL: Value = Value::Null;

/// The value at `idx`. Rows loaded from a snapshot may be shorter than the
/// schema; missing cells read as NULL.
fn cell(row: &[Value], idx: usize) -> &Value {
    row.get(idx).unwrap_or(&NULL)
}

/// A table: its schema and rows in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<ColumnDef>,
    /// Primary key column names, in key order
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table, checking the key refers to real columns.
    pub fn new(columns: Vec<ColumnDef>, primary_key: Vec<String>) -> Result<Self, QueryError> {
        if columns.is_empty() {
            return Err(QueryError::new(
                QueryErrorKind::Syntax,
                "A table must have at least 1 column",
            ));
        }
        for (i, column) in columns.iter().enumerate() {
            if columns[..i]
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&column.name))
            {
                return Err(QueryError::new(
                    QueryErrorKind::Database,
                    format!("Duplicate column name '{}'", column.name),
                ));
            }
        }
        let table = Self {
            columns,
            primary_key: Vec::new(),
            rows: Vec::new(),
        };
        let mut key = Vec::with_capacity(primary_key.len());
        for name in primary_key {
            let idx = table.column_index(&name).ok_or_else(|| {
                QueryError::new(
                    QueryErrorKind::NotFound,
                    format!("Key column '{}' doesn't exist in table", name),
                )
            })?;
            let canonical = table.columns[idx].name.clone();
            if !key.contains(&canonical) {
                key.push(canonical);
            }
        }
        Ok(Self {
            primary_key: key,
            ..table
        })
    }

    /// Position of a column, matched case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn require_column(&self, name: &str, clause: &str) -> Result<usize, QueryError> {
        self.column_index(name).ok_or_else(|| {
            QueryError::new(
                QueryErrorKind::NotFound,
                format!("Unknown column '{}' in '{}'", name, clause),
            )
        })
    }

    fn key_indices(&self) -> Vec<usize> {
        self.primary_key
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect()
    }

    /// Resolve WHERE conditions to (index, coerced value) pairs.
    fn resolve_filter(&self, filter: &[Condition]) -> Result<Vec<(usize, Value)>, QueryError> {
        filter
            .iter()
            .map(|cond| {
                let idx = self.require_column(&cond.column, "where clause")?;
                let column = &self.columns[idx];
                // A literal the column type rejects still compares, it just
                // never matches a stored value of that type.
                let value = column
                    .column_type
                    .coerce(cond.value.clone(), &column.name)
                    .unwrap_or_else(|_| cond.value.clone());
                Ok((idx, value))
            })
            .collect()
    }

    fn matches(row: &[Value], filter: &[(usize, Value)]) -> bool {
        filter.iter().all(|(idx, value)| cell(row, *idx).sql_eq(value))
    }

    /// Reject NULL keys and duplicate keys across `rows`.
    fn check_keys(&self, rows: &[Vec<Value>]) -> Result<(), QueryError> {
        let key = self.key_indices();
        if key.is_empty() {
            return Ok(());
        }
        for (i, row) in rows.iter().enumerate() {
            if let Some(&idx) = key.iter().find(|&&idx| cell(row, idx).is_null()) {
                return Err(QueryError::new(
                    QueryErrorKind::Constraint,
                    format!("Column '{}' cannot be null", self.columns[idx].name),
                ));
            }
            let duplicate = rows[..i]
                .iter()
                .any(|other| key.iter().all(|&idx| cell(other, idx).sql_eq(cell(row, idx))));
            if duplicate {
                let entry: Vec<String> = key.iter().map(|&idx| cell(row, idx).to_string()).collect();
                return Err(QueryError::new(
                    QueryErrorKind::Constraint,
                    format!("Duplicate entry '{}' for key 'PRIMARY'", entry.join("-")),
                ));
            }
        }
        Ok(())
    }

    /// Insert rows, all or nothing. Returns the number inserted.
    pub fn insert(
        &mut self,
        columns: Option<&[String]>,
        rows: Vec<Vec<Value>>,
    ) -> Result<u64, QueryError> {
        let targets: Vec<usize> = match columns {
            Some(names) => names
                .iter()
                .map(|name| self.require_column(name, "field list"))
                .collect::<Result<_, _>>()?,
            None => (0..self.columns.len()).collect(),
        };

        let mut staged = self.rows.clone();
        let inserted = rows.len() as u64;
        for (n, values) in rows.into_iter().enumerate() {
            if values.len() != targets.len() {
                return Err(QueryError::new(
                    QueryErrorKind::Database,
                    format!("Column count doesn't match value count at row {}", n + 1),
                ));
            }
            let mut row = vec![Value::Null; self.columns.len()];
            for (&idx, value) in targets.iter().zip(values) {
                let column = &self.columns[idx];
                row[idx] = column.column_type.coerce(value, &column.name)?;
            }
            staged.push(row);
        }
        self.check_keys(&staged)?;
        self.rows = staged;
        Ok(inserted)
    }

    /// Run a SELECT against this table.
    pub fn select(
        &self,
        projection: &Projection,
        filter: &[Condition],
        limit: Option<usize>,
    ) -> Result<ResultSet, QueryError> {
        let (names, indices): (Vec<String>, Vec<usize>) = match projection {
            Projection::All => self
                .columns
                .iter()
                .enumerate()
                .map(|(i, c)| (c.name.clone(), i))
                .unzip(),
            Projection::Columns(items) => {
                let mut names = Vec::with_capacity(items.len());
                let mut indices = Vec::with_capacity(items.len());
                for item in items {
                    let idx = self.require_column(&item.column, "field list")?;
                    names.push(
                        item.alias
                            .clone()
                            .unwrap_or_else(|| self.columns[idx].name.clone()),
                    );
                    indices.push(idx);
                }
                (names, indices)
            }
        };

        let filter = self.resolve_filter(filter)?;
        let mut result = ResultSet::new(names);
        for row in self
            .rows
            .iter()
            .filter(|row| Self::matches(row, &filter))
            .take(limit.unwrap_or(usize::MAX))
        {
            result.push_row(indices.iter().map(|&idx| cell(row, idx).to_text()));
        }
        Ok(result)
    }

    /// Apply assignments to matching rows. Returns the number of rows changed.
    pub fn update(
        &mut self,
        assignments: &[(String, Value)],
        filter: &[Condition],
    ) -> Result<u64, QueryError> {
        let mut resolved = Vec::with_capacity(assignments.len());
        for (name, value) in assignments {
            let idx = self.require_column(name, "field list")?;
            let column = &self.columns[idx];
            resolved.push((idx, column.column_type.coerce(value.clone(), &column.name)?));
        }
        let filter = self.resolve_filter(filter)?;

        let width = self.columns.len();
        let mut staged = self.rows.clone();
        let mut changed = 0;
        for row in staged.iter_mut().filter(|row| Self::matches(row, &filter)) {
            let before = row.clone();
            if row.len() < width {
                row.resize(width, Value::Null);
            }
            for (idx, value) in &resolved {
                row[*idx] = value.clone();
            }
            if *row != before {
                changed += 1;
            }
        }
        self.check_keys(&staged)?;
        self.rows = staged;
        Ok(changed)
    }

    /// Remove matching rows. Returns the number removed.
    pub fn delete(&mut self, filter: &[Condition]) -> Result<u64, QueryError> {
        let filter = self.resolve_filter(filter)?;
        let before = self.rows.len();
        self.rows.retain(|row| !Self::matches(row, &filter));
        Ok((before - self.rows.len()) as u64)
    }
}

/// A database: named tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    pub tables: BTreeMap<String, Table>,
}

/// Every database the backend holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub databases: BTreeMap<String, Database>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Database names in sorted order.
    pub fn database_names(&self) -> Vec<String> {
        self.databases.keys().cloned().collect()
    }

    pub fn has_database(&self, name: &str) -> bool {
        self.databases.contains_key(name)
    }

    /// Returns 1 if the database was created, 0 if it already existed.
    pub fn create_database(&mut self, name: &str, if_not_exists: bool) -> Result<u64, QueryError> {
        if self.databases.contains_key(name) {
            if if_not_exists {
                return Ok(0);
            }
            return Err(QueryError::new(
                QueryErrorKind::Database,
                format!("Can't create database '{}'; database exists", name),
            ));
        }
        self.databases.insert(name.to_string(), Database::default());
        Ok(1)
    }

    /// Returns the number of tables dropped with the database.
    pub fn drop_database(&mut self, name: &str, if_exists: bool) -> Result<u64, QueryError> {
        match self.databases.remove(name) {
            Some(db) => Ok(db.tables.len() as u64),
            None if if_exists => Ok(0),
            None => Err(QueryError::new(
                QueryErrorKind::Database,
                format!("Can't drop database '{}'; database doesn't exist", name),
            )),
        }
    }

    pub fn database(&self, name: &str) -> Result<&Database, QueryError> {
        self.databases.get(name).ok_or_else(|| unknown_database(name))
    }

    pub fn database_mut(&mut self, name: &str) -> Result<&mut Database, QueryError> {
        self.databases
            .get_mut(name)
            .ok_or_else(|| unknown_database(name))
    }

    pub fn table(&self, database: &str, name: &str) -> Result<&Table, QueryError> {
        self.database(database)?
            .tables
            .get(name)
            .ok_or_else(|| unknown_table(database, name))
    }

    pub fn table_mut(&mut self, database: &str, name: &str) -> Result<&mut Table, QueryError> {
        self.database_mut(database)?
            .tables
            .get_mut(name)
            .ok_or_else(|| unknown_table(database, name))
    }

    /// Returns 0 either way; DDL reports no affected rows.
    pub fn create_table(
        &mut self,
        database: &str,
        name: &str,
        table: Table,
        if_not_exists: bool,
    ) -> Result<u64, QueryError> {
        let db = self.database_mut(database)?;
        if db.tables.contains_key(name) {
            if if_not_exists {
                return Ok(0);
            }
            return Err(QueryError::new(
                QueryErrorKind::Database,
                format!("Table '{}' already exists", name),
            ));
        }
        db.tables.insert(name.to_string(), table);
        Ok(0)
    }

    pub fn drop_table(
        &mut self,
        database: &str,
        name: &str,
        if_exists: bool,
    ) -> Result<u64, QueryError> {
        let db = self.database_mut(database)?;
        if db.tables.remove(name).is_none() && !if_exists {
            return Err(unknown_table(database, name));
        }
        Ok(0)
    }
}

fn unknown_database(name: &str) -> QueryError {
    QueryError::new(
        QueryErrorKind::NotFound,
        format!("Unknown database '{}'", name),
    )
}

fn unknown_table(database: &str, name: &str) -> QueryError {
    QueryError::new(
        QueryErrorKind::NotFound,
        format!("Table '{}.{}' doesn't exist", database, name),
    )
}
