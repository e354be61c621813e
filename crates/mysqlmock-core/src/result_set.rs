//! Result sets handed from the SQL backend to the wire encoder.

use crate::value::Value;

/// A tabular query result, already rendered to text cells.
///
/// Every cell travels as text regardless of its logical type; `None` is
/// SQL NULL and is distinct from the empty string. A result with no
/// columns describes a statement that produced no rows (DDL/DML) and is
/// answered with an OK packet carrying `affected_rows` instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    /// Column names in order
    columns: Vec<String>,
    /// Row cells, one `Vec` per row, in column order
    rows: Vec<Vec<Option<String>>>,
    /// Rows touched by a statement without a result set
    affected_rows: u64,
}

impl ResultSet {
    /// Create an empty result set with the given column names.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            affected_rows: 0,
        }
    }

    /// Create a row-less result for a statement that touched `count` rows.
    pub fn affected(count: u64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows: count,
        }
    }

    /// Append a row of text cells.
    ///
    /// Short rows are padded with NULL and long rows truncated so the row
    /// always has exactly one cell per column.
    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        let mut row: Vec<Option<String>> = cells
            .into_iter()
            .map(|cell| cell.map(Into::into))
            .collect();
        row.resize(self.columns.len(), None);
        self.rows.push(row);
    }

    /// Append a row of typed values, rendering each through [`Value::to_text`].
    pub fn push_values(&mut self, values: &[Value]) {
        self.push_row(values.iter().map(Value::to_text));
    }

    /// Builder form of [`ResultSet::push_row`].
    pub fn with_row<I, S>(mut self, cells: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        self.push_row(cells);
        self
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in order.
    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows touched by a row-less statement.
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    /// True when the result carries no column metadata at all.
    pub fn is_command_result(&self) -> bool {
        self.columns.is_empty()
    }
}
