//! The SQL execution collaborator.
//!
//! The protocol engine never interprets user SQL itself beyond a handful of
//! introspection statements. Everything else is handed to a [`Backend`],
//! which returns either a [`ResultSet`] or a structured [`QueryError`].

use std::sync::Arc;

use crate::error::{NotFoundError, QueryError};
use crate::result_set::ResultSet;

/// A SQL execution and storage layer the server delegates to.
///
/// One backend instance is shared by every connection, so implementations
/// must be `Send + Sync` and do their own interior locking. Calls are
/// synchronous; the connection worker blocks on them.
pub trait Backend: Send + Sync {
    /// Execute a cleaned SQL statement.
    ///
    /// `capabilities` is the session's negotiated capability set and
    /// `database` the session's current schema, if any.
    fn execute(
        &self,
        sql: &str,
        capabilities: u32,
        database: Option<&str>,
    ) -> Result<ResultSet, QueryError>;

    /// Check that `name` exists so a session can switch to it.
    fn select_database(&self, name: &str) -> Result<(), NotFoundError>;

    /// User databases to list after the system schemas in `SHOW DATABASES`.
    fn databases(&self) -> Vec<String> {
        Vec::new()
    }
}

impl<T: Backend + ?Sized> Backend for Arc<T> {
    fn execute(
        &self,
        sql: &str,
        capabilities: u32,
        database: Option<&str>,
    ) -> Result<ResultSet, QueryError> {
        (**self).execute(sql, capabilities, database)
    }

    fn select_database(&self, name: &str) -> Result<(), NotFoundError> {
        (**self).select_database(name)
    }

    fn databases(&self) -> Vec<String> {
        (**self).databases()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryErrorKind;

    struct Fixed;

    impl Backend for Fixed {
        fn execute(
            &self,
            sql: &str,
            _capabilities: u32,
            _database: Option<&str>,
        ) -> Result<ResultSet, QueryError> {
            if sql == "fail" {
                return Err(QueryError::new(QueryErrorKind::Syntax, "bad"));
            }
            Ok(ResultSet::new(["x"]).with_row([Some("1")]))
        }

        fn select_database(&self, name: &str) -> Result<(), NotFoundError> {
            Err(NotFoundError {
                name: name.to_string(),
            })
        }
    }

    #[test]
    fn test_arc_delegation() {
        let backend: Arc<dyn Backend> = Arc::new(Fixed);
        let rs = backend.execute("SELECT x", 0, None).unwrap();
        assert_eq!(rs.columns(), &["x".to_string()]);
        assert!(backend.execute("fail", 0, None).is_err());
        assert!(backend.select_database("db").is_err());
        assert!(backend.databases().is_empty());
    }
}
