//! Statements the server answers without the SQL backend.
//!
//! Connectors and GUI clients fire a burst of introspection queries right after
//! login (`SELECT @@version_comment`, `SHOW VARIABLES LIKE ...`, `SET NAMES
//! ...`). They are recognised here, case-insensitively, on SQL that has
//! already gone through [`clean_sql`].

use std::sync::OnceLock;

use mysqlmock_core::{Backend, ResultSet};
use regex::Regex;
use tracing::warn;

/// Schemas every MySQL server reports, listed before the backend's own.
pub const SYSTEM_SCHEMAS: [&str; 4] = ["information_schema", "mysql", "performance_schema", "sys"];

/// Value reported for a system variable that is not in [`SYSTEM_VARIABLES`].
pub const UNKNOWN_VARIABLE_VALUE: &str = "mock_value";

/// Session variables reported by `SHOW VARIABLES` and `SELECT @@...`.
pub const SYSTEM_VARIABLES: [(&str, &str); 30] = [
    ("autocommit", "ON"),
    ("auto_increment_increment", "1"),
    ("character_set_client", "utf8mb4"),
    ("character_set_connection", "utf8mb4"),
    ("character_set_database", "utf8mb4"),
    ("character_set_results", "utf8mb4"),
    ("character_set_server", "utf8mb4"),
    ("collation_connection", "utf8mb4_general_ci"),
    ("collation_database", "utf8mb4_general_ci"),
    ("collation_server", "utf8mb4_general_ci"),
    ("init_connect", ""),
    ("interactive_timeout", "28800"),
    ("license", "GPL"),
    ("lower_case_table_names", "0"),
    ("max_allowed_packet", "67108864"),
    ("max_connections", "151"),
    ("net_write_timeout", "60"),
    ("performance_schema", "ON"),
    ("port", "2883"),
    ("protocol_version", "10"),
    ("query_cache_size", "0"),
    ("query_cache_type", "OFF"),
    ("server_id", "1"),
    ("sql_mode", "STRICT_TRANS_TABLES,NO_ENGINE_SUBSTITUTION"),
    ("system_time_zone", "UTC"),
    ("time_zone", "SYSTEM"),
    ("transaction_isolation", "REPEATABLE-READ"),
    ("version", "5.7+"),
    ("version_comment", "MySQL Mock Server"),
    ("wait_timeout", "28800"),
];

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn block_comment() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r"(?s)/\*.*?\*/")
}

fn line_comment() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r"(?:--|#)[^\n]*")
}

fn whitespace() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r"\s+")
}

fn like_clause() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r#"(?i)\bLIKE\s+['"]([^'"]*)['"]"#)
}

fn alias_clause() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r"(?i)^(.*?)\s+AS\s+(.+)$")
}

fn select_list_end() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r"(?i)\s+(?:FROM|LIMIT|WHERE)\s")
}

/// Strip comments and collapse whitespace.
///
/// Removes `/* ... */` blocks, `--` and `#` line comments, squeezes every
/// whitespace run to one space, trims, and drops trailing semicolons.
/// Comment markers inside string literals are not special-cased.
pub fn clean_sql(sql: &str) -> String {
    let mut text = sql.to_string();
    if let Some(re) = block_comment() {
        text = re.replace_all(&text, " ").into_owned();
    }
    if let Some(re) = line_comment() {
        text = re.replace_all(&text, " ").into_owned();
    }
    if let Some(re) = whitespace() {
        text = re.replace_all(&text, " ").into_owned();
    }
    text.trim().trim_end_matches(';').trim_end().to_string()
}

/// Session facts an introspection answer may depend on.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionView<'a> {
    pub database: Option<&'a str>,
}

/// Answer `sql` locally if it is one of the built-in statements.
///
/// Returns `None` when the statement must go to the backend. `SET` yields a
/// command result (rendered as a plain OK).
pub fn answer(sql: &str, session: SessionView<'_>, backend: &dyn Backend) -> Option<ResultSet> {
    let upper = sql.to_ascii_uppercase();

    if upper == "SELECT 1" {
        return Some(ResultSet::new(vec!["1".to_string()]).with_row(vec![Some("1".to_string())]));
    }
    if upper == "SHOW DATABASES" || upper == "SHOW SCHEMAS" {
        return Some(show_databases(backend));
    }
    if upper.starts_with("SELECT @@") || upper.starts_with("SELECT DATABASE()") {
        return Some(select_variables(sql, session));
    }
    if upper.starts_with("SHOW ENGINES") {
        return Some(empty(&["Engine", "Support", "Comment"]));
    }
    if upper.starts_with("SHOW CHARSET") || upper.starts_with("SHOW CHARACTER SET") {
        return Some(empty(&["Charset", "Description"]));
    }
    if upper.starts_with("SHOW COLLATION") {
        return Some(empty(&["Collation", "Charset"]));
    }
    if upper.starts_with("SHOW PLUGINS") {
        return Some(empty(&["Name", "Status"]));
    }
    if upper.starts_with("SHOW VARIABLES")
        || upper.starts_with("SHOW SESSION VARIABLES")
        || upper.starts_with("SHOW GLOBAL VARIABLES")
    {
        return Some(show_variables(sql));
    }
    if upper == "SET" || upper.starts_with("SET ") {
        return Some(ResultSet::affected(0));
    }
    None
}

fn empty(columns: &[&str]) -> ResultSet {
    ResultSet::new(columns.iter().copied())
}

fn show_databases(backend: &dyn Backend) -> ResultSet {
    let mut result = ResultSet::new(vec!["Database".to_string()]);
    for schema in SYSTEM_SCHEMAS {
        result.push_row(vec![Some(schema.to_string())]);
    }
    for name in backend.databases() {
        if SYSTEM_SCHEMAS.iter().any(|s| s.eq_ignore_ascii_case(&name)) {
            continue;
        }
        result.push_row(vec![Some(name)]);
    }
    result
}

/// Value of a system variable by bare name.
pub fn variable_value(name: &str) -> Option<&'static str> {
    SYSTEM_VARIABLES
        .iter()
        .find(|(var, _)| var.eq_ignore_ascii_case(name))
        .map(|(_, value)| *value)
}

/// `@@session.x`, `@@global.x` and `@@x` all name `x`.
fn bare_variable_name(expr: &str) -> &str {
    let name = expr.trim().trim_start_matches("@@");
    for scope in ["session.", "global.", "local."] {
        if name.len() >= scope.len() && name[..scope.len()].eq_ignore_ascii_case(scope) {
            return &name[scope.len()..];
        }
    }
    name
}

/// `SELECT @@a, @@session.b AS b, DATABASE() [LIMIT 1]`: one row, one
/// column per select item.
fn select_variables(sql: &str, session: SessionView<'_>) -> ResultSet {
    // "SELECT " is ASCII, so byte offset 7 is a char boundary.
    let list = &sql[7..];
    let list = match select_list_end().and_then(|re| re.find(list)) {
        Some(m) => &list[..m.start()],
        None => list,
    };

    let mut columns = Vec::new();
    let mut row = Vec::new();
    for item in list.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let (expr, alias) = match alias_clause().and_then(|re| re.captures(item)) {
            Some(caps) => (
                caps.get(1).map_or(item, |m| m.as_str().trim()),
                caps.get(2).map(|m| m.as_str().trim().trim_matches('`').to_string()),
            ),
            None => (item, None),
        };

        if expr.eq_ignore_ascii_case("DATABASE()") {
            columns.push(alias.unwrap_or_else(|| "DATABASE()".to_string()));
            row.push(session.database.map(str::to_string));
            continue;
        }

        let name = bare_variable_name(expr);
        columns.push(alias.unwrap_or_else(|| name.to_string()));
        row.push(Some(
            variable_value(name)
                .unwrap_or(UNKNOWN_VARIABLE_VALUE)
                .to_string(),
        ));
    }

    ResultSet::new(columns).with_row(row)
}

/// Translate a SQL `LIKE` pattern into an anchored, case-insensitive regex.
pub fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("(?i)^");
    for ch in pattern.chars() {
        match ch {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    out.push('$');
    out
}

fn show_variables(sql: &str) -> ResultSet {
    let mut result = ResultSet::new(vec!["Variable_name".to_string(), "Value".to_string()]);

    let filter = like_clause()
        .and_then(|re| re.captures(sql))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    let matcher = match filter {
        Some(pattern) => match Regex::new(&like_to_regex(&pattern)) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "unusable LIKE pattern, matching nothing");
                return result;
            }
        },
        None => None,
    };

    for (name, value) in SYSTEM_VARIABLES {
        if matcher.as_ref().is_none_or(|re| re.is_match(name)) {
            result.push_row(vec![Some(name.to_string()), Some(value.to_string())]);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use mysqlmock_core::{NotFoundError, QueryError};

    struct Catalog(Vec<&'static str>);

    impl Backend for Catalog {
        fn execute(&self, _: &str, _: u32, _: Option<&str>) -> Result<ResultSet, QueryError> {
            Ok(ResultSet::default())
        }

        fn select_database(&self, name: &str) -> Result<(), NotFoundError> {
            Err(NotFoundError {
                name: name.to_string(),
            })
        }

        fn databases(&self) -> Vec<String> {
            self.0.iter().map(|s| (*s).to_string()).collect()
        }
    }

    fn ask(sql: &str) -> Option<ResultSet> {
        answer(&clean_sql(sql), SessionView::default(), &Catalog(vec![]))
    }

    fn cell(result: &ResultSet, row: usize, col: usize) -> Option<&str> {
        result.rows()[row][col].as_deref()
    }

    #[test]
    fn test_clean_sql_strips_comments() {
        assert_eq!(clean_sql("SELECT 1 /* c */ -- trailing\n"), "SELECT 1");
        assert_eq!(clean_sql("  SELECT\n\t*  FROM t # note\n;"), "SELECT * FROM t");
        assert_eq!(clean_sql("/* multi\nline */SHOW DATABASES"), "SHOW DATABASES");
        assert_eq!(clean_sql("   "), "");
    }

    #[test]
    fn test_select_one() {
        let result = ask("select 1").unwrap();
        assert_eq!(result.columns(), ["1"]);
        assert_eq!(cell(&result, 0, 0), Some("1"));
        assert!(ask("SELECT 10").is_none());
    }

    #[test]
    fn test_show_databases_lists_system_then_backend() {
        let backend = Catalog(vec!["mysql", "shop", "zoo"]);
        let result = answer("show schemas", SessionView::default(), &backend).unwrap();
        let names: Vec<_> = result.rows().iter().map(|r| r[0].clone().unwrap()).collect();
        assert_eq!(
            names,
            ["information_schema", "mysql", "performance_schema", "sys", "shop", "zoo"]
        );
        assert_eq!(result.columns(), ["Database"]);
    }

    #[test]
    fn test_select_database() {
        let result = ask("SELECT DATABASE()").unwrap();
        assert_eq!(result.columns(), ["DATABASE()"]);
        assert_eq!(cell(&result, 0, 0), None);

        let session = SessionView {
            database: Some("shop"),
        };
        let result = answer("SELECT DATABASE()", session, &Catalog(vec![])).unwrap();
        assert_eq!(cell(&result, 0, 0), Some("shop"));
    }

    #[test]
    fn test_select_version_comment() {
        let result = ask("select @@version_comment limit 1").unwrap();
        assert_eq!(result.columns(), ["version_comment"]);
        assert_eq!(cell(&result, 0, 0), Some("MySQL Mock Server"));
    }

    #[test]
    fn test_select_many_variables_with_aliases() {
        let result = ask(
            "SELECT @@session.auto_increment_increment AS auto_increment_increment, \
             @@character_set_client, @@global.max_allowed_packet AS `map`, @@no_such_thing",
        )
        .unwrap();
        assert_eq!(
            result.columns(),
            ["auto_increment_increment", "character_set_client", "map", "no_such_thing"]
        );
        assert_eq!(result.len(), 1);
        assert_eq!(cell(&result, 0, 0), Some("1"));
        assert_eq!(cell(&result, 0, 1), Some("utf8mb4"));
        assert_eq!(cell(&result, 0, 2), Some("67108864"));
        assert_eq!(cell(&result, 0, 3), Some("mock_value"));
    }

    #[test]
    fn test_empty_show_statements() {
        let engines = ask("SHOW ENGINES").unwrap();
        assert_eq!(engines.columns(), ["Engine", "Support", "Comment"]);
        assert!(engines.is_empty());

        assert_eq!(ask("show charset").unwrap().columns(), ["Charset", "Description"]);
        assert_eq!(ask("SHOW COLLATION").unwrap().columns(), ["Collation", "Charset"]);
        assert_eq!(ask("SHOW PLUGINS").unwrap().columns(), ["Name", "Status"]);
    }

    #[test]
    fn test_show_variables_full_table() {
        let result = ask("SHOW VARIABLES").unwrap();
        assert_eq!(result.columns(), ["Variable_name", "Value"]);
        assert_eq!(result.len(), 30);
    }

    #[test]
    fn test_show_variables_like() {
        let result = ask("SHOW VARIABLES LIKE 'char%'").unwrap();
        assert_eq!(result.len(), 5);
        assert!(
            result
                .rows()
                .iter()
                .all(|row| row[0].as_deref().unwrap().starts_with("char"))
        );

        let result = ask("show session variables like 'PORT'").unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(cell(&result, 0, 1), Some("2883"));

        let result = ask("SHOW VARIABLES LIKE 'wait_timeou_'").unwrap();
        assert_eq!(result.len(), 1);

        assert!(ask("SHOW VARIABLES LIKE 'nothing%'").unwrap().is_empty());
    }

    #[test]
    fn test_like_to_regex_escapes_metacharacters() {
        assert_eq!(like_to_regex("a%b_c"), "(?i)^a.*b.c$");
        let re = Regex::new(&like_to_regex("a.b")).unwrap();
        assert!(re.is_match("a.b"));
        assert!(!re.is_match("axb"));
    }

    #[test]
    fn test_set_is_ok() {
        let result = ask("SET NAMES utf8mb4").unwrap();
        assert!(result.is_command_result());
        assert_eq!(result.affected_rows(), 0);
        assert!(ask("SETTINGS").is_none());
    }

    #[test]
    fn test_other_statements_fall_through() {
        assert!(ask("SELECT * FROM users").is_none());
        assert!(ask("INSERT INTO t VALUES (1)").is_none());
    }
}
