//! The SQL subset the memory backend understands.
//!
//! Statements are recognised with anchored, case-insensitive regexes; the
//! lists inside them (columns, values, conditions) are split by hand so that
//! separators inside quoted strings are left alone.

use std::sync::OnceLock;

use mysqlmock_core::{QueryError, QueryErrorKind, Value};
use regex::Regex;

use crate::catalog::{ColumnDef, ColumnType, Condition, Projection, SelectItem};

/// A possibly schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub database: Option<String>,
    pub name: String,
}

/// A parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateDatabase {
        name: String,
        if_not_exists: bool,
    },
    DropDatabase {
        name: String,
        if_exists: bool,
    },
    Use {
        name: String,
    },
    CreateTable {
        table: TableRef,
        if_not_exists: bool,
        columns: Vec<ColumnDef>,
        primary_key: Vec<String>,
    },
    DropTable {
        table: TableRef,
        if_exists: bool,
    },
    ShowTables,
    Insert {
        table: TableRef,
        columns: Option<Vec<String>>,
        rows: Vec<Vec<Value>>,
    },
    Select {
        table: TableRef,
        projection: Projection,
        filter: Vec<Condition>,
        limit: Option<usize>,
    },
    Update {
        table: TableRef,
        assignments: Vec<(String, Value)>,
        filter: Vec<Condition>,
    },
    Delete {
        table: TableRef,
        filter: Vec<Condition>,
    },
}

impl Statement {
    /// Does executing this statement change the catalog?
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Statement::Use { .. } | Statement::ShowTables | Statement::Select { .. }
        )
    }
}

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

macro_rules! statement_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> Option<&'static Regex> {
            static RE: OnceLock<Option<Regex>> = OnceLock::new();
            cached(&RE, $pattern)
        }
    };
}

statement_regex!(create_database_re, r"(?is)^CREATE\s+(?:DATABASE|SCHEMA)\s+(IF\s+NOT\s+EXISTS\s+)?(\S+)$");
statement_regex!(drop_database_re, r"(?is)^DROP\s+(?:DATABASE|SCHEMA)\s+(IF\s+EXISTS\s+)?(\S+)$");
statement_regex!(use_re, r"(?is)^USE\s+(\S+)$");
statement_regex!(create_table_re, r"(?is)^CREATE\s+TABLE\s+(IF\s+NOT\s+EXISTS\s+)?([^\s(]+)\s*\((.*)\)[^)]*$");
statement_regex!(drop_table_re, r"(?is)^DROP\s+TABLE\s+(IF\s+EXISTS\s+)?(\S+)$");
statement_regex!(show_tables_re, r"(?is)^SHOW\s+TABLES$");
statement_regex!(insert_re, r"(?is)^INSERT\s+INTO\s+([^\s(]+)\s*(?:\(([^)]*)\)\s*)?VALUES\s*(.+)$");
statement_regex!(select_re, r"(?is)^SELECT\s+(.+?)\s+FROM\s+(\S+)(?:\s+WHERE\s+(.+?))?(?:\s+LIMIT\s+(\d+))?$");
statement_regex!(update_re, r"(?is)^UPDATE\s+(\S+)\s+SET\s+(.+?)(?:\s+WHERE\s+(.+))?$");
statement_regex!(delete_re, r"(?is)^DELETE\s+FROM\s+(\S+)(?:\s+WHERE\s+(.+))?$");
statement_regex!(primary_key_re, r"(?is)^PRIMARY\s+KEY\s*\((.*)\)$");
statement_regex!(column_re, r"(?is)^(\S+)\s+([A-Za-z]+(?:\s*\(\s*[^)]*\))?)(.*)$");
statement_regex!(inline_key_re, r"(?i)\bPRIMARY\s+KEY\b");
statement_regex!(select_item_re, r"(?is)^(\S+?)(?:\s+AS\s+(\S+))?$");

fn syntax(message: impl Into<String>) -> QueryError {
    QueryError::new(QueryErrorKind::Syntax, message)
}

fn unsupported(sql: &str) -> QueryError {
    QueryError::new(
        QueryErrorKind::Unsupported,
        format!("Unsupported statement: {}", sql),
    )
}

/// Parse one statement.
pub fn parse(sql: &str) -> Result<Statement, QueryError> {
    let sql = sql.trim().trim_end_matches(';').trim_end();

    if let Some(caps) = create_database_re().and_then(|re| re.captures(sql)) {
        return Ok(Statement::CreateDatabase {
            name: ident(&caps[2]),
            if_not_exists: caps.get(1).is_some(),
        });
    }
    if let Some(caps) = drop_database_re().and_then(|re| re.captures(sql)) {
        return Ok(Statement::DropDatabase {
            name: ident(&caps[2]),
            if_exists: caps.get(1).is_some(),
        });
    }
    if let Some(caps) = use_re().and_then(|re| re.captures(sql)) {
        return Ok(Statement::Use {
            name: ident(&caps[1]),
        });
    }
    if let Some(caps) = create_table_re().and_then(|re| re.captures(sql)) {
        let (columns, primary_key) = table_elements(&caps[3])?;
        return Ok(Statement::CreateTable {
            table: table_ref(&caps[2]),
            if_not_exists: caps.get(1).is_some(),
            columns,
            primary_key,
        });
    }
    if let Some(caps) = drop_table_re().and_then(|re| re.captures(sql)) {
        return Ok(Statement::DropTable {
            table: table_ref(&caps[2]),
            if_exists: caps.get(1).is_some(),
        });
    }
    if show_tables_re().is_some_and(|re| re.is_match(sql)) {
        return Ok(Statement::ShowTables);
    }
    if let Some(caps) = insert_re().and_then(|re| re.captures(sql)) {
        let columns = caps.get(2).map(|m| {
            split_top_level(m.as_str(), comma)
                .into_iter()
                .map(ident)
                .collect()
        });
        return Ok(Statement::Insert {
            table: table_ref(&caps[1]),
            columns,
            rows: value_rows(&caps[3])?,
        });
    }
    if let Some(caps) = select_re().and_then(|re| re.captures(sql)) {
        let limit = match caps.get(4) {
            Some(m) => Some(
                m.as_str()
                    .parse::<usize>()
                    .map_err(|_| syntax(format!("Invalid LIMIT: {}", m.as_str())))?,
            ),
            None => None,
        };
        return Ok(Statement::Select {
            table: table_ref(&caps[2]),
            projection: projection(&caps[1])?,
            filter: conditions(caps.get(3).map(|m| m.as_str()))?,
            limit,
        });
    }
    if let Some(caps) = update_re().and_then(|re| re.captures(sql)) {
        let assignments = split_top_level(&caps[2], comma)
            .into_iter()
            .map(|item| {
                let (column, value) = equality(item)
                    .ok_or_else(|| syntax(format!("Expected column = value, got: {}", item.trim())))?;
                Ok((column, literal(value)?))
            })
            .collect::<Result<Vec<_>, QueryError>>()?;
        return Ok(Statement::Update {
            table: table_ref(&caps[1]),
            assignments,
            filter: conditions(caps.get(3).map(|m| m.as_str()))?,
        });
    }
    if let Some(caps) = delete_re().and_then(|re| re.captures(sql)) {
        return Ok(Statement::Delete {
            table: table_ref(&caps[1]),
            filter: conditions(caps.get(2).map(|m| m.as_str()))?,
        });
    }

    Err(unsupported(sql))
}

/// Strip surrounding whitespace and backticks.
fn ident(text: &str) -> String {
    text.trim().trim_matches('`').to_string()
}

/// `table`, `db.table` or `` `db`.`table` ``.
fn table_ref(text: &str) -> TableRef {
    match text.trim().split_once('.') {
        Some((db, name)) => TableRef {
            database: Some(ident(db)),
            name: ident(name),
        },
        None => TableRef {
            database: None,
            name: ident(text),
        },
    }
}

fn comma(rest: &str) -> Option<usize> {
    rest.starts_with(',').then_some(1)
}

/// ` AND ` between two conditions.
fn and_keyword(rest: &str) -> Option<usize> {
    let bytes = rest.as_bytes();
    let is_and = bytes.len() >= 5
        && bytes[0].is_ascii_whitespace()
        && bytes[1..4].eq_ignore_ascii_case(b"AND")
        && bytes[4].is_ascii_whitespace();
    is_and.then_some(5)
}

/// Split `text` wherever `separator` matches outside quotes and parentheses.
///
/// `separator` is tried at every candidate position and returns the byte
/// length of the separator found there.
fn split_top_level(text: &str, separator: impl Fn(&str) -> Option<usize>) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut start = 0;
    let mut skip_to = 0;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if i < skip_to {
            continue;
        }
        if let Some(q) = quote {
            // A doubled quote closes and immediately reopens, which is
            // exactly what the escape means.
            if escaped {
                escaped = false;
            } else if ch == '\\' && q != '`' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' | '`' => quote = Some(ch),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => {
                if let Some(len) = separator(&text[i..]) {
                    parts.push(&text[start..i]);
                    start = i + len;
                    skip_to = start;
                }
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Parse a literal: quoted string, integer, decimal, TRUE/FALSE or NULL.
pub fn literal(text: &str) -> Result<Value, QueryError> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("NULL") {
        return Ok(Value::Null);
    }
    if text.eq_ignore_ascii_case("TRUE") {
        return Ok(Value::Bool(true));
    }
    if text.eq_ignore_ascii_case("FALSE") {
        return Ok(Value::Bool(false));
    }
    for q in ['\'', '"'] {
        if text.len() >= 2 && text.starts_with(q) && text.ends_with(q) {
            return Ok(Value::Text(unescape(&text[1..text.len() - 1], q)));
        }
    }
    if let Ok(v) = text.parse::<i64>() {
        return Ok(Value::BigInt(v));
    }
    if let Ok(v) = text.parse::<f64>() {
        return Ok(Value::Double(v));
    }
    Err(syntax(format!("Unsupported value: {}", text)))
}

/// Undo `''` doubling and backslash escapes inside a string literal.
fn unescape(body: &str, quote: char) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('0') => out.push('\0'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            },
            c if c == quote && chars.peek() == Some(&quote) => {
                chars.next();
                out.push(quote);
            }
            c => out.push(c),
        }
    }
    out
}

/// `(1, 'a'), (2, 'b')`
fn value_rows(text: &str) -> Result<Vec<Vec<Value>>, QueryError> {
    split_top_level(text, comma)
        .into_iter()
        .map(|tuple| {
            let tuple = tuple.trim();
            let inner = tuple
                .strip_prefix('(')
                .and_then(|t| t.strip_suffix(')'))
                .ok_or_else(|| syntax(format!("Expected a parenthesised row, got: {}", tuple)))?;
            split_top_level(inner, comma)
                .into_iter()
                .map(literal)
                .collect::<Result<Vec<_>, _>>()
        })
        .collect()
}

fn projection(text: &str) -> Result<Projection, QueryError> {
    if text.trim() == "*" {
        return Ok(Projection::All);
    }
    split_top_level(text, comma)
        .into_iter()
        .map(|item| {
            let item = item.trim();
            let caps = select_item_re()
                .and_then(|re| re.captures(item))
                .ok_or_else(|| syntax(format!("Unsupported select item: {}", item)))?;
            Ok(SelectItem {
                column: ident(&caps[1]),
                alias: caps.get(2).map(|m| ident(m.as_str())),
            })
        })
        .collect::<Result<Vec<_>, QueryError>>()
        .map(Projection::Columns)
}

/// Split `column = value`. The left side must be a bare or backticked
/// identifier, which rules out `!=`, `<=` and `>=`.
fn equality(text: &str) -> Option<(String, &str)> {
    let (column, value) = text.split_once('=')?;
    let column = ident(column);
    let valid = !column.is_empty()
        && column
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    valid.then_some((column, value))
}

/// `a = 1 AND b = 'x'`; `None` means no WHERE clause.
fn conditions(text: Option<&str>) -> Result<Vec<Condition>, QueryError> {
    let Some(text) = text else {
        return Ok(Vec::new());
    };
    split_top_level(text, and_keyword)
        .into_iter()
        .map(|part| -> Result<Condition, QueryError> {
            let (column, value) = equality(part)
                .ok_or_else(|| syntax(format!("Unsupported condition: {}", part.trim())))?;
            Ok(Condition {
                column,
                value: literal(value)?,
            })
        })
        .collect()
}

/// Column definitions and key columns of a `CREATE TABLE` body.
fn table_elements(body: &str) -> Result<(Vec<ColumnDef>, Vec<String>), QueryError> {
    let mut columns = Vec::new();
    let mut primary_key = Vec::new();

    for element in split_top_level(body, comma) {
        let element = element.trim();
        if element.is_empty() {
            continue;
        }
        if let Some(caps) = primary_key_re().and_then(|re| re.captures(element)) {
            primary_key.extend(split_top_level(&caps[1], comma).into_iter().map(ident));
            continue;
        }
        let upper = element.to_ascii_uppercase();
        if ["KEY ", "INDEX ", "UNIQUE ", "CONSTRAINT "]
            .iter()
            .any(|prefix| upper.starts_with(prefix))
        {
            continue;
        }

        let caps = column_re()
            .and_then(|re| re.captures(element))
            .ok_or_else(|| syntax(format!("Invalid column definition: {}", element)))?;
        let name = ident(&caps[1]);
        let column_type = ColumnType::parse(&caps[2]).ok_or_else(|| {
            syntax(format!(
                "Unknown column type '{}' for column '{}'",
                caps[2].trim(),
                name
            ))
        })?;
        if inline_key_re().is_some_and(|re| re.is_match(&caps[3])) {
            primary_key.push(name.clone());
        }
        columns.push(ColumnDef::new(name, column_type));
    }

    Ok((columns, primary_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str) -> TableRef {
        TableRef {
            database: None,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_database_statements() {
        assert_eq!(
            parse("create database if not exists `shop`").unwrap(),
            Statement::CreateDatabase {
                name: "shop".to_string(),
                if_not_exists: true
            }
        );
        assert_eq!(
            parse("DROP SCHEMA shop;").unwrap(),
            Statement::DropDatabase {
                name: "shop".to_string(),
                if_exists: false
            }
        );
        assert_eq!(
            parse("use shop").unwrap(),
            Statement::Use {
                name: "shop".to_string()
            }
        );
        assert_eq!(parse("show tables").unwrap(), Statement::ShowTables);
    }

    #[test]
    fn test_create_table() {
        let stmt = parse(
            "CREATE TABLE shop.items (id INT NOT NULL, name VARCHAR(32), price DOUBLE, \
             PRIMARY KEY (`id`)) ENGINE=InnoDB",
        )
        .unwrap();
        let Statement::CreateTable {
            table,
            columns,
            primary_key,
            if_not_exists,
        } = stmt
        else {
            panic!("expected CREATE TABLE");
        };
        assert_eq!(table.database.as_deref(), Some("shop"));
        assert_eq!(table.name, "items");
        assert!(!if_not_exists);
        assert_eq!(
            columns,
            vec![
                ColumnDef::new("id", ColumnType::Int),
                ColumnDef::new("name", ColumnType::VarChar(32)),
                ColumnDef::new("price", ColumnType::Double),
            ]
        );
        assert_eq!(primary_key, vec!["id".to_string()]);
    }

    #[test]
    fn test_create_table_inline_key_and_bad_type() {
        let Statement::CreateTable { primary_key, .. } =
            parse("CREATE TABLE t (code varchar(8) primary key, n int)").unwrap()
        else {
            panic!("expected CREATE TABLE");
        };
        assert_eq!(primary_key, vec!["code".to_string()]);

        let err = parse("CREATE TABLE t (g GEOMETRY)").unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::Syntax);
        assert_eq!(err.message, "Unknown column type 'GEOMETRY' for column 'g'");
    }

    #[test]
    fn test_insert_with_quotes() {
        let stmt = parse("INSERT INTO t (id, note) VALUES (1, 'a, b'), (2, 'it''s'), (3, NULL)")
            .unwrap();
        assert_eq!(
            stmt,
            Statement::Insert {
                table: table("t"),
                columns: Some(vec!["id".to_string(), "note".to_string()]),
                rows: vec![
                    vec![Value::BigInt(1), Value::Text("a, b".to_string())],
                    vec![Value::BigInt(2), Value::Text("it's".to_string())],
                    vec![Value::BigInt(3), Value::Null],
                ],
            }
        );

        let Statement::Insert { rows, .. } = parse(r"INSERT INTO t VALUES ('a\', b', 2)").unwrap()
        else {
            panic!("expected insert");
        };
        assert_eq!(
            rows,
            vec![vec![Value::Text("a', b".to_string()), Value::BigInt(2)]]
        );
    }

    #[test]
    fn test_select() {
        let stmt = parse("SELECT id, name AS n FROM t WHERE id = 1 AND name = 'x AND y' LIMIT 10")
            .unwrap();
        assert_eq!(
            stmt,
            Statement::Select {
                table: table("t"),
                projection: Projection::Columns(vec![
                    SelectItem {
                        column: "id".to_string(),
                        alias: None
                    },
                    SelectItem {
                        column: "name".to_string(),
                        alias: Some("n".to_string())
                    },
                ]),
                filter: vec![
                    Condition {
                        column: "id".to_string(),
                        value: Value::BigInt(1)
                    },
                    Condition {
                        column: "name".to_string(),
                        value: Value::Text("x AND y".to_string())
                    },
                ],
                limit: Some(10),
            }
        );

        let Statement::Select {
            projection, filter, limit, ..
        } = parse("select * from `t`").unwrap()
        else {
            panic!("expected SELECT");
        };
        assert_eq!(projection, Projection::All);
        assert!(filter.is_empty());
        assert_eq!(limit, None);
    }

    #[test]
    fn test_update_and_delete() {
        assert_eq!(
            parse("UPDATE t SET a = 1.5, b = 'q' WHERE id = 2").unwrap(),
            Statement::Update {
                table: table("t"),
                assignments: vec![
                    ("a".to_string(), Value::Double(1.5)),
                    ("b".to_string(), Value::Text("q".to_string())),
                ],
                filter: vec![Condition {
                    column: "id".to_string(),
                    value: Value::BigInt(2)
                }],
            }
        );
        assert_eq!(
            parse("DELETE FROM t").unwrap(),
            Statement::Delete {
                table: table("t"),
                filter: Vec::new()
            }
        );
    }

    #[test]
    fn test_only_equality_conditions() {
        for sql in [
            "SELECT * FROM t WHERE a != 1",
            "DELETE FROM t WHERE a <= 1",
            "UPDATE t SET a = 1 WHERE b >= 2",
            "UPDATE t SET a != 1",
        ] {
            let err = parse(sql).unwrap_err();
            assert_eq!(err.kind, QueryErrorKind::Syntax, "{}", sql);
        }

        let Statement::Delete { filter, .. } = parse("DELETE FROM t WHERE `a` = 'x=y'").unwrap()
        else {
            panic!("expected delete");
        };
        assert_eq!(
            filter,
            vec![Condition {
                column: "a".to_string(),
                value: Value::Text("x=y".to_string())
            }]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(literal(" -7 ").unwrap(), Value::BigInt(-7));
        assert_eq!(literal("TRUE").unwrap(), Value::Bool(true));
        assert_eq!(literal(r#""dq""#).unwrap(), Value::Text("dq".to_string()));
        assert_eq!(literal(r"'a\'b'").unwrap(), Value::Text("a'b".to_string()));
        assert!(literal("now()").is_err());
    }

    #[test]
    fn test_unsupported() {
        let err = parse("GRANT ALL ON *.* TO bob").unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::Unsupported);
        assert!(!Statement::ShowTables.is_mutation());
        assert!(parse("DELETE FROM t").unwrap().is_mutation());
    }
}
