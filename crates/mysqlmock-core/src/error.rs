//! Error types for the mock server.
//!
//! Every error that can surface while serving a connection is one of the
//! variants below. Most of them are answered with an ERR packet and the
//! connection keeps going; only [`Error::is_fatal`] errors tear the
//! connection down.

use std::fmt;

/// The primary error type for all mock server operations.
#[derive(Debug)]
pub enum Error {
    /// Malformed or oversized frame header
    Framing(FramingError),
    /// Truncated or malformed handshake/command payload
    Protocol(ProtocolError),
    /// Authentication errors (digest mismatch, unknown plugin)
    Auth(AuthError),
    /// Command byte the dispatcher does not implement
    Command(CommandError),
    /// Query execution errors reported by the SQL backend
    Query(QueryError),
    /// Database selection failed
    UnknownDatabase(NotFoundError),
    /// Configuration errors
    Config(ConfigError),
    /// I/O errors
    Io(std::io::Error),
    /// Operation timed out
    Timeout,
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramingError {
    /// Payload length announced by the frame header
    pub declared_length: usize,
    /// Configured upper bound
    pub max_packet_size: usize,
}

#[derive(Debug)]
pub struct ProtocolError {
    pub message: String,
    pub raw_data: Option<Vec<u8>>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct AuthError {
    pub kind: AuthErrorKind,
    pub user: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// Client response did not match the stored credential
    Failed,
    /// Client asked for a plugin the verifier does not implement
    UnsupportedPlugin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandError {
    pub code: u8,
    pub message: String,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Table, column or database not found
    NotFound,
    /// Statement shape the backend does not handle
    Unsupported,
    /// Constraint violation (duplicate primary key)
    Constraint,
    /// Other backend error
    Database,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotFoundError {
    pub name: String,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Does this error require closing the connection?
    ///
    /// A garbled frame header leaves the byte stream unsynchronised, and
    /// transport failures leave nothing to reply on.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Framing(_) | Error::Io(_))
    }

    /// MySQL error code used when this error is rendered as an ERR packet.
    pub fn mysql_code(&self) -> u16 {
        match self {
            Error::Auth(a) => match a.kind {
                // ER_ACCESS_DENIED_ERROR
                AuthErrorKind::Failed => 1045,
                // ER_NOT_SUPPORTED_AUTH_MODE
                AuthErrorKind::UnsupportedPlugin => 1251,
            },
            // ER_UNKNOWN_COM_ERROR
            Error::Command(_) => 1047,
            // ER_PARSE_ERROR
            Error::Protocol(_) => 1064,
            // ER_BAD_DB_ERROR
            Error::UnknownDatabase(_) => 1049,
            Error::Query(q) => match q.kind {
                QueryErrorKind::Syntax => 1064,
                // ER_NO_SUCH_TABLE
                QueryErrorKind::NotFound => 1146,
                // ER_DUP_ENTRY
                QueryErrorKind::Constraint => 1062,
                QueryErrorKind::Unsupported | QueryErrorKind::Database => 1105,
            },
            // ER_UNKNOWN_ERROR
            _ => 1105,
        }
    }

    /// Five-character SQLSTATE matching [`Error::mysql_code`].
    pub fn sql_state(&self) -> &'static str {
        match self.mysql_code() {
            1045 => "28000",
            1251 => "08004",
            1047 => "08S01",
            1064 | 1049 => "42000",
            1146 => "42S02",
            1062 => "23000",
            _ => "HY000",
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl QueryError {
    /// Create a query error without a source.
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            sql: None,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the offending SQL text.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Framing(e) => write!(f, "Framing error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e.message),
            // Auth, command and query messages go to the client verbatim.
            Error::Auth(e) => write!(f, "{}", e.message),
            Error::Command(e) => write!(f, "{}", e.message),
            Error::Query(e) => write!(f, "{}", e.message),
            Error::UnknownDatabase(e) => write!(f, "{}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Protocol(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "declared payload length {} exceeds maximum packet size {}",
            self.declared_length, self.max_packet_size
        )
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown database '{}'", self.name)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

impl std::error::Error for NotFoundError {}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<FramingError> for Error {
    fn from(err: FramingError) -> Self {
        Error::Framing(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<AuthError> for Error {
    fn from(err: AuthError) -> Self {
        Error::Auth(err)
    }
}

impl From<CommandError> for Error {
    fn from(err: CommandError) -> Self {
        Error::Command(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<NotFoundError> for Error {
    fn from(err: NotFoundError) -> Self {
        Error::UnknownDatabase(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for mock server operations.
pub type Result<T> = std::result::Result<T, Error>;
