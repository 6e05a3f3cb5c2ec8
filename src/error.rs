//! Error types for SQL Server operations.
//!
//! Query and fetch failures carry the SQL text that produced them, so a
//! caller logging an error can see which statement went wrong without
//! threading that context through separately.

use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to SQL Server.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration or connection string.
    #[error("configuration error: {0}")]
    Config(String),

    /// TCP connect or TDS handshake failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// Query execution failure, with the offending SQL attached.
    #[error("query error: {source} (sql: {sql})")]
    Query {
        /// The SQL text that failed to execute.
        sql: String,
        /// The underlying driver error.
        #[source]
        source: tiberius::error::Error,
    },

    /// Result-shaping failure while reading rows out of a statement.
    #[error("fetch error: {message} (sql: {sql})")]
    Fetch {
        /// What went wrong while shaping the result.
        message: String,
        /// The SQL text that produced the statement.
        sql: String,
    },

    /// Other driver errors not tied to a specific statement.
    #[error("sql server error: {0}")]
    Server(#[from] tiberius::error::Error),

    /// A column value could not be represented as a [`SqlValue`].
    ///
    /// [`SqlValue`]: crate::SqlValue
    #[error("type conversion error: {0}")]
    TypeConversion(String),

    /// Internal error (runtime construction and similar faults).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a query error carrying the SQL that failed.
    pub fn query(sql: impl Into<String>, source: tiberius::error::Error) -> Self {
        Self::Query {
            sql: sql.into(),
            source,
        }
    }

    /// Create a fetch error carrying the SQL that produced the statement.
    pub fn fetch(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
            sql: sql.into(),
        }
    }

    /// Create a type conversion error.
    pub fn type_conversion(message: impl Into<String>) -> Self {
        Self::TypeConversion(message.into())
    }

    /// The SQL text attached to this error, if any.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Query { sql, .. } | Self::Fetch { sql, .. } => Some(sql),
            _ => None,
        }
    }

    /// The SQL Server error number, when the server reported one.
    pub fn server_code(&self) -> Option<u32> {
        let source = match self {
            Self::Query { source, .. } => source,
            Self::Server(source) => source,
            _ => return None,
        };

        match source {
            tiberius::error::Error::Server(token) => Some(token.code()),
            _ => None,
        }
    }

    /// Check if this is a connection-level error.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Connection(_))
    }

    /// Check if the server rejected the statement for a constraint
    /// violation (primary key 2627, unique index 2601, foreign key 547).
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self.server_code(), Some(547 | 2601 | 2627))
    }

    /// Check if the server rejected a NULL insert into a NOT NULL column
    /// (error 515).
    pub fn is_null_violation(&self) -> bool {
        self.server_code() == Some(515)
    }
}
