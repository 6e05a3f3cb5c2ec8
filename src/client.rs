//! Synchronous SQL Server client with lazy connection management.

use indexmap::IndexMap;
use serde::Serialize;
use tiberius::{Row, ToSql};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::row::{RowExt, SqlRow};
use crate::types::SqlValue;

type TdsClient = tiberius::Client<Compat<TcpStream>>;

/// A synchronous, single-connection SQL Server client.
///
/// The connection is established lazily: constructing a client does no
/// I/O, and every query path connects on first use. The client drives the
/// async `tiberius` driver on an internal current-thread tokio runtime,
/// so the public API stays blocking.
///
/// Parameter placeholders are written as `?` and bound positionally:
///
/// ```rust,ignore
/// use mssql_client::Client;
///
/// let mut client = Client::from_connection_string(
///     "Server=localhost;Database=orders;User Id=sa;Password=Password123;",
/// )?;
///
/// let rows = client.get_rows("SELECT id, name FROM customers WHERE region = ?", &[&"EU"])?;
/// for row in &rows {
///     println!("{:?} {:?}", row.get("id"), row.get("name"));
/// }
/// ```
pub struct Client {
    config: Config,
    // Declared before the runtime so the session drops while the IO
    // driver is still alive.
    conn: Option<TdsClient>,
    runtime: Runtime,
}

/// Server identity, as reported by the server itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerInfo {
    /// `@@SERVERNAME`; absent on servers where it was never set.
    pub server_name: Option<String>,
    /// `SERVERPROPERTY('ProductVersion')`.
    pub product_version: String,
    /// `SERVERPROPERTY('ProductLevel')`, e.g. `RTM` or a service pack.
    pub product_level: String,
    /// `SERVERPROPERTY('Edition')`.
    pub edition: String,
    /// The database this session is connected to.
    pub current_database: String,
}

/// Client-side driver stack information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    /// Name of the underlying TDS driver.
    pub driver: &'static str,
    /// Version of this client library.
    pub client_version: &'static str,
}

impl Client {
    /// Create a client from a configuration. Does not connect.
    pub fn new(config: Config) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Internal(format!("failed to build tokio runtime: {}", e)))?;

        Ok(Self {
            config,
            runtime,
            conn: None,
        })
    }

    /// Create a client from a connection string. Does not connect.
    pub fn from_connection_string(conn_str: impl AsRef<str>) -> Result<Self> {
        Self::new(Config::from_connection_string(conn_str)?)
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check whether a session is currently established.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Establish the session if it is not already up.
    ///
    /// Called implicitly by every query path; only needed directly to
    /// surface connection errors early.
    pub fn connect(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }

        let tds_config = self.config.to_tiberius_config()?;
        let addr = tds_config.get_addr();
        let timeout = self.config.connect_timeout;

        // The timeout bounds the whole session establishment: TCP connect
        // plus the TDS login handshake.
        let conn = self.runtime.block_on(async {
            tokio::time::timeout(timeout, async {
                let tcp = TcpStream::connect(&addr).await.map_err(|e| {
                    Error::connection(format!("failed to connect to {}: {}", addr, e))
                })?;

                tcp.set_nodelay(true)
                    .map_err(|e| Error::connection(format!("failed to set TCP_NODELAY: {}", e)))?;

                tiberius::Client::connect(tds_config, tcp.compat_write())
                    .await
                    .map_err(|e| Error::connection(format!("login to {} failed: {}", addr, e)))
            })
            .await
            .unwrap_or_else(|_| {
                Err(Error::connection(format!(
                    "timed out connecting to {} after {:?}",
                    addr, timeout
                )))
            })
        })?;

        info!(
            host = %self.config.host,
            port = %self.config.port,
            database = %self.config.database,
            "connected to sql server"
        );

        self.conn = Some(conn);
        Ok(())
    }

    /// Close the session. A later query reconnects lazily.
    pub fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            debug!("closing connection");
            self.runtime.block_on(conn.close())?;
        }
        Ok(())
    }

    /// Execute a query and return the first result set as raw driver rows.
    ///
    /// This is the single execution primitive every fetch helper is built
    /// on. `?` placeholders are rewritten to the driver's `@PN` form.
    pub fn query(&mut self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>> {
        self.connect()?;
        let sql = normalize_placeholders(sql);
        debug!(sql = %sql, "executing query");

        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| Error::connection("not connected"))?;
        let result = self.runtime.block_on(async {
            let stream = conn.query(sql.as_str(), params).await?;
            stream.into_first_result().await
        });
        result.map_err(|e| Error::query(sql, e))
    }

    /// Execute a statement and return the number of affected rows.
    pub fn execute(&mut self, sql: &str, params: &[&dyn ToSql]) -> Result<u64> {
        self.connect()?;
        let sql = normalize_placeholders(sql);
        debug!(sql = %sql, "executing statement");

        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| Error::connection("not connected"))?;
        let result = self
            .runtime
            .block_on(async { conn.execute(sql.as_str(), params).await });
        result
            .map(|result| result.total())
            .map_err(|e| Error::query(sql, e))
    }

    /// Execute an unparameterized batch of statements.
    pub fn batch_execute(&mut self, sql: &str) -> Result<()> {
        self.connect()?;
        debug!(sql = %sql, "executing batch");

        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| Error::connection("not connected"))?;
        self.runtime
            .block_on(async {
                conn.simple_query(sql).await?.into_results().await?;
                Ok(())
            })
            .map_err(|e: tiberius::error::Error| Error::query(sql, e))
    }

    /// Fetch a single field of the first row, by zero-based column index.
    ///
    /// Returns `None` when the query yields no rows; a NULL field comes
    /// back as `Some(SqlValue::Null)`, so the two stay distinguishable.
    pub fn get_value(
        &mut self,
        sql: &str,
        params: &[&dyn ToSql],
        index: usize,
    ) -> Result<Option<SqlValue>> {
        let mut rows = self.query(sql, params)?;
        if rows.is_empty() {
            return Ok(None);
        }

        let row = rows.swap_remove(0);
        let data = row
            .into_iter()
            .nth(index)
            .ok_or_else(|| Error::fetch(format!("column index {} out of range", index), sql))?;
        SqlValue::from_column_data(&data).map(Some)
    }

    /// Fetch the first row as an ordered name/value map.
    pub fn get_row(&mut self, sql: &str, params: &[&dyn ToSql]) -> Result<Option<SqlRow>> {
        let mut rows = self.query(sql, params)?;
        if rows.is_empty() {
            return Ok(None);
        }
        SqlRow::from_tiberius(rows.swap_remove(0)).map(Some)
    }

    /// Fetch all rows of the first result set.
    pub fn get_rows(&mut self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<SqlRow>> {
        self.query(sql, params)?
            .into_iter()
            .map(SqlRow::from_tiberius)
            .collect()
    }

    /// Fetch all rows keyed by the display form of the named column.
    ///
    /// Insertion order follows the result set; rows sharing a key keep
    /// the last one. A result set without the key column, or a NULL in
    /// the key column, is a fetch error.
    pub fn get_rows_keyed(
        &mut self,
        sql: &str,
        params: &[&dyn ToSql],
        key: &str,
    ) -> Result<IndexMap<String, SqlRow>> {
        let rows = self.get_rows(sql, params)?;
        key_rows(rows, key, sql)
    }

    /// Query the server for its identity and version information.
    pub fn server_info(&mut self) -> Result<ServerInfo> {
        const SQL: &str = "SELECT @@SERVERNAME AS server_name, \
             CAST(SERVERPROPERTY('ProductVersion') AS NVARCHAR(128)) AS product_version, \
             CAST(SERVERPROPERTY('ProductLevel') AS NVARCHAR(128)) AS product_level, \
             CAST(SERVERPROPERTY('Edition') AS NVARCHAR(128)) AS edition, \
             DB_NAME() AS current_database";

        let mut rows = self.query(SQL, &[])?;
        let row = rows
            .pop()
            .ok_or_else(|| Error::fetch("server info query returned no rows", SQL))?;

        Ok(ServerInfo {
            server_name: row.get_opt::<&str>("server_name")?.map(String::from),
            product_version: row.get_value::<&str>("product_version")?.to_string(),
            product_level: row.get_value::<&str>("product_level")?.to_string(),
            edition: row.get_value::<&str>("edition")?.to_string(),
            current_database: row.get_value::<&str>("current_database")?.to_string(),
        })
    }

    /// Information about the client-side driver stack.
    pub fn client_info(&self) -> ClientInfo {
        ClientInfo {
            driver: "tiberius",
            client_version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Key rows by the display form of the named column, preserving result
/// set order. Rows sharing a key keep the last one; a missing key column
/// or a NULL key value is a fetch error.
fn key_rows(rows: Vec<SqlRow>, key: &str, sql: &str) -> Result<IndexMap<String, SqlRow>> {
    let mut keyed = IndexMap::with_capacity(rows.len());

    for row in rows {
        let value = row
            .get(key)
            .ok_or_else(|| Error::fetch(format!("key column '{}' not in result set", key), sql))?;
        if value.is_null() {
            return Err(Error::fetch(format!("key column '{}' is NULL", key), sql));
        }
        keyed.insert(value.to_string(), row);
    }

    Ok(keyed)
}

/// Rewrite `?` placeholders to the `@P1`-style markers tiberius expects,
/// leaving string literals, quoted/bracketed identifiers, and comments
/// untouched.
fn normalize_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut iter = sql.chars().peekable();
    let mut next_param = 1u32;

    while let Some(c) = iter.next() {
        match c {
            // 'literal' or "quoted id", with doubled-quote escapes
            '\'' | '"' => {
                out.push(c);
                while let Some(ch) = iter.next() {
                    out.push(ch);
                    if ch == c {
                        if iter.peek() == Some(&c) {
                            out.push(c);
                            iter.next();
                        } else {
                            break;
                        }
                    }
                }
            }
            '[' => {
                out.push(c);
                for ch in iter.by_ref() {
                    out.push(ch);
                    if ch == ']' {
                        break;
                    }
                }
            }
            '-' if iter.peek() == Some(&'-') => {
                out.push(c);
                for ch in iter.by_ref() {
                    out.push(ch);
                    if ch == '\n' {
                        break;
                    }
                }
            }
            '/' if iter.peek() == Some(&'*') => {
                out.push(c);
                out.push('*');
                iter.next();
                let mut prev = '\0';
                for ch in iter.by_ref() {
                    out.push(ch);
                    if prev == '*' && ch == '/' {
                        break;
                    }
                    prev = ch;
                }
            }
            '?' => {
                out.push_str("@P");
                out.push_str(&next_param.to_string());
                next_param += 1;
            }
            _ => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // Query and fetch behavior needs a live SQL Server; those paths are
    // covered by integration environments. What follows is the
    // connection-free surface.

    #[test]
    fn test_client_new_is_lazy() {
        let config = Config::builder()
            .host("db.nowhere.invalid")
            .database("db")
            .username("sa")
            .password("pass")
            .build()
            .unwrap();

        let client = Client::new(config).unwrap();
        assert!(!client.is_connected());
        assert_eq!(client.config().host, "db.nowhere.invalid");
    }

    #[test]
    fn test_close_without_connection_is_noop() {
        let mut client =
            Client::from_connection_string("Server=localhost;Database=db;Uid=sa;Pwd=pass")
                .unwrap();
        client.close().unwrap();
        assert!(!client.is_connected());
    }

    #[test]
    fn test_client_info() {
        let client =
            Client::from_connection_string("Server=localhost;Database=db;Uid=sa;Pwd=pass")
                .unwrap();
        let info = client.client_info();
        assert_eq!(info.driver, "tiberius");
        assert_eq!(info.client_version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_normalize_placeholders() {
        assert_eq!(
            normalize_placeholders("SELECT * FROM users WHERE id = ?"),
            "SELECT * FROM users WHERE id = @P1"
        );
        assert_eq!(
            normalize_placeholders("SELECT * FROM users WHERE id = ? AND name = ?"),
            "SELECT * FROM users WHERE id = @P1 AND name = @P2"
        );
        assert_eq!(
            normalize_placeholders("SELECT * FROM users"),
            "SELECT * FROM users"
        );
    }

    #[test]
    fn test_normalize_skips_string_literals() {
        assert_eq!(
            normalize_placeholders("SELECT '?' , ? FROM t"),
            "SELECT '?' , @P1 FROM t"
        );
        assert_eq!(
            normalize_placeholders("SELECT 'it''s ?' , ?"),
            "SELECT 'it''s ?' , @P1"
        );
    }

    #[test]
    fn test_normalize_skips_identifiers() {
        assert_eq!(
            normalize_placeholders("SELECT [what?] FROM t WHERE x = ?"),
            "SELECT [what?] FROM t WHERE x = @P1"
        );
        assert_eq!(
            normalize_placeholders("SELECT \"odd?name\" FROM t WHERE x = ?"),
            "SELECT \"odd?name\" FROM t WHERE x = @P1"
        );
    }

    #[test]
    fn test_normalize_skips_comments() {
        assert_eq!(
            normalize_placeholders("SELECT ? -- really?\nFROM t"),
            "SELECT @P1 -- really?\nFROM t"
        );
        assert_eq!(
            normalize_placeholders("SELECT ? /* eh? */ FROM t WHERE y = ?"),
            "SELECT @P1 /* eh? */ FROM t WHERE y = @P2"
        );
    }

    #[test]
    fn test_normalize_unterminated_literal() {
        // Malformed SQL passes through untouched; the server reports it.
        assert_eq!(normalize_placeholders("SELECT 'oops"), "SELECT 'oops");
    }

    #[test]
    fn test_connect_timeout_bounds_handshake() {
        // A listener that completes the TCP handshake but never speaks
        // TDS: the login stall must still hit the connect timeout.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = Config::builder()
            .host("127.0.0.1")
            .port(port)
            .database("db")
            .username("sa")
            .password("pass")
            .connect_timeout(std::time::Duration::from_millis(250))
            .build()
            .unwrap();

        let mut client = Client::new(config).unwrap();
        let start = std::time::Instant::now();
        let err = client.connect().unwrap_err();

        assert!(err.is_connection_error());
        assert!(err.to_string().contains("timed out"), "got: {}", err);
        assert!(start.elapsed() < std::time::Duration::from_secs(5));
        assert!(!client.is_connected());
    }

    fn region_rows() -> Vec<SqlRow> {
        vec![
            SqlRow::from_iter([
                ("id".to_string(), SqlValue::Int(1)),
                ("region".to_string(), SqlValue::String("EU".to_string())),
            ]),
            SqlRow::from_iter([
                ("id".to_string(), SqlValue::Int(2)),
                ("region".to_string(), SqlValue::String("US".to_string())),
            ]),
        ]
    }

    #[test]
    fn test_key_rows_preserves_order() {
        let keyed = key_rows(region_rows(), "id", "SELECT ...").unwrap();
        let keys: Vec<&str> = keyed.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["1", "2"]);
        assert_eq!(
            keyed["2"].get("region"),
            Some(&SqlValue::String("US".to_string()))
        );
    }

    #[test]
    fn test_key_rows_duplicate_keys_keep_last() {
        let mut rows = region_rows();
        for row in &mut rows {
            *row = SqlRow::from_iter(
                row.clone()
                    .into_iter()
                    .map(|(name, value)| match name.as_str() {
                        "id" => (name, SqlValue::Int(9)),
                        _ => (name, value),
                    }),
            );
        }

        let keyed = key_rows(rows, "id", "SELECT ...").unwrap();
        assert_eq!(keyed.len(), 1);
        assert_eq!(
            keyed["9"].get("region"),
            Some(&SqlValue::String("US".to_string()))
        );
    }

    #[test]
    fn test_key_rows_missing_column_is_fetch_error() {
        let err = key_rows(region_rows(), "nope", "SELECT ...").unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
        assert!(err.to_string().contains("key column 'nope'"));
    }

    #[test]
    fn test_key_rows_null_key_is_fetch_error() {
        let rows = vec![SqlRow::from_iter([
            ("id".to_string(), SqlValue::Null),
            ("region".to_string(), SqlValue::String("EU".to_string())),
        ])];

        let err = key_rows(rows, "id", "SELECT ...").unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
        assert!(err.to_string().contains("key column 'id' is NULL"));
    }
}
