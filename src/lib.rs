//! # mssql-client
//!
//! A synchronous, single-connection Microsoft SQL Server client built on
//! the `tiberius` TDS driver.
//!
//! This crate provides:
//! - Lazy connection management (no I/O until the first query)
//! - Parameterized query execution with `?` placeholders
//! - Row-fetching helpers: single value, single row, all rows, keyed rows
//! - Typed errors that carry the offending SQL and the server error code
//! - SQL metadata accessors: schema/object id resolution and stored
//!   procedure introspection
//!
//! The driver itself is async; the client owns a current-thread tokio
//! runtime and blocks on it internally, so callers never touch a future.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mssql_client::{Client, Config};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::builder()
//!         .host("localhost")
//!         .database("orders")
//!         .username("sa")
//!         .password("Password123!")
//!         .build()?;
//!
//!     let mut client = Client::new(config)?;
//!
//!     // Connects on first use.
//!     let total = client.get_value(
//!         "SELECT COUNT(*) FROM customers WHERE region = ?",
//!         &[&"EU"],
//!         0,
//!     )?;
//!     println!("{:?}", total);
//!
//!     // Rows keyed by a column value.
//!     let by_id = client.get_rows_keyed("SELECT id, name FROM customers", &[], "id")?;
//!     println!("{:?}", by_id.get("42"));
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Metadata accessors
//!
//! ```rust,ignore
//! let schema_id = client.schema_id(Some("dbo"))?;
//! let exists = client.proc_exists("usp_load_orders", None)?;
//! for param in client.proc_params("usp_load_orders", None)? {
//!     println!("{} {}", param.name, param.type_name);
//! }
//! ```

pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod row;
pub mod types;

pub use catalog::ProcParam;
pub use client::{Client, ClientInfo, ServerInfo};
pub use config::{Config, ConfigBuilder, EncryptionMode};
pub use error::{Error, Result};
pub use row::{RowExt, SqlRow};
pub use types::SqlValue;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::catalog::ProcParam;
    pub use crate::client::{Client, ClientInfo, ServerInfo};
    pub use crate::config::{Config, ConfigBuilder, EncryptionMode};
    pub use crate::error::{Error, Result};
    pub use crate::row::{RowExt, SqlRow};
    pub use crate::types::SqlValue;
}
