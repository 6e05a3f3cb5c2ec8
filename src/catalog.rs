//! SQL metadata accessors: schema/object id resolution and stored
//! procedure introspection, built on the catalog functions and `sys.*`
//! views.

use serde::Serialize;
use uuid::Uuid;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::row::RowExt;
use crate::types::SqlValue;

/// A stored procedure parameter, from `sys.parameters`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcParam {
    /// Ordinal within the procedure signature, starting at 1.
    pub parameter_id: i32,
    /// Parameter name, including the `@` prefix.
    pub name: String,
    /// SQL Server type name (`TYPE_NAME` of the user type id).
    pub type_name: String,
    /// Maximum length in bytes; -1 for `(MAX)` types.
    pub max_length: i16,
    /// Whether the parameter is OUTPUT.
    pub is_output: bool,
    /// Whether the parameter is READONLY (table-valued parameters).
    pub is_readonly: bool,
    /// Whether the parameter accepts NULL.
    pub is_nullable: bool,
}

fn into_string(value: Option<SqlValue>) -> Option<String> {
    match value {
        Some(SqlValue::String(s)) => Some(s),
        _ => None,
    }
}

impl Client {
    /// Resolve a schema name to its id, or the session's default schema
    /// id when `name` is `None`. `None` result means no such schema.
    pub fn schema_id(&mut self, name: Option<&str>) -> Result<Option<i32>> {
        let value = match name {
            Some(name) => self.get_value("SELECT SCHEMA_ID(?)", &[&name], 0)?,
            None => self.get_value("SELECT SCHEMA_ID()", &[], 0)?,
        };
        Ok(value.and_then(|v| v.as_i32()))
    }

    /// Resolve a schema id to its name, or the session's default schema
    /// name when `id` is `None`.
    pub fn schema_name(&mut self, id: Option<i32>) -> Result<Option<String>> {
        let value = match id {
            Some(id) => self.get_value("SELECT SCHEMA_NAME(?)", &[&id], 0)?,
            None => self.get_value("SELECT SCHEMA_NAME()", &[], 0)?,
        };
        Ok(into_string(value))
    }

    /// Resolve an object name (optionally schema-qualified) to its id,
    /// restricted to `object_type` when given (e.g. `"P"` for stored
    /// procedures, `"U"` for user tables).
    pub fn object_id(&mut self, name: &str, object_type: Option<&str>) -> Result<Option<i32>> {
        let value = match object_type {
            Some(object_type) => {
                self.get_value("SELECT OBJECT_ID(?, ?)", &[&name, &object_type], 0)?
            }
            None => self.get_value("SELECT OBJECT_ID(?)", &[&name], 0)?,
        };
        Ok(value.and_then(|v| v.as_i32()))
    }

    /// Resolve an object id to its name.
    pub fn object_name(&mut self, id: i32) -> Result<Option<String>> {
        let value = self.get_value("SELECT OBJECT_NAME(?)", &[&id], 0)?;
        Ok(into_string(value))
    }

    /// Ask the server for a fresh GUID (`NEWID()`).
    pub fn new_guid(&mut self) -> Result<Uuid> {
        const SQL: &str = "SELECT NEWID()";
        let value = self
            .get_value(SQL, &[], 0)?
            .ok_or_else(|| Error::fetch("NEWID() returned no rows", SQL))?;
        value
            .as_uuid()
            .ok_or_else(|| Error::type_conversion(format!("NEWID() returned {:?}", value)))
    }

    /// The database user name of the session (`CURRENT_USER`).
    pub fn current_user(&mut self) -> Result<String> {
        self.user("SELECT CURRENT_USER")
    }

    /// The login name of the session (`SYSTEM_USER`).
    pub fn system_user(&mut self) -> Result<String> {
        self.user("SELECT SYSTEM_USER")
    }

    fn user(&mut self, sql: &str) -> Result<String> {
        let value = self
            .get_value(sql, &[], 0)?
            .ok_or_else(|| Error::fetch("user query returned no rows", sql))?;
        into_string(Some(value))
            .ok_or_else(|| Error::type_conversion("user query returned a non-string value"))
    }

    /// Check whether a stored procedure exists, in the given schema or
    /// the session's default schema.
    pub fn proc_exists(&mut self, name: &str, schema: Option<&str>) -> Result<bool> {
        const SQL: &str = "SELECT CASE WHEN EXISTS (\
             SELECT 1 FROM sys.procedures p \
             JOIN sys.schemas s ON s.schema_id = p.schema_id \
             WHERE p.name = ? AND s.name = COALESCE(?, SCHEMA_NAME())\
             ) THEN 1 ELSE 0 END";

        let value = self.get_value(SQL, &[&name, &schema], 0)?;
        Ok(value.and_then(|v| v.as_i64()) == Some(1))
    }

    /// List a stored procedure's declared parameters in signature order,
    /// from the given schema or the session's default schema.
    ///
    /// The implicit return value (parameter_id 0) is not included.
    pub fn proc_params(&mut self, name: &str, schema: Option<&str>) -> Result<Vec<ProcParam>> {
        const SQL: &str = "SELECT p.parameter_id, p.name, \
             TYPE_NAME(p.user_type_id) AS type_name, \
             p.max_length, p.is_output, p.is_readonly, p.is_nullable \
             FROM sys.parameters p \
             JOIN sys.procedures pr ON pr.object_id = p.object_id \
             JOIN sys.schemas s ON s.schema_id = pr.schema_id \
             WHERE pr.name = ? AND s.name = COALESCE(?, SCHEMA_NAME()) \
             AND p.parameter_id > 0 \
             ORDER BY p.parameter_id";

        let rows = self.query(SQL, &[&name, &schema])?;

        rows.iter()
            .map(|row| {
                Ok(ProcParam {
                    parameter_id: row.get_value("parameter_id")?,
                    name: row.get_opt::<&str>("name")?.unwrap_or_default().to_string(),
                    type_name: row
                        .get_opt::<&str>("type_name")?
                        .unwrap_or_default()
                        .to_string(),
                    max_length: row.get_value("max_length")?,
                    is_output: row.get_value("is_output")?,
                    is_readonly: row.get_value("is_readonly")?,
                    is_nullable: row.get_value("is_nullable")?,
                })
            })
            .collect()
    }
}
