//! Row shaping: ordered name/value maps over raw driver rows.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tiberius::Row;

use crate::error::{Error, Result};
use crate::types::SqlValue;

/// A result row as an insertion-ordered map of column name to owned value.
///
/// Column order matches the select list. Duplicate column names keep the
/// last value; alias duplicate columns if you need to read both.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct SqlRow {
    columns: IndexMap<String, SqlValue>,
}

impl SqlRow {
    /// Convert a raw driver row into an owned [`SqlRow`].
    pub fn from_tiberius(row: Row) -> Result<Self> {
        let names: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();

        let mut columns = IndexMap::with_capacity(names.len());
        for (name, data) in names.into_iter().zip(row.into_iter()) {
            columns.insert(name, SqlValue::from_column_data(&data)?);
        }

        Ok(Self { columns })
    }

    /// Get a column value by name.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns.get(column)
    }

    /// Get a column value by position in the select list.
    pub fn get_index(&self, index: usize) -> Option<&SqlValue> {
        self.columns.get_index(index).map(|(_, v)| v)
    }

    /// Column names in select-list order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check for a zero-column row.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterate over `(name, value)` pairs in select-list order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// A JSON object view of the row.
    pub fn to_json(&self) -> JsonValue {
        let map = self
            .columns
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        JsonValue::Object(map)
    }
}

impl FromIterator<(String, SqlValue)> for SqlRow {
    fn from_iter<I: IntoIterator<Item = (String, SqlValue)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for SqlRow {
    type Item = (String, SqlValue);
    type IntoIter = indexmap::map::IntoIter<String, SqlValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

/// Extension trait for typed access into raw [`tiberius::Row`]s.
///
/// Wraps the driver accessors with column-name context on failure, for the
/// places that read raw rows instead of going through [`SqlRow`].
pub trait RowExt {
    /// Get a non-null column value by name.
    fn get_value<'a, T>(&'a self, column: &str) -> Result<T>
    where
        T: tiberius::FromSql<'a>;

    /// Get an optional column value by name.
    fn get_opt<'a, T>(&'a self, column: &str) -> Result<Option<T>>
    where
        T: tiberius::FromSql<'a>;
}

impl RowExt for Row {
    fn get_value<'a, T>(&'a self, column: &str) -> Result<T>
    where
        T: tiberius::FromSql<'a>,
    {
        self.get_opt(column)?
            .ok_or_else(|| Error::type_conversion(format!("column '{}' is null", column)))
    }

    fn get_opt<'a, T>(&'a self, column: &str) -> Result<Option<T>>
    where
        T: tiberius::FromSql<'a>,
    {
        self.try_get(column).map_err(|e| {
            Error::type_conversion(format!("failed to read column '{}': {}", column, e))
        })
    }
}
