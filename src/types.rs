//! Owned column values and parameter binding.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tiberius::numeric::Numeric;
use tiberius::{ColumnData, FromSql, ToSql};
use uuid::Uuid;

use crate::error::{Error, Result};

/// An owned SQL Server column value.
///
/// `DECIMAL`/`NUMERIC`/`MONEY` collapse to [`SqlValue::Double`] and `XML`
/// to [`SqlValue::String`]; everything else keeps its natural Rust type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// BIT.
    Bool(bool),
    /// TINYINT.
    TinyInt(u8),
    /// SMALLINT.
    SmallInt(i16),
    /// INT.
    Int(i32),
    /// BIGINT.
    BigInt(i64),
    /// REAL.
    Float(f32),
    /// FLOAT, and the DECIMAL family.
    Double(f64),
    /// CHAR/VARCHAR/NCHAR/NVARCHAR/TEXT/NTEXT/XML.
    String(String),
    /// BINARY/VARBINARY/IMAGE.
    Binary(Vec<u8>),
    /// UNIQUEIDENTIFIER.
    Uuid(Uuid),
    /// DATE.
    Date(NaiveDate),
    /// TIME.
    Time(NaiveTime),
    /// DATETIME/SMALLDATETIME/DATETIME2.
    DateTime(NaiveDateTime),
    /// DATETIMEOFFSET, normalized to UTC.
    DateTimeOffset(DateTime<Utc>),
}

fn numeric_to_f64(n: &Numeric) -> f64 {
    n.value() as f64 / 10f64.powi(i32::from(n.scale()))
}

impl SqlValue {
    /// Convert a raw driver value into an owned [`SqlValue`].
    pub fn from_column_data(data: &ColumnData<'static>) -> Result<Self> {
        let conv = |e: tiberius::error::Error| Error::type_conversion(e.to_string());

        let value = match data {
            ColumnData::Bit(v) => v.map(SqlValue::Bool),
            ColumnData::U8(v) => v.map(SqlValue::TinyInt),
            ColumnData::I16(v) => v.map(SqlValue::SmallInt),
            ColumnData::I32(v) => v.map(SqlValue::Int),
            ColumnData::I64(v) => v.map(SqlValue::BigInt),
            ColumnData::F32(v) => v.map(SqlValue::Float),
            ColumnData::F64(v) => v.map(SqlValue::Double),
            ColumnData::Numeric(v) => v.as_ref().map(|n| SqlValue::Double(numeric_to_f64(n))),
            ColumnData::String(v) => v.as_ref().map(|s| SqlValue::String(s.to_string())),
            ColumnData::Xml(v) => v
                .as_ref()
                .map(|x| SqlValue::String(x.clone().into_owned().into_string())),
            ColumnData::Binary(v) => v.as_ref().map(|b| SqlValue::Binary(b.to_vec())),
            ColumnData::Guid(v) => v.map(SqlValue::Uuid),
            ColumnData::Date(_) => NaiveDate::from_sql(data).map_err(conv)?.map(SqlValue::Date),
            ColumnData::Time(_) => NaiveTime::from_sql(data).map_err(conv)?.map(SqlValue::Time),
            ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
                NaiveDateTime::from_sql(data)
                    .map_err(conv)?
                    .map(SqlValue::DateTime)
            }
            ColumnData::DateTimeOffset(_) => DateTime::<Utc>::from_sql(data)
                .map_err(conv)?
                .map(SqlValue::DateTimeOffset),
        };

        Ok(value.unwrap_or(SqlValue::Null))
    }

    /// Check for SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// The value as a bool, if it is a BIT.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The value as an i64, widening from any integer column type.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::TinyInt(v) => Some(i64::from(*v)),
            SqlValue::SmallInt(v) => Some(i64::from(*v)),
            SqlValue::Int(v) => Some(i64::from(*v)),
            SqlValue::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as an i32, when it fits.
    pub fn as_i32(&self) -> Option<i32> {
        self.as_i64().and_then(|v| i32::try_from(v).ok())
    }

    /// The value as an f64, widening from either float column type.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Float(v) => Some(f64::from(*v)),
            SqlValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as a string slice, if it is textual.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The value as raw bytes, if it is binary.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SqlValue::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// The value as a UUID, if it is a UNIQUEIDENTIFIER.
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            SqlValue::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    /// The value as a date, if it is a DATE.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            SqlValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// The value as a time of day, if it is a TIME.
    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            SqlValue::Time(t) => Some(*t),
            _ => None,
        }
    }

    /// The value as a naive timestamp, if it is a DATETIME family type.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            SqlValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// The value as a UTC timestamp, if it is a DATETIMEOFFSET.
    pub fn as_datetime_offset(&self) -> Option<DateTime<Utc>> {
        match self {
            SqlValue::DateTimeOffset(dt) => Some(*dt),
            _ => None,
        }
    }

    /// A JSON view of the value.
    ///
    /// Non-finite floats become JSON null; binary data becomes a hex
    /// string; dates and UUIDs become their display strings.
    pub fn to_json(&self) -> JsonValue {
        match self {
            SqlValue::Null => JsonValue::Null,
            SqlValue::Bool(b) => JsonValue::Bool(*b),
            SqlValue::TinyInt(v) => JsonValue::Number((*v).into()),
            SqlValue::SmallInt(v) => JsonValue::Number((*v).into()),
            SqlValue::Int(v) => JsonValue::Number((*v).into()),
            SqlValue::BigInt(v) => JsonValue::Number((*v).into()),
            SqlValue::Float(v) => serde_json::Number::from_f64(f64::from(*v))
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            SqlValue::Double(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            SqlValue::String(s) => JsonValue::String(s.clone()),
            SqlValue::Binary(_)
            | SqlValue::Uuid(_)
            | SqlValue::Date(_)
            | SqlValue::Time(_)
            | SqlValue::DateTime(_)
            | SqlValue::DateTimeOffset(_) => JsonValue::String(self.to_string()),
        }
    }
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::TinyInt(v) => write!(f, "{}", v),
            SqlValue::SmallInt(v) => write!(f, "{}", v),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::BigInt(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Double(v) => write!(f, "{}", v),
            SqlValue::String(s) => write!(f, "{}", s),
            SqlValue::Binary(b) => {
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            SqlValue::Uuid(u) => write!(f, "{}", u),
            SqlValue::Date(d) => write!(f, "{}", d),
            SqlValue::Time(t) => write!(f, "{}", t),
            SqlValue::DateTime(dt) => write!(f, "{}", dt),
            SqlValue::DateTimeOffset(dt) => write!(f, "{}", dt),
        }
    }
}

/// [`SqlValue`]s round-trip as query parameters.
impl ToSql for SqlValue {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            SqlValue::Null => ColumnData::String(None),
            SqlValue::Bool(b) => ColumnData::Bit(Some(*b)),
            SqlValue::TinyInt(v) => ColumnData::U8(Some(*v)),
            SqlValue::SmallInt(v) => ColumnData::I16(Some(*v)),
            SqlValue::Int(v) => ColumnData::I32(Some(*v)),
            SqlValue::BigInt(v) => ColumnData::I64(Some(*v)),
            SqlValue::Float(v) => ColumnData::F32(Some(*v)),
            SqlValue::Double(v) => ColumnData::F64(Some(*v)),
            SqlValue::String(s) => ColumnData::String(Some(s.as_str().into())),
            SqlValue::Binary(b) => ColumnData::Binary(Some(b.as_slice().into())),
            SqlValue::Uuid(u) => ColumnData::Guid(Some(*u)),
            SqlValue::Date(d) => d.to_sql(),
            SqlValue::Time(t) => t.to_sql(),
            SqlValue::DateTime(dt) => dt.to_sql(),
            SqlValue::DateTimeOffset(dt) => dt.to_sql(),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::String(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::String(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::BigInt(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Double(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<Uuid> for SqlValue {
    fn from(value: Uuid) -> Self {
        SqlValue::Uuid(value)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_column_data_scalars() {
        let cases = [
            (ColumnData::Bit(Some(true)), SqlValue::Bool(true)),
            (ColumnData::U8(Some(7)), SqlValue::TinyInt(7)),
            (ColumnData::I16(Some(-3)), SqlValue::SmallInt(-3)),
            (ColumnData::I32(Some(42)), SqlValue::Int(42)),
            (ColumnData::I64(Some(1 << 40)), SqlValue::BigInt(1 << 40)),
            (ColumnData::F64(Some(2.5)), SqlValue::Double(2.5)),
        ];

        for (data, expected) in cases {
            assert_eq!(SqlValue::from_column_data(&data).unwrap(), expected);
        }
    }

    #[test]
    fn test_from_column_data_null() {
        let data = ColumnData::I32(None);
        assert_eq!(SqlValue::from_column_data(&data).unwrap(), SqlValue::Null);

        let data = ColumnData::String(None);
        assert_eq!(SqlValue::from_column_data(&data).unwrap(), SqlValue::Null);
    }

    #[test]
    fn test_from_column_data_string_and_binary() {
        let data = ColumnData::String(Some("hello".into()));
        assert_eq!(
            SqlValue::from_column_data(&data).unwrap(),
            SqlValue::String("hello".to_string())
        );

        let data = ColumnData::Binary(Some(vec![0xde, 0xad].into()));
        assert_eq!(
            SqlValue::from_column_data(&data).unwrap(),
            SqlValue::Binary(vec![0xde, 0xad])
        );
    }

    #[test]
    fn test_numeric_collapses_to_double() {
        let data = ColumnData::Numeric(Some(Numeric::new_with_scale(12345, 2)));
        assert_eq!(
            SqlValue::from_column_data(&data).unwrap(),
            SqlValue::Double(123.45)
        );
    }

    #[test]
    fn test_accessors() {
        assert_eq!(SqlValue::SmallInt(9).as_i64(), Some(9));
        assert_eq!(SqlValue::Int(9).as_i32(), Some(9));
        assert_eq!(SqlValue::BigInt(i64::MAX).as_i32(), None);
        assert_eq!(SqlValue::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(SqlValue::String("x".into()).as_str(), Some("x"));
        assert_eq!(SqlValue::String("x".into()).as_i64(), None);
        assert!(SqlValue::Null.is_null());
    }

    #[test]
    fn test_display() {
        assert_eq!(SqlValue::Null.to_string(), "NULL");
        assert_eq!(SqlValue::Int(42).to_string(), "42");
        assert_eq!(SqlValue::String("abc".into()).to_string(), "abc");
        assert_eq!(SqlValue::Binary(vec![0xde, 0xad]).to_string(), "dead");
    }

    #[test]
    fn test_to_sql_round_trip() {
        let value = SqlValue::Int(42);
        assert_eq!(value.to_sql(), ColumnData::I32(Some(42)));

        let value = SqlValue::String("abc".into());
        assert_eq!(value.to_sql(), ColumnData::String(Some("abc".into())));

        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(SqlValue::Date(date).to_sql(), date.to_sql());
    }

    #[test]
    fn test_to_json() {
        assert_eq!(SqlValue::Null.to_json(), JsonValue::Null);
        assert_eq!(SqlValue::Int(1).to_json(), serde_json::json!(1));
        assert_eq!(
            SqlValue::Double(f64::NAN).to_json(),
            JsonValue::Null,
            "non-finite floats have no JSON representation"
        );
        assert_eq!(
            SqlValue::Binary(vec![0xff]).to_json(),
            serde_json::json!("ff")
        );
    }

    #[test]
    fn test_from_impls() {
        assert_eq!(SqlValue::from("x"), SqlValue::String("x".to_string()));
        assert_eq!(SqlValue::from(7i32), SqlValue::Int(7));
        assert_eq!(SqlValue::from(None::<i32>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(7i64)), SqlValue::BigInt(7));
    }
}
