use crate::CqlValue;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, PartialEq)]
pub enum RowError {
    #[error("column `{0}` is not present in the row")]
    MissingColumn(String),
    #[error("column `{column}` holds a {found} where a {expected} was expected")]
    WrongType {
        column: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// A decoded row: column name to [`CqlValue`], in select order.
///
/// Row builders consume one of these to produce a record. The typed getters
/// return `Ok(None)` for a null column and `Err` for a type mismatch, so a
/// builder can distinguish absent data from corrupt data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowValues {
    columns: IndexMap<String, CqlValue>,
}

macro_rules! typed_getter {
    ($name:ident, $out:ty, $expected:literal, $($pat:pat => $val:expr),+ $(,)?) => {
        pub fn $name(&self, column: &str) -> Result<Option<$out>, RowError> {
            match self.require(column)? {
                CqlValue::Null => Ok(None),
                $($pat => Ok(Some($val)),)+
                other => Err(RowError::WrongType {
                    column: column.to_owned(),
                    expected: $expected,
                    found: other.kind(),
                }),
            }
        }
    };
}

impl RowValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: CqlValue) {
        self.columns.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&CqlValue> {
        self.columns.get(column)
    }

    pub fn require(&self, column: &str) -> Result<&CqlValue, RowError> {
        self.columns
            .get(column)
            .ok_or_else(|| RowError::MissingColumn(column.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CqlValue)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    typed_getter!(text, String, "text", CqlValue::Text(s) => s.clone());
    typed_getter!(boolean, bool, "boolean", CqlValue::Boolean(b) => *b);
    typed_getter!(tinyint, i8, "tinyint", CqlValue::TinyInt(v) => *v);
    typed_getter!(smallint, i16, "smallint", CqlValue::SmallInt(v) => *v);
    typed_getter!(int, i32, "int", CqlValue::Int(v) => *v);
    typed_getter!(bigint, i64, "bigint", CqlValue::BigInt(v) => *v, CqlValue::Counter(v) => *v);
    typed_getter!(double, f64, "double", CqlValue::Double(v) => *v);
    typed_getter!(float, f32, "float", CqlValue::Float(v) => *v);
    typed_getter!(uuid, Uuid, "uuid", CqlValue::Uuid(u) => *u, CqlValue::TimeUuid(u) => *u);
    typed_getter!(timestamp, DateTime<Utc>, "timestamp", CqlValue::Timestamp(t) => *t);
    typed_getter!(blob, bytes::Bytes, "blob", CqlValue::Blob(b) => b.clone());
    typed_getter!(list, Vec<CqlValue>, "list", CqlValue::List(v) => v.clone());
    typed_getter!(set, Vec<CqlValue>, "set", CqlValue::Set(v) => v.clone());
    typed_getter!(map, Vec<(CqlValue, CqlValue)>, "map", CqlValue::Map(v) => v.clone());
}

impl FromIterator<(String, CqlValue)> for RowValues {
    fn from_iter<I: IntoIterator<Item = (String, CqlValue)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn typed_getters_distinguish_null_from_mismatch() {
        let mut row = RowValues::new();
        row.insert("name", CqlValue::Text("ada".into()));
        row.insert("age", CqlValue::Null);

        assert_eq!(row.text("name").unwrap(), Some("ada".to_owned()));
        assert_eq!(row.int("age").unwrap(), None);
        assert_eq!(
            row.int("name"),
            Err(RowError::WrongType {
                column: "name".into(),
                expected: "int",
                found: "text",
            })
        );
        assert_eq!(row.text("missing"), Err(RowError::MissingColumn("missing".into())));
    }
}
