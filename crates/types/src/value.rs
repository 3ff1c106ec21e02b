use crate::CqlType;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use derive_more::From;
use std::fmt;
use std::net::IpAddr;
use uuid::Uuid;

/// A runtime CQL value, independent of any record type.
///
/// Field extractors produce these, codecs move them to and from the wire,
/// and the statement writer renders them as literals. `Null` is an absent
/// value; whether absence round-trips as null or as an empty collection is
/// decided by the column's mandatory-collection flag, not here.
///
/// Each native type converts into the variant CQL treats as its default;
/// ambiguous variants (`Counter`, `TimeUuid`, `Time`, `Set`, `Tuple`, ...)
/// are constructed explicitly.
#[derive(Debug, Clone, PartialEq, From)]
pub enum CqlValue {
    #[from(ignore)]
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    #[from(ignore)]
    Counter(i64),
    /// Two's-complement big-endian magnitude.
    #[from(ignore)]
    VarInt(Vec<u8>),
    Float(f32),
    Double(f64),
    #[from(ignore)]
    Decimal {
        scale: i32,
        unscaled: Vec<u8>,
    },
    Text(String),
    Blob(Bytes),
    Uuid(Uuid),
    #[from(ignore)]
    TimeUuid(Uuid),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    /// Nanoseconds since midnight.
    #[from(ignore)]
    Time(i64),
    Inet(IpAddr),
    List(Vec<CqlValue>),
    #[from(ignore)]
    Set(Vec<CqlValue>),
    Map(Vec<(CqlValue, CqlValue)>),
    #[from(ignore)]
    Tuple(Vec<CqlValue>),
    #[from(ignore)]
    Udt {
        type_name: String,
        fields: Vec<(String, CqlValue)>,
    },
}

impl CqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CqlValue::Null)
    }

    pub fn is_empty_collection(&self) -> bool {
        match self {
            CqlValue::List(v) | CqlValue::Set(v) | CqlValue::Tuple(v) => v.is_empty(),
            CqlValue::Map(v) => v.is_empty(),
            _ => false,
        }
    }

    /// The empty collection value for a collection type, `Null` otherwise.
    pub fn empty_of(ty: &CqlType) -> CqlValue {
        match ty.unfrozen() {
            CqlType::List(_) => CqlValue::List(Vec::new()),
            CqlType::Set(_) => CqlValue::Set(Vec::new()),
            CqlType::Map(..) | CqlType::SortedMap(..) => CqlValue::Map(Vec::new()),
            _ => CqlValue::Null,
        }
    }

    /// A short name for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            CqlValue::Null => "null",
            CqlValue::Boolean(_) => "boolean",
            CqlValue::TinyInt(_) => "tinyint",
            CqlValue::SmallInt(_) => "smallint",
            CqlValue::Int(_) => "int",
            CqlValue::BigInt(_) => "bigint",
            CqlValue::Counter(_) => "counter",
            CqlValue::VarInt(_) => "varint",
            CqlValue::Float(_) => "float",
            CqlValue::Double(_) => "double",
            CqlValue::Decimal { .. } => "decimal",
            CqlValue::Text(_) => "text",
            CqlValue::Blob(_) => "blob",
            CqlValue::Uuid(_) => "uuid",
            CqlValue::TimeUuid(_) => "timeuuid",
            CqlValue::Timestamp(_) => "timestamp",
            CqlValue::Date(_) => "date",
            CqlValue::Time(_) => "time",
            CqlValue::Inet(_) => "inet",
            CqlValue::List(_) => "list",
            CqlValue::Set(_) => "set",
            CqlValue::Map(_) => "map",
            CqlValue::Tuple(_) => "tuple",
            CqlValue::Udt { .. } => "udt",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CqlValue::BigInt(v) | CqlValue::Counter(v) => Some(*v),
            CqlValue::Int(v) => Some(*v as i64),
            CqlValue::SmallInt(v) => Some(*v as i64),
            CqlValue::TinyInt(v) => Some(*v as i64),
            _ => None,
        }
    }
}

impl fmt::Display for CqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CqlValue::Null => f.write_str("null"),
            CqlValue::Text(s) => write!(f, "{s}"),
            CqlValue::Boolean(b) => write!(f, "{b}"),
            CqlValue::TinyInt(v) => write!(f, "{v}"),
            CqlValue::SmallInt(v) => write!(f, "{v}"),
            CqlValue::Int(v) => write!(f, "{v}"),
            CqlValue::BigInt(v) | CqlValue::Counter(v) | CqlValue::Time(v) => write!(f, "{v}"),
            CqlValue::Float(v) => write!(f, "{v}"),
            CqlValue::Double(v) => write!(f, "{v}"),
            CqlValue::Uuid(u) | CqlValue::TimeUuid(u) => write!(f, "{u}"),
            CqlValue::Timestamp(t) => write!(f, "{}", t.timestamp_millis()),
            CqlValue::Date(d) => write!(f, "{d}"),
            CqlValue::Inet(a) => write!(f, "{a}"),
            CqlValue::Blob(b) => write!(f, "0x{}", hex::encode(b)),
            other => write!(f, "{}<..>", other.kind()),
        }
    }
}

impl From<&str> for CqlValue {
    fn from(v: &str) -> Self {
        CqlValue::Text(v.to_owned())
    }
}

impl<V: Into<CqlValue>> From<Option<V>> for CqlValue {
    fn from(v: Option<V>) -> Self {
        v.map(Into::into).unwrap_or(CqlValue::Null)
    }
}
