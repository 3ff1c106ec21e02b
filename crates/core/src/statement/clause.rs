//! The value types a statement is built from: where-clauses, assignments,
//! orderings, and `USING` options.

use tessera_schema::SortOrder;
use tessera_types::CqlValue;

/// A `WHERE` predicate.
///
/// The three record-derived variants carry no values of their own; they
/// expand against the statement's bound record at lowering time. Clauses on
/// keyspace-key columns never reach the CQL text — they select the physical
/// keyspace instead, and an `In` over a keyspace key splits the statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Eq { column: String, value: CqlValue },
    In { column: String, values: Vec<CqlValue> },
    Lt { column: String, value: CqlValue },
    Lte { column: String, value: CqlValue },
    Gt { column: String, value: CqlValue },
    Gte { column: String, value: CqlValue },
    /// Equality on every primary-key column of the record.
    IsObject,
    /// Equality on the partition-key columns of the record.
    IsPartitionedLike,
    /// Keyspace-key selection from the record; no physical predicate.
    IsSuffixedLike,
}

impl Clause {
    pub fn eq(column: impl Into<String>, value: impl Into<CqlValue>) -> Self {
        Clause::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn in_list<V: Into<CqlValue>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Clause::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn lt(column: impl Into<String>, value: impl Into<CqlValue>) -> Self {
        Clause::Lt {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn lte(column: impl Into<String>, value: impl Into<CqlValue>) -> Self {
        Clause::Lte {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn gt(column: impl Into<String>, value: impl Into<CqlValue>) -> Self {
        Clause::Gt {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn gte(column: impl Into<String>, value: impl Into<CqlValue>) -> Self {
        Clause::Gte {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn is_object() -> Self {
        Clause::IsObject
    }

    pub fn is_partitioned_like() -> Self {
        Clause::IsPartitionedLike
    }

    pub fn is_suffixed_like() -> Self {
        Clause::IsSuffixedLike
    }

    /// The column this clause constrains, when it names one.
    pub fn column(&self) -> Option<&str> {
        match self {
            Clause::Eq { column, .. }
            | Clause::In { column, .. }
            | Clause::Lt { column, .. }
            | Clause::Lte { column, .. }
            | Clause::Gt { column, .. }
            | Clause::Gte { column, .. } => Some(column),
            _ => None,
        }
    }

    pub(crate) fn operator(&self) -> &'static str {
        match self {
            Clause::Eq { .. } => "=",
            Clause::Lt { .. } => "<",
            Clause::Lte { .. } => "<=",
            Clause::Gt { .. } => ">",
            Clause::Gte { .. } => ">=",
            Clause::In { .. } => "IN",
            _ => "=",
        }
    }
}

/// A `SET` assignment (or counter mutation) in an `UPDATE`.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    Set { column: String, value: CqlValue },
    /// Supplies the previous value of a primary-key column without being a
    /// real assignment; consumed by the reassignment rewrite.
    SetPrevious { column: String, previous: CqlValue },
    Incr { column: String, delta: i64 },
    Decr { column: String, delta: i64 },
    Prepend { column: String, values: Vec<CqlValue> },
    Append { column: String, values: Vec<CqlValue> },
    Discard { column: String, values: Vec<CqlValue> },
    SetAt { column: String, index: i32, value: CqlValue },
    AddToSet { column: String, values: Vec<CqlValue> },
    RemoveFromSet { column: String, values: Vec<CqlValue> },
    Put { column: String, key: CqlValue, value: CqlValue },
    /// Every non-key column takes its value from the record.
    SetAllFromRecord,
}

impl Assignment {
    pub fn set(column: impl Into<String>, value: impl Into<CqlValue>) -> Self {
        Assignment::Set {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn previous(column: impl Into<String>, previous: impl Into<CqlValue>) -> Self {
        Assignment::SetPrevious {
            column: column.into(),
            previous: previous.into(),
        }
    }

    pub fn incr(column: impl Into<String>) -> Self {
        Self::incr_by(column, 1)
    }

    pub fn incr_by(column: impl Into<String>, delta: i64) -> Self {
        Assignment::Incr {
            column: column.into(),
            delta,
        }
    }

    pub fn decr(column: impl Into<String>) -> Self {
        Self::decr_by(column, 1)
    }

    pub fn decr_by(column: impl Into<String>, delta: i64) -> Self {
        Assignment::Decr {
            column: column.into(),
            delta,
        }
    }

    pub fn prepend<V: Into<CqlValue>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Assignment::Prepend {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn append<V: Into<CqlValue>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Assignment::Append {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn discard<V: Into<CqlValue>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Assignment::Discard {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn set_at(column: impl Into<String>, index: i32, value: impl Into<CqlValue>) -> Self {
        Assignment::SetAt {
            column: column.into(),
            index,
            value: value.into(),
        }
    }

    pub fn add<V: Into<CqlValue>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Assignment::AddToSet {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn remove<V: Into<CqlValue>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Assignment::RemoveFromSet {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn put(column: impl Into<String>, key: impl Into<CqlValue>, value: impl Into<CqlValue>) -> Self {
        Assignment::Put {
            column: column.into(),
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn set_all_from_record() -> Self {
        Assignment::SetAllFromRecord
    }

    pub fn column(&self) -> Option<&str> {
        match self {
            Assignment::Set { column, .. }
            | Assignment::SetPrevious { column, .. }
            | Assignment::Incr { column, .. }
            | Assignment::Decr { column, .. }
            | Assignment::Prepend { column, .. }
            | Assignment::Append { column, .. }
            | Assignment::Discard { column, .. }
            | Assignment::SetAt { column, .. }
            | Assignment::AddToSet { column, .. }
            | Assignment::RemoveFromSet { column, .. }
            | Assignment::Put { column, .. } => Some(column),
            Assignment::SetAllFromRecord => None,
        }
    }

    /// Counter mutations and list prepends/appends do not replay safely.
    pub fn is_idempotent(&self) -> bool {
        !matches!(
            self,
            Assignment::Incr { .. } | Assignment::Decr { .. } | Assignment::Prepend { .. } | Assignment::Append { .. }
        )
    }

    pub fn is_counter(&self) -> bool {
        matches!(self, Assignment::Incr { .. } | Assignment::Decr { .. })
    }
}

/// `ORDER BY column ASC|DESC`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ordering {
    pub column: String,
    pub order: SortOrder,
}

impl Ordering {
    pub fn asc(column: impl Into<String>) -> Self {
        Ordering {
            column: column.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Ordering {
            column: column.into(),
            order: SortOrder::Desc,
        }
    }
}

/// A `USING` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Using {
    /// Write timestamp in microseconds.
    Timestamp(i64),
    /// Time-to-live in seconds.
    Ttl(u32),
}
