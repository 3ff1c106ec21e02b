//! Physical statement values and the CQL text writer.

pub mod keywords;
mod writer;

pub use writer::CqlWriter;

use std::fmt;
use std::time::Duration;

/// Consistency levels the transport understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    Serial,
    LocalSerial,
    LocalOne,
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Consistency::Any => "ANY",
            Consistency::One => "ONE",
            Consistency::Two => "TWO",
            Consistency::Three => "THREE",
            Consistency::Quorum => "QUORUM",
            Consistency::All => "ALL",
            Consistency::LocalQuorum => "LOCAL_QUORUM",
            Consistency::EachQuorum => "EACH_QUORUM",
            Consistency::Serial => "SERIAL",
            Consistency::LocalSerial => "LOCAL_SERIAL",
            Consistency::LocalOne => "LOCAL_ONE",
        })
    }
}

/// What one physical statement does, as far as the engine cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    CreateKeyspace,
    AlterKeyspace,
    CreateType,
    AlterType,
    CreateTable,
    AlterTable,
    CreateIndex,
    Truncate,
    Batch,
    Raw,
}

impl StatementKind {
    /// Reads never mutate and are always safe to retry.
    pub fn is_read(&self) -> bool {
        matches!(self, StatementKind::Select)
    }
}

/// One fully lowered CQL statement, ready for the transport.
///
/// Values are inlined as literals in `cql`; the remaining fields carry the
/// per-statement execution contract the transport honors.
#[derive(Debug, Clone)]
pub struct PhysicalStatement {
    pub cql: String,
    pub keyspace: String,
    pub table: Option<String>,
    pub kind: StatementKind,
    /// Whether the statement carries an `IF` condition.
    pub conditional: bool,
    /// See [`crate::retry`] for how this is derived.
    pub idempotent: bool,
    pub consistency: Option<Consistency>,
    pub serial_consistency: Option<Consistency>,
    pub using_timestamp: Option<i64>,
    pub using_ttl: Option<u32>,
    pub fetch_size: Option<i32>,
    pub read_timeout: Option<Duration>,
    pub tracing: bool,
    pub trace_prefix: Option<String>,
}

impl PhysicalStatement {
    pub(crate) fn new(kind: StatementKind, keyspace: impl Into<String>, cql: impl Into<String>) -> Self {
        Self {
            cql: cql.into(),
            keyspace: keyspace.into(),
            table: None,
            kind,
            conditional: false,
            idempotent: kind.is_read(),
            consistency: None,
            serial_consistency: None,
            using_timestamp: None,
            using_ttl: None,
            fetch_size: None,
            read_timeout: None,
            tracing: false,
            trace_prefix: None,
        }
    }

    pub(crate) fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }
}

impl fmt::Display for PhysicalStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cql)
    }
}
