//! The seam between the execution core and the CQL wire client.
//!
//! The core lowers statements and decides composition; everything that
//! touches a socket lives behind [`Transport`]. Implementations classify
//! protocol failures into [`ExecutionError`] variants at this boundary —
//! notably "keyspace does not exist", which must arrive as
//! [`ExecutionError::UnknownKeyspace`] and never as message text to be
//! pattern-matched upstream.

use crate::cql::{Consistency, PhysicalStatement};
use crate::error::ExecutionError;
use async_trait::async_trait;
use bytes::Bytes;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::time::Duration;
use tessera_schema::Replication;
use tessera_types::CqlType;

/// One undecoded row: column name to optional cell bytes, in select order.
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    columns: Vec<(String, Option<Bytes>)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, bytes: Option<Bytes>) {
        self.columns.push((column.into(), bytes));
    }

    pub fn get(&self, column: &str) -> Option<&Option<Bytes>> {
        self.columns
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(column))
            .map(|(_, b)| b)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Bytes>)> {
        self.columns.iter().map(|(c, b)| (c.as_str(), b.as_ref()))
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<C: Into<String>> FromIterator<(C, Option<Bytes>)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (C, Option<Bytes>)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().map(|(c, b)| (c.into(), b)).collect(),
        }
    }
}

/// One physical statement's result, with its paging cursor.
///
/// `next_row` only drains rows already fetched; when it runs dry and
/// [`RawResultSet::is_fully_fetched`] is false, [`RawResultSet::fetch_more`]
/// pulls the next page. Dropping a result set abandons any pending fetch.
#[async_trait]
pub trait RawResultSet: Send {
    /// The next already-fetched row, if any.
    fn next_row(&mut self) -> Option<RawRow>;

    fn available_without_fetching(&self) -> usize;

    fn is_fully_fetched(&self) -> bool;

    /// Fetches the next page; returns false when there was none.
    async fn fetch_more(&mut self) -> Result<bool, ExecutionError>;

    /// Conditional-statement outcome; unconditional statements report true.
    fn was_applied(&self) -> bool;
}

/// Cluster facts the engine needs for sizing and schema work.
#[derive(Debug, Clone)]
pub struct ClusterMetadata {
    pub nodes: usize,
    pub data_centers: Vec<String>,
}

/// Transport-level defaults, consulted when a statement sets nothing.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub default_consistency: Consistency,
    pub default_serial_consistency: Consistency,
    pub default_idempotence: bool,
    pub read_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            default_consistency: Consistency::LocalQuorum,
            default_serial_consistency: Consistency::Serial,
            default_idempotence: false,
            read_timeout: Duration::from_secs(12),
        }
    }
}

/// A table as it exists on the cluster, for `ALTER` diffing.
#[derive(Debug, Clone, Default)]
pub struct ObservedTable {
    pub columns: IndexMap<String, CqlType>,
    pub partition_key: Vec<String>,
    pub clustering_key: Vec<String>,
}

/// A keyspace as it exists on the cluster.
#[derive(Debug, Clone)]
pub struct ObservedKeyspace {
    pub name: String,
    pub replication: Replication,
    pub durable_writes: bool,
    pub tables: HashMap<String, ObservedTable>,
    pub udts: HashMap<String, Vec<(String, CqlType)>>,
}

/// The async CQL client the core drives.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn execute(&self, statement: &PhysicalStatement) -> Result<Box<dyn RawResultSet>, ExecutionError>;

    fn cluster_metadata(&self) -> ClusterMetadata;

    fn configuration(&self) -> TransportConfig;

    /// The keyspace's current schema, or `None` when it does not exist.
    async fn observe_schema(&self, keyspace: &str) -> Result<Option<ObservedKeyspace>, ExecutionError>;
}
