//! Statement builders and the common machinery behind them.

pub mod clause;
mod ddl;
mod delete;
mod insert;
mod raw;
mod select;
mod update;

pub use ddl::{AlterSchema, CreateSchema, SchemaOp, Schemas, Truncate};
pub(crate) use ddl::SelectedClass;
pub use delete::Delete;
pub use insert::Insert;
pub use raw::RawCql;
pub use select::Select;
pub use update::Update;

use crate::cql::{Consistency, PhysicalStatement};
use crate::error::{LowerError, ObjectValidationError};
use crate::lower::LowerContext;
use clause::Using;
use std::any::Any;
use std::time::Duration;

/// Options shared by every statement, logical or composite.
#[derive(Debug, Clone)]
pub struct StatementOptions {
    pub(crate) consistency: Option<Consistency>,
    pub(crate) serial_consistency: Option<Consistency>,
    pub(crate) idempotent: Option<bool>,
    pub(crate) fetch_size: Option<i32>,
    pub(crate) read_timeout: Option<Duration>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) tracing: bool,
    pub(crate) trace_prefix: Option<String>,
    pub(crate) enabled: bool,
    pub(crate) usings: Vec<Using>,
}

impl Default for StatementOptions {
    fn default() -> Self {
        Self {
            consistency: None,
            serial_consistency: None,
            idempotent: None,
            fetch_size: None,
            read_timeout: None,
            timeout: None,
            tracing: false,
            trace_prefix: None,
            enabled: true,
            usings: Vec::new(),
        }
    }
}

/// A lowered statement tree.
///
/// Leaves are physical statements; interior nodes record how their children
/// may be scheduled. A `Sequence` is a barrier wherever it appears inside a
/// `Group`'s statement list.
#[derive(Debug, Clone)]
pub enum Lowered {
    Statement(PhysicalStatement),
    Sequence(Vec<Lowered>),
    Group {
        children: Vec<Lowered>,
        parallel_factor: Option<usize>,
    },
}

impl Lowered {
    pub(crate) fn group(children: Vec<Lowered>) -> Self {
        Lowered::Group {
            children,
            parallel_factor: None,
        }
    }

    /// Collapses a single-child composition to its child.
    pub(crate) fn group_or_single(mut children: Vec<Lowered>) -> Self {
        if children.len() == 1 {
            children.pop().unwrap()
        } else {
            Lowered::group(children)
        }
    }

    pub(crate) fn empty() -> Self {
        Lowered::group(Vec::new())
    }

    /// Every physical statement, in execution-plan order.
    pub fn statements(&self) -> Vec<&PhysicalStatement> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a PhysicalStatement>) {
        match self {
            Lowered::Statement(s) => out.push(s),
            Lowered::Sequence(children) | Lowered::Group { children, .. } => {
                for c in children {
                    c.collect(out);
                }
            }
        }
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            Lowered::Statement(_) => 1,
            Lowered::Sequence(children) | Lowered::Group { children, .. } => {
                children.iter().map(Lowered::leaf_count).sum()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count() == 0
    }
}

/// What a recorder hook gets to see of a record-bearing leaf.
pub trait RecordLeaf {
    fn record_type(&self) -> &str;

    /// `"insert"`, `"update"`, or `"delete"`.
    fn operation(&self) -> &'static str;

    /// The record itself, for downcasting recorders.
    fn record_any(&self) -> &dyn Any;
}

/// Object-safe face of every statement, so composites can hold any mix.
pub trait AnyStatement: Send + Sync {
    /// Lowers this statement against its compiled metadata.
    fn lower(&self, ctx: &LowerContext) -> Result<Lowered, LowerError>;

    fn is_enabled(&self) -> bool;

    /// Idempotence after applying the explicit override, if any.
    fn inferred_idempotence(&self) -> bool;

    /// Whether this statement mutates counters.
    fn is_counter_update(&self) -> bool {
        false
    }

    /// (has counter leaves, has non-counter leaves) — for batch composition.
    fn counter_summary(&self) -> (bool, bool) {
        let counter = self.is_counter_update();
        (counter, !counter)
    }

    /// Visits every record-bearing leaf, recursively, for recorder hooks.
    fn visit_record_leaves(
        &self,
        _visit: &mut dyn FnMut(&dyn RecordLeaf) -> Result<(), ObjectValidationError>,
    ) -> Result<(), ObjectValidationError> {
        Ok(())
    }

    /// Physical keyspaces whose cluster schema must be observed before this
    /// statement can lower (schema diffing).
    fn keyspaces_to_observe(&self) -> Result<Vec<String>, LowerError> {
        Ok(Vec::new())
    }
}

/// Implements the fluent option setters a statement shares with every other.
macro_rules! impl_statement_options {
    ($ty:ident $(< $generic:ident >)?) => {
        impl$(<$generic: Send + Sync + 'static>)? $ty$(<$generic>)? {
            pub fn consistency(mut self, consistency: crate::cql::Consistency) -> Self {
                self.options.consistency = Some(consistency);
                self
            }

            pub fn serial_consistency(mut self, consistency: crate::cql::Consistency) -> Self {
                self.options.serial_consistency = Some(consistency);
                self
            }

            pub fn idempotent(mut self, idempotent: bool) -> Self {
                self.options.idempotent = Some(idempotent);
                self
            }

            pub fn fetch_size(mut self, rows: i32) -> Self {
                self.options.fetch_size = Some(rows);
                self
            }

            pub fn read_timeout(mut self, timeout: std::time::Duration) -> Self {
                self.options.read_timeout = Some(timeout);
                self
            }

            /// Deadline for the whole operation, composites included.
            pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
                self.options.timeout = Some(timeout);
                self
            }

            pub fn tracing(mut self, prefix: Option<String>) -> Self {
                self.options.tracing = true;
                self.options.trace_prefix = prefix;
                self
            }

            pub fn using(mut self, using: crate::statement::clause::Using) -> Self {
                self.options.usings.push(using);
                self
            }

            /// A disabled statement executes as a no-op with an empty result.
            pub fn disable(mut self) -> Self {
                self.options.enabled = false;
                self
            }

            pub fn enable(mut self, enabled: bool) -> Self {
                self.options.enabled = enabled;
                self
            }
        }
    };
}

pub(crate) use impl_statement_options;
