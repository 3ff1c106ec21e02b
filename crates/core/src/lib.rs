//! The tessera execution core: fluent statement builders over compiled
//! record metadata, a lowering engine that turns one logical operation into
//! the physical CQL statements it implies, and three composite operators
//! (batch, sequence, group) with distinct atomicity and ordering contracts.
//!
//! The crate does not speak the CQL wire protocol. It consumes a
//! [`transport::Transport`] that executes physical statements and reports
//! cluster facts; everything above that seam lives here:
//!
//! - [`session`]: the process-wide manager and the explicit [`Session`]
//!   handle threaded through every builder.
//! - [`statement`]: `SELECT`/`INSERT`/`UPDATE`/`DELETE`, schema operations,
//!   raw CQL, and the clause/assignment model.
//! - [`lower`]: the rewrite rules — multi-table fan-out, primary-key
//!   reassignment as delete-then-insert, keyspace-key splitting, and schema
//!   diffing.
//! - [`composite`]: batches (logged, unlogged, counter), sequences, and
//!   groups with recorder hooks, error handlers, and idempotence inference.
//! - [`result`]: composite result sets, typed object streams, and the
//!   parallel executors behind them.

pub mod composite;
pub mod cql;
pub mod error;
pub mod exec;
pub mod lower;
pub mod result;
pub mod retry;
pub mod session;
pub mod statement;
pub mod testing;
pub mod transport;

pub use error::{Error, ExecutionError, LowerError, ObjectValidationError};
pub use session::{Session, SessionConfig};
pub use statement::clause::{Assignment, Clause, Ordering, Using};

/// Commonly used items, one `use` away.
pub mod prelude {
    pub use crate::composite::{Batch, BatchKind, Group, Recorder, Sequence};
    pub use crate::cql::{Consistency, PhysicalStatement};
    pub use crate::error::Error;
    pub use crate::result::{CompositeResultSet, ObjectSet};
    pub use crate::session::Session;
    pub use crate::statement::clause::{Assignment, Clause, Ordering, Using};
    pub use tessera_schema::{
        compile, ClassInfo, FieldDef, KeyspaceDef, KeyspaceKeyMap, RecordDescriptor, Replication, SortOrder,
    };
    pub use tessera_types::{CqlType, CqlValue, RowValues};
}
