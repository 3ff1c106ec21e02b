//! The three composition operators and what they guarantee:
//!
//! | operator | atomicity | order | parallelism |
//! |---|---|---|---|
//! | [`Batch`] (logged) | storage-defined, all-or-nothing | batch-defined | one round trip |
//! | [`Batch`] (unlogged) | none | unspecified | one round trip |
//! | [`Batch`] (counter) | counter-safe | unspecified | one round trip |
//! | [`Sequence`] | none | strict, result-before-next | 1 |
//! | [`Group`] | none | parallel waves, sequenced | bounded |
//!
//! All three share compose-time recorder hooks, error handlers invoked once
//! per failed execution, an enable flag, and incremental idempotence
//! inference: a composite is idempotent iff every leaf is.

mod batch;
mod group;
mod sequence;

pub use batch::{Batch, BatchKind};
pub use group::Group;
pub use sequence::Sequence;

use crate::error::{Error, ObjectValidationError};
use crate::statement::{AnyStatement, RecordLeaf};
use std::sync::Arc;

/// Compose-time hook observing every record-bearing leaf added to a
/// composite, recursively. A recorder may reject a leaf; rejection
/// surfaces immediately and the leaf is not added.
pub trait Recorder: Send + Sync {
    fn record(&self, leaf: &dyn RecordLeaf) -> Result<(), ObjectValidationError>;
}

pub type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// State shared by all three operators.
pub(crate) struct CompositeInner {
    pub(crate) children: Vec<Arc<dyn AnyStatement>>,
    pub(crate) recorder: Option<Arc<dyn Recorder>>,
    pub(crate) handlers: Vec<ErrorHandler>,
    /// AND over every child added so far.
    pub(crate) idempotent_all: bool,
}

impl CompositeInner {
    pub(crate) fn new() -> Self {
        Self {
            children: Vec::new(),
            recorder: None,
            handlers: Vec::new(),
            idempotent_all: true,
        }
    }

    /// Runs the recorder over the statement's record leaves, then adopts it.
    pub(crate) fn add(&mut self, statement: Arc<dyn AnyStatement>) -> Result<(), Error> {
        if let Some(recorder) = &self.recorder {
            statement.visit_record_leaves(&mut |leaf| recorder.record(leaf))?;
        }
        self.idempotent_all &= statement.inferred_idempotence();
        self.children.push(statement);
        Ok(())
    }

    /// Invokes the error handlers, in registration order, exactly once.
    pub(crate) fn handle_error(&self, error: &Error) {
        for handler in &self.handlers {
            handler(error);
        }
    }

    pub(crate) fn observed_keyspaces(&self) -> Result<Vec<String>, crate::error::LowerError> {
        let mut out = Vec::new();
        for child in &self.children {
            for keyspace in child.keyspaces_to_observe()? {
                if !out.contains(&keyspace) {
                    out.push(keyspace);
                }
            }
        }
        Ok(out)
    }
}
