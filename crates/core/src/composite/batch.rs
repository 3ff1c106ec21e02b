use super::{CompositeInner, ErrorHandler, Recorder};
use crate::cql::{PhysicalStatement, StatementKind};
use crate::error::{Error, LowerError, ObjectValidationError};
use crate::lower::{apply_options, effective_usings, render_using, LowerContext};
use crate::result::CompositeResultSet;
use crate::session::Session;
use crate::statement::{AnyStatement, Lowered, RecordLeaf, StatementOptions};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Logged,
    Unlogged,
    Counter,
}

/// A CQL batch: every leaf travels in one round trip.
///
/// Logged batches are atomic as the storage layer defines; unlogged ones
/// trade that away for speed. Counter batches carry only counter updates,
/// and mixing counter with non-counter leaves is rejected when the leaf is
/// added, not at execution.
pub struct Batch {
    session: Session,
    kind: BatchKind,
    inner: CompositeInner,
    has_counter: bool,
    has_non_counter: bool,
    options: StatementOptions,
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("kind", &self.kind)
            .field("has_counter", &self.has_counter)
            .field("has_non_counter", &self.has_non_counter)
            .finish()
    }
}

impl Batch {
    pub(crate) fn new(session: Session, kind: BatchKind) -> Self {
        Self {
            session,
            kind,
            inner: CompositeInner::new(),
            has_counter: false,
            has_non_counter: false,
            options: StatementOptions::default(),
        }
    }

    /// Installs the recorder; set it before adding leaves.
    pub fn recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
        self.inner.recorder = Some(recorder);
        self
    }

    pub fn on_error(mut self, handler: ErrorHandler) -> Self {
        self.inner.handlers.push(handler);
        self
    }

    /// Adds a leaf, enforcing the counter rules of this batch kind.
    pub fn add(&mut self, statement: impl AnyStatement + 'static) -> Result<&mut Self, Error> {
        let statement: Arc<dyn AnyStatement> = Arc::new(statement);
        let (counter, non_counter) = statement.counter_summary();
        match self.kind {
            BatchKind::Counter => {
                if non_counter {
                    return Err(Error::Lower(LowerError::CounterMixedWithNonCounter));
                }
            }
            BatchKind::Logged | BatchKind::Unlogged => {
                if (self.has_counter && non_counter) || (self.has_non_counter && counter) || (counter && non_counter) {
                    return Err(Error::Lower(LowerError::CounterMixedWithNonCounter));
                }
            }
        }
        self.inner.add(statement)?;
        self.has_counter |= counter;
        self.has_non_counter |= non_counter;
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.children.is_empty()
    }

    pub async fn execute(&self) -> Result<CompositeResultSet, Error> {
        let result = self.run().await;
        if let Err(error) = &result {
            self.inner.handle_error(error);
        }
        result
    }

    async fn run(&self) -> Result<CompositeResultSet, Error> {
        if !self.options.enabled {
            return Ok(CompositeResultSet::new(Vec::new()));
        }
        let observe = self.inner.observed_keyspaces()?;
        let ctx = self.session.lower_context(&observe).await?;
        let plan = AnyStatement::lower(self, &ctx)?;
        let sets = self.session.execute_plan(&plan, &self.options).await?;
        Ok(CompositeResultSet::new(sets))
    }
}

impl AnyStatement for Batch {
    fn lower(&self, ctx: &LowerContext) -> Result<Lowered, LowerError> {
        if !self.options.enabled {
            return Ok(Lowered::empty());
        }
        let mut leaves: Vec<PhysicalStatement> = Vec::new();
        for child in &self.inner.children {
            if !child.is_enabled() {
                continue;
            }
            let lowered = child.lower(ctx)?;
            leaves.extend(lowered.statements().into_iter().cloned());
        }
        if leaves.is_empty() {
            return Ok(Lowered::empty());
        }
        if leaves.len() == 1 {
            // A batch of one is just its statement.
            return Ok(Lowered::Statement(leaves.pop().unwrap()));
        }

        let keyspace = leaves[0].keyspace.clone();
        let conditional = leaves.iter().any(|s| s.conditional);
        let mut cql = String::from(match self.kind {
            BatchKind::Logged => "BEGIN BATCH",
            BatchKind::Unlogged => "BEGIN UNLOGGED BATCH",
            BatchKind::Counter => "BEGIN COUNTER BATCH",
        });
        let (timestamp, ttl) = effective_usings(&self.options, ctx);
        if timestamp.is_some() || ttl.is_some() {
            let mut w = crate::cql::CqlWriter::new();
            render_using(&mut w, timestamp, ttl);
            cql.push_str(&w.finish());
        }
        for leaf in &leaves {
            cql.push(' ');
            cql.push_str(&leaf.cql);
            cql.push(';');
        }
        cql.push_str(" APPLY BATCH");

        let mut stmt = PhysicalStatement::new(StatementKind::Batch, keyspace, cql);
        stmt.conditional = conditional;
        apply_options(&mut stmt, &self.options, ctx, self.inner.idempotent_all);
        Ok(Lowered::Statement(stmt))
    }

    fn is_enabled(&self) -> bool {
        self.options.enabled
    }

    fn inferred_idempotence(&self) -> bool {
        self.options.idempotent.unwrap_or(self.inner.idempotent_all)
    }

    fn counter_summary(&self) -> (bool, bool) {
        (self.has_counter, self.has_non_counter)
    }

    fn visit_record_leaves(
        &self,
        visit: &mut dyn FnMut(&dyn RecordLeaf) -> Result<(), ObjectValidationError>,
    ) -> Result<(), ObjectValidationError> {
        for child in &self.inner.children {
            child.visit_record_leaves(visit)?;
        }
        Ok(())
    }

    fn keyspaces_to_observe(&self) -> Result<Vec<String>, LowerError> {
        self.inner.observed_keyspaces()
    }
}

crate::statement::impl_statement_options!(Batch);
