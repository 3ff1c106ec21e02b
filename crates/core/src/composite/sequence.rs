use super::{CompositeInner, ErrorHandler, Recorder};
use crate::error::{Error, LowerError, ObjectValidationError};
use crate::lower::LowerContext;
use crate::result::{CompositeResultFuture, CompositeResultSet};
use crate::session::Session;
use crate::statement::{AnyStatement, Lowered, RecordLeaf, StatementOptions};
use std::sync::Arc;

/// Statements executed strictly one after another: leaf N+1 is submitted
/// only after leaf N's result has arrived. No atomicity — a failure at leaf
/// N leaves leaves 1..N-1 applied.
///
/// Inside a [`super::Group`]'s statement list, a sequence is a barrier.
pub struct Sequence {
    session: Session,
    inner: CompositeInner,
    options: StatementOptions,
}

impl Sequence {
    pub(crate) fn new(session: Session) -> Self {
        Self {
            session,
            inner: CompositeInner::new(),
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

    pub fn add(&mut self, statement: impl AnyStatement + 'static) -> Result<&mut Self, Error> {
        self.inner.add(Arc::new(statement))?;
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

    /// Spawns the execution and returns a cancellable handle to it.
    pub fn submit(self) -> CompositeResultFuture {
        CompositeResultFuture::spawn(move |cancel| async move {
            let result = async {
                if !self.options.enabled {
                    return Ok(CompositeResultSet::new(Vec::new()));
                }
                let observe = self.inner.observed_keyspaces()?;
                let ctx = self.session.lower_context(&observe).await?;
                let plan = AnyStatement::lower(&self, &ctx)?;
                let sets = self.session.execute_plan_with(&plan, &self.options, cancel).await?;
                Ok(CompositeResultSet::new(sets))
            }
            .await;
            if let Err(error) = &result {
                self.inner.handle_error(error);
            }
            result
        })
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

impl AnyStatement for Sequence {
    fn lower(&self, ctx: &LowerContext) -> Result<Lowered, LowerError> {
        if !self.options.enabled {
            return Ok(Lowered::empty());
        }
        let mut children = Vec::with_capacity(self.inner.children.len());
        for child in &self.inner.children {
            if !child.is_enabled() {
                continue;
            }
            children.push(child.lower(ctx)?);
        }
        Ok(Lowered::Sequence(children))
    }

    fn is_enabled(&self) -> bool {
        self.options.enabled
    }

    fn inferred_idempotence(&self) -> bool {
        self.options.idempotent.unwrap_or(self.inner.idempotent_all)
    }

    fn counter_summary(&self) -> (bool, bool) {
        self.inner
            .children
            .iter()
            .fold((false, false), |(c, n), child| {
                let (cc, cn) = child.counter_summary();
                (c || cc, n || cn)
            })
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

crate::statement::impl_statement_options!(Sequence);
