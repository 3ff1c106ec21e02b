use super::{CompositeInner, ErrorHandler, Recorder};
use crate::error::{Error, LowerError, ObjectValidationError};
use crate::lower::LowerContext;
use crate::result::{CompositeResultFuture, CompositeResultSet, LastResultParallelFuture};
use crate::session::Session;
use crate::statement::{AnyStatement, Lowered, RecordLeaf, StatementOptions};
use std::sync::Arc;

/// Statements executed in parallel waves.
///
/// Walking the statement list in order, leaves accumulate into the current
/// wave until it reaches the parallel factor — or until the next leaf is a
/// [`super::Sequence`], which closes the wave, runs alone, and starts a new
/// one. Every statement of a wave completes before the next wave starts;
/// within a wave there is no ordering at all.
///
/// The parallel factor defaults to the observed cluster node count × 32.
pub struct Group {
    session: Session,
    inner: CompositeInner,
    parallel_factor: Option<usize>,
    options: StatementOptions,
}

impl Group {
    pub(crate) fn new(session: Session) -> Self {
        Self {
            session,
            inner: CompositeInner::new(),
            parallel_factor: None,
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

    /// Caps how many statements run concurrently within a wave.
    pub fn parallel_factor(mut self, factor: usize) -> Self {
        self.parallel_factor = Some(factor.max(1));
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

    /// Spawns the execution and resolves with the last completed
    /// statement's result only.
    pub fn submit_last(self) -> LastResultParallelFuture {
        LastResultParallelFuture::spawn(move |cancel| async move {
            let result = async {
                if !self.options.enabled {
                    return Ok(None);
                }
                let observe = self.inner.observed_keyspaces()?;
                let ctx = self.session.lower_context(&observe).await?;
                let plan = AnyStatement::lower(&self, &ctx)?;
                let mut sets = self.session.execute_plan_with(&plan, &self.options, cancel).await?;
                Ok(sets.pop())
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

impl AnyStatement for Group {
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
        Ok(Lowered::Group {
            children,
            parallel_factor: self.parallel_factor,
        })
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

crate::statement::impl_statement_options!(Group);
