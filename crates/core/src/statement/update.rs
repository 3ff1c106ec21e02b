use super::clause::{Assignment, Clause};
use super::{impl_statement_options, AnyStatement, Lowered, RecordLeaf, StatementOptions};
use crate::error::{Error, LowerError, ObjectValidationError};
use crate::lower::dml::{self, UpdateSpec};
use crate::lower::LowerContext;
use crate::result::{CompositeResultSet, ObjectSet};
use crate::session::Session;
use std::any::Any;
use std::sync::Arc;
use tessera_schema::ClassInfo;

/// An UPDATE of one record across every table of its type.
///
/// An empty assignment list means "set every non-key column from the
/// record"; an empty where-list means "this record's identity". Assigning a
/// new value to a primary-key column rewrites the whole operation as
/// delete-then-insert per table (see the lowering engine).
pub struct Update<T> {
    session: Session,
    class: Arc<ClassInfo<T>>,
    record: Arc<T>,
    assignments: Vec<Assignment>,
    wheres: Vec<Clause>,
    conditions: Vec<Clause>,
    if_exists: bool,
    options: StatementOptions,
}

impl<T: Send + Sync + 'static> Update<T> {
    pub(crate) fn new(session: Session, class: Arc<ClassInfo<T>>, record: T) -> Result<Self, Error> {
        class.validate(&record).map_err(|message| {
            Error::Validation(ObjectValidationError {
                record_type: class.name().to_owned(),
                message,
            })
        })?;
        Ok(Self {
            session,
            class,
            record: Arc::new(record),
            assignments: Vec::new(),
            wheres: Vec::new(),
            conditions: Vec::new(),
            if_exists: false,
            options: StatementOptions::default(),
        })
    }

    pub fn assign(mut self, assignment: Assignment) -> Self {
        self.assignments.push(assignment);
        self
    }

    pub fn set(self, column: &str, value: impl Into<tessera_types::CqlValue>) -> Self {
        self.assign(Assignment::set(column, value))
    }

    /// Records the previous value of a primary-key column, so a key
    /// reassignment deletes the right old row.
    pub fn previous(self, column: &str, value: impl Into<tessera_types::CqlValue>) -> Self {
        self.assign(Assignment::previous(column, value))
    }

    pub fn where_(mut self, clause: Clause) -> Self {
        self.wheres.push(clause);
        self
    }

    pub fn and(self, clause: Clause) -> Self {
        self.where_(clause)
    }

    /// Adds an `IF` condition; the update applies only when it holds.
    pub fn if_condition(mut self, clause: Clause) -> Self {
        self.conditions.push(clause);
        self
    }

    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
    }

    fn spec(&self) -> UpdateSpec<'_, T> {
        UpdateSpec {
            record: &self.record,
            assignments: &self.assignments,
            wheres: &self.wheres,
            conditions: &self.conditions,
            if_exists: self.if_exists,
            options: &self.options,
        }
    }

    pub async fn execute(&self) -> Result<ObjectSet<T>, Error> {
        if !self.options.enabled {
            return Ok(ObjectSet::empty(self.class.clone()));
        }
        let ctx = self.session.lower_context(&[]).await?;
        let plan = AnyStatement::lower(self, &ctx)?;
        let sets = self.session.execute_plan(&plan, &self.options).await?;
        Ok(ObjectSet::new(self.class.clone(), CompositeResultSet::new(sets)))
    }

    /// Executes and surfaces a failed `IF` as [`Error::UpdateNotApplied`],
    /// carrying the row the condition saw.
    pub async fn execute_applied(&self) -> Result<(), Error> {
        let conditional = self.if_exists || !self.conditions.is_empty();
        let mut set = self.execute().await?;
        if conditional && !set.was_applied() {
            let row = set.one_raw_values().await?;
            return Err(Error::UpdateNotApplied { row });
        }
        Ok(())
    }
}

impl<T: Send + Sync + 'static> AnyStatement for Update<T> {
    fn lower(&self, ctx: &LowerContext) -> Result<Lowered, LowerError> {
        if !self.options.enabled {
            return Ok(Lowered::empty());
        }
        dml::lower_update(ctx, &self.class, &self.spec())
    }

    fn is_enabled(&self) -> bool {
        self.options.enabled
    }

    fn inferred_idempotence(&self) -> bool {
        self.options
            .idempotent
            .unwrap_or_else(|| dml::update_is_idempotent(&self.assignments))
    }

    fn is_counter_update(&self) -> bool {
        self.assignments.iter().any(Assignment::is_counter)
    }

    fn visit_record_leaves(
        &self,
        visit: &mut dyn FnMut(&dyn RecordLeaf) -> Result<(), ObjectValidationError>,
    ) -> Result<(), ObjectValidationError> {
        visit(self)
    }
}

impl<T: Send + Sync + 'static> RecordLeaf for Update<T> {
    fn record_type(&self) -> &str {
        self.class.name()
    }

    fn operation(&self) -> &'static str {
        "update"
    }

    fn record_any(&self) -> &dyn Any {
        &*self.record
    }
}

impl_statement_options!(Update<T>);
