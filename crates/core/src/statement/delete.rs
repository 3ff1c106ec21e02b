use super::clause::Clause;
use super::{impl_statement_options, AnyStatement, Lowered, RecordLeaf, StatementOptions};
use crate::error::{Error, LowerError, ObjectValidationError};
use crate::lower::dml::{self, DeleteSpec};
use crate::lower::LowerContext;
use crate::result::{CompositeResultSet, ObjectSet};
use crate::session::Session;
use std::any::Any;
use std::sync::Arc;
use tessera_schema::ClassInfo;

/// A DELETE across every table of a record type.
///
/// Built either from a record (whose identity becomes the default WHERE) or
/// bare, with explicit clauses. Naming columns deletes those cells instead
/// of whole rows.
pub struct Delete<T> {
    session: Session,
    class: Arc<ClassInfo<T>>,
    record: Option<Arc<T>>,
    columns: Vec<String>,
    wheres: Vec<Clause>,
    conditions: Vec<Clause>,
    if_exists: bool,
    options: StatementOptions,
}

impl<T: Send + Sync + 'static> Delete<T> {
    pub(crate) fn new(session: Session, class: Arc<ClassInfo<T>>, record: Option<T>) -> Self {
        Self {
            session,
            class,
            record: record.map(Arc::new),
            columns: Vec::new(),
            wheres: Vec::new(),
            conditions: Vec::new(),
            if_exists: false,
            options: StatementOptions::default(),
        }
    }

    /// Deletes only the named columns' cells.
    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn where_(mut self, clause: Clause) -> Self {
        self.wheres.push(clause);
        self
    }

    pub fn and(self, clause: Clause) -> Self {
        self.where_(clause)
    }

    pub fn if_condition(mut self, clause: Clause) -> Self {
        self.conditions.push(clause);
        self
    }

    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
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
}

impl<T: Send + Sync + 'static> AnyStatement for Delete<T> {
    fn lower(&self, ctx: &LowerContext) -> Result<Lowered, LowerError> {
        if !self.options.enabled {
            return Ok(Lowered::empty());
        }
        dml::lower_delete(
            ctx,
            &self.class,
            &DeleteSpec {
                record: self.record.as_deref(),
                columns: &self.columns,
                wheres: &self.wheres,
                conditions: &self.conditions,
                if_exists: self.if_exists,
                options: &self.options,
            },
        )
    }

    fn is_enabled(&self) -> bool {
        self.options.enabled
    }

    fn inferred_idempotence(&self) -> bool {
        self.options.idempotent.unwrap_or(true)
    }

    fn visit_record_leaves(
        &self,
        visit: &mut dyn FnMut(&dyn RecordLeaf) -> Result<(), ObjectValidationError>,
    ) -> Result<(), ObjectValidationError> {
        if self.record.is_some() {
            visit(self)?;
        }
        Ok(())
    }
}

impl<T: Send + Sync + 'static> RecordLeaf for Delete<T> {
    fn record_type(&self) -> &str {
        self.class.name()
    }

    fn operation(&self) -> &'static str {
        "delete"
    }

    fn record_any(&self) -> &dyn Any {
        self.record
            .as_deref()
            .map(|r| r as &dyn Any)
            .unwrap_or(&())
    }
}

impl_statement_options!(Delete<T>);
