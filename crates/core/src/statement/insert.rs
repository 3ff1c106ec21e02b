use super::{impl_statement_options, AnyStatement, Lowered, RecordLeaf, StatementOptions};
use crate::error::{Error, LowerError, ObjectValidationError};
use crate::lower::dml::{self, InsertSpec};
use crate::lower::LowerContext;
use crate::result::{CompositeResultSet, ObjectSet};
use crate::session::Session;
use std::any::Any;
use std::sync::Arc;
use tessera_schema::ClassInfo;

/// An INSERT of one record, fanned out to every table of its type.
///
/// With `IF NOT EXISTS`, the condition applies per table and the logical
/// insert counts as applied only when every per-table statement applied.
pub struct Insert<T> {
    session: Session,
    class: Arc<ClassInfo<T>>,
    record: Arc<T>,
    if_not_exists: bool,
    options: StatementOptions,
}

impl<T: Send + Sync + 'static> Insert<T> {
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
            if_not_exists: false,
            options: StatementOptions::default(),
        })
    }

    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
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

    /// Executes and reports a conditional failure as [`Error::ObjectExists`].
    pub async fn execute_applied(&self) -> Result<(), Error> {
        let set = self.execute().await?;
        if self.if_not_exists && !set.was_applied() {
            return Err(Error::ObjectExists);
        }
        Ok(())
    }
}

impl<T: Send + Sync + 'static> AnyStatement for Insert<T> {
    fn lower(&self, ctx: &LowerContext) -> Result<Lowered, LowerError> {
        if !self.options.enabled {
            return Ok(Lowered::empty());
        }
        dml::lower_insert(
            ctx,
            &self.class,
            &InsertSpec {
                record: &*self.record,
                if_not_exists: self.if_not_exists,
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
        visit(self)
    }
}

impl<T: Send + Sync + 'static> RecordLeaf for Insert<T> {
    fn record_type(&self) -> &str {
        self.class.name()
    }

    fn operation(&self) -> &'static str {
        "insert"
    }

    fn record_any(&self) -> &dyn Any {
        &*self.record
    }
}

impl_statement_options!(Insert<T>);
