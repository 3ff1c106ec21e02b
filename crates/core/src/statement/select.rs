use super::clause::{Clause, Ordering};
use super::{impl_statement_options, AnyStatement, Lowered, StatementOptions};
use crate::error::{Error, LowerError};
use crate::lower::dml::{self, SelectSpec};
use crate::lower::LowerContext;
use crate::result::ObjectSet;
use crate::session::Session;
use std::sync::Arc;
use tessera_schema::ClassInfo;

/// A SELECT over one record type.
///
/// Lowers to a single physical statement against one table — unless a
/// keyspace-key `IN` splits it, in which case one statement per substituted
/// keyspace executes and the results are stitched back in input order.
pub struct Select<T> {
    session: Session,
    class: Arc<ClassInfo<T>>,
    table: Option<String>,
    columns: Option<Vec<String>>,
    wheres: Vec<Clause>,
    orderings: Vec<Ordering>,
    limit: Option<i32>,
    allow_filtering: bool,
    options: StatementOptions,
}

impl<T: Send + Sync + 'static> Select<T> {
    pub(crate) fn new(session: Session, class: Arc<ClassInfo<T>>) -> Self {
        Self {
            session,
            class,
            table: None,
            columns: None,
            wheres: Vec::new(),
            orderings: Vec::new(),
            limit: None,
            allow_filtering: false,
            options: StatementOptions::default(),
        }
    }

    /// Reads from a specific table instead of letting the engine pick one.
    pub fn from(mut self, table: &str) -> Self {
        self.table = Some(table.to_owned());
        self
    }

    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn where_(mut self, clause: Clause) -> Self {
        self.wheres.push(clause);
        self
    }

    pub fn and(self, clause: Clause) -> Self {
        self.where_(clause)
    }

    /// Constrains to the given record's identity: equality on its primary
    /// key and keyspace keys.
    pub fn matching(mut self, record: &T) -> Self {
        for key in self.class.keyspace_keys() {
            self.wheres.push(Clause::Eq {
                column: key.column.clone(),
                value: self.class.extract_field(record, key.field),
            });
        }
        let table = match &self.table {
            Some(name) => self.class.table(name),
            None => self.class.tables().first(),
        };
        if let Some(table) = table {
            for binding in table.primary_key() {
                self.wheres.push(Clause::Eq {
                    column: binding.column.clone(),
                    value: self.class.extract(record, binding),
                });
            }
        }
        self
    }

    pub fn order_by(mut self, ordering: Ordering) -> Self {
        self.orderings.push(ordering);
        self
    }

    pub fn limit(mut self, limit: i32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn allow_filtering(mut self) -> Self {
        self.allow_filtering = true;
        self
    }

    fn spec(&self) -> SelectSpec<'_> {
        SelectSpec {
            table: self.table.as_deref(),
            columns: self.columns.as_deref(),
            wheres: &self.wheres,
            orderings: &self.orderings,
            limit: self.limit,
            allow_filtering: self.allow_filtering,
            options: &self.options,
        }
    }

    pub async fn execute(&self) -> Result<ObjectSet<T>, Error> {
        if !self.options.enabled {
            return Ok(ObjectSet::empty(self.class.clone()));
        }
        let ctx = self.session.lower_context(&[]).await?;
        let plan = self.lower(&ctx)?;
        let table = dml::pick_table(&self.class, self.table.as_deref(), &self.wheres, &self.orderings)?.clone();
        let sets = self.session.execute_plan(&plan, &self.options).await?;
        Ok(ObjectSet::with_table(
            self.class.clone(),
            table,
            crate::result::CompositeResultSet::new(sets),
        ))
    }

    /// Executes and insists on at most one row.
    pub async fn execute_one(&self) -> Result<Option<T>, Error> {
        let mut set = self.execute().await?;
        let first = set.one().await?;
        if first.is_some() && set.one().await?.is_some() {
            return Err(Error::TooManyMatchesFound { found: 2 });
        }
        Ok(first)
    }

    /// Executes and insists on exactly one row.
    pub async fn execute_one_required(&self) -> Result<T, Error> {
        self.execute_one().await?.ok_or(Error::ObjectMissing)
    }
}

impl<T: Send + Sync + 'static> AnyStatement for Select<T> {
    fn lower(&self, ctx: &LowerContext) -> Result<Lowered, LowerError> {
        if !self.options.enabled {
            return Ok(Lowered::empty());
        }
        dml::lower_select(ctx, &self.class, &self.spec())
    }

    fn is_enabled(&self) -> bool {
        self.options.enabled
    }

    fn inferred_idempotence(&self) -> bool {
        true
    }
}

impl_statement_options!(Select<T>);
