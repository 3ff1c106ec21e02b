use super::clause::Clause;
use super::{impl_statement_options, AnyStatement, Lowered, StatementOptions};
use crate::error::{Error, LowerError};
use crate::lower::ddl::{lower_schema, schema_keyspaces, SchemaSpec};
use crate::lower::LowerContext;
use crate::result::CompositeResultSet;
use crate::session::{SchemaLowerFn, Session};
use std::sync::Arc;
use tessera_schema::{ClassInfo, KeyspaceKeyMap};

/// Which schema operation a DDL statement performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaOp {
    Create { if_not_exists: bool },
    Alter,
    Truncate,
}

macro_rules! schema_statement {
    ($(#[$doc:meta])* $name:ident, $op:expr) => {
        $(#[$doc])*
        pub struct $name<T> {
            session: Session,
            class: Arc<ClassInfo<T>>,
            keys: Vec<Clause>,
            contexts: Option<Vec<String>>,
            op: SchemaOp,
            options: StatementOptions,
        }

        impl<T: Send + Sync + 'static> $name<T> {
            pub(crate) fn new(session: Session, class: Arc<ClassInfo<T>>) -> Self {
                Self {
                    session,
                    class,
                    keys: Vec::new(),
                    contexts: None,
                    op: $op,
                    options: StatementOptions::default(),
                }
            }

            /// Supplies a keyspace-key value; `In` splits across keyspaces.
            pub fn where_(mut self, clause: Clause) -> Self {
                self.keys.push(clause);
                self
            }

            pub fn and(self, clause: Clause) -> Self {
                self.where_(clause)
            }

            /// Restricts the operation to the named tables.
            pub fn contexts<S: Into<String>>(mut self, tables: impl IntoIterator<Item = S>) -> Self {
                self.contexts = Some(tables.into_iter().map(Into::into).collect());
                self
            }

            pub async fn execute(&self) -> Result<CompositeResultSet, Error> {
                if !self.options.enabled {
                    return Ok(CompositeResultSet::new(Vec::new()));
                }
                let observe = self.keyspaces_to_observe()?;
                let ctx = self.session.lower_context(&observe).await?;
                let plan = AnyStatement::lower(self, &ctx)?;
                let sets = self.session.execute_plan(&plan, &self.options).await?;
                Ok(CompositeResultSet::new(sets))
            }
        }

        impl<T: Send + Sync + 'static> AnyStatement for $name<T> {
            fn lower(&self, ctx: &LowerContext) -> Result<Lowered, LowerError> {
                if !self.options.enabled {
                    return Ok(Lowered::empty());
                }
                lower_schema(
                    ctx,
                    &self.class,
                    &SchemaSpec {
                        op: self.op,
                        key_clauses: &self.keys,
                        contexts: self.contexts.as_deref(),
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

            fn keyspaces_to_observe(&self) -> Result<Vec<String>, LowerError> {
                if matches!(self.op, SchemaOp::Truncate) {
                    return Ok(Vec::new());
                }
                schema_keyspaces(&self.class, &self.keys)
            }
        }

        impl_statement_options!($name<T>);
    };
}

schema_statement!(
    /// Creates a record type's schema: keyspace, user-defined types, tables,
    /// indexes, and initial rows, in that order. Steps whose post-condition
    /// already holds on the cluster are omitted.
    CreateSchema,
    SchemaOp::Create { if_not_exists: false }
);

schema_statement!(
    /// Diffs a record type's declared schema against the cluster and emits
    /// only the ALTERs (and missing CREATEs) that close the gap.
    AlterSchema,
    SchemaOp::Alter
);

schema_statement!(
    /// Truncates every table of a record type.
    Truncate,
    SchemaOp::Truncate
);

impl<T: Send + Sync + 'static> CreateSchema<T> {
    /// Makes the emitted DDL re-runnable (`IF NOT EXISTS` everywhere).
    pub fn if_not_exists(mut self) -> Self {
        self.op = SchemaOp::Create { if_not_exists: true };
        self
    }
}

/// A schema operation over every registered record type whose keyspace keys
/// fit the given key set — exactly (matching mode) or as a subset.
///
/// Classes are ordered so that initial-row dependencies insert first.
pub struct Schemas {
    session: Session,
    op: SchemaOp,
    keys: KeyspaceKeyMap,
    matching: bool,
    pub(crate) selected: Vec<SelectedClass>,
    options: StatementOptions,
}

pub(crate) struct SelectedClass {
    pub(crate) name: String,
    pub(crate) lower: SchemaLowerFn,
    pub(crate) keyspaces: Vec<String>,
}

impl Schemas {
    pub(crate) fn new(
        session: Session,
        op: SchemaOp,
        keys: KeyspaceKeyMap,
        matching: bool,
        selected: Vec<SelectedClass>,
    ) -> Self {
        Self {
            session,
            op,
            keys,
            matching,
            selected,
            options: StatementOptions::default(),
        }
    }

    /// Names of the record types this operation covers, in apply order.
    pub fn covered(&self) -> Vec<&str> {
        self.selected.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn is_matching(&self) -> bool {
        self.matching
    }

    pub async fn execute(&self) -> Result<CompositeResultSet, Error> {
        if !self.options.enabled {
            return Ok(CompositeResultSet::new(Vec::new()));
        }
        let observe = self.keyspaces_to_observe()?;
        let ctx = self.session.lower_context(&observe).await?;
        let plan = AnyStatement::lower(self, &ctx)?;
        let sets = self.session.execute_plan(&plan, &self.options).await?;
        Ok(CompositeResultSet::new(sets))
    }
}

impl AnyStatement for Schemas {
    fn lower(&self, ctx: &LowerContext) -> Result<Lowered, LowerError> {
        if !self.options.enabled {
            return Ok(Lowered::empty());
        }
        let mut parts = Vec::with_capacity(self.selected.len());
        for class in &self.selected {
            parts.push((class.lower)(ctx, &self.keys, &self.op)?);
        }
        Ok(Lowered::Sequence(parts))
    }

    fn is_enabled(&self) -> bool {
        self.options.enabled
    }

    fn inferred_idempotence(&self) -> bool {
        self.options.idempotent.unwrap_or(true)
    }

    fn keyspaces_to_observe(&self) -> Result<Vec<String>, LowerError> {
        let mut out = Vec::new();
        for class in &self.selected {
            for keyspace in &class.keyspaces {
                if !out.contains(keyspace) {
                    out.push(keyspace.clone());
                }
            }
        }
        Ok(out)
    }
}

macro_rules! impl_plain_options {
    ($ty:ident) => {
        impl $ty {
            pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
                self.options.timeout = Some(timeout);
                self
            }

            pub fn disable(mut self) -> Self {
                self.options.enabled = false;
                self
            }
        }
    };
}

impl_plain_options!(Schemas);
