use super::{impl_statement_options, AnyStatement, Lowered, StatementOptions};
use crate::cql::{PhysicalStatement, StatementKind};
use crate::error::{Error, LowerError};
use crate::lower::{apply_options, LowerContext};
use crate::result::CompositeResultSet;
use crate::session::Session;

/// A raw CQL statement the engine cannot see into.
///
/// Raw statements are assumed non-idempotent unless the caller says
/// otherwise.
pub struct RawCql {
    session: Session,
    keyspace: String,
    cql: String,
    options: StatementOptions,
}

impl RawCql {
    pub(crate) fn new(session: Session, keyspace: impl Into<String>, cql: impl Into<String>) -> Self {
        Self {
            session,
            keyspace: keyspace.into(),
            cql: cql.into(),
            options: StatementOptions::default(),
        }
    }

    pub async fn execute(&self) -> Result<CompositeResultSet, Error> {
        if !self.options.enabled {
            return Ok(CompositeResultSet::new(Vec::new()));
        }
        let ctx = self.session.lower_context(&[]).await?;
        let plan = AnyStatement::lower(self, &ctx)?;
        let sets = self.session.execute_plan(&plan, &self.options).await?;
        Ok(CompositeResultSet::new(sets))
    }
}

impl AnyStatement for RawCql {
    fn lower(&self, ctx: &LowerContext) -> Result<Lowered, LowerError> {
        if !self.options.enabled {
            return Ok(Lowered::empty());
        }
        let mut stmt = PhysicalStatement::new(StatementKind::Raw, self.keyspace.clone(), self.cql.clone());
        apply_options(&mut stmt, &self.options, ctx, false);
        Ok(Lowered::Statement(stmt))
    }

    fn is_enabled(&self) -> bool {
        self.options.enabled
    }

    fn inferred_idempotence(&self) -> bool {
        self.options.idempotent.unwrap_or(false)
    }
}

impl_statement_options!(RawCql);
