//! Lowering rules for schema operations: CREATE, ALTER (by diffing the
//! declared schema against what the cluster reports), and TRUNCATE.
//!
//! A schema sequence is strictly ordered: keyspace, then user-defined types
//! in dependency order, then tables, then indexes, then initial rows.

use super::{apply_options, dml, resolve_keyspaces, LowerContext};
use crate::cql::{CqlWriter, PhysicalStatement, StatementKind};
use crate::error::LowerError;
use crate::statement::clause::Clause;
use crate::statement::{Lowered, SchemaOp, StatementOptions};
use crate::transport::{ObservedKeyspace, ObservedTable};
use std::sync::Arc;
use tessera_schema::{BindingRole, ClassInfo, KeyspaceKeyMap, Replication, TableInfo};
use tessera_types::UdtDef;

pub(crate) struct SchemaSpec<'a> {
    pub op: SchemaOp,
    pub key_clauses: &'a [Clause],
    /// Restricts table-level work to the named tables.
    pub contexts: Option<&'a [String]>,
    pub options: &'a StatementOptions,
}

/// The physical keyspaces a schema operation will touch; used to decide
/// what to observe before lowering.
pub(crate) fn schema_keyspaces<T>(class: &ClassInfo<T>, key_clauses: &[Clause]) -> Result<Vec<String>, LowerError> {
    Ok(resolve_keyspaces(class, key_clauses, None)?
        .into_iter()
        .map(|(name, _)| name)
        .collect())
}

pub(crate) fn lower_schema<T>(
    ctx: &LowerContext,
    class: &ClassInfo<T>,
    spec: &SchemaSpec<'_>,
) -> Result<Lowered, LowerError> {
    let keyspaces = resolve_keyspaces(class, spec.key_clauses, None)?;
    let mut parts = Vec::with_capacity(keyspaces.len());
    for (keyspace, keys) in &keyspaces {
        let observed = ctx.observed.get(keyspace).and_then(Option::as_ref);
        let part = match spec.op {
            SchemaOp::Create { if_not_exists } => {
                lower_create(ctx, class, spec, keyspace, keys, observed, if_not_exists)?
            }
            SchemaOp::Alter => lower_alter(ctx, class, spec, keyspace, keys, observed)?,
            SchemaOp::Truncate => lower_truncate(ctx, class, spec, keyspace)?,
        };
        parts.push(part);
    }
    Ok(Lowered::group_or_single(parts))
}

fn in_context(spec: &SchemaSpec<'_>, table: &TableInfo) -> bool {
    match spec.contexts {
        None => true,
        Some(contexts) => contexts.iter().any(|c| c.eq_ignore_ascii_case(table.name())),
    }
}

#[allow(clippy::too_many_arguments)]
fn lower_create<T>(
    ctx: &LowerContext,
    class: &ClassInfo<T>,
    spec: &SchemaSpec<'_>,
    keyspace: &str,
    keys: &KeyspaceKeyMap,
    observed: Option<&ObservedKeyspace>,
    if_not_exists: bool,
) -> Result<Lowered, LowerError> {
    let mut steps = Vec::new();

    let keyspace_absent = observed.is_none();
    if keyspace_absent {
        steps.push(stmt(
            ctx,
            spec.options,
            StatementKind::CreateKeyspace,
            keyspace,
            create_keyspace_cql(class, ctx, keyspace, if_not_exists),
        ));
    }

    for udt in class.udts() {
        let exists = observed.is_some_and(|o| o.udts.contains_key(&udt.name));
        if !exists {
            steps.push(stmt(
                ctx,
                spec.options,
                StatementKind::CreateType,
                keyspace,
                create_type_cql(keyspace, udt, if_not_exists),
            ));
        }
    }

    let mut created_tables = Vec::new();
    for table in class.tables() {
        if !in_context(spec, table) {
            continue;
        }
        match observed.and_then(|o| o.tables.get(table.name())) {
            Some(existing) => {
                if !columns_match(table, existing) {
                    tracing::warn!(
                        table = table.name(),
                        keyspace,
                        "table exists with a different shape; create leaves it untouched"
                    );
                }
            }
            None => {
                created_tables.push(table.name().to_owned());
                steps.push(stmt(
                    ctx,
                    spec.options,
                    StatementKind::CreateTable,
                    keyspace,
                    create_table_cql(keyspace, table, if_not_exists),
                ));
            }
        }
    }

    for table in class.tables() {
        if !in_context(spec, table) {
            continue;
        }
        let newly_created = created_tables.iter().any(|t| t == table.name());
        if !newly_created && !if_not_exists {
            continue;
        }
        for (binding, index) in table.indexes() {
            steps.push(stmt(
                ctx,
                spec.options,
                StatementKind::CreateIndex,
                keyspace,
                create_index_cql(keyspace, table, &binding.column, index, if_not_exists),
            ));
        }
    }

    if keyspace_absent {
        for record in class.initial_rows(keys) {
            let insert = dml::lower_insert(
                ctx,
                class,
                &dml::InsertSpec {
                    record: &record,
                    if_not_exists: false,
                    options: spec.options,
                },
            )?;
            steps.push(insert);
        }
    }

    Ok(Lowered::Sequence(steps))
}

fn lower_alter<T>(
    ctx: &LowerContext,
    class: &ClassInfo<T>,
    spec: &SchemaSpec<'_>,
    keyspace: &str,
    keys: &KeyspaceKeyMap,
    observed: Option<&ObservedKeyspace>,
) -> Result<Lowered, LowerError> {
    let Some(observed) = observed else {
        // Nothing to diff against: the full creation sequence applies.
        return lower_create(ctx, class, spec, keyspace, keys, None, false);
    };

    let mut steps = Vec::new();

    let replication = effective_replication(class, ctx);
    if observed.replication != replication || observed.durable_writes != class.keyspace().durable_writes() {
        let mut w = CqlWriter::new();
        w.raw("ALTER KEYSPACE ").ident(keyspace);
        w.raw(" WITH replication = ").raw(&replication.to_cql());
        w.raw(" AND durable_writes = ")
            .raw(if class.keyspace().durable_writes() { "true" } else { "false" });
        steps.push(stmt(ctx, spec.options, StatementKind::AlterKeyspace, keyspace, w.finish()));
    }

    for udt in class.udts() {
        match observed.udts.get(&udt.name) {
            None => steps.push(stmt(
                ctx,
                spec.options,
                StatementKind::CreateType,
                keyspace,
                create_type_cql(keyspace, udt, false),
            )),
            Some(existing) => {
                for (field, ty) in &udt.fields {
                    match existing.iter().find(|(f, _)| f.eq_ignore_ascii_case(field)) {
                        None => {
                            let mut w = CqlWriter::new();
                            w.raw("ALTER TYPE ").qualified(keyspace, &udt.name);
                            w.raw(" ADD ").ident(field).raw(" ").raw(&ty.to_string());
                            steps.push(stmt(ctx, spec.options, StatementKind::AlterType, keyspace, w.finish()));
                        }
                        Some((_, existing_ty)) if existing_ty != ty => {
                            return Err(LowerError::AlterIncompatible {
                                table: udt.name.clone(),
                                reason: format!("field `{field}` is `{existing_ty}`, declared `{ty}`"),
                            });
                        }
                        Some(_) => {}
                    }
                }
            }
        }
    }

    for table in class.tables() {
        if !in_context(spec, table) {
            continue;
        }
        match observed.tables.get(table.name()) {
            None => {
                steps.push(stmt(
                    ctx,
                    spec.options,
                    StatementKind::CreateTable,
                    keyspace,
                    create_table_cql(keyspace, table, false),
                ));
                for (binding, index) in table.indexes() {
                    steps.push(stmt(
                        ctx,
                        spec.options,
                        StatementKind::CreateIndex,
                        keyspace,
                        create_index_cql(keyspace, table, &binding.column, index, false),
                    ));
                }
            }
            Some(existing) => {
                diff_table(ctx, spec, keyspace, table, existing, &mut steps)?;
                for (binding, index) in table.indexes() {
                    steps.push(stmt(
                        ctx,
                        spec.options,
                        StatementKind::CreateIndex,
                        keyspace,
                        create_index_cql(keyspace, table, &binding.column, index, true),
                    ));
                }
            }
        }
    }

    Ok(Lowered::Sequence(steps))
}

/// Emits the ALTERs that bring `existing` to the declared shape, or fails
/// when no sequence of ALTERs can.
fn diff_table(
    ctx: &LowerContext,
    spec: &SchemaSpec<'_>,
    keyspace: &str,
    table: &TableInfo,
    existing: &ObservedTable,
    steps: &mut Vec<Lowered>,
) -> Result<(), LowerError> {
    let declared_partition: Vec<&str> = table.partition_key().iter().map(|b| b.column.as_str()).collect();
    let observed_partition: Vec<&str> = existing.partition_key.iter().map(String::as_str).collect();
    if !names_equal(&declared_partition, &observed_partition) {
        return Err(LowerError::AlterIncompatible {
            table: table.name().to_owned(),
            reason: format!(
                "partition key is ({}), declared ({})",
                observed_partition.join(", "),
                declared_partition.join(", ")
            ),
        });
    }
    let declared_clustering: Vec<&str> = table.clustering_key().iter().map(|b| b.column.as_str()).collect();
    let observed_clustering: Vec<&str> = existing.clustering_key.iter().map(String::as_str).collect();
    if !names_equal(&declared_clustering, &observed_clustering) {
        return Err(LowerError::AlterIncompatible {
            table: table.name().to_owned(),
            reason: format!(
                "clustering key is ({}), declared ({})",
                observed_clustering.join(", "),
                declared_clustering.join(", ")
            ),
        });
    }

    for binding in table.columns() {
        let observed_ty = existing
            .columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&binding.column))
            .map(|(_, ty)| ty);
        match observed_ty {
            None => {
                let mut w = CqlWriter::new();
                w.raw("ALTER TABLE ").qualified(keyspace, table.name());
                w.raw(" ADD ").ident(&binding.column).raw(" ").raw(&binding.cql_type.to_string());
                if matches!(binding.role, BindingRole::Static) {
                    w.raw(" static");
                }
                steps.push(stmt(ctx, spec.options, StatementKind::AlterTable, keyspace, w.finish()));
            }
            Some(ty) if *ty != binding.cql_type => {
                if !ty.is_alterable_to(&binding.cql_type) {
                    return Err(LowerError::AlterIncompatible {
                        table: table.name().to_owned(),
                        reason: format!("column `{}` is `{ty}`, declared `{}`", binding.column, binding.cql_type),
                    });
                }
                let mut w = CqlWriter::new();
                w.raw("ALTER TABLE ").qualified(keyspace, table.name());
                w.raw(" ALTER ").ident(&binding.column).raw(" TYPE ").raw(&binding.cql_type.to_string());
                steps.push(stmt(ctx, spec.options, StatementKind::AlterTable, keyspace, w.finish()));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn lower_truncate<T>(
    ctx: &LowerContext,
    class: &ClassInfo<T>,
    spec: &SchemaSpec<'_>,
    keyspace: &str,
) -> Result<Lowered, LowerError> {
    let mut statements = Vec::new();
    for table in class.tables() {
        if !in_context(spec, table) {
            continue;
        }
        let mut w = CqlWriter::new();
        w.raw("TRUNCATE ").qualified(keyspace, table.name());
        statements.push(stmt(ctx, spec.options, StatementKind::Truncate, keyspace, w.finish()));
    }
    Ok(Lowered::group(statements))
}

fn stmt(
    ctx: &LowerContext,
    options: &StatementOptions,
    kind: StatementKind,
    keyspace: &str,
    cql: String,
) -> Lowered {
    let mut statement = PhysicalStatement::new(kind, keyspace, cql);
    apply_options(&mut statement, options, ctx, true);
    Lowered::Statement(statement)
}

/// The class's declared replication, the session default, or a single
/// replica, in that order.
fn effective_replication<T>(class: &ClassInfo<T>, ctx: &LowerContext) -> Replication {
    class
        .keyspace()
        .replication()
        .cloned()
        .or_else(|| ctx.default_replication.clone())
        .unwrap_or_else(|| Replication::simple(1))
}

fn create_keyspace_cql<T>(class: &ClassInfo<T>, ctx: &LowerContext, keyspace: &str, if_not_exists: bool) -> String {
    let mut w = CqlWriter::new();
    w.raw("CREATE KEYSPACE ");
    if if_not_exists {
        w.raw("IF NOT EXISTS ");
    }
    w.ident(keyspace);
    w.raw(" WITH replication = ").raw(&effective_replication(class, ctx).to_cql());
    w.raw(" AND durable_writes = ")
        .raw(if class.keyspace().durable_writes() { "true" } else { "false" });
    w.finish()
}

fn create_type_cql(keyspace: &str, udt: &Arc<UdtDef>, if_not_exists: bool) -> String {
    let mut w = CqlWriter::new();
    w.raw("CREATE TYPE ");
    if if_not_exists {
        w.raw("IF NOT EXISTS ");
    }
    w.qualified(keyspace, &udt.name).raw(" (");
    let mut first = true;
    for (field, ty) in &udt.fields {
        w.sep(&mut first, ", ").ident(field).raw(" ").raw(&ty.to_string());
    }
    w.raw(")");
    w.finish()
}

fn create_table_cql(keyspace: &str, table: &TableInfo, if_not_exists: bool) -> String {
    let mut w = CqlWriter::new();
    w.raw("CREATE TABLE ");
    if if_not_exists {
        w.raw("IF NOT EXISTS ");
    }
    w.qualified(keyspace, table.name()).raw(" (");
    let mut first = true;
    for binding in table.columns() {
        w.sep(&mut first, ", ").ident(&binding.column).raw(" ").raw(&binding.cql_type.to_string());
        if matches!(binding.role, BindingRole::Static) {
            w.raw(" static");
        }
    }
    w.sep(&mut first, ", ").raw("PRIMARY KEY ((");
    let mut first_key = true;
    for binding in table.partition_key() {
        w.sep(&mut first_key, ", ").ident(&binding.column);
    }
    w.raw(")");
    for binding in table.clustering_key() {
        w.raw(", ").ident(&binding.column);
    }
    w.raw("))");

    let mut with_first = true;
    let mut with = |w: &mut CqlWriter, part: String| {
        w.raw(if with_first { " WITH " } else { " AND " }).raw(&part);
        with_first = false;
    };
    let clustering = table.clustering_key();
    if !clustering.is_empty() {
        let mut order = String::from("CLUSTERING ORDER BY (");
        for (i, binding) in clustering.iter().enumerate() {
            if i > 0 {
                order.push_str(", ");
            }
            let BindingRole::ClusteringKey(_, sort) = binding.role else {
                unreachable!()
            };
            order.push_str(&format!("{} {sort}", binding.column));
        }
        order.push(')');
        with(&mut w, order);
    }
    let options = table.options();
    if let Some(compaction) = &options.compaction {
        with(&mut w, format!("compaction = {compaction}"));
    }
    if let Some(caching) = &options.caching {
        with(&mut w, format!("caching = {caching}"));
    }
    if let Some(ttl) = options.default_ttl {
        with(&mut w, format!("default_time_to_live = {ttl}"));
    }
    if let Some(comment) = &options.comment {
        with(&mut w, format!("comment = '{}'", comment.replace('\'', "''")));
    }
    w.finish()
}

fn create_index_cql(
    keyspace: &str,
    table: &TableInfo,
    column: &str,
    index: &tessera_schema::IndexDef,
    if_not_exists: bool,
) -> String {
    let mut w = CqlWriter::new();
    w.raw("CREATE ");
    if index.using.is_some() {
        w.raw("CUSTOM ");
    }
    w.raw("INDEX ");
    if if_not_exists {
        w.raw("IF NOT EXISTS ");
    }
    let default_name = format!("{}_{}_idx", table.name(), column);
    w.ident(index.name.as_deref().unwrap_or(&default_name));
    w.raw(" ON ").qualified(keyspace, table.name()).raw(" (").ident(column).raw(")");
    if let Some(class) = &index.using {
        w.raw(" USING '").raw(class).raw("'");
    }
    w.finish()
}

fn names_equal(a: &[&str], b: &[&str]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_ignore_ascii_case(y))
}

/// Whether an observed table already has exactly the declared columns.
fn columns_match(table: &TableInfo, existing: &ObservedTable) -> bool {
    table.columns().len() == existing.columns.len()
        && table.columns().iter().all(|b| {
            existing
                .columns
                .iter()
                .any(|(name, ty)| name.eq_ignore_ascii_case(&b.column) && *ty == b.cql_type)
        })
}
