//! Lowering rules for SELECT, INSERT, UPDATE, and DELETE.

use super::{
    apply_options, effective_usings, element_codec, expand_wheres, is_keyspace_key_clause, map_key_codec,
    render_using, render_where, resolve_keyspaces, LowerContext,
};
use crate::cql::{CqlWriter, PhysicalStatement, StatementKind};
use crate::error::LowerError;
use crate::retry;
use crate::statement::clause::{Assignment, Clause, Ordering};
use crate::statement::{Lowered, StatementOptions};
use std::collections::HashMap;
use std::sync::Arc;
use tessera_schema::{BindingRole, ClassInfo, ColumnBinding, TableInfo};
use tessera_types::CqlValue;

pub(crate) struct SelectSpec<'a> {
    pub table: Option<&'a str>,
    pub columns: Option<&'a [String]>,
    pub wheres: &'a [Clause],
    pub orderings: &'a [Ordering],
    pub limit: Option<i32>,
    pub allow_filtering: bool,
    pub options: &'a StatementOptions,
}

pub(crate) struct InsertSpec<'a, T> {
    pub record: &'a T,
    pub if_not_exists: bool,
    pub options: &'a StatementOptions,
}

pub(crate) struct UpdateSpec<'a, T> {
    pub record: &'a T,
    pub assignments: &'a [Assignment],
    pub wheres: &'a [Clause],
    pub conditions: &'a [Clause],
    pub if_exists: bool,
    pub options: &'a StatementOptions,
}

pub(crate) struct DeleteSpec<'a, T> {
    pub record: Option<&'a T>,
    pub columns: &'a [String],
    pub wheres: &'a [Clause],
    pub conditions: &'a [Clause],
    pub if_exists: bool,
    pub options: &'a StatementOptions,
}

/// Picks the one physical table a SELECT reads.
///
/// An explicit `.from(..)` wins. Otherwise the first table containing every
/// referenced column is chosen, preferring one whose whole partition key is
/// constrained.
pub(crate) fn pick_table<'c, T>(
    class: &'c ClassInfo<T>,
    explicit: Option<&str>,
    clauses: &[Clause],
    orderings: &[Ordering],
) -> Result<&'c Arc<TableInfo>, LowerError> {
    if let Some(name) = explicit {
        return class.table(name).ok_or_else(|| LowerError::UnknownTable {
            table: name.to_owned(),
        });
    }

    let referenced: Vec<&str> = clauses
        .iter()
        .filter(|c| !is_keyspace_key_clause(class, c))
        .filter_map(Clause::column)
        .chain(orderings.iter().map(|o| o.column.as_str()))
        .collect();

    let candidates: Vec<&Arc<TableInfo>> = class
        .tables()
        .iter()
        .filter(|t| referenced.iter().all(|col| t.column(col).is_some()))
        .collect();

    if candidates.is_empty() {
        let table = class.tables()[0].name().to_owned();
        let column = referenced
            .iter()
            .find(|col| class.tables()[0].column(col).is_none())
            .copied()
            .unwrap_or_default();
        return Err(LowerError::UnknownColumn {
            column: column.to_owned(),
            table,
        });
    }

    let constrained: Vec<&str> = clauses
        .iter()
        .filter(|c| matches!(c, Clause::Eq { .. } | Clause::In { .. }))
        .filter_map(Clause::column)
        .collect();
    let fully_keyed = candidates.iter().find(|t| {
        t.partition_key()
            .iter()
            .all(|b| constrained.iter().any(|col| col.eq_ignore_ascii_case(&b.column)))
    });
    Ok(fully_keyed.copied().unwrap_or(candidates[0]))
}

pub(crate) fn lower_select<T>(
    ctx: &LowerContext,
    class: &ClassInfo<T>,
    spec: &SelectSpec<'_>,
) -> Result<Lowered, LowerError> {
    let table = pick_table(class, spec.table, spec.wheres, spec.orderings)?;
    let keyspaces = resolve_keyspaces(class, spec.wheres, None)?;
    let clauses = expand_wheres(class, table, None, spec.wheres, true)?;

    let mut statements = Vec::with_capacity(keyspaces.len());
    for (keyspace, _) in &keyspaces {
        let mut w = CqlWriter::new();
        w.raw("SELECT ");
        match spec.columns {
            None => {
                w.raw("*");
            }
            Some(columns) => {
                let mut first = true;
                for column in columns {
                    let binding = table.column(column).ok_or_else(|| LowerError::UnknownColumn {
                        column: column.clone(),
                        table: table.name().to_owned(),
                    })?;
                    w.sep(&mut first, ", ").ident(&binding.column);
                }
            }
        }
        w.raw(" FROM ").qualified(keyspace, table.name());
        render_where(&mut w, table, &clauses)?;
        if !spec.orderings.is_empty() {
            w.raw(" ORDER BY ");
            let mut first = true;
            for ordering in spec.orderings {
                let binding = table.column(&ordering.column).ok_or_else(|| LowerError::UnknownColumn {
                    column: ordering.column.clone(),
                    table: table.name().to_owned(),
                })?;
                w.sep(&mut first, ", ")
                    .ident(&binding.column)
                    .raw(" ")
                    .raw(&ordering.order.to_string());
            }
        }
        if let Some(limit) = spec.limit {
            w.raw(" LIMIT ").raw(&limit.to_string());
        }
        if spec.allow_filtering {
            w.raw(" ALLOW FILTERING");
        }

        let mut stmt = PhysicalStatement::new(StatementKind::Select, keyspace.clone(), w.finish())
            .with_table(table.name().to_owned());
        apply_options(&mut stmt, spec.options, ctx, true);
        statements.push(Lowered::Statement(stmt));
    }
    Ok(Lowered::group_or_single(statements))
}

pub(crate) fn lower_insert<T>(
    ctx: &LowerContext,
    class: &ClassInfo<T>,
    spec: &InsertSpec<'_, T>,
) -> Result<Lowered, LowerError> {
    let keyspaces = resolve_keyspaces(class, &[], Some(spec.record))?;
    let mut statements = Vec::new();
    for (keyspace, _) in &keyspaces {
        for table in class.tables() {
            if table.is_counter_table() {
                // Counters cannot be INSERTed; the table is fed by updates.
                tracing::debug!(table = table.name(), "skipping counter table on insert");
                continue;
            }
            statements.push(Lowered::Statement(insert_into_table(
                ctx,
                class,
                table,
                keyspace,
                spec.record,
                &HashMap::new(),
                spec.if_not_exists,
                spec.options,
            )?));
        }
    }
    Ok(Lowered::group_or_single(statements))
}

/// Renders one per-table INSERT, with `overrides` (field index to value)
/// taking precedence over the record's own values.
#[allow(clippy::too_many_arguments)]
fn insert_into_table<T>(
    ctx: &LowerContext,
    class: &ClassInfo<T>,
    table: &TableInfo,
    keyspace: &str,
    record: &T,
    overrides: &HashMap<usize, CqlValue>,
    if_not_exists: bool,
    options: &StatementOptions,
) -> Result<PhysicalStatement, LowerError> {
    let mut columns: Vec<(&ColumnBinding, CqlValue)> = Vec::with_capacity(table.columns().len());
    for binding in table.columns() {
        let value = binding
            .field
            .and_then(|f| overrides.get(&f).cloned())
            .unwrap_or_else(|| class.extract(record, binding));
        if value.is_null() {
            if binding.role.is_primary_key() {
                return Err(LowerError::NullPrimaryKey {
                    column: binding.column.clone(),
                    table: table.name().to_owned(),
                });
            }
            continue;
        }
        columns.push((binding, value));
    }

    let mut w = CqlWriter::new();
    w.raw("INSERT INTO ").qualified(keyspace, table.name()).raw(" (");
    let mut first = true;
    for (binding, _) in &columns {
        w.sep(&mut first, ", ").ident(&binding.column);
    }
    w.raw(") VALUES (");
    let mut first = true;
    for (binding, value) in &columns {
        w.sep(&mut first, ", ").literal(&binding.codec, value)?;
    }
    w.raw(")");
    if if_not_exists {
        w.raw(" IF NOT EXISTS");
    }
    let (timestamp, ttl) = effective_usings(options, ctx);
    render_using(&mut w, timestamp, ttl);

    let mut stmt =
        PhysicalStatement::new(StatementKind::Insert, keyspace, w.finish()).with_table(table.name().to_owned());
    stmt.conditional = if_not_exists;
    apply_options(&mut stmt, options, ctx, true);
    Ok(stmt)
}

pub(crate) fn lower_update<T>(
    ctx: &LowerContext,
    class: &ClassInfo<T>,
    spec: &UpdateSpec<'_, T>,
) -> Result<Lowered, LowerError> {
    let keyspaces = resolve_keyspaces(class, spec.wheres, Some(spec.record))?;

    // Previous-value hints and the new values assignments establish.
    let mut previous: HashMap<String, CqlValue> = HashMap::new();
    let mut overrides: HashMap<usize, CqlValue> = HashMap::new();
    let mut reassigns_key = false;
    for assignment in spec.assignments {
        match assignment {
            Assignment::SetPrevious { column, previous: old } => {
                previous.insert(column.to_lowercase(), old.clone());
            }
            Assignment::Set { column, value } => {
                for table in class.tables() {
                    if let Some(binding) = table.column(column) {
                        if let Some(field) = binding.field {
                            overrides.insert(field, value.clone());
                        }
                        if binding.role.is_primary_key() && class.extract(spec.record, binding) != *value {
                            reassigns_key = true;
                        }
                    }
                }
            }
            _ => {}
        }
    }

    if reassigns_key {
        return lower_key_reassignment(ctx, class, spec, &keyspaces, &previous, &overrides);
    }

    let mut statements = Vec::new();
    for (keyspace, _) in &keyspaces {
        for table in class.tables() {
            // Tables none of the assignments touch produce no statement.
            if let Some(stmt) = update_one_table(ctx, class, table, keyspace, spec)? {
                statements.push(Lowered::Statement(stmt));
            }
        }
    }
    Ok(Lowered::group_or_single(statements))
}

/// A primary-key reassignment cannot be expressed as an UPDATE: the old row
/// is deleted and the new row inserted, per table, with the delete strictly
/// before its insert. Tables are independent of each other.
fn lower_key_reassignment<T>(
    ctx: &LowerContext,
    class: &ClassInfo<T>,
    spec: &UpdateSpec<'_, T>,
    keyspaces: &[(String, tessera_schema::KeyspaceKeyMap)],
    previous: &HashMap<String, CqlValue>,
    overrides: &HashMap<usize, CqlValue>,
) -> Result<Lowered, LowerError> {
    let mut tables = Vec::new();
    for (keyspace, _) in keyspaces {
        for table in class.tables() {
            // Old primary key: explicit previous() hints, falling back to
            // the record's current values.
            let mut missing_previous = false;
            let mut where_clauses = Vec::with_capacity(table.primary_key().len());
            for binding in table.primary_key() {
                let field_name = binding.field.map(|f| class.fields()[f].name().to_lowercase());
                let hinted = previous
                    .get(&binding.column.to_lowercase())
                    .or_else(|| field_name.as_deref().and_then(|n| previous.get(n)));
                let old = match hinted {
                    Some(v) => v.clone(),
                    None => {
                        if binding
                            .field
                            .is_some_and(|f| overrides.contains_key(&f))
                        {
                            missing_previous = true;
                        }
                        class.extract(spec.record, binding)
                    }
                };
                if old.is_null() {
                    return Err(LowerError::NullPrimaryKey {
                        column: binding.column.clone(),
                        table: table.name().to_owned(),
                    });
                }
                where_clauses.push(Clause::Eq {
                    column: binding.column.clone(),
                    value: old,
                });
            }
            if missing_previous {
                tracing::warn!(
                    table = table.name(),
                    "primary-key assignment without a previous() hint; deleting by the record's current key"
                );
            }

            let mut w = CqlWriter::new();
            w.raw("DELETE FROM ").qualified(keyspace, table.name());
            let (timestamp, _) = effective_usings(spec.options, ctx);
            render_using(&mut w, timestamp, None);
            render_where(&mut w, table, &where_clauses)?;
            let mut delete =
                PhysicalStatement::new(StatementKind::Delete, keyspace, w.finish()).with_table(table.name().to_owned());
            apply_options(&mut delete, spec.options, ctx, true);

            let insert = insert_into_table(ctx, class, table, keyspace, spec.record, overrides, false, spec.options)?;

            tables.push(Lowered::Sequence(vec![
                Lowered::Statement(delete),
                Lowered::Statement(insert),
            ]));
        }
    }
    Ok(Lowered::group(tables))
}

fn update_one_table<T>(
    ctx: &LowerContext,
    class: &ClassInfo<T>,
    table: &TableInfo,
    keyspace: &str,
    spec: &UpdateSpec<'_, T>,
) -> Result<Option<PhysicalStatement>, LowerError> {
    // Effective assignments: explicit ones, or everything the record holds.
    // previous() hints are not assignments of their own.
    let has_real_assignment = spec
        .assignments
        .iter()
        .any(|a| !matches!(a, Assignment::SetPrevious { .. }));
    let expanded: Vec<Assignment>;
    let assignments: &[Assignment] = if has_real_assignment {
        spec.assignments
    } else {
        expanded = vec![Assignment::SetAllFromRecord];
        &expanded
    };

    let mut rendered: Vec<String> = Vec::new();
    let mut inferred_idempotent = true;
    for assignment in assignments {
        match assignment {
            Assignment::SetAllFromRecord => {
                for binding in table.non_key_columns() {
                    if matches!(binding.role, BindingRole::Counter) {
                        return Err(LowerError::CounterOperationOnNonCounter {
                            column: binding.column.clone(),
                        });
                    }
                    let value = class.extract(spec.record, binding);
                    let mut w = CqlWriter::new();
                    w.ident(&binding.column).raw(" = ").literal(&binding.codec, &value)?;
                    rendered.push(w.finish());
                }
            }
            Assignment::SetPrevious { .. } => {}
            named => {
                if !named.is_idempotent() {
                    inferred_idempotent = false;
                }
                let column = named.column().expect("named assignments always have a column");
                let Some(binding) = table.column(column) else {
                    // Field projected onto other tables only.
                    continue;
                };
                if binding.role.is_primary_key() {
                    // Same-value key assignment; the row already has it.
                    continue;
                }
                let is_counter_column = matches!(binding.role, BindingRole::Counter) || binding.cql_type.is_counter();
                if named.is_counter() != is_counter_column {
                    return Err(LowerError::CounterOperationOnNonCounter {
                        column: column.to_owned(),
                    });
                }
                rendered.push(render_assignment(ctx, binding, named)?);
            }
        }
    }
    if rendered.is_empty() {
        return Ok(None);
    }

    let clauses = expand_wheres(class, table, Some(spec.record), spec.wheres, false)?;

    let mut w = CqlWriter::new();
    w.raw("UPDATE ").qualified(keyspace, table.name());
    let (timestamp, ttl) = effective_usings(spec.options, ctx);
    render_using(&mut w, timestamp, ttl);
    w.raw(" SET ");
    let mut first = true;
    for text in &rendered {
        w.sep(&mut first, ", ").raw(text);
    }
    render_where(&mut w, table, &clauses)?;
    let conditional = render_conditions(&mut w, table, spec.conditions, spec.if_exists)?;

    let mut stmt =
        PhysicalStatement::new(StatementKind::Update, keyspace, w.finish()).with_table(table.name().to_owned());
    stmt.conditional = conditional;
    apply_options(&mut stmt, spec.options, ctx, inferred_idempotent);
    Ok(Some(stmt))
}

/// Renders one `SET` fragment.
fn render_assignment(ctx: &LowerContext, binding: &ColumnBinding, assignment: &Assignment) -> Result<String, LowerError> {
    let mut w = CqlWriter::new();
    let column = &binding.column;
    match assignment {
        Assignment::Set { value, .. } => {
            w.ident(column).raw(" = ").literal(&binding.codec, value)?;
        }
        Assignment::Incr { delta, .. } => {
            w.ident(column).raw(" = ").ident(column).raw(" + ").raw(&delta.to_string());
        }
        Assignment::Decr { delta, .. } => {
            w.ident(column).raw(" = ").ident(column).raw(" - ").raw(&delta.to_string());
        }
        Assignment::Prepend { values, .. } => {
            w.ident(column).raw(" = ");
            w.literal(&binding.codec, &CqlValue::List(values.clone()))?;
            w.raw(" + ").ident(column);
        }
        Assignment::Append { values, .. } => {
            w.ident(column).raw(" = ").ident(column).raw(" + ");
            w.literal(&binding.codec, &CqlValue::List(values.clone()))?;
        }
        Assignment::Discard { values, .. } => {
            w.ident(column).raw(" = ").ident(column).raw(" - ");
            w.literal(&binding.codec, &CqlValue::List(values.clone()))?;
        }
        Assignment::SetAt { index, value, .. } => {
            let elem = element_codec(ctx, &binding.cql_type)?;
            w.ident(column).raw("[").raw(&index.to_string()).raw("] = ");
            w.literal(&elem, value)?;
        }
        Assignment::AddToSet { values, .. } => {
            w.ident(column).raw(" = ").ident(column).raw(" + ");
            w.literal(&binding.codec, &CqlValue::Set(values.clone()))?;
        }
        Assignment::RemoveFromSet { values, .. } => {
            w.ident(column).raw(" = ").ident(column).raw(" - ");
            w.literal(&binding.codec, &CqlValue::Set(values.clone()))?;
        }
        Assignment::Put { key, value, .. } => {
            let key_codec = map_key_codec(ctx, &binding.cql_type)?;
            let value_codec = element_codec(ctx, &binding.cql_type)?;
            w.ident(column).raw("[");
            w.literal(&key_codec, key)?;
            w.raw("] = ");
            w.literal(&value_codec, value)?;
        }
        Assignment::SetAllFromRecord | Assignment::SetPrevious { .. } => {
            unreachable!("expanded before rendering")
        }
    }
    Ok(w.finish())
}

/// Renders ` IF EXISTS` / ` IF a = 1 AND b > 2`; returns whether the
/// statement became conditional.
fn render_conditions(
    w: &mut CqlWriter,
    table: &TableInfo,
    conditions: &[Clause],
    if_exists: bool,
) -> Result<bool, LowerError> {
    if if_exists {
        w.raw(" IF EXISTS");
        return Ok(true);
    }
    if conditions.is_empty() {
        return Ok(false);
    }
    w.raw(" IF ");
    let mut first = true;
    for condition in conditions {
        let column = condition.column().ok_or_else(|| LowerError::UnknownColumn {
            column: String::new(),
            table: table.name().to_owned(),
        })?;
        let binding = table.column(column).ok_or_else(|| LowerError::UnknownColumn {
            column: column.to_owned(),
            table: table.name().to_owned(),
        })?;
        w.sep(&mut first, " AND ").ident(&binding.column);
        w.raw(" ").raw(condition.operator()).raw(" ");
        match condition {
            Clause::Eq { value, .. }
            | Clause::Lt { value, .. }
            | Clause::Lte { value, .. }
            | Clause::Gt { value, .. }
            | Clause::Gte { value, .. } => {
                w.literal(&binding.codec, value)?;
            }
            _ => {
                return Err(LowerError::UnknownColumn {
                    column: column.to_owned(),
                    table: table.name().to_owned(),
                })
            }
        }
    }
    Ok(true)
}

pub(crate) fn lower_delete<T>(
    ctx: &LowerContext,
    class: &ClassInfo<T>,
    spec: &DeleteSpec<'_, T>,
) -> Result<Lowered, LowerError> {
    let keyspaces = resolve_keyspaces(class, spec.wheres, spec.record)?;

    if !spec.columns.is_empty() {
        let known = spec
            .columns
            .iter()
            .all(|c| class.tables().iter().any(|t| t.column(c).is_some()));
        if !known {
            let column = spec
                .columns
                .iter()
                .find(|c| class.tables().iter().all(|t| t.column(c).is_none()))
                .unwrap();
            return Err(LowerError::UnknownColumn {
                column: column.clone(),
                table: class.tables()[0].name().to_owned(),
            });
        }
    }

    let mut statements = Vec::new();
    for (keyspace, _) in &keyspaces {
        for table in class.tables() {
            let clauses = expand_wheres(class, table, spec.record, spec.wheres, false)?;
            let mut w = CqlWriter::new();
            w.raw("DELETE ");
            let mut first = true;
            for column in spec.columns {
                // A named column is deleted wherever it exists.
                if let Some(binding) = table.column(column) {
                    w.sep(&mut first, ", ").ident(&binding.column);
                }
            }
            if !first {
                w.raw(" ");
            }
            w.raw("FROM ").qualified(keyspace, table.name());
            let (timestamp, _) = effective_usings(spec.options, ctx);
            render_using(&mut w, timestamp, None);
            render_where(&mut w, table, &clauses)?;
            let conditional = render_conditions(&mut w, table, spec.conditions, spec.if_exists)?;

            let mut stmt =
                PhysicalStatement::new(StatementKind::Delete, keyspace, w.finish()).with_table(table.name().to_owned());
            stmt.conditional = conditional;
            apply_options(&mut stmt, spec.options, ctx, true);
            statements.push(Lowered::Statement(stmt));
        }
    }
    Ok(Lowered::group_or_single(statements))
}

/// Idempotence of an update's assignment list, for composite inference.
pub(crate) fn update_is_idempotent(assignments: &[Assignment]) -> bool {
    retry::infer_assignments(assignments)
}
