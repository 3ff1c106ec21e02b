//! The lowering engine: turns one logical statement into the physical CQL
//! statements it implies.
//!
//! The rewrite rules live in [`dml`] and [`ddl`]; this module holds the
//! context threaded through them and the helpers they share — physical
//! keyspace resolution (including IN-splitting on keyspace keys), clause
//! expansion against a bound record, and WHERE/USING rendering.

pub(crate) mod ddl;
pub(crate) mod dml;

use crate::cql::{CqlWriter, PhysicalStatement};
use crate::error::LowerError;
use crate::retry;
use crate::statement::clause::{Clause, Using};
use crate::statement::StatementOptions;
use crate::transport::ObservedKeyspace;
use std::collections::HashMap;
use std::sync::Arc;
use tessera_schema::{ClassInfo, KeyspaceKeyMap, TableInfo};
use tessera_types::codec::{Codec, CodecRegistry};
use tessera_types::{CqlType, CqlValue};

/// Everything lowering may consult besides the statement itself.
pub struct LowerContext {
    pub(crate) codecs: Arc<CodecRegistry>,
    pub(crate) default_usings: Vec<Using>,
    /// Pre-fetched cluster schemas, keyed by physical keyspace name.
    /// `Some(None)` means the keyspace is known not to exist.
    pub(crate) observed: HashMap<String, Option<ObservedKeyspace>>,
    pub(crate) full_trace: bool,
    /// Replication for keyspaces that declare none of their own.
    pub(crate) default_replication: Option<tessera_schema::Replication>,
}

impl LowerContext {
    pub fn new(codecs: Arc<CodecRegistry>) -> Self {
        Self {
            codecs,
            default_usings: Vec::new(),
            observed: HashMap::new(),
            full_trace: false,
            default_replication: None,
        }
    }

    pub fn with_observed(mut self, keyspace: impl Into<String>, schema: Option<ObservedKeyspace>) -> Self {
        self.observed.insert(keyspace.into(), schema);
        self
    }
}

/// Resolves the physical keyspaces a statement addresses, in input order,
/// de-duplicated on first occurrence.
///
/// Values come from keyspace-key clauses first (`Eq` selects one, `In`
/// splits), then from the bound record. An `In` over several keys produces
/// the cartesian product in key-declaration order.
pub(crate) fn resolve_keyspaces<T>(
    class: &ClassInfo<T>,
    clauses: &[Clause],
    record: Option<&T>,
) -> Result<Vec<(String, KeyspaceKeyMap)>, LowerError> {
    let mut maps: Vec<KeyspaceKeyMap> = vec![KeyspaceKeyMap::new()];
    for key in class.keyspace_keys() {
        let values: Vec<CqlValue> = match clauses
            .iter()
            .find(|c| c.column().is_some_and(|col| col.eq_ignore_ascii_case(&key.column)))
        {
            Some(Clause::Eq { value, .. }) => vec![value.clone()],
            Some(Clause::In { values, .. }) => {
                if values.is_empty() {
                    return Err(LowerError::EmptyInList {
                        column: key.column.clone(),
                    });
                }
                values.clone()
            }
            _ => match record {
                Some(r) => vec![class.extract_field(r, key.field)],
                None => {
                    return Err(LowerError::MissingKeyspaceKey {
                        key: key.column.clone(),
                    })
                }
            },
        };
        let mut next = Vec::with_capacity(maps.len() * values.len());
        for map in &maps {
            for value in &values {
                let mut map = map.clone();
                map.insert(key.column.clone(), value.clone());
                next.push(map);
            }
        }
        maps = next;
    }

    let mut out: Vec<(String, KeyspaceKeyMap)> = Vec::with_capacity(maps.len());
    for map in maps {
        let name = class.keyspace().physical_name(&map)?;
        if !out.iter().any(|(n, _)| *n == name) {
            out.push((name, map));
        }
    }
    Ok(out)
}

/// Whether a clause constrains a keyspace key rather than a table column.
pub(crate) fn is_keyspace_key_clause<T>(class: &ClassInfo<T>, clause: &Clause) -> bool {
    clause.column().is_some_and(|col| {
        class
            .keyspace_keys()
            .iter()
            .any(|k| k.column.eq_ignore_ascii_case(col))
    })
}

/// Expands a statement's where-clauses against one table.
///
/// Record-derived clauses become per-column equalities; keyspace-key
/// clauses are dropped (resolution consumed them); everything else must
/// name a column of `table`. Defaults to `is_object()` when the statement
/// carries a record and no clauses at all.
pub(crate) fn expand_wheres<T>(
    class: &ClassInfo<T>,
    table: &TableInfo,
    record: Option<&T>,
    clauses: &[Clause],
    include_discriminator: bool,
) -> Result<Vec<Clause>, LowerError> {
    let effective: Vec<Clause> = if clauses.is_empty() && record.is_some() {
        vec![Clause::IsObject]
    } else {
        clauses.to_vec()
    };

    let mut out = Vec::new();
    for clause in &effective {
        match clause {
            Clause::IsObject | Clause::IsPartitionedLike => {
                let Some(record) = record else { continue };
                let key = if matches!(clause, Clause::IsObject) {
                    table.primary_key()
                } else {
                    table.partition_key()
                };
                for binding in key {
                    let value = class.extract(record, binding);
                    if value.is_null() {
                        return Err(LowerError::NullPrimaryKey {
                            column: binding.column.clone(),
                            table: table.name().to_owned(),
                        });
                    }
                    out.push(Clause::Eq {
                        column: binding.column.clone(),
                        value,
                    });
                }
            }
            Clause::IsSuffixedLike => {}
            named => {
                if is_keyspace_key_clause(class, named) {
                    continue;
                }
                let column = named.column().expect("named clause always has a column");
                let binding = table.column(column).ok_or_else(|| LowerError::UnknownColumn {
                    column: column.to_owned(),
                    table: table.name().to_owned(),
                })?;
                if let Clause::In { values, .. } = named {
                    if values.is_empty() {
                        return Err(LowerError::EmptyInList {
                            column: column.to_owned(),
                        });
                    }
                }
                if let Clause::Eq { value, .. } = named {
                    if value.is_null() && binding.role.is_primary_key() {
                        return Err(LowerError::NullPrimaryKey {
                            column: column.to_owned(),
                            table: table.name().to_owned(),
                        });
                    }
                }
                out.push(named.clone());
            }
        }
    }

    if include_discriminator {
        if let Some(d) = class.discriminator() {
            if !out.iter().any(|c| c.column().is_some_and(|col| col == d.column)) {
                out.push(Clause::Eq {
                    column: d.column.clone(),
                    value: CqlValue::Text(d.value.clone()),
                });
            }
        }
    }

    Ok(out)
}

/// Renders `WHERE a = 1 AND b IN (2, 3)`.
pub(crate) fn render_where(w: &mut CqlWriter, table: &TableInfo, clauses: &[Clause]) -> Result<(), LowerError> {
    if clauses.is_empty() {
        return Ok(());
    }
    w.raw(" WHERE ");
    let mut first = true;
    for clause in clauses {
        let column = clause.column().expect("expanded clauses always name a column");
        let binding = table.column(column).ok_or_else(|| LowerError::UnknownColumn {
            column: column.to_owned(),
            table: table.name().to_owned(),
        })?;
        w.sep(&mut first, " AND ").ident(&binding.column);
        match clause {
            Clause::In { values, .. } => {
                w.raw(" IN (");
                let mut first_value = true;
                for value in values {
                    w.sep(&mut first_value, ", ").literal(&binding.codec, value)?;
                }
                w.raw(")");
            }
            other => {
                w.raw(" ").raw(other.operator()).raw(" ");
                let value = match other {
                    Clause::Eq { value, .. }
                    | Clause::Lt { value, .. }
                    | Clause::Lte { value, .. }
                    | Clause::Gt { value, .. }
                    | Clause::Gte { value, .. } => value,
                    _ => unreachable!("record-derived clauses were expanded"),
                };
                w.literal(&binding.codec, value)?;
            }
        }
    }
    Ok(())
}

/// Folds statement-level and session-default USING options into
/// `(timestamp, ttl)`; the statement's own options win.
pub(crate) fn effective_usings(options: &StatementOptions, ctx: &LowerContext) -> (Option<i64>, Option<u32>) {
    let mut timestamp = None;
    let mut ttl = None;
    for using in ctx.default_usings.iter().chain(&options.usings) {
        match using {
            Using::Timestamp(us) => timestamp = Some(*us),
            Using::Ttl(s) => ttl = Some(*s),
        }
    }
    (timestamp, ttl)
}

/// Renders ` USING TIMESTAMP t AND TTL s` (whichever parts are present).
pub(crate) fn render_using(w: &mut CqlWriter, timestamp: Option<i64>, ttl: Option<u32>) {
    if timestamp.is_none() && ttl.is_none() {
        return;
    }
    w.raw(" USING ");
    let mut first = true;
    if let Some(us) = timestamp {
        w.sep(&mut first, " AND ").raw("TIMESTAMP ").raw(&us.to_string());
    }
    if let Some(s) = ttl {
        w.sep(&mut first, " AND ").raw("TTL ").raw(&s.to_string());
    }
}

/// Stamps the execution contract onto a freshly rendered statement.
pub(crate) fn apply_options(
    stmt: &mut PhysicalStatement,
    options: &StatementOptions,
    ctx: &LowerContext,
    inferred_idempotent: bool,
) {
    stmt.consistency = options.consistency;
    stmt.serial_consistency = options.serial_consistency;
    stmt.fetch_size = options.fetch_size;
    stmt.read_timeout = options.read_timeout;
    stmt.tracing = options.tracing || ctx.full_trace;
    stmt.trace_prefix = options.trace_prefix.clone();
    stmt.idempotent = retry::resolve_idempotence(stmt.kind, options.idempotent, inferred_idempotent);
    let (timestamp, ttl) = effective_usings(options, ctx);
    stmt.using_timestamp = timestamp;
    stmt.using_ttl = ttl;
}

/// Codec for one element of a collection column, for `l[i] = v` and
/// friends.
pub(crate) fn element_codec(ctx: &LowerContext, collection: &CqlType) -> Result<Arc<dyn Codec>, LowerError> {
    let ty = match collection.unfrozen() {
        CqlType::List(e) | CqlType::Set(e) => (**e).clone(),
        CqlType::Map(_, v) | CqlType::SortedMap(_, v) => (**v).clone(),
        other => other.clone(),
    };
    Ok(ctx.codecs.codec_for(&ty)?)
}

/// Codec for a map column's key.
pub(crate) fn map_key_codec(ctx: &LowerContext, collection: &CqlType) -> Result<Arc<dyn Codec>, LowerError> {
    let ty = match collection.unfrozen() {
        CqlType::Map(k, _) | CqlType::SortedMap(k, _) => (**k).clone(),
        other => other.clone(),
    };
    Ok(ctx.codecs.codec_for(&ty)?)
}
