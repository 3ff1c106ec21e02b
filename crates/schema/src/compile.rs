use crate::class_info::{BindingRole, ClassInfo, ColumnBinding, CompiledField, KeyspaceKeyBinding, TableInfo};
use crate::descriptor::{ColumnRole, FieldDef, RecordDescriptor, TableDecl};
use crate::keyspace::KeyspaceSpec;
use itertools::Itertools;
use smallvec::SmallVec;
use std::sync::Arc;
use tessera_types::codec::{CodecError, CodecRegistry};
use tessera_types::{CqlType, UdtDef};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("record type `{record}` declares no keyspace")]
    MissingKeyspace { record: String },
    #[error("record type `{record}` declares no tables")]
    NoTables { record: String },
    #[error("record type `{record}` declares table `{table}` twice")]
    DuplicateTable { record: String, table: String },
    #[error("table `{table}` binds column `{column}` more than once")]
    DuplicateColumn { table: String, column: String },
    #[error("table `{table}` has an empty partition key")]
    MissingPartitionKey { table: String },
    #[error("{kind} key position {position} of table `{table}` has no bound column")]
    PrimaryKeyMissingBinding {
        table: String,
        kind: &'static str,
        position: usize,
    },
    #[error("no codec for field `{field}`: {source}")]
    CodecUnavailable { field: String, source: CodecError },
    #[error("keyspace key `{key}` does not bind to any field")]
    KeyspaceKeyUnbound { key: String },
    #[error("counter table `{table}` mixes counter and non-counter columns")]
    CounterMixedWithNonCounter { table: String },
    #[error("column `{column}` of table `{table}` has counter role but type `{ty}`")]
    CounterColumnType { table: String, column: String, ty: CqlType },
    #[error("field `{field}` of record type `{record}` projects onto no table and is not a keyspace key")]
    UnprojectedField { record: String, field: String },
}

/// Compiles a descriptor into an immutable [`ClassInfo`].
///
/// Pure: calling it twice with equal descriptors yields equal results. The
/// once-per-type caching discipline lives with the session registry.
pub fn compile<T>(descriptor: RecordDescriptor<T>, registry: &CodecRegistry) -> Result<ClassInfo<T>, CompileError> {
    let record = descriptor.name.clone();

    let keyspace = descriptor
        .keyspace
        .ok_or_else(|| CompileError::MissingKeyspace { record: record.clone() })?;
    let keyspace = KeyspaceSpec::from_def(keyspace);

    if descriptor.tables.is_empty() {
        return Err(CompileError::NoTables { record });
    }
    if let Some(table) = descriptor
        .tables
        .iter()
        .map(|t| t.name.to_lowercase())
        .duplicates()
        .next()
    {
        return Err(CompileError::DuplicateTable { record, table });
    }

    let fields: Vec<CompiledField<T>> = descriptor
        .fields
        .iter()
        .map(|f| CompiledField {
            name: f.name.clone(),
            cql_type: f.cql_type.clone(),
            get: f.get.clone(),
            mandatory: f.mandatory,
        })
        .collect();

    for field in &descriptor.fields {
        if field.projections.is_empty() && !field.keyspace_key {
            return Err(CompileError::UnprojectedField {
                record,
                field: field.name.clone(),
            });
        }
    }

    let mut tables = Vec::with_capacity(descriptor.tables.len());
    for decl in &descriptor.tables {
        tables.push(Arc::new(compile_table(
            decl,
            &descriptor.fields,
            descriptor.discriminator.as_ref().map(|d| d.column.as_str()),
            registry,
        )?));
    }

    let keyspace_keys = resolve_keyspace_keys(&keyspace, &descriptor.fields, registry)?;

    let mut udts: Vec<Arc<UdtDef>> = Vec::new();
    for field in &descriptor.fields {
        for udt in field.cql_type.referenced_udts() {
            if !udts.iter().any(|u| u.name == udt.name) {
                udts.push(udt);
            }
        }
    }

    log::debug!(
        "compiled record type `{}`: {} tables, {} keyspace keys, {} udts",
        descriptor.name,
        tables.len(),
        keyspace_keys.len(),
        udts.len()
    );

    Ok(ClassInfo {
        name: descriptor.name,
        keyspace,
        tables,
        fields,
        keyspace_keys,
        discriminator: descriptor.discriminator,
        initial_rows: descriptor.initial_rows,
        validator: descriptor.validator,
        build_row: descriptor.build_row,
        udts,
    })
}

fn compile_table<T>(
    decl: &TableDecl,
    fields: &[FieldDef<T>],
    discriminator_column: Option<&str>,
    registry: &CodecRegistry,
) -> Result<TableInfo, CompileError> {
    let table = decl.name.clone();

    // Gather this table's bindings in field-declaration order.
    let mut bindings: Vec<ColumnBinding> = Vec::new();
    for (field_idx, field) in fields.iter().enumerate() {
        for projection in &field.projections {
            let applies = match &projection.table {
                Some(t) => t.eq_ignore_ascii_case(&table),
                None => true,
            };
            if !applies {
                continue;
            }
            if bindings.iter().any(|b| b.column.eq_ignore_ascii_case(&projection.column)) {
                return Err(CompileError::DuplicateColumn {
                    table,
                    column: projection.column.clone(),
                });
            }
            let (cql_type, codec) = if field.persisted {
                let codec = registry
                    .persister(&field.cql_type)
                    .map_err(|source| CompileError::CodecUnavailable {
                        field: field.name.clone(),
                        source,
                    })?;
                (CqlType::Blob, codec)
            } else if field.mandatory {
                let codec = registry
                    .mandatory(&field.cql_type)
                    .map_err(|source| CompileError::CodecUnavailable {
                        field: field.name.clone(),
                        source,
                    })?;
                (field.cql_type.clone(), codec)
            } else {
                let codec = registry
                    .codec_for(&field.cql_type)
                    .map_err(|source| CompileError::CodecUnavailable {
                        field: field.name.clone(),
                        source,
                    })?;
                (field.cql_type.clone(), codec)
            };
            let role = match &projection.role {
                ColumnRole::PartitionKey { position } => BindingRole::PartitionKey(*position),
                ColumnRole::ClusteringKey { position, order } => BindingRole::ClusteringKey(*position, *order),
                ColumnRole::Static => BindingRole::Static,
                ColumnRole::Regular => BindingRole::Regular,
                ColumnRole::Counter => {
                    if !field.cql_type.is_counter() {
                        return Err(CompileError::CounterColumnType {
                            table,
                            column: projection.column.clone(),
                            ty: field.cql_type.clone(),
                        });
                    }
                    BindingRole::Counter
                }
            };
            bindings.push(ColumnBinding {
                column: projection.column.clone(),
                field: Some(field_idx),
                cql_type,
                codec,
                role,
                index: projection.index.clone(),
                mandatory: field.mandatory,
            });
        }
    }

    if let Some(column) = discriminator_column {
        if bindings.iter().any(|b| b.column.eq_ignore_ascii_case(column)) {
            return Err(CompileError::DuplicateColumn {
                table,
                column: column.to_owned(),
            });
        }
        bindings.push(ColumnBinding {
            column: column.to_owned(),
            field: None,
            cql_type: CqlType::Text,
            codec: registry
                .codec_for(&CqlType::Text)
                .map_err(|source| CompileError::CodecUnavailable {
                    field: column.to_owned(),
                    source,
                })?,
            role: BindingRole::Regular,
            index: None,
            mandatory: false,
        });
    }

    // Order: partition key, clustering key, then the rest as declared.
    let mut partition: Vec<ColumnBinding> = Vec::new();
    let mut clustering: Vec<ColumnBinding> = Vec::new();
    let mut rest: Vec<ColumnBinding> = Vec::new();
    for binding in bindings {
        match binding.role {
            BindingRole::PartitionKey(_) => partition.push(binding),
            BindingRole::ClusteringKey(..) => clustering.push(binding),
            _ => rest.push(binding),
        }
    }
    partition.sort_by_key(|b| match b.role {
        BindingRole::PartitionKey(p) => p,
        _ => unreachable!(),
    });
    clustering.sort_by_key(|b| match b.role {
        BindingRole::ClusteringKey(p, _) => p,
        _ => unreachable!(),
    });

    if partition.is_empty() {
        return Err(CompileError::MissingPartitionKey { table });
    }
    check_contiguous(&table, "partition", &partition, |b| match b.role {
        BindingRole::PartitionKey(p) => p,
        _ => unreachable!(),
    })?;
    check_contiguous(&table, "clustering", &clustering, |b| match b.role {
        BindingRole::ClusteringKey(p, _) => p,
        _ => unreachable!(),
    })?;

    // A counter table carries nothing but its key and counters.
    let has_counter = rest.iter().any(|b| matches!(b.role, BindingRole::Counter));
    if has_counter && rest.iter().any(|b| !matches!(b.role, BindingRole::Counter)) {
        return Err(CompileError::CounterMixedWithNonCounter { table });
    }

    let partition_len = partition.len();
    let clustering_len = clustering.len();
    let mut columns = partition;
    columns.append(&mut clustering);
    columns.append(&mut rest);

    Ok(TableInfo {
        name: decl.name.clone(),
        columns,
        partition_len,
        clustering_len,
        options: decl.options.clone(),
        is_counter: has_counter,
    })
}

fn check_contiguous(
    table: &str,
    kind: &'static str,
    bindings: &[ColumnBinding],
    position: impl Fn(&ColumnBinding) -> usize,
) -> Result<(), CompileError> {
    for (expected, binding) in bindings.iter().enumerate() {
        if position(binding) != expected {
            return Err(CompileError::PrimaryKeyMissingBinding {
                table: table.to_owned(),
                kind,
                position: expected,
            });
        }
    }
    Ok(())
}

fn resolve_keyspace_keys<T>(
    keyspace: &KeyspaceSpec,
    fields: &[FieldDef<T>],
    registry: &CodecRegistry,
) -> Result<SmallVec<[KeyspaceKeyBinding; 2]>, CompileError> {
    keyspace
        .keys()
        .iter()
        .map(|key| {
            let (field_idx, field) = fields
                .iter()
                .enumerate()
                .find(|(_, f)| f.keyspace_key && f.name.eq_ignore_ascii_case(&key.column))
                .ok_or_else(|| CompileError::KeyspaceKeyUnbound {
                    key: key.column.clone(),
                })?;
            let codec = registry
                .codec_for(&field.cql_type)
                .map_err(|source| CompileError::CodecUnavailable {
                    field: field.name.clone(),
                    source,
                })?;
            Ok(KeyspaceKeyBinding {
                column: key.column.clone(),
                field: field_idx,
                exclude: key.exclude.clone(),
                codec,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SortOrder;
    use crate::keyspace::{KeyspaceDef, KeyspaceKeyMap};
    use pretty_assertions::assert_eq;
    use tessera_types::{CqlValue, RowValues};

    #[derive(Debug, Clone, PartialEq)]
    struct User {
        id: i64,
        email: String,
        name: Option<String>,
        tags: Vec<String>,
    }

    fn user_descriptor() -> RecordDescriptor<User> {
        RecordDescriptor::new("user", |row: &RowValues| {
            Ok(User {
                id: row.bigint("id")?.unwrap_or_default(),
                email: row.text("email")?.unwrap_or_default(),
                name: row.text("name")?,
                tags: row
                    .set("tags")?
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|v| v.as_text().map(str::to_owned))
                    .collect(),
            })
        })
        .keyspace(KeyspaceDef::new("app"))
        .table("user_by_id")
        .table("user_by_email")
        .field(
            FieldDef::new("id", CqlType::BigInt, |u: &User| u.id.into())
                .partition_key("user_by_id", 0)
                .regular("user_by_email"),
        )
        .field(
            FieldDef::new("email", CqlType::Text, |u: &User| u.email.clone().into())
                .partition_key("user_by_email", 0)
                .regular("user_by_id"),
        )
        .field(FieldDef::new("name", CqlType::Text, |u: &User| u.name.clone().into()).regular_everywhere())
        .field(
            FieldDef::new("tags", CqlType::set(CqlType::Text), |u: &User| {
                CqlValue::Set(u.tags.iter().map(|t| t.as_str().into()).collect())
            })
            .mandatory()
            .regular("user_by_id"),
        )
    }

    #[test]
    fn compiles_a_two_table_record() {
        let registry = CodecRegistry::new();
        let info = compile(user_descriptor(), &registry).unwrap();

        assert_eq!(info.tables().len(), 2);
        let by_id = info.table("user_by_id").unwrap();
        let pk: Vec<_> = by_id.partition_key().iter().map(|c| c.column.as_str()).collect();
        assert_eq!(pk, vec!["id"]);
        assert_eq!(by_id.columns().len(), 4);

        let by_email = info.table("user_by_email").unwrap();
        let pk: Vec<_> = by_email.partition_key().iter().map(|c| c.column.as_str()).collect();
        assert_eq!(pk, vec!["email"]);
        // `tags` binds only into user_by_id.
        assert!(by_email.column("tags").is_none());
    }

    #[test]
    fn mandatory_field_extraction_rewrites_null() {
        let registry = CodecRegistry::new();
        let info = compile(user_descriptor(), &registry).unwrap();
        let user = User {
            id: 7,
            email: "a@x".into(),
            name: None,
            tags: vec![],
        };
        let tags = info.table("user_by_id").unwrap().column("tags").unwrap();
        assert_eq!(info.extract(&user, tags), CqlValue::Set(vec![]));
        let name = info.table("user_by_id").unwrap().column("name").unwrap();
        assert_eq!(info.extract(&user, name), CqlValue::Null);
    }

    #[test]
    fn missing_keyspace_fails() {
        let registry = CodecRegistry::new();
        let descriptor = RecordDescriptor::<User>::new("user", |_| {
            Ok(User {
                id: 0,
                email: String::new(),
                name: None,
                tags: vec![],
            })
        })
        .table("t")
        .field(FieldDef::new("id", CqlType::BigInt, |u: &User| u.id.into()).partition_key("t", 0));
        assert!(matches!(
            compile(descriptor, &registry),
            Err(CompileError::MissingKeyspace { .. })
        ));
    }

    #[test]
    fn duplicate_column_fails() {
        let registry = CodecRegistry::new();
        let descriptor = user_descriptor()
            .field(FieldDef::new("email2", CqlType::Text, |u: &User| u.email.clone().into()).regular_as("user_by_id", "email"));
        assert!(matches!(
            compile(descriptor, &registry),
            Err(CompileError::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn partition_key_gap_fails() {
        let registry = CodecRegistry::new();
        let descriptor = RecordDescriptor::<User>::new("user", |_| {
            Ok(User {
                id: 0,
                email: String::new(),
                name: None,
                tags: vec![],
            })
        })
        .keyspace(KeyspaceDef::new("app"))
        .table("t")
        .field(FieldDef::new("id", CqlType::BigInt, |u: &User| u.id.into()).partition_key("t", 1));
        assert!(matches!(
            compile(descriptor, &registry),
            Err(CompileError::PrimaryKeyMissingBinding { position: 0, .. })
        ));
    }

    #[test]
    fn counter_table_rejects_regular_columns() {
        let registry = CodecRegistry::new();
        let descriptor = RecordDescriptor::<User>::new("hits", |_| {
            Ok(User {
                id: 0,
                email: String::new(),
                name: None,
                tags: vec![],
            })
        })
        .keyspace(KeyspaceDef::new("app"))
        .table("hits")
        .field(FieldDef::new("id", CqlType::BigInt, |u: &User| u.id.into()).partition_key("hits", 0))
        .field(FieldDef::new("count", CqlType::Counter, |u: &User| CqlValue::Counter(u.id)).counter("hits"))
        .field(FieldDef::new("name", CqlType::Text, |u: &User| u.name.clone().into()).regular("hits"));
        assert!(matches!(
            compile(descriptor, &registry),
            Err(CompileError::CounterMixedWithNonCounter { .. })
        ));
    }

    #[test]
    fn keyspace_key_must_bind() {
        let registry = CodecRegistry::new();
        let descriptor = user_descriptor().keyspace(KeyspaceDef::new("app").key("tenant"));
        assert!(matches!(
            compile(descriptor, &registry),
            Err(CompileError::KeyspaceKeyUnbound { .. })
        ));
    }

    #[test]
    fn keyspace_key_values_come_from_the_record() {
        let registry = CodecRegistry::new();
        let descriptor = user_descriptor()
            .keyspace(KeyspaceDef::new("app").key("tenant"))
            .field(FieldDef::new("tenant", CqlType::Text, |_| "acme".into()).keyspace_key());
        let info = compile(descriptor, &registry).unwrap();
        let user = User {
            id: 1,
            email: String::new(),
            name: None,
            tags: vec![],
        };
        let keys = info.keyspace_key_values(&user);
        let expected: KeyspaceKeyMap = [("tenant", "acme")].into_iter().collect();
        assert_eq!(keys, expected);
        assert_eq!(info.keyspace().physical_name(&keys).unwrap(), "app_acme");
    }

    #[test]
    fn compilation_is_deterministic() {
        let registry = CodecRegistry::new();
        let a = compile(user_descriptor(), &registry).unwrap();
        let b = compile(user_descriptor(), &registry).unwrap();
        let layout = |info: &ClassInfo<User>| {
            info.tables()
                .iter()
                .map(|t| {
                    (
                        t.name().to_owned(),
                        t.columns().iter().map(|c| c.column.clone()).collect::<Vec<_>>(),
                    )
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(layout(&a), layout(&b));
    }
}
