use crate::descriptor::{
    Discriminator, Extractor, IndexDef, InitialRowsDef, RowBuilder, SortOrder, TableOptions, Validator,
};
use crate::keyspace::{KeyspaceKeyMap, KeyspaceSpec};
use itertools::Itertools;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use tessera_types::codec::Codec;
use tessera_types::{CqlType, CqlValue, RowError, RowValues, UdtDef};

/// Role of one bound column within its table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingRole {
    PartitionKey(usize),
    ClusteringKey(usize, SortOrder),
    Static,
    Regular,
    Counter,
}

impl BindingRole {
    pub fn is_primary_key(&self) -> bool {
        matches!(self, BindingRole::PartitionKey(_) | BindingRole::ClusteringKey(..))
    }

    pub fn is_partition_key(&self) -> bool {
        matches!(self, BindingRole::PartitionKey(_))
    }
}

/// A column of one physical table, bound to a record field.
#[derive(Clone)]
pub struct ColumnBinding {
    pub column: String,
    /// Index into [`ClassInfo::fields`]; `None` for the synthesized
    /// discriminator column.
    pub field: Option<usize>,
    pub cql_type: CqlType,
    pub codec: Arc<dyn Codec>,
    pub role: BindingRole,
    pub index: Option<IndexDef>,
    pub mandatory: bool,
}

impl fmt::Debug for ColumnBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnBinding")
            .field("column", &self.column)
            .field("field", &self.field)
            .field("cql_type", &self.cql_type)
            .field("role", &self.role)
            .finish()
    }
}

/// One physical denormalized table of a record type.
#[derive(Debug)]
pub struct TableInfo {
    pub(crate) name: String,
    /// All bindings, partition key first, then clustering, then the rest in
    /// declaration order.
    pub(crate) columns: Vec<ColumnBinding>,
    pub(crate) partition_len: usize,
    pub(crate) clustering_len: usize,
    pub(crate) options: TableOptions,
    pub(crate) is_counter: bool,
}

impl TableInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnBinding] {
        &self.columns
    }

    pub fn partition_key(&self) -> &[ColumnBinding] {
        &self.columns[..self.partition_len]
    }

    pub fn clustering_key(&self) -> &[ColumnBinding] {
        &self.columns[self.partition_len..self.partition_len + self.clustering_len]
    }

    pub fn primary_key(&self) -> &[ColumnBinding] {
        &self.columns[..self.partition_len + self.clustering_len]
    }

    pub fn non_key_columns(&self) -> &[ColumnBinding] {
        &self.columns[self.partition_len + self.clustering_len..]
    }

    pub fn column(&self, name: &str) -> Option<&ColumnBinding> {
        self.columns.iter().find(|c| c.column.eq_ignore_ascii_case(name))
    }

    pub fn indexes(&self) -> impl Iterator<Item = (&ColumnBinding, &IndexDef)> {
        self.columns.iter().filter_map(|c| c.index.as_ref().map(|i| (c, i)))
    }

    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    pub fn is_counter_table(&self) -> bool {
        self.is_counter
    }
}

/// A record field after compilation.
#[derive(Clone)]
pub struct CompiledField<T> {
    pub(crate) name: String,
    pub(crate) cql_type: CqlType,
    pub(crate) get: Extractor<T>,
    pub(crate) mandatory: bool,
}

impl<T> CompiledField<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cql_type(&self) -> &CqlType {
        &self.cql_type
    }
}

/// A keyspace key after compilation: the bound field plus its codec.
#[derive(Clone)]
pub struct KeyspaceKeyBinding {
    pub column: String,
    pub field: usize,
    pub exclude: Vec<String>,
    pub codec: Arc<dyn Codec>,
}

/// Immutable compiled view of a record type.
///
/// Compiled once at registration and shared behind an `Arc`; every lookup
/// the statement pipeline needs is precomputed here.
pub struct ClassInfo<T> {
    pub(crate) name: String,
    pub(crate) keyspace: KeyspaceSpec,
    pub(crate) tables: Vec<Arc<TableInfo>>,
    pub(crate) fields: Vec<CompiledField<T>>,
    pub(crate) keyspace_keys: SmallVec<[KeyspaceKeyBinding; 2]>,
    pub(crate) discriminator: Option<Discriminator>,
    pub(crate) initial_rows: Vec<InitialRowsDef<T>>,
    pub(crate) validator: Option<Validator<T>>,
    pub(crate) build_row: RowBuilder<T>,
    /// Every UDT referenced by a field, dependencies first.
    pub(crate) udts: Vec<Arc<UdtDef>>,
}

impl<T> ClassInfo<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keyspace(&self) -> &KeyspaceSpec {
        &self.keyspace
    }

    pub fn tables(&self) -> &[Arc<TableInfo>] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&Arc<TableInfo>> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn fields(&self) -> &[CompiledField<T>] {
        &self.fields
    }

    pub fn field_named(&self, name: &str) -> Option<(usize, &CompiledField<T>)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name.eq_ignore_ascii_case(name))
    }

    pub fn keyspace_keys(&self) -> &[KeyspaceKeyBinding] {
        &self.keyspace_keys
    }

    pub fn discriminator(&self) -> Option<&Discriminator> {
        self.discriminator.as_ref()
    }

    pub fn udts(&self) -> &[Arc<UdtDef>] {
        &self.udts
    }

    /// Extracts one field from a record.
    pub fn extract_field(&self, record: &T, field: usize) -> CqlValue {
        let f = &self.fields[field];
        let value = (f.get)(record);
        if value.is_null() && f.mandatory {
            return CqlValue::empty_of(&f.cql_type);
        }
        value
    }

    /// Extracts the value a binding stores, honoring the mandatory rewrite.
    pub fn extract(&self, record: &T, binding: &ColumnBinding) -> CqlValue {
        match binding.field {
            Some(field) => self.extract_field(record, field),
            None => match &self.discriminator {
                Some(d) => CqlValue::Text(d.value.clone()),
                None => CqlValue::Null,
            },
        }
    }

    /// The record's keyspace-key values, for physical-keyspace resolution.
    pub fn keyspace_key_values(&self, record: &T) -> KeyspaceKeyMap {
        self.keyspace_keys
            .iter()
            .map(|k| (k.column.clone(), self.extract_field(record, k.field)))
            .collect()
    }

    pub fn build_row(&self, row: &RowValues) -> Result<T, RowError> {
        (self.build_row)(row)
    }

    pub fn validate(&self, record: &T) -> Result<(), String> {
        match &self.validator {
            Some(validator) => validator(record),
            None => Ok(()),
        }
    }

    /// Rows to insert right after this type's schema is created.
    pub fn initial_rows(&self, keys: &KeyspaceKeyMap) -> Vec<T> {
        self.initial_rows.iter().flat_map(|def| (def.factory)(keys)).collect()
    }

    /// Record-type names whose initial rows must precede this type's.
    pub fn initial_row_dependencies(&self) -> Vec<&str> {
        self.initial_rows
            .iter()
            .flat_map(|def| def.depends_on.iter().map(String::as_str))
            .unique()
            .collect()
    }
}

impl<T> fmt::Debug for ClassInfo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("name", &self.name)
            .field("keyspace", &self.keyspace)
            .field("tables", &self.tables)
            .finish()
    }
}
