use crate::keyspace::{KeyspaceDef, KeyspaceKeyMap};
use std::fmt;
use std::sync::Arc;
use tessera_types::{CqlType, CqlValue, RowError, RowValues};

/// Projects one record field to a [`CqlValue`].
pub type Extractor<T> = Arc<dyn Fn(&T) -> CqlValue + Send + Sync>;

/// Builds a record from a decoded row.
pub type RowBuilder<T> = Arc<dyn Fn(&RowValues) -> Result<T, RowError> + Send + Sync>;

/// Validates a record before it is bound into a statement.
pub type Validator<T> = Arc<dyn Fn(&T) -> Result<(), String> + Send + Sync>;

/// Produces the rows inserted right after a type's schema is created.
pub type InitialRowsFactory<T> = Arc<dyn Fn(&KeyspaceKeyMap) -> Vec<T> + Send + Sync>;

/// Column name used for the discriminator of type entities unless the
/// descriptor names its own.
pub const DEFAULT_DISCRIMINATOR_COLUMN: &str = "kind";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        })
    }
}

/// What a projected column is, within one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRole {
    PartitionKey { position: usize },
    ClusteringKey { position: usize, order: SortOrder },
    Static,
    Regular,
    Counter,
}

/// A secondary index declaration on one projected column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDef {
    pub name: Option<String>,
    /// Custom index class for `CREATE CUSTOM INDEX ... USING`.
    pub using: Option<String>,
}

/// One projection of a field onto a column of one table (or of every table,
/// when `table` is `None`).
#[derive(Debug, Clone)]
pub struct ColumnProjection {
    pub(crate) table: Option<String>,
    pub(crate) column: String,
    pub(crate) role: ColumnRole,
    pub(crate) index: Option<IndexDef>,
}

/// A record field: its extractor, CQL type, and per-table projections.
///
/// The same field may appear under different column names and roles in
/// different tables; that is what makes denormalized views possible.
#[derive(Clone)]
pub struct FieldDef<T> {
    pub(crate) name: String,
    pub(crate) cql_type: CqlType,
    pub(crate) get: Extractor<T>,
    pub(crate) mandatory: bool,
    pub(crate) persisted: bool,
    pub(crate) keyspace_key: bool,
    pub(crate) projections: Vec<ColumnProjection>,
}

impl<T> FieldDef<T> {
    pub fn new(name: impl Into<String>, cql_type: CqlType, get: impl Fn(&T) -> CqlValue + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            cql_type,
            get: Arc::new(get),
            mandatory: false,
            persisted: false,
            keyspace_key: false,
            projections: Vec::new(),
        }
    }

    fn project(mut self, table: Option<&str>, column: Option<&str>, role: ColumnRole) -> Self {
        self.projections.push(ColumnProjection {
            table: table.map(str::to_owned),
            column: column.unwrap_or(&self.name).to_owned(),
            role,
            index: None,
        });
        self
    }

    pub fn partition_key(self, table: &str, position: usize) -> Self {
        self.project(Some(table), None, ColumnRole::PartitionKey { position })
    }

    pub fn partition_key_as(self, table: &str, column: &str, position: usize) -> Self {
        self.project(Some(table), Some(column), ColumnRole::PartitionKey { position })
    }

    pub fn clustering_key(self, table: &str, position: usize, order: SortOrder) -> Self {
        self.project(Some(table), None, ColumnRole::ClusteringKey { position, order })
    }

    pub fn clustering_key_as(self, table: &str, column: &str, position: usize, order: SortOrder) -> Self {
        self.project(Some(table), Some(column), ColumnRole::ClusteringKey { position, order })
    }

    pub fn static_column(self, table: &str) -> Self {
        self.project(Some(table), None, ColumnRole::Static)
    }

    pub fn regular(self, table: &str) -> Self {
        self.project(Some(table), None, ColumnRole::Regular)
    }

    pub fn regular_as(self, table: &str, column: &str) -> Self {
        self.project(Some(table), Some(column), ColumnRole::Regular)
    }

    /// Projects onto every table of the record under the field's own name.
    pub fn regular_everywhere(self) -> Self {
        self.project(None, None, ColumnRole::Regular)
    }

    pub fn counter(self, table: &str) -> Self {
        self.project(Some(table), None, ColumnRole::Counter)
    }

    /// Adds a secondary index to this field's projection on `table`,
    /// creating a regular projection when none exists yet.
    pub fn indexed(self, table: &str) -> Self {
        self.indexed_with(table, IndexDef::default())
    }

    pub fn indexed_with(mut self, table: &str, index: IndexDef) -> Self {
        if let Some(projection) = self
            .projections
            .iter_mut()
            .find(|p| p.table.as_deref() == Some(table))
        {
            projection.index = Some(index);
            return self;
        }
        let mut with_projection = self.project(Some(table), None, ColumnRole::Regular);
        with_projection.projections.last_mut().unwrap().index = Some(index);
        with_projection
    }

    /// Marks this field as a keyspace key; it parameterizes the physical
    /// keyspace name instead of becoming a column.
    pub fn keyspace_key(mut self) -> Self {
        self.keyspace_key = true;
        self
    }

    /// Null and the empty collection become interchangeable for this field.
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Stores this field deflate-compressed in a blob column.
    pub fn persisted(mut self) -> Self {
        self.persisted = true;
        self
    }
}

impl<T> fmt::Debug for FieldDef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("cql_type", &self.cql_type)
            .field("mandatory", &self.mandatory)
            .field("persisted", &self.persisted)
            .field("keyspace_key", &self.keyspace_key)
            .field("projections", &self.projections)
            .finish()
    }
}

/// Per-table storage options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableOptions {
    pub compaction: Option<String>,
    pub caching: Option<String>,
    pub default_ttl: Option<u32>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TableDecl {
    pub(crate) name: String,
    pub(crate) options: TableOptions,
}

/// Discriminator for type entities: several record variants sharing one set
/// of tables, told apart by a fixed text column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discriminator {
    pub column: String,
    pub value: String,
}

#[derive(Clone)]
pub struct InitialRowsDef<T> {
    pub(crate) factory: InitialRowsFactory<T>,
    /// Record-type names whose initial rows must be inserted first.
    pub(crate) depends_on: Vec<String>,
}

/// The declarative input to [`crate::compile`].
#[derive(Clone)]
pub struct RecordDescriptor<T> {
    pub(crate) name: String,
    pub(crate) keyspace: Option<KeyspaceDef>,
    pub(crate) tables: Vec<TableDecl>,
    pub(crate) fields: Vec<FieldDef<T>>,
    pub(crate) build_row: RowBuilder<T>,
    pub(crate) validator: Option<Validator<T>>,
    pub(crate) discriminator: Option<Discriminator>,
    pub(crate) initial_rows: Vec<InitialRowsDef<T>>,
}

impl<T> RecordDescriptor<T> {
    pub fn new(
        name: impl Into<String>,
        build_row: impl Fn(&RowValues) -> Result<T, RowError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            keyspace: None,
            tables: Vec::new(),
            fields: Vec::new(),
            build_row: Arc::new(build_row),
            validator: None,
            discriminator: None,
            initial_rows: Vec::new(),
        }
    }

    pub fn keyspace(mut self, keyspace: KeyspaceDef) -> Self {
        self.keyspace = Some(keyspace);
        self
    }

    pub fn table(self, name: &str) -> Self {
        self.table_with(name, TableOptions::default())
    }

    pub fn table_with(mut self, name: &str, options: TableOptions) -> Self {
        self.tables.push(TableDecl {
            name: name.to_owned(),
            options,
        });
        self
    }

    pub fn field(mut self, field: FieldDef<T>) -> Self {
        self.fields.push(field);
        self
    }

    pub fn validator(mut self, validator: impl Fn(&T) -> Result<(), String> + Send + Sync + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Discriminates this record type under the default column.
    pub fn discriminated_as(self, value: &str) -> Self {
        self.discriminator(DEFAULT_DISCRIMINATOR_COLUMN, value)
    }

    pub fn discriminator(mut self, column: &str, value: &str) -> Self {
        self.discriminator = Some(Discriminator {
            column: column.to_owned(),
            value: value.to_owned(),
        });
        self
    }

    pub fn initial_rows(self, factory: impl Fn(&KeyspaceKeyMap) -> Vec<T> + Send + Sync + 'static) -> Self {
        self.initial_rows_after::<&str>([], factory)
    }

    pub fn initial_rows_after<S: Into<String>>(
        mut self,
        depends_on: impl IntoIterator<Item = S>,
        factory: impl Fn(&KeyspaceKeyMap) -> Vec<T> + Send + Sync + 'static,
    ) -> Self {
        self.initial_rows.push(InitialRowsDef {
            factory: Arc::new(factory),
            depends_on: depends_on.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> fmt::Debug for RecordDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordDescriptor")
            .field("name", &self.name)
            .field("tables", &self.tables)
            .field("fields", &self.fields)
            .finish()
    }
}
