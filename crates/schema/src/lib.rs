//! Record descriptors and the class-info compiler.
//!
//! A [`RecordDescriptor`] is the declarative input: it names the keyspace, the
//! physical tables, and how each record field projects onto columns. The
//! descriptor is plain data built with a fluent API (or by generated code);
//! nothing here inspects types at runtime.
//!
//! [`compile`] turns a descriptor into an immutable [`ClassInfo`]: per-table
//! column bindings with resolved codecs, ordered key columns, keyspace-key
//! substitution, and initial-row factories. A `ClassInfo` is compiled once
//! per record type and shared behind an `Arc` for the life of the process.

mod class_info;
mod compile;
mod descriptor;
mod keyspace;

pub use class_info::{BindingRole, ClassInfo, ColumnBinding, CompiledField, KeyspaceKeyBinding, TableInfo};
pub use compile::{compile, CompileError};
pub use descriptor::{
    ColumnProjection, ColumnRole, Discriminator, FieldDef, IndexDef, InitialRowsDef, RecordDescriptor, SortOrder,
    TableDecl, TableOptions, DEFAULT_DISCRIMINATOR_COLUMN,
};
pub use keyspace::{KeyspaceDef, KeyspaceKey, KeyspaceKeyMap, KeyspaceSpec, Replication, SubstituteError};
