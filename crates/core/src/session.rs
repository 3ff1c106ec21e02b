//! The process-wide statement manager and the [`Session`] handle.
//!
//! One session owns the transport, the codec registry, and the insert-only
//! class-info cache. The global manager is initialized exactly once;
//! everything downstream receives an explicit `Session` clone rather than
//! reading global state.

use crate::composite::{Batch, BatchKind, Group, Sequence};
use crate::error::{Error, ExecutionError, LowerError};
use crate::exec::{self, ExecControl};
use crate::lower::ddl::{lower_schema, schema_keyspaces as class_keyspaces, SchemaSpec};
use crate::lower::LowerContext;
use crate::statement::clause::{Clause, Using};
use crate::statement::{
    AlterSchema, CreateSchema, Delete, Insert, Lowered, RawCql, SchemaOp, Schemas, Select, SelectedClass,
    StatementOptions, Truncate, Update,
};
use crate::transport::{RawResultSet, Transport};
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tessera_schema::{compile, ClassInfo, KeyspaceKeyMap, RecordDescriptor, Replication};
use tessera_types::codec::CodecRegistry;
use tokio_util::sync::CancellationToken;

static GLOBAL: OnceCell<Session> = OnceCell::new();

/// Session-level defaults, adjustable after initialization behind their own
/// lock.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Replication for keyspaces that declare none of their own.
    pub default_replication: Option<Replication>,
    /// Trace every lowered statement.
    pub full_trace: bool,
    /// USING options statements inherit unless they set their own.
    pub default_usings: Vec<Using>,
}

pub(crate) type SchemaLowerFn =
    Arc<dyn Fn(&LowerContext, &KeyspaceKeyMap, &SchemaOp) -> Result<Lowered, LowerError> + Send + Sync>;
type SchemaKeyspacesFn = Arc<dyn Fn(&KeyspaceKeyMap) -> Result<Vec<String>, LowerError> + Send + Sync>;

/// Type-erased registration entry; the typed `ClassInfo` lives behind
/// `info` and is recovered by downcast.
struct RegisteredClass {
    info: Arc<dyn Any + Send + Sync>,
    keyspace_base: String,
    replication: Option<Replication>,
    durable_writes: bool,
    key_names: BTreeSet<String>,
    initial_deps: Vec<String>,
    schema_lower: SchemaLowerFn,
    schema_keyspaces: SchemaKeyspacesFn,
}

pub(crate) struct SessionInner {
    transport: Arc<dyn Transport>,
    codecs: Arc<CodecRegistry>,
    /// Insert-only; registration order is schema-apply order for ties.
    classes: RwLock<IndexMap<String, RegisteredClass>>,
    config: RwLock<SessionConfig>,
    shut_down: AtomicBool,
}

/// Cheap-to-clone handle on the statement manager.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Initializes the process-wide manager. A second call fails with
    /// [`Error::AlreadyInitialized`].
    pub fn initialize(transport: Arc<dyn Transport>) -> Result<Session, Error> {
        let session = Session::detached(transport);
        GLOBAL
            .set(session.clone())
            .map_err(|_| Error::AlreadyInitialized)?;
        Ok(session)
    }

    /// The globally initialized session.
    pub fn global() -> Result<Session, Error> {
        GLOBAL.get().cloned().ok_or(Error::NotInitialized)
    }

    /// A session that is not registered globally — owned by the caller and
    /// threaded explicitly. Tests and embedded uses live here.
    pub fn detached(transport: Arc<dyn Transport>) -> Session {
        Session {
            inner: Arc::new(SessionInner {
                transport,
                codecs: Arc::new(CodecRegistry::new()),
                classes: RwLock::new(IndexMap::new()),
                config: RwLock::new(SessionConfig::default()),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn configure(&self, adjust: impl FnOnce(&mut SessionConfig)) {
        adjust(&mut self.inner.config.write());
    }

    /// Stops accepting work. In-flight statements finish on the transport.
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::Release);
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_live(&self) -> Result<(), Error> {
        if self.is_shut_down() {
            return Err(Error::Shutdown);
        }
        Ok(())
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.inner.transport.as_ref()
    }

    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.inner.codecs
    }

    /// Compiles and caches a record type. Idempotent per type name: a
    /// second registration returns the cached `ClassInfo`.
    ///
    /// Types sharing a physical keyspace must agree on replication and
    /// durable-writes; disagreement fails the later registration.
    pub fn register<T: Send + Sync + 'static>(
        &self,
        descriptor: RecordDescriptor<T>,
    ) -> Result<Arc<ClassInfo<T>>, Error> {
        let name = descriptor.name().to_owned();
        if let Some(existing) = self.inner.classes.read().get(&name) {
            return downcast_info(&name, existing);
        }

        let info = Arc::new(compile(descriptor, &self.inner.codecs)?);

        {
            let classes = self.inner.classes.read();
            for other in classes.values() {
                if other.keyspace_base.eq_ignore_ascii_case(info.keyspace().base())
                    && (other.replication != info.keyspace().replication().cloned()
                        || other.durable_writes != info.keyspace().durable_writes())
                {
                    return Err(Error::KeyspaceAgreement {
                        keyspace: info.keyspace().base().to_owned(),
                    });
                }
            }
        }

        let lower_info = info.clone();
        let schema_lower: SchemaLowerFn = Arc::new(move |ctx, keys, op| {
            let clauses = key_clauses(keys);
            lower_schema(
                ctx,
                &lower_info,
                &SchemaSpec {
                    op: *op,
                    key_clauses: &clauses,
                    contexts: None,
                    options: &StatementOptions::default(),
                },
            )
        });
        let keyspaces_info = info.clone();
        let schema_keyspaces: SchemaKeyspacesFn = Arc::new(move |keys| {
            let clauses = key_clauses(keys);
            class_keyspaces(&keyspaces_info, &clauses)
        });

        let entry = RegisteredClass {
            info: info.clone() as Arc<dyn Any + Send + Sync>,
            keyspace_base: info.keyspace().base().to_owned(),
            replication: info.keyspace().replication().cloned(),
            durable_writes: info.keyspace().durable_writes(),
            key_names: info.keyspace().key_names().iter().map(|s| (*s).to_owned()).collect(),
            initial_deps: info.initial_row_dependencies().iter().map(|s| (*s).to_owned()).collect(),
            schema_lower,
            schema_keyspaces,
        };

        let mut classes = self.inner.classes.write();
        if let Some(existing) = classes.get(&name) {
            // Lost a registration race; the first entry wins.
            return downcast_info(&name, existing);
        }
        classes.insert(name, entry);
        Ok(info)
    }

    pub fn select<T: Send + Sync + 'static>(&self, class: &Arc<ClassInfo<T>>) -> Select<T> {
        Select::new(self.clone(), class.clone())
    }

    pub fn insert<T: Send + Sync + 'static>(
        &self,
        class: &Arc<ClassInfo<T>>,
        record: T,
    ) -> Result<Insert<T>, Error> {
        Insert::new(self.clone(), class.clone(), record)
    }

    pub fn update<T: Send + Sync + 'static>(
        &self,
        class: &Arc<ClassInfo<T>>,
        record: T,
    ) -> Result<Update<T>, Error> {
        Update::new(self.clone(), class.clone(), record)
    }

    /// A DELETE with explicit clauses, bound to no particular record.
    pub fn delete<T: Send + Sync + 'static>(&self, class: &Arc<ClassInfo<T>>) -> Delete<T> {
        Delete::new(self.clone(), class.clone(), None)
    }

    /// A DELETE of one record's rows.
    pub fn delete_record<T: Send + Sync + 'static>(&self, class: &Arc<ClassInfo<T>>, record: T) -> Delete<T> {
        Delete::new(self.clone(), class.clone(), Some(record))
    }

    pub fn create_schema<T: Send + Sync + 'static>(&self, class: &Arc<ClassInfo<T>>) -> CreateSchema<T> {
        CreateSchema::new(self.clone(), class.clone())
    }

    pub fn alter_schema<T: Send + Sync + 'static>(&self, class: &Arc<ClassInfo<T>>) -> AlterSchema<T> {
        AlterSchema::new(self.clone(), class.clone())
    }

    pub fn truncate<T: Send + Sync + 'static>(&self, class: &Arc<ClassInfo<T>>) -> Truncate<T> {
        Truncate::new(self.clone(), class.clone())
    }

    pub fn batch(&self) -> Batch {
        Batch::new(self.clone(), BatchKind::Logged)
    }

    pub fn unlogged_batch(&self) -> Batch {
        Batch::new(self.clone(), BatchKind::Unlogged)
    }

    pub fn counter_batch(&self) -> Batch {
        Batch::new(self.clone(), BatchKind::Counter)
    }

    pub fn sequence(&self) -> Sequence {
        Sequence::new(self.clone())
    }

    pub fn group(&self) -> Group {
        Group::new(self.clone())
    }

    pub fn raw(&self, keyspace: &str, cql: &str) -> RawCql {
        RawCql::new(self.clone(), keyspace, cql)
    }

    /// Schema creation across every registered type whose keyspace keys are
    /// a subset of `keys` — or exactly `keys`, in matching mode.
    pub fn create_schemas(&self, keys: &KeyspaceKeyMap) -> Schemas {
        self.schemas(SchemaOp::Create { if_not_exists: true }, keys, false)
    }

    pub fn create_schemas_matching(&self, keys: &KeyspaceKeyMap) -> Schemas {
        self.schemas(SchemaOp::Create { if_not_exists: true }, keys, true)
    }

    pub fn alter_schemas(&self, keys: &KeyspaceKeyMap) -> Schemas {
        self.schemas(SchemaOp::Alter, keys, false)
    }

    pub fn alter_schemas_matching(&self, keys: &KeyspaceKeyMap) -> Schemas {
        self.schemas(SchemaOp::Alter, keys, true)
    }

    fn schemas(&self, op: SchemaOp, keys: &KeyspaceKeyMap, matching: bool) -> Schemas {
        let provided: BTreeSet<String> = keys.names().iter().map(|s| (*s).to_owned()).collect();
        let classes = self.inner.classes.read();
        let mut selected: Vec<(String, Vec<String>, SelectedClass)> = Vec::new();
        for (name, class) in classes.iter() {
            let fits = if matching {
                class.key_names == provided
            } else {
                class.key_names.is_subset(&provided)
            };
            if !fits {
                continue;
            }
            let keyspaces = match (class.schema_keyspaces)(keys) {
                Ok(keyspaces) => keyspaces,
                Err(error) => {
                    tracing::warn!(class = name.as_str(), %error, "cannot resolve keyspaces; skipped");
                    continue;
                }
            };
            selected.push((
                name.clone(),
                class.initial_deps.clone(),
                SelectedClass {
                    name: name.clone(),
                    lower: class.schema_lower.clone(),
                    keyspaces,
                },
            ));
        }
        drop(classes);
        let ordered = dependency_order(selected);
        Schemas::new(self.clone(), op, keys.clone(), matching, ordered)
    }

    /// Builds the lowering context, observing the given keyspaces first.
    pub(crate) async fn lower_context(&self, keyspaces: &[String]) -> Result<LowerContext, Error> {
        self.ensure_live()?;
        let mut ctx = LowerContext::new(self.inner.codecs.clone());
        {
            let config = self.inner.config.read();
            ctx.default_usings = config.default_usings.clone();
            ctx.full_trace = config.full_trace;
            ctx.default_replication = config.default_replication.clone();
        }
        for keyspace in keyspaces {
            let observed = match self.inner.transport.observe_schema(keyspace).await {
                Ok(observed) => observed,
                Err(ExecutionError::UnknownKeyspace { .. }) => None,
                Err(error) => return Err(Error::Execution(error)),
            };
            ctx.observed.insert(keyspace.clone(), observed);
        }
        Ok(ctx)
    }

    pub(crate) async fn execute_plan(
        &self,
        plan: &Lowered,
        options: &StatementOptions,
    ) -> Result<Vec<Box<dyn RawResultSet>>, Error> {
        self.execute_plan_with(plan, options, CancellationToken::new()).await
    }

    pub(crate) async fn execute_plan_with(
        &self,
        plan: &Lowered,
        options: &StatementOptions,
        cancel: CancellationToken,
    ) -> Result<Vec<Box<dyn RawResultSet>>, Error> {
        self.ensure_live()?;
        let ctl = ExecControl {
            cancel,
            deadline: options.timeout.map(|t| tokio::time::Instant::now() + t),
            default_parallel: self.default_parallel_factor(),
        };
        exec::execute_lowered(self, plan, &ctl).await
    }

    /// Observed cluster node count × 32, floored at one node.
    pub(crate) fn default_parallel_factor(&self) -> usize {
        self.inner.transport.cluster_metadata().nodes.max(1) * 32
    }
}

fn key_clauses(keys: &KeyspaceKeyMap) -> Vec<Clause> {
    keys.iter()
        .map(|(column, value)| Clause::Eq {
            column: column.to_owned(),
            value: value.clone(),
        })
        .collect()
}

fn downcast_info<T: Send + Sync + 'static>(
    name: &str,
    entry: &RegisteredClass,
) -> Result<Arc<ClassInfo<T>>, Error> {
    entry
        .info
        .clone()
        .downcast::<ClassInfo<T>>()
        .map_err(|_| Error::Other(anyhow::anyhow!("record type `{name}` is registered under a different Rust type")))
}

/// Orders classes so initial-row dependencies apply first. Cycles are
/// broken by registration order with a warning.
fn dependency_order(mut selected: Vec<(String, Vec<String>, SelectedClass)>) -> Vec<SelectedClass> {
    let names: BTreeSet<String> = selected.iter().map(|(n, _, _)| n.clone()).collect();
    let mut ordered = Vec::with_capacity(selected.len());
    while !selected.is_empty() {
        let ready = selected.iter().position(|(_, deps, _)| {
            deps.iter()
                .all(|d| !names.contains(d) || ordered.iter().any(|c: &SelectedClass| c.name == *d))
        });
        match ready {
            Some(index) => {
                let (_, _, class) = selected.remove(index);
                ordered.push(class);
            }
            None => {
                tracing::warn!("initial-row dependency cycle; falling back to registration order");
                ordered.extend(selected.drain(..).map(|(_, _, c)| c));
            }
        }
    }
    ordered
}
