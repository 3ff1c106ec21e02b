//! Schema lowering: creation sequences, idempotent re-creation, ALTER
//! diffing, and the multi-class registry operations.

mod common;

use common::*;
use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tessera::lower::LowerContext;
use tessera::statement::AnyStatement;
use tessera::transport::{ObservedKeyspace, ObservedTable};
use tessera::{Clause, Error, LowerError};
use tessera_schema::{FieldDef, KeyspaceDef, Replication};
use tessera_types::CqlType;

fn ctx(session: &tessera::Session) -> LowerContext {
    LowerContext::new(session.codecs().clone())
}

fn observed_user_keyspace() -> ObservedKeyspace {
    let mut tables = std::collections::HashMap::new();
    for (name, key) in [("user_by_id", "id"), ("user_by_email", "email")] {
        let mut columns = IndexMap::new();
        columns.insert("id".to_owned(), CqlType::BigInt);
        columns.insert("email".to_owned(), CqlType::Text);
        columns.insert("name".to_owned(), CqlType::Text);
        // Partition key first, as compiled.
        columns.move_index(columns.get_index_of(key).unwrap(), 0);
        tables.insert(
            name.to_owned(),
            ObservedTable {
                columns,
                partition_key: vec![key.to_owned()],
                clustering_key: vec![],
            },
        );
    }
    ObservedKeyspace {
        name: "app".to_owned(),
        replication: Replication::simple(1),
        durable_writes: true,
        tables,
        udts: std::collections::HashMap::new(),
    }
}

#[test]
fn create_schema_orders_keyspace_tables_and_initial_rows() {
    let (session, _) = session();
    let users = session
        .register(user_descriptor().initial_rows(|_| {
            vec![User {
                id: 1,
                email: "root@x".into(),
                name: None,
            }]
        }))
        .unwrap();

    let create = session.create_schema(&users);
    let plan = create.lower(&ctx(&session)).unwrap();
    let cql: Vec<String> = plan.statements().iter().map(|s| s.cql.clone()).collect();

    assert!(cql[0].starts_with("CREATE KEYSPACE app WITH replication"), "{}", cql[0]);
    assert!(cql[1].starts_with("CREATE TABLE app.user_by_id ("), "{}", cql[1]);
    assert!(cql[2].starts_with("CREATE TABLE app.user_by_email ("), "{}", cql[2]);
    assert!(cql[3].starts_with("INSERT INTO app.user_by_id"), "{}", cql[3]);
    assert!(cql[4].starts_with("INSERT INTO app.user_by_email"), "{}", cql[4]);
}

#[test]
fn create_table_text_carries_primary_key_and_options() {
    let (session, _) = session();
    let users = session.register(user_descriptor()).unwrap();
    let plan = session.create_schema(&users).lower(&ctx(&session)).unwrap();
    let create_by_id = plan
        .statements()
        .iter()
        .find(|s| s.cql.contains("user_by_id"))
        .unwrap()
        .cql
        .clone();
    assert_eq!(
        create_by_id,
        "CREATE TABLE app.user_by_id (id bigint, email text, name text, PRIMARY KEY ((id)))"
    );
}

#[test]
fn recreation_skips_steps_whose_postconditions_hold() {
    let (session, _) = session();
    let users = session.register(user_descriptor()).unwrap();

    let context = ctx(&session).with_observed("app", Some(observed_user_keyspace()));
    let plan = session.create_schema(&users).if_not_exists().lower(&context).unwrap();
    // Keyspace and both tables already exist with identical columns:
    // nothing but (idempotent) index creation remains — and user has none.
    assert!(plan.statements().is_empty(), "{:?}", plan.statements());
}

#[test]
fn alter_emits_only_the_missing_column() {
    let (session, _) = session();
    let users = session
        .register(
            user_descriptor().field(
                FieldDef::new("tags", CqlType::set(CqlType::Text), |_u: &User| {
                    tessera_types::CqlValue::Set(vec![])
                })
                .regular("user_by_id"),
            ),
        )
        .unwrap();

    let context = ctx(&session).with_observed("app", Some(observed_user_keyspace()));
    let plan = session.alter_schema(&users).lower(&context).unwrap();
    let cql: Vec<String> = plan.statements().iter().map(|s| s.cql.clone()).collect();
    assert_eq!(cql, vec!["ALTER TABLE app.user_by_id ADD tags set<text>"]);
}

#[test]
fn alter_accepts_compatible_type_changes_only() {
    let (session, _) = session();
    let users = session.register(user_descriptor()).unwrap();

    // email observed as ascii: alterable to text.
    let mut observed = observed_user_keyspace();
    observed
        .tables
        .get_mut("user_by_id")
        .unwrap()
        .columns
        .insert("email".to_owned(), CqlType::Ascii);
    let context = ctx(&session).with_observed("app", Some(observed));
    let plan = session.alter_schema(&users).lower(&context).unwrap();
    let cql: Vec<String> = plan.statements().iter().map(|s| s.cql.clone()).collect();
    assert_eq!(cql, vec!["ALTER TABLE app.user_by_id ALTER email TYPE text"]);

    // name observed as bigint: not alterable to text.
    let mut observed = observed_user_keyspace();
    observed
        .tables
        .get_mut("user_by_id")
        .unwrap()
        .columns
        .insert("name".to_owned(), CqlType::BigInt);
    let context = ctx(&session).with_observed("app", Some(observed));
    let err = session.alter_schema(&users).lower(&context).unwrap_err();
    assert!(matches!(err, LowerError::AlterIncompatible { .. }));
}

#[test]
fn partition_key_changes_are_incompatible() {
    let (session, _) = session();
    let users = session.register(user_descriptor()).unwrap();
    let mut observed = observed_user_keyspace();
    observed.tables.get_mut("user_by_id").unwrap().partition_key = vec!["email".to_owned()];
    let context = ctx(&session).with_observed("app", Some(observed));
    let err = session.alter_schema(&users).lower(&context).unwrap_err();
    assert!(matches!(err, LowerError::AlterIncompatible { table, .. } if table == "user_by_id"));
}

#[test]
fn alter_against_an_absent_keyspace_creates_everything() {
    let (session, _) = session();
    let users = session.register(user_descriptor()).unwrap();
    let context = ctx(&session).with_observed("app", None);
    let plan = session.alter_schema(&users).lower(&context).unwrap();
    assert!(plan.statements()[0].cql.starts_with("CREATE KEYSPACE app"));
}

#[test]
fn truncate_covers_every_table() {
    let (session, _) = session();
    let users = session.register(user_descriptor()).unwrap();
    let plan = session.truncate(&users).lower(&ctx(&session)).unwrap();
    let cql: Vec<String> = plan.statements().iter().map(|s| s.cql.clone()).collect();
    assert_eq!(cql, vec!["TRUNCATE app.user_by_id", "TRUNCATE app.user_by_email"]);
}

#[test]
fn schema_for_keyspace_keyed_types_needs_key_values() {
    let (session, _) = session();
    let events = session.register(event_descriptor()).unwrap();

    let err = session.create_schema(&events).keyspaces_to_observe().unwrap_err();
    assert!(matches!(err, LowerError::MissingKeyspaceKey { .. }));

    let create = session.create_schema(&events).where_(Clause::eq("tenant", "acme"));
    let plan = create.lower(&ctx(&session)).unwrap();
    assert!(plan.statements()[0].cql.starts_with("CREATE KEYSPACE app_acme"));
}

#[test]
fn registered_types_sharing_a_keyspace_must_agree() {
    let (session, _) = session();
    session.register(user_descriptor()).unwrap();

    let conflicting = hit_descriptor().keyspace(KeyspaceDef::new("app").durable_writes(false));
    let err = session.register(conflicting).unwrap_err();
    assert!(matches!(err, Error::KeyspaceAgreement { keyspace } if keyspace == "app"));
}

#[test]
fn registration_is_idempotent_per_type() {
    let (session, _) = session();
    let first = session.register(user_descriptor()).unwrap();
    let second = session.register(user_descriptor()).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn schemas_selects_by_subset_or_exact_match() {
    let (session, _) = session();
    session.register(user_descriptor()).unwrap();
    session.register(event_descriptor()).unwrap();

    let keys: tessera_schema::KeyspaceKeyMap = [("tenant", "acme")].into_iter().collect();

    // Subset mode: `user` declares no keys (trivially a subset), `event`
    // declares exactly {tenant}.
    let subset = session.create_schemas(&keys);
    assert_eq!(subset.covered(), vec!["user", "event"]);

    let matching = session.create_schemas_matching(&keys);
    assert_eq!(matching.covered(), vec!["event"]);
}

#[test]
fn schemas_orders_initial_row_dependencies_first() {
    let (session, _) = session();
    // `event` inserts initial rows that reference `user` rows.
    session
        .register(event_descriptor().initial_rows_after(["user"], |_| Vec::new()))
        .unwrap();
    session.register(user_descriptor()).unwrap();

    let keys: tessera_schema::KeyspaceKeyMap = [("tenant", "acme")].into_iter().collect();
    let schemas = session.create_schemas(&keys);
    assert_eq!(schemas.covered(), vec!["user", "event"]);
}

#[test]
fn global_manager_initializes_exactly_once() {
    let (_, transport) = session();
    let first = tessera::Session::initialize(transport.clone());
    let second = tessera::Session::initialize(transport);
    // Another test in this process may have initialized already; either
    // way only the first call anywhere can succeed.
    assert!(matches!(first, Ok(_) | Err(Error::AlreadyInitialized)));
    assert!(matches!(second, Err(Error::AlreadyInitialized)));
    assert!(tessera::Session::global().is_ok());
}

#[test]
fn create_table_renders_clustering_order_and_static_columns() {
    let (session, _) = session();
    let readings = session
        .register(
            tessera_schema::RecordDescriptor::<Reading>::new("reading", |row| {
                Ok(Reading {
                    sensor: row.text("sensor")?.unwrap_or_default(),
                    ts: row.bigint("ts")?.unwrap_or_default(),
                    value: row.double("value")?.unwrap_or_default(),
                    site: row.text("site")?.unwrap_or_default(),
                })
            })
            .keyspace(KeyspaceDef::new("app"))
            .table("readings")
            .field(
                FieldDef::new("sensor", CqlType::Text, |r: &Reading| r.sensor.clone().into())
                    .partition_key("readings", 0),
            )
            .field(
                FieldDef::new("ts", CqlType::BigInt, |r: &Reading| r.ts.into()).clustering_key(
                    "readings",
                    0,
                    tessera_schema::SortOrder::Desc,
                ),
            )
            .field(FieldDef::new("value", CqlType::Double, |r: &Reading| r.value.into()).regular("readings"))
            .field(FieldDef::new("site", CqlType::Text, |r: &Reading| r.site.clone().into()).static_column("readings")),
        )
        .unwrap();

    let plan = session.create_schema(&readings).lower(&ctx(&session)).unwrap();
    let create = plan
        .statements()
        .iter()
        .find(|s| s.cql.contains("CREATE TABLE"))
        .unwrap()
        .cql
        .clone();
    assert_eq!(
        create,
        "CREATE TABLE app.readings (sensor text, ts bigint, value double, site text static, \
         PRIMARY KEY ((sensor), ts)) WITH CLUSTERING ORDER BY (ts DESC)"
    );
}

#[test]
fn user_defined_types_are_created_before_tables() {
    let (session, _) = session();
    let address = tessera_types::UdtDef::new("address", vec![("street".into(), CqlType::Text)]);
    let with_udt = user_descriptor().field(
        FieldDef::new("home", CqlType::Udt(address), |_u: &User| tessera_types::CqlValue::Null)
            .regular("user_by_id"),
    );
    let users = session.register(with_udt).unwrap();

    let plan = session.create_schema(&users).lower(&ctx(&session)).unwrap();
    let cql: Vec<String> = plan.statements().iter().map(|s| s.cql.clone()).collect();
    let type_at = cql.iter().position(|s| s.starts_with("CREATE TYPE app.address (street text)")).unwrap();
    let table_at = cql.iter().position(|s| s.starts_with("CREATE TABLE")).unwrap();
    assert!(type_at < table_at);
    assert!(cql.iter().any(|s| s.contains("home frozen<address>")));
}

#[derive(Debug, Clone)]
struct Reading {
    sensor: String,
    ts: i64,
    value: f64,
    site: String,
}
