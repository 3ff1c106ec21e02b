//! Lowering behavior: statement shapes, multi-table fan-out, primary-key
//! reassignment, and keyspace-key splitting.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use tessera::lower::LowerContext;
use tessera::statement::{AnyStatement, Lowered};
use tessera::{Assignment, Clause, LowerError};

fn ctx(session: &tessera::Session) -> LowerContext {
    LowerContext::new(session.codecs().clone())
}

fn cql_of(plan: &Lowered) -> Vec<String> {
    plan.statements().iter().map(|s| s.cql.clone()).collect()
}

#[test]
fn insert_fans_out_to_every_table() {
    let (session, _) = session();
    let users = session.register(user_descriptor()).unwrap();
    let insert = session.insert(&users, sample_user()).unwrap();
    let plan = insert.lower(&ctx(&session)).unwrap();
    assert_eq!(
        cql_of(&plan),
        vec![
            "INSERT INTO app.user_by_id (id, email, name) VALUES (7, 'a@x', 'A')",
            "INSERT INTO app.user_by_email (email, id, name) VALUES ('a@x', 7, 'A')",
        ]
    );
}

#[test]
fn conditional_insert_applies_the_condition_per_table() {
    let (session, _) = session();
    let users = session.register(user_descriptor()).unwrap();
    let insert = session.insert(&users, sample_user()).unwrap().if_not_exists();
    let plan = insert.lower(&ctx(&session)).unwrap();
    for stmt in plan.statements() {
        assert!(stmt.cql.ends_with(" IF NOT EXISTS"), "{}", stmt.cql);
        assert!(stmt.conditional);
    }
}

#[test]
fn update_defaults_to_record_identity_and_full_assignment() {
    let (session, _) = session();
    let users = session.register(user_descriptor()).unwrap();
    let update = session.update(&users, sample_user()).unwrap();
    let plan = update.lower(&ctx(&session)).unwrap();
    assert_eq!(
        cql_of(&plan),
        vec![
            "UPDATE app.user_by_id SET email = 'a@x', name = 'A' WHERE id = 7",
            "UPDATE app.user_by_email SET id = 7, name = 'A' WHERE email = 'a@x'",
        ]
    );
}

#[test]
fn pk_reassignment_rewrites_as_delete_then_insert_across_tables() {
    let (session, _) = session();
    let users = session.register(user_descriptor()).unwrap();
    let update = session
        .update(&users, sample_user())
        .unwrap()
        .set("email", "b@x")
        .previous("email", "a@x");
    let plan = update.lower(&ctx(&session)).unwrap();

    assert_eq!(
        cql_of(&plan),
        vec![
            "DELETE FROM app.user_by_id WHERE id = 7",
            "INSERT INTO app.user_by_id (id, email, name) VALUES (7, 'b@x', 'A')",
            "DELETE FROM app.user_by_email WHERE email = 'a@x'",
            "INSERT INTO app.user_by_email (email, id, name) VALUES ('b@x', 7, 'A')",
        ]
    );

    // Per table the delete precedes its insert; tables are independent.
    let Lowered::Group { children, .. } = &plan else {
        panic!("expected a group of per-table sequences");
    };
    assert_eq!(children.len(), 2);
    for child in children {
        assert!(matches!(child, Lowered::Sequence(steps) if steps.len() == 2));
    }
}

#[test]
fn pk_reassignment_without_previous_uses_current_values() {
    let (session, _) = session();
    let users = session.register(user_descriptor()).unwrap();
    let update = session
        .update(&users, sample_user())
        .unwrap()
        .set("email", "b@x");
    let plan = update.lower(&ctx(&session)).unwrap();
    // The record's current email identifies the old row.
    assert!(cql_of(&plan).contains(&"DELETE FROM app.user_by_email WHERE email = 'a@x'".to_owned()));
}

#[test]
fn select_splits_on_keyspace_key_in() {
    let (session, _) = session();
    let events = session.register(event_descriptor()).unwrap();
    let select = session
        .select(&events)
        .where_(Clause::in_list("tenant", ["acme", "corp", "acme"]))
        .and(Clause::eq("id", 1i64));
    let plan = select.lower(&ctx(&session)).unwrap();
    // Input order, first occurrence wins on duplicates.
    assert_eq!(
        cql_of(&plan),
        vec![
            "SELECT * FROM app_acme.events WHERE id = 1",
            "SELECT * FROM app_corp.events WHERE id = 1",
        ]
    );
}

#[test]
fn empty_in_list_is_rejected() {
    let (session, _) = session();
    let events = session.register(event_descriptor()).unwrap();
    let select = session
        .select(&events)
        .where_(Clause::in_list("tenant", Vec::<String>::new()));
    let err = select.lower(&ctx(&session)).unwrap_err();
    assert!(matches!(err, LowerError::EmptyInList { column } if column == "tenant"));
}

#[test]
fn missing_keyspace_key_is_rejected() {
    let (session, _) = session();
    let events = session.register(event_descriptor()).unwrap();
    let select = session.select(&events).where_(Clause::eq("id", 1i64));
    let err = select.lower(&ctx(&session)).unwrap_err();
    assert!(matches!(err, LowerError::MissingKeyspaceKey { key } if key == "tenant"));
}

#[test]
fn excluded_keyspace_key_is_rejected() {
    let (session, _) = session();
    let events = session
        .register(
            event_descriptor()
                .keyspace(tessera::prelude::KeyspaceDef::new("app").key_excluding("tenant", vec!["system".into()])),
        )
        .unwrap();
    let select = session
        .select(&events)
        .where_(Clause::eq("tenant", "system"))
        .and(Clause::eq("id", 1i64));
    let err = select.lower(&ctx(&session)).unwrap_err();
    assert!(matches!(err, LowerError::ExcludedKeyspaceKey { .. }));
}

#[test]
fn select_picks_the_table_covering_the_clauses() {
    let (session, _) = session();
    let users = session.register(user_descriptor()).unwrap();

    let by_email = session.select(&users).where_(Clause::eq("email", "a@x"));
    let plan = by_email.lower(&ctx(&session)).unwrap();
    assert_eq!(plan.statements()[0].table.as_deref(), Some("user_by_email"));

    let by_id = session.select(&users).where_(Clause::eq("id", 7i64));
    let plan = by_id.lower(&ctx(&session)).unwrap();
    assert_eq!(plan.statements()[0].table.as_deref(), Some("user_by_id"));
}

#[test]
fn unknown_column_is_rejected() {
    let (session, _) = session();
    let users = session.register(user_descriptor()).unwrap();
    let select = session.select(&users).where_(Clause::eq("nope", 1i64));
    assert!(matches!(
        select.lower(&ctx(&session)).unwrap_err(),
        LowerError::UnknownColumn { .. }
    ));
}

#[test]
fn counter_update_renders_arithmetic() {
    let (session, _) = session();
    let hits = session.register(hit_descriptor()).unwrap();
    let update = session
        .update(&hits, Hit { id: 3, count: 0 })
        .unwrap()
        .assign(Assignment::incr_by("count", 5));
    let plan = update.lower(&ctx(&session)).unwrap();
    assert_eq!(cql_of(&plan), vec!["UPDATE app.hits SET count = count + 5 WHERE id = 3"]);
    assert!(!plan.statements()[0].idempotent);
}

#[test]
fn counter_operation_on_non_counter_column_is_rejected() {
    let (session, _) = session();
    let users = session.register(user_descriptor()).unwrap();
    let update = session
        .update(&users, sample_user())
        .unwrap()
        .assign(Assignment::incr("name"));
    assert!(matches!(
        update.lower(&ctx(&session)).unwrap_err(),
        LowerError::CounterOperationOnNonCounter { column } if column == "name"
    ));
}

#[test]
fn collection_assignments_render_in_place_edits() {
    let (session, _) = session();
    let users = session.register(user_descriptor()).unwrap();
    let update = session
        .update(&users, sample_user())
        .unwrap()
        .assign(Assignment::set("name", "B"));
    let plan = update.lower(&ctx(&session)).unwrap();
    for stmt in plan.statements() {
        assert!(stmt.cql.contains("SET name = 'B'"), "{}", stmt.cql);
    }
}

#[test]
fn delete_defaults_to_record_identity() {
    let (session, _) = session();
    let users = session.register(user_descriptor()).unwrap();
    let delete = session.delete_record(&users, sample_user());
    let plan = delete.lower(&ctx(&session)).unwrap();
    assert_eq!(
        cql_of(&plan),
        vec![
            "DELETE FROM app.user_by_id WHERE id = 7",
            "DELETE FROM app.user_by_email WHERE email = 'a@x'",
        ]
    );
}

#[test]
fn lowering_is_deterministic() {
    let (session, _) = session();
    let users = session.register(user_descriptor()).unwrap();
    let update = session
        .update(&users, sample_user())
        .unwrap()
        .set("email", "b@x")
        .previous("email", "a@x");
    let first = cql_of(&update.lower(&ctx(&session)).unwrap());
    let second = cql_of(&update.lower(&ctx(&session)).unwrap());
    assert_eq!(first, second);
}

#[test]
fn using_options_render_and_attach() {
    let (session, _) = session();
    let users = session.register(user_descriptor()).unwrap();
    let insert = session
        .insert(&users, sample_user())
        .unwrap()
        .using(tessera::Using::Ttl(60))
        .using(tessera::Using::Timestamp(1_000_000));
    let plan = insert.lower(&ctx(&session)).unwrap();
    let stmt = plan.statements()[0];
    assert!(stmt.cql.ends_with("USING TIMESTAMP 1000000 AND TTL 60"), "{}", stmt.cql);
    assert_eq!(stmt.using_ttl, Some(60));
    assert_eq!(stmt.using_timestamp, Some(1_000_000));
}

#[test]
fn reserved_identifiers_are_quoted() {
    let (session, _) = session();
    let orders = session
        .register(
            tessera::prelude::RecordDescriptor::<User>::new("order", |_| {
                Ok(User {
                    id: 0,
                    email: String::new(),
                    name: None,
                })
            })
            .keyspace(tessera::prelude::KeyspaceDef::new("app"))
            .table("order")
            .field(
                tessera::prelude::FieldDef::new("id", tessera::prelude::CqlType::BigInt, |u: &User| u.id.into())
                    .partition_key("order", 0),
            ),
        )
        .unwrap();
    let select = session.select(&orders).where_(Clause::eq("id", 1i64));
    let plan = select.lower(&ctx(&session)).unwrap();
    assert_eq!(cql_of(&plan), vec!["SELECT * FROM app.\"order\" WHERE id = 1"]);
}

#[test]
fn type_entities_stamp_and_filter_on_the_discriminator() {
    let (session, _) = session();
    let dogs = session
        .register(
            tessera::prelude::RecordDescriptor::<User>::new("dog", |row: &tessera::prelude::RowValues| {
                Ok(User {
                    id: row.bigint("id")?.unwrap_or_default(),
                    email: String::new(),
                    name: row.text("name")?,
                })
            })
            .keyspace(tessera::prelude::KeyspaceDef::new("app"))
            .table("animals")
            .field(
                tessera::prelude::FieldDef::new("id", tessera::prelude::CqlType::BigInt, |u: &User| u.id.into())
                    .partition_key("animals", 0),
            )
            .field(
                tessera::prelude::FieldDef::new("name", tessera::prelude::CqlType::Text, |u: &User| {
                    u.name.clone().into()
                })
                .regular("animals"),
            )
            .discriminated_as("dog"),
        )
        .unwrap();

    let insert = session
        .insert(
            &dogs,
            User {
                id: 1,
                email: String::new(),
                name: Some("rex".into()),
            },
        )
        .unwrap();
    let plan = insert.lower(&ctx(&session)).unwrap();
    assert_eq!(
        cql_of(&plan),
        vec!["INSERT INTO app.animals (id, name, kind) VALUES (1, 'rex', 'dog')"]
    );

    let select = session.select(&dogs).where_(Clause::eq("id", 1i64));
    let plan = select.lower(&ctx(&session)).unwrap();
    assert_eq!(
        cql_of(&plan),
        vec!["SELECT * FROM app.animals WHERE id = 1 AND kind = 'dog'"]
    );
}

#[test]
fn partitioned_like_constrains_the_partition_key_only() {
    let (session, _) = session();
    let users = session.register(user_descriptor()).unwrap();
    let delete = session
        .delete_record(&users, sample_user())
        .where_(Clause::is_partitioned_like());
    let plan = delete.lower(&ctx(&session)).unwrap();
    assert_eq!(
        cql_of(&plan),
        vec![
            "DELETE FROM app.user_by_id WHERE id = 7",
            "DELETE FROM app.user_by_email WHERE email = 'a@x'",
        ]
    );
}

#[test]
fn suffixed_like_resolves_the_keyspace_from_the_record() {
    let (session, _) = session();
    let events = session.register(event_descriptor()).unwrap();
    let update = session
        .update(
            &events,
            Event {
                tenant: "acme".into(),
                id: 5,
                payload: "p".into(),
            },
        )
        .unwrap()
        .where_(Clause::is_suffixed_like())
        .and(Clause::is_partitioned_like());
    let plan = update.lower(&ctx(&session)).unwrap();
    assert_eq!(
        cql_of(&plan),
        vec!["UPDATE app_acme.events SET payload = 'p' WHERE id = 5"]
    );
}

#[test]
fn mandatory_collections_write_the_empty_collection() {
    let (session, _) = session();
    let users = session
        .register(
            user_descriptor().field(
                tessera::prelude::FieldDef::new(
                    "tags",
                    tessera::prelude::CqlType::set(tessera::prelude::CqlType::Text),
                    |_u: &User| tessera::prelude::CqlValue::Null,
                )
                .mandatory()
                .regular("user_by_id"),
            ),
        )
        .unwrap();
    let insert = session
        .insert(
            &users,
            User {
                id: 7,
                email: "a@x".into(),
                name: None,
            },
        )
        .unwrap();
    let plan = insert.lower(&ctx(&session)).unwrap();
    // Null name is omitted; the null mandatory set becomes `{}`.
    assert_eq!(
        cql_of(&plan)[0],
        "INSERT INTO app.user_by_id (id, email, tags) VALUES (7, 'a@x', {})"
    );
}

#[test]
fn persisted_fields_store_compressed_blobs() {
    let (session, _) = session();
    let events = session
        .register(
            event_descriptor().field(
                tessera::prelude::FieldDef::new("body", tessera::prelude::CqlType::Text, |e: &Event| {
                    e.payload.clone().into()
                })
                .persisted()
                .regular("events"),
            ),
        )
        .unwrap();
    let insert = session
        .insert(
            &events,
            Event {
                tenant: "acme".into(),
                id: 1,
                payload: "compress me please, repeatedly repeatedly repeatedly".into(),
            },
        )
        .unwrap();
    let plan = insert.lower(&ctx(&session)).unwrap();
    let cql = &cql_of(&plan)[0];
    assert!(cql.contains("body"), "{cql}");
    assert!(cql.contains(", 0x"), "{cql}");
}
