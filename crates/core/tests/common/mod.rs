//! Shared fixtures: record types, descriptors, and a scripted transport.

use bytes::Bytes;
use std::sync::Arc;
use tessera::prelude::*;
use tessera::testing::MockTransport;
use tessera::transport::RawRow;

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
}

/// Two denormalized tables over one record: keyed by id and by email.
pub fn user_descriptor() -> RecordDescriptor<User> {
    RecordDescriptor::new("user", |row: &RowValues| {
        Ok(User {
            id: row.bigint("id")?.unwrap_or_default(),
            email: row.text("email")?.unwrap_or_default(),
            name: row.text("name")?,
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
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub tenant: String,
    pub id: i64,
    pub payload: String,
}

/// A tenant-keyspaced record: `tenant` picks the physical keyspace.
pub fn event_descriptor() -> RecordDescriptor<Event> {
    RecordDescriptor::new("event", |row: &RowValues| {
        Ok(Event {
            tenant: String::new(),
            id: row.bigint("id")?.unwrap_or_default(),
            payload: row.text("payload")?.unwrap_or_default(),
        })
    })
    .keyspace(KeyspaceDef::new("app").key("tenant"))
    .table("events")
    .field(FieldDef::new("tenant", CqlType::Text, |e: &Event| e.tenant.clone().into()).keyspace_key())
    .field(FieldDef::new("id", CqlType::BigInt, |e: &Event| e.id.into()).partition_key("events", 0))
    .field(FieldDef::new("payload", CqlType::Text, |e: &Event| e.payload.clone().into()).regular("events"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: i64,
    pub count: i64,
}

/// A counter table.
pub fn hit_descriptor() -> RecordDescriptor<Hit> {
    RecordDescriptor::new("hit", |row: &RowValues| {
        Ok(Hit {
            id: row.bigint("id")?.unwrap_or_default(),
            count: row.bigint("count")?.unwrap_or_default(),
        })
    })
    .keyspace(KeyspaceDef::new("app"))
    .table("hits")
    .field(FieldDef::new("id", CqlType::BigInt, |h: &Hit| h.id.into()).partition_key("hits", 0))
    .field(FieldDef::new("count", CqlType::Counter, |h: &Hit| CqlValue::Counter(h.count)).counter("hits"))
}

pub fn session() -> (Session, Arc<MockTransport>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let transport = MockTransport::new(1);
    let session = Session::detached(transport.clone());
    (session, transport)
}

pub fn sample_user() -> User {
    User {
        id: 7,
        email: "a@x".to_owned(),
        name: Some("A".to_owned()),
    }
}

/// A wire row for the user tables.
pub fn user_row(id: i64, email: &str, name: &str) -> RawRow {
    [
        ("id", Some(Bytes::copy_from_slice(&id.to_be_bytes()))),
        ("email", Some(Bytes::copy_from_slice(email.as_bytes()))),
        ("name", Some(Bytes::copy_from_slice(name.as_bytes()))),
    ]
    .into_iter()
    .collect()
}
