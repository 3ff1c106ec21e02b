//! Result streams: lazy decoding, paging, cross-keyspace stitching, and
//! read-path error classification.

mod common;

use common::*;
use bytes::Bytes;
use pretty_assertions::assert_eq;
use std::time::Duration;
use tessera::error::ExecutionError;
use tessera::testing::MockData;
use tessera::transport::RawRow;
use tessera::{Clause, Error};

#[tokio::test]
async fn rows_decode_into_records() {
    let (session, transport) = session();
    let users = session.register(user_descriptor()).unwrap();
    transport.when(
        |s| s.cql.starts_with("SELECT"),
        |_| Ok(MockData::rows(vec![user_row(7, "a@x", "A"), user_row(8, "b@x", "B")])),
    );

    let mut set = session
        .select(&users)
        .where_(Clause::eq("id", 7i64))
        .execute()
        .await
        .unwrap();
    let all = set.all().await.unwrap();
    assert_eq!(
        all,
        vec![
            User {
                id: 7,
                email: "a@x".into(),
                name: Some("A".into()),
            },
            User {
                id: 8,
                email: "b@x".into(),
                name: Some("B".into()),
            },
        ]
    );
    assert!(set.is_exhausted());
}

#[tokio::test]
async fn paging_fetches_lazily() {
    let (session, transport) = session();
    let users = session.register(user_descriptor()).unwrap();
    transport.when(
        |s| s.cql.starts_with("SELECT"),
        |_| {
            Ok(MockData::paged(vec![
                vec![user_row(1, "1@x", "one")],
                vec![user_row(2, "2@x", "two")],
            ]))
        },
    );

    let mut set = session
        .select(&users)
        .where_(Clause::eq("id", 1i64))
        .execute()
        .await
        .unwrap();
    assert_eq!(set.available_without_fetching(), 1);
    assert!(!set.is_exhausted());

    assert_eq!(set.one().await.unwrap().unwrap().id, 1);
    // Second row lives on the next page; one() fetches it.
    assert_eq!(set.one().await.unwrap().unwrap().id, 2);
    assert_eq!(set.one().await.unwrap(), None);
}

#[tokio::test]
async fn split_select_stitches_keyspaces_in_input_order() {
    let (session, transport) = session();
    let events = session.register(event_descriptor()).unwrap();
    transport.when(
        |s| s.keyspace == "app_acme",
        |_| {
            Ok(MockData::rows(vec![event_row(1, "acme-event")]))
        },
    );
    transport.when(
        |s| s.keyspace == "app_corp",
        |_| {
            Ok(MockData::rows(vec![event_row(2, "corp-event")]))
        },
    );

    let mut set = session
        .select(&events)
        .where_(Clause::in_list("tenant", ["acme", "corp"]))
        .and(Clause::gte("id", 0i64))
        .execute()
        .await
        .unwrap();
    let all = set.all().await.unwrap();
    let payloads: Vec<_> = all.iter().map(|e| e.payload.as_str()).collect();
    assert_eq!(payloads, vec!["acme-event", "corp-event"]);
}

#[tokio::test]
async fn a_bad_row_does_not_poison_the_stream() {
    let (session, transport) = session();
    let users = session.register(user_descriptor()).unwrap();
    let bad_row: RawRow = [("id", Some(Bytes::from_static(b"xx")))].into_iter().collect();
    transport.when(
        move |s| s.cql.starts_with("SELECT"),
        move |_| Ok(MockData::rows(vec![bad_row.clone(), user_row(9, "ok@x", "ok")])),
    );

    let mut set = session
        .select(&users)
        .where_(Clause::eq("id", 9i64))
        .execute()
        .await
        .unwrap();
    assert!(matches!(set.one().await.unwrap_err(), Error::ObjectConversion { .. }));
    // The failing row has been consumed; the next row decodes fine.
    assert_eq!(set.one().await.unwrap().unwrap().id, 9);
}

#[tokio::test]
async fn unknown_keyspace_on_read_is_object_not_found() {
    let (session, transport) = session();
    let users = session.register(user_descriptor()).unwrap();
    transport.when(
        |s| s.cql.starts_with("SELECT"),
        |s| {
            Err(ExecutionError::UnknownKeyspace {
                keyspace: s.keyspace.clone(),
            })
        },
    );

    let err = session
        .select(&users)
        .where_(Clause::eq("id", 1i64))
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ObjectNotFound { keyspace } if keyspace == "app"));
}

#[tokio::test]
async fn select_one_enforces_cardinality() {
    let (session, transport) = session();
    let users = session.register(user_descriptor()).unwrap();
    transport.when(
        |s| s.cql.starts_with("SELECT"),
        |_| Ok(MockData::rows(vec![user_row(1, "1@x", "one"), user_row(2, "2@x", "two")])),
    );

    let select = session.select(&users).where_(Clause::gte("id", 0i64)).allow_filtering();
    assert!(matches!(
        select.execute_one().await.unwrap_err(),
        Error::TooManyMatchesFound { .. }
    ));

    let (session2, transport2) = common::session();
    let users = session2.register(user_descriptor()).unwrap();
    transport2.when(|s| s.cql.starts_with("SELECT"), |_| Ok(MockData::empty()));
    let select = session2.select(&users).where_(Clause::eq("id", 1i64));
    assert_eq!(select.execute_one().await.unwrap(), None);
    assert!(matches!(
        select.execute_one_required().await.unwrap_err(),
        Error::ObjectMissing
    ));
}

#[tokio::test]
async fn last_result_future_yields_the_final_statement() {
    let (session, transport) = session();
    transport.base_delay(Duration::from_millis(10));

    let mut group = session.group().parallel_factor(2);
    for name in ["L-1", "L-2", "L-3"] {
        group.add(session.raw("ks", name)).unwrap();
    }
    let future = group.submit_last();
    let last = future.get().await.unwrap();
    assert!(last.is_some());
    assert!(future.is_done());
}

fn event_row(id: i64, payload: &str) -> RawRow {
    [
        ("id", Some(Bytes::copy_from_slice(&id.to_be_bytes()))),
        ("payload", Some(Bytes::copy_from_slice(payload.as_bytes()))),
    ]
    .into_iter()
    .collect()
}
