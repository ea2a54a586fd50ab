//! Purpose: End-to-end tests for lazy find cursors through the public API.
//! Role: Validate page following, caller limits, state rules, and similarity
//! passthrough against a scripted transport.
//! Invariants: Page identity is derived from the request's pageState option.
//! Invariants: No network; the transport double is the wire peer.
use std::time::Duration;

use quiver_client::api::{CursorState, Error, ErrorKind, FindOptions, RetryPolicy};
use serde_json::{Value, json};

mod common;
use common::{ScriptedTransport, client, events_collection, response};

/// Three pages of two, two, and one documents: ids 1..=5.
fn paged_handler(body: &Value) -> Value {
    let (documents, next): (Vec<Value>, Option<&str>) =
        match body["find"]["options"]["pageState"].as_str() {
            None => (vec![json!({"_id": 1}), json!({"_id": 2})], Some("p1")),
            Some("p1") => (vec![json!({"_id": 3}), json!({"_id": 4})], Some("p2")),
            Some("p2") => (vec![json!({"_id": 5})], None),
            Some(other) => panic!("unexpected page state {other}"),
        };
    json!({"data": {"documents": documents, "nextPageState": next}})
}

#[test]
fn cursor_yields_five_documents_across_three_fetches() {
    let transport =
        ScriptedTransport::new(|command, _call| Ok(response(paged_handler(&command.body()))));
    let mut cursor = events_collection(transport.clone())
        .find(&FindOptions::new())
        .expect("cursor");
    assert_eq!(cursor.state(), CursorState::NotStarted);

    let mut ids = Vec::new();
    while let Some(document) = cursor.next_document().expect("next") {
        ids.push(document["_id"].as_u64().expect("id"));
    }

    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert_eq!(transport.call_count(), 3);
    assert_eq!(cursor.state(), CursorState::Exhausted);

    // An exhausted cursor yields nothing more and never re-fetches.
    assert!(cursor.next_document().expect("next").is_none());
    assert_eq!(transport.call_count(), 3);
}

#[test]
fn caller_limit_stops_yielding_and_fetching() {
    let transport =
        ScriptedTransport::new(|command, _call| Ok(response(paged_handler(&command.body()))));
    let cursor = events_collection(transport.clone())
        .find(&FindOptions {
            limit: Some(3),
            ..FindOptions::new()
        })
        .expect("cursor");

    let documents = cursor.collect_documents().expect("documents");
    assert_eq!(documents.len(), 3);
    // The limit landed inside page two; page three was never requested.
    assert_eq!(transport.call_count(), 2);
}

#[test]
fn mutating_a_started_cursor_is_a_state_error() {
    let transport =
        ScriptedTransport::new(|command, _call| Ok(response(paged_handler(&command.body()))));
    let mut cursor = events_collection(transport)
        .find(&FindOptions::new())
        .expect("cursor");
    cursor.next_document().expect("next").expect("document");

    let err = cursor
        .with_filter(json!({"kind": "login"}))
        .expect_err("err");
    assert_eq!(err.kind(), ErrorKind::State);
}

#[test]
fn vector_find_passes_similarity_through_in_service_order() {
    let transport = ScriptedTransport::new(|_command, _call| {
        Ok(response(json!({"data": {"documents": [
            {"_id": "close", "$similarity": 0.97},
            {"_id": "far", "$similarity": 0.41},
        ]}})))
    });
    let cursor = events_collection(transport.clone())
        .find(&FindOptions {
            vector: Some(vec![0.5, 0.25, 0.125]),
            include_similarity: true,
            ..FindOptions::new()
        })
        .expect("cursor");

    let documents = cursor.collect_documents().expect("documents");
    assert_eq!(documents[0]["_id"], json!("close"));
    assert_eq!(documents[0]["$similarity"], json!(0.97));
    assert_eq!(documents[1]["$similarity"], json!(0.41));

    let request = &transport.request_bodies()[0];
    assert_eq!(request["find"]["sort"]["$vector"], json!([0.5, 0.25, 0.125]));
    assert_eq!(request["find"]["options"]["includeSimilarity"], json!(true));
}

#[test]
fn transient_page_failure_is_retried_by_the_governor() {
    let transport = ScriptedTransport::new(|command, call| {
        if call == 0 {
            return Err(Error::new(ErrorKind::Transport).with_message("connection reset"));
        }
        Ok(response(paged_handler(&command.body())))
    });
    let policy = RetryPolicy {
        max_attempts: 2,
        backoff: Duration::from_millis(1),
        retryable_codes: Default::default(),
    };
    let cursor = client(transport.clone())
        .with_retry_policy(policy)
        .database("app")
        .collection("events")
        .find(&FindOptions::new())
        .expect("cursor");

    let documents = cursor.collect_documents().expect("documents");
    assert_eq!(documents.len(), 5);
    // Three pages plus the one retried first attempt.
    assert_eq!(transport.call_count(), 4);
}

#[test]
fn service_error_page_surfaces_with_find_context() {
    let transport = ScriptedTransport::new(|_command, _call| {
        Ok(response(json!({"errors": [
            {"message": "unknown collection", "errorCode": "COLLECTION_NOT_EXIST"}
        ]})))
    });
    let mut cursor = events_collection(transport)
        .find(&FindOptions::new())
        .expect("cursor");

    let err = cursor.next_document().expect_err("err");
    assert_eq!(err.kind(), ErrorKind::Service);
    assert_eq!(err.code(), Some("COLLECTION_NOT_EXIST"));
    assert!(err.to_string().contains("find"));
}
