mod common;

use common::object;
use serde_json::json;
use std::sync::{Arc, Barrier};
use std::thread;
use todo_core::db::{open_db, open_db_in_memory};
use todo_core::{
    ClientError, DocumentClient, QuerySpec, ResourceLink, Scope, SqliteDocumentClient,
};

fn seed_collection(client: &SqliteDocumentClient<'_>) -> ResourceLink {
    let database = client
        .create_resource(&Scope::Account, &object(json!({ "id": "ToDoList" })))
        .unwrap();
    let collection = client
        .create_resource(
            &Scope::Database(database.self_link.clone()),
            &object(json!({ "id": "Items" })),
        )
        .unwrap();
    collection.self_link
}

#[test]
fn duplicate_database_create_is_a_conflict() {
    let conn = open_db_in_memory().unwrap();
    let client = SqliteDocumentClient::new(&conn);
    let spec = object(json!({ "id": "ToDoList" }));

    let first = client.create_resource(&Scope::Account, &spec).unwrap();
    assert_eq!(first.self_link.as_str(), "dbs/ToDoList");

    let err = client.create_resource(&Scope::Account, &spec).unwrap_err();
    assert!(matches!(err, ClientError::Conflict(_)), "got {err}");

    let all = client
        .query_resources(&Scope::Account, &QuerySpec::new("SELECT * FROM root"))
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[test]
fn creating_under_missing_database_reports_scope_not_found() {
    let conn = open_db_in_memory().unwrap();
    let client = SqliteDocumentClient::new(&conn);
    let missing = ResourceLink::database("nope");

    let err = client
        .create_resource(&Scope::Database(missing.clone()), &object(json!({ "id": "Items" })))
        .unwrap_err();
    assert!(matches!(err, ClientError::ScopeNotFound(link) if link == missing));
}

#[test]
fn create_rejects_missing_or_invalid_ids() {
    let conn = open_db_in_memory().unwrap();
    let client = SqliteDocumentClient::new(&conn);

    for spec in [json!({}), json!({ "id": "" }), json!({ "id": "a/b" }), json!({ "id": 1 })] {
        let err = client
            .create_resource(&Scope::Account, &object(spec))
            .unwrap_err();
        assert!(matches!(err, ClientError::BadRequest(_)), "got {err}");
    }
}

#[test]
fn documents_carry_system_fields_and_ignore_caller_supplied_ones() {
    let conn = open_db_in_memory().unwrap();
    let client = SqliteDocumentClient::new(&conn);
    let collection = seed_collection(&client);

    let created = client
        .create_resource(
            &Scope::Collection(collection.clone()),
            &object(json!({ "id": "1", "name": "buy milk", "_etag": "forged" })),
        )
        .unwrap();

    assert_eq!(created.self_link, collection.document("1"));
    assert_ne!(created.etag, "forged");
    assert!(!created.content.contains_key("_etag"));

    let body = created.to_body();
    assert_eq!(body["id"], json!("1"));
    assert_eq!(body["name"], json!("buy milk"));
    assert_eq!(body["_self"], json!("dbs/ToDoList/colls/Items/docs/1"));
    assert!(body["_ts"].is_i64());
}

#[test]
fn read_returns_none_for_missing_resources() {
    let conn = open_db_in_memory().unwrap();
    let client = SqliteDocumentClient::new(&conn);
    let collection = seed_collection(&client);

    assert!(client.read_resource(&collection.document("ghost")).unwrap().is_none());
    assert!(client
        .read_resource(&ResourceLink::database("ghost"))
        .unwrap()
        .is_none());
    assert!(client.read_resource(&collection).unwrap().is_some());

    let err = client
        .read_resource(&ResourceLink::from_raw("dbs/a/docs/b"))
        .unwrap_err();
    assert!(matches!(err, ClientError::BadRequest(_)));
}

#[test]
fn replace_rotates_etag_and_keeps_rid() {
    let conn = open_db_in_memory().unwrap();
    let client = SqliteDocumentClient::new(&conn);
    let collection = seed_collection(&client);
    let scope = Scope::Collection(collection.clone());

    let created = client
        .create_resource(&scope, &object(json!({ "id": "1", "name": "buy milk" })))
        .unwrap();
    let replaced = client
        .replace_resource(
            &created.self_link,
            &object(json!({ "id": "1", "name": "buy oat milk" })),
        )
        .unwrap();

    assert_eq!(replaced.rid, created.rid);
    assert_ne!(replaced.etag, created.etag);
    assert_eq!(replaced.content["name"], json!("buy oat milk"));

    let read = client.read_resource(&created.self_link).unwrap().unwrap();
    assert_eq!(read, replaced);
}

#[test]
fn replace_reports_missing_documents_and_id_mismatch() {
    let conn = open_db_in_memory().unwrap();
    let client = SqliteDocumentClient::new(&conn);
    let collection = seed_collection(&client);

    let missing = collection.document("ghost");
    let err = client
        .replace_resource(&missing, &object(json!({ "name": "x" })))
        .unwrap_err();
    assert!(matches!(err, ClientError::NotFound(link) if link == missing));

    client
        .create_resource(&Scope::Collection(collection.clone()), &object(json!({ "id": "1" })))
        .unwrap();
    let err = client
        .replace_resource(&collection.document("1"), &object(json!({ "id": "2" })))
        .unwrap_err();
    assert!(matches!(err, ClientError::BadRequest(_)));

    let err = client
        .replace_resource(&collection, &object(json!({ "id": "Items" })))
        .unwrap_err();
    assert!(matches!(err, ClientError::BadRequest(_)));
}

#[test]
fn queries_filter_documents_in_insertion_order() {
    let conn = open_db_in_memory().unwrap();
    let client = SqliteDocumentClient::new(&conn);
    let collection = seed_collection(&client);
    let scope = Scope::Collection(collection);

    for (id, completed) in [("a", false), ("b", true), ("c", false)] {
        client
            .create_resource(&scope, &object(json!({ "id": id, "completed": completed })))
            .unwrap();
    }

    let open = client
        .query_resources(
            &scope,
            &QuerySpec::new("SELECT * FROM root r WHERE r.completed = @completed")
                .bind("completed", false),
        )
        .unwrap();
    let ids = open.iter().map(|d| d.id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, ["a", "c"]);

    let err = client
        .query_resources(&scope, &QuerySpec::new("SELECT name FROM root"))
        .unwrap_err();
    assert!(matches!(err, ClientError::BadRequest(_)));
}

#[test]
fn connect_binds_store_to_first_master_key() {
    let conn = open_db_in_memory().unwrap();

    assert!(SqliteDocumentClient::connect(&conn, "https://localhost:8081/", "key-1").is_ok());
    assert!(SqliteDocumentClient::connect(&conn, "https://localhost:8081/", " key-1 ").is_ok());

    let wrong = SqliteDocumentClient::connect(&conn, "https://localhost:8081/", "key-2");
    assert!(matches!(wrong, Err(ClientError::Unauthorized(_))));

    let blank = SqliteDocumentClient::connect(&conn, "https://localhost:8081/", "   ");
    assert!(matches!(blank, Err(ClientError::Unauthorized(_))));
}

#[test]
fn concurrent_first_connects_bind_exactly_one_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.sqlite3");
    drop(open_db(&path).unwrap());

    let contenders = 8;
    let barrier = Arc::new(Barrier::new(contenders));
    let handles = (0..contenders)
        .map(|index| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let key = format!("key-{index}");
                barrier.wait();
                SqliteDocumentClient::connect(&conn, "https://localhost:8081/", &key)
                    .map(|_| index)
            })
        })
        .collect::<Vec<_>>();

    let results = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect::<Vec<_>>();

    let winners = results
        .iter()
        .filter_map(|result| result.as_ref().ok().copied())
        .collect::<Vec<_>>();
    assert_eq!(winners.len(), 1, "results: {results:?}");
    assert!(results
        .iter()
        .filter_map(|result| result.as_ref().err())
        .all(|err| matches!(err, ClientError::Unauthorized(_))));

    let conn = open_db(&path).unwrap();
    let winner_key = format!("key-{}", winners[0]);
    assert!(SqliteDocumentClient::connect(&conn, "https://localhost:8081/", &winner_key).is_ok());
}
