//! Integration tests for read-only store queries and the recipe lookups.

mod common;

use std::fs;
use std::sync::Arc;

use common::CursorRoot;
use phalcon_mcp::cursor::query::{CHAT_DATA_KEY, COMPOSER_INDEX_KEY};
use phalcon_mcp::cursor::{DiscoverySources, QueryEngine, QueryRequest, StoreRegistry, StoredValue};
use phalcon_mcp::error::QueryError;
use rusqlite::Connection;
use serde_json::json;

fn engine_for(root: &CursorRoot) -> QueryEngine {
    let registry = Arc::new(StoreRegistry::new(DiscoverySources {
        root: Some(root.path().to_path_buf()),
        project_dirs: Vec::new(),
    }));
    registry.refresh();
    QueryEngine::new(registry)
}

fn request<'a>(table: &'a str, query_type: &'a str, key: Option<&'a str>) -> QueryRequest<'a> {
    QueryRequest {
        project: "my-app",
        table,
        query_type,
        key,
        limit: 100,
    }
}

fn fixture() -> CursorRoot {
    let root = CursorRoot::new();
    root.add_workspace(
        "abc",
        "file:///home/u/code/my-app",
        &[
            ("a", r#"{"a":1}"#),
            (CHAT_DATA_KEY, r#"{"tabs":[{"title":"hello"}]}"#),
            ("plain", "not json at all"),
            ("editor.fontSize", "14"),
        ],
    );
    root
}

#[test]
fn get_by_key_miss_is_empty() {
    let root = fixture();
    let rows = engine_for(&root)
        .query(&request("ItemTable", "get_by_key", Some("nonexistent")))
        .unwrap();
    assert!(rows.is_empty());
}

#[test]
fn get_by_key_decodes_json() {
    let root = fixture();
    let rows = engine_for(&root)
        .query(&request("ItemTable", "get_by_key", Some("a")))
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].key, "a");
    assert_eq!(rows[0].value, StoredValue::Decoded(json!({"a": 1})));
}

#[test]
fn undecodable_value_stays_raw() {
    let root = fixture();
    let rows = engine_for(&root)
        .query(&request("ItemTable", "get_by_key", Some("plain")))
        .unwrap();
    assert_eq!(rows[0].value, StoredValue::Raw("not json at all".into()));
}

#[test]
fn search_keys_is_a_case_sensitive_substring_match() {
    let root = fixture();
    let engine = engine_for(&root);

    let mut req = request("ItemTable", "search_keys", Some("chat"));
    req.limit = 10;
    let rows = engine.query(&req).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].key, CHAT_DATA_KEY);

    let upper = engine.query(&request("ItemTable", "search_keys", Some("CHAT"))).unwrap();
    assert!(upper.is_empty());
}

#[test]
fn get_all_respects_limit() {
    let root = fixture();
    let engine = engine_for(&root);

    let all = engine.query(&request("ItemTable", "get_all", None)).unwrap();
    assert_eq!(all.len(), 4);

    let mut req = request("ItemTable", "get_all", None);
    req.limit = 2;
    assert_eq!(engine.query(&req).unwrap().len(), 2);
}

#[test]
fn odd_key_rows_do_not_sink_the_query() {
    let root = fixture();
    let engine = engine_for(&root);
    let store = engine.registry().store_path("my-app").unwrap();
    Connection::open(&store)
        .unwrap()
        .execute_batch(
            "INSERT INTO ItemTable (key, value) VALUES (NULL, '{\"orphan\":true}');
             INSERT INTO ItemTable (key, value) VALUES (CAST(X'FF61' AS TEXT), '1');",
        )
        .unwrap();

    let all = engine.query(&request("ItemTable", "get_all", None)).unwrap();
    assert_eq!(all.len(), 5, "NULL key skipped, the rest kept");
    assert!(all.iter().any(|r| r.key == "a"));
    assert!(all.iter().any(|r| r.key == "\u{FFFD}a"));

    let hits = engine
        .query(&request("ItemTable", "search_keys", Some("a")))
        .unwrap();
    assert!(hits.iter().any(|r| r.key == "\u{FFFD}a"));
}

#[test]
fn unknown_table_is_rejected_before_touching_the_store() {
    let root = fixture();
    let engine = engine_for(&root);
    let store = engine.registry().store_path("my-app").unwrap();
    fs::remove_file(&store).unwrap();

    let err = engine
        .query(&request("sqlite_master", "get_all", None))
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidArgument(_)));
}

#[test]
fn unknown_query_type_is_invalid() {
    let root = fixture();
    let err = engine_for(&root)
        .query(&request("ItemTable", "delete_all", None))
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidArgument(_)));
}

#[test]
fn keyed_query_without_key_is_invalid() {
    let root = fixture();
    let engine = engine_for(&root);
    for query_type in ["get_by_key", "search_keys"] {
        let err = engine.query(&request("ItemTable", query_type, None)).unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)), "{query_type}");
    }
}

#[test]
fn unknown_project_is_not_found() {
    let root = fixture();
    let mut req = request("ItemTable", "get_all", None);
    req.project = "other-app";
    let err = engine_for(&root).query(&req).unwrap_err();
    assert!(matches!(err, QueryError::NotFound(_)));
}

#[test]
fn missing_table_is_a_storage_error() {
    let root = CursorRoot::new();
    let ws = root.workspace_dir("bare");
    fs::write(ws.join("workspace.json"), r#"{"folder":"file:///code/my-app"}"#).unwrap();
    Connection::open(ws.join("state.vscdb"))
        .unwrap()
        .execute_batch("CREATE TABLE ItemTable (key TEXT, value BLOB);")
        .unwrap();

    let err = engine_for(&root)
        .query(&request("cursorDiskKV", "get_all", None))
        .unwrap_err();
    match err {
        QueryError::Storage { project, table, .. } => {
            assert_eq!(project, "my-app");
            assert_eq!(table, "cursorDiskKV");
        }
        other => panic!("expected storage error, got {other:?}"),
    }
}

#[test]
fn queries_leave_the_store_untouched() {
    let root = fixture();
    let engine = engine_for(&root);
    let store = engine.registry().store_path("my-app").unwrap();
    let before = fs::read(&store).unwrap();

    engine.query(&request("ItemTable", "get_all", None)).unwrap();
    engine.query(&request("cursorDiskKV", "search_keys", Some("x"))).unwrap();

    assert_eq!(fs::read(&store).unwrap(), before);
}

// ── Recipes ───────────────────────────────────────────────────────────────────

#[test]
fn chat_history_reads_the_chat_key() {
    let root = fixture();
    let value = engine_for(&root).chat_history("my-app").unwrap().unwrap();
    assert_eq!(value.into_json()["tabs"][0]["title"], "hello");
}

#[test]
fn absent_well_known_key_is_none() {
    let root = CursorRoot::new();
    root.add_workspace("abc", "file:///code/my-app", &[]);
    let engine = engine_for(&root);
    assert!(engine.chat_history("my-app").unwrap().is_none());
    assert!(engine.composer_ids("my-app").unwrap().is_none());
}

#[test]
fn composer_ids_and_detail() {
    let root = CursorRoot::new();
    root.add_workspace(
        "abc",
        "file:///code/my-app",
        &[(
            COMPOSER_INDEX_KEY,
            r#"{"allComposers":[{"composerId":"c-1","name":"first"},{"composerId":"c-2"}]}"#,
        )],
    );
    root.add_global_store(&[("composerData:c-1", r#"{"conversation":[{"text":"hi"}]}"#)]);
    let engine = engine_for(&root);

    assert_eq!(
        engine.composer_ids("my-app").unwrap(),
        Some(vec!["c-1".to_string(), "c-2".to_string()])
    );

    let detail = engine.composer_detail("c-1").unwrap().unwrap();
    assert_eq!(detail.into_json()["conversation"][0]["text"], "hi");
    assert!(engine.composer_detail("c-2").unwrap().is_none());
}

#[test]
fn composer_detail_without_global_store_is_not_found() {
    let root = fixture();
    let err = engine_for(&root).composer_detail("c-1").unwrap_err();
    assert!(matches!(err, QueryError::NotFound(_)));
}

#[test]
fn empty_composer_id_is_invalid() {
    let root = fixture();
    root.add_global_store(&[]);
    let err = engine_for(&root).composer_detail("").unwrap_err();
    assert!(matches!(err, QueryError::InvalidArgument(_)));
}
