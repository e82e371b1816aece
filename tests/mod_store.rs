use bson::{Bson, doc};
use doclayer::query::{AggregateOptions, FindOneAndUpdateOptions, FindOptions};
use doclayer::store::QUERY_TARGET;
use doclayer::utils::devlog;
use doclayer::{DocumentStore, MemoryStore, QueryContext, StoreError};
use std::sync::Arc;

fn bg() -> QueryContext {
    QueryContext::background()
}

#[test]
fn insert_generates_leading_object_id() {
    let store = MemoryStore::new("s");
    let id = store.insert_one(&bg(), "c", doc! { "a": 1 }).unwrap();
    assert!(id.as_object_id().is_some());
    let docs: Vec<_> = store.find(&bg(), "c", &doc! {}, &FindOptions::new()).unwrap().collect();
    assert_eq!(docs[0].keys().next().map(String::as_str), Some("_id"));
    assert_eq!(docs[0].get("_id"), Some(&id));

    let err = store.insert_one(&bg(), "c", doc! { "_id": id, "a": 2 }).unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey { .. }));
    assert_eq!(store.list_collection_names(), ["c"]);
}

#[test]
fn upserts_seed_from_filter_equalities() {
    let store = MemoryStore::new("s");
    let res = store
        .update(&bg(), "c", &doc! { "k": "x", "n": { "$gt": 1 } }, &doc! { "$inc": { "hits": 1 } }, false, true)
        .unwrap();
    assert_eq!((res.matched_count, res.modified_count), (0, 0));
    assert!(res.upserted_id.is_some());
    let doc = store.find(&bg(), "c", &doc! {}, &FindOptions::new()).unwrap().next().unwrap();
    assert_eq!(doc.get_str("k").ok(), Some("x"));
    assert!(doc.get("n").is_none());
    assert_eq!(doc.get("hits"), Some(&Bson::Int32(1)));

    let again = store
        .update(&bg(), "c", &doc! { "k": "x" }, &doc! { "$inc": { "hits": 1 } }, false, true)
        .unwrap();
    assert_eq!((again.matched_count, again.modified_count), (1, 1));
    assert!(again.upserted_id.is_none());
}

#[test]
fn unchanged_documents_are_not_counted_as_modified() {
    let store = MemoryStore::new("s");
    store.insert_one(&bg(), "c", doc! { "a": 1 }).unwrap();
    let res = store.update(&bg(), "c", &doc! {}, &doc! { "$set": { "a": 1 } }, true, false).unwrap();
    assert_eq!((res.matched_count, res.modified_count), (1, 0));
}

#[test]
fn replacement_rules() {
    let store = MemoryStore::new("s");
    store.insert_one(&bg(), "c", doc! { "_id": 1, "a": 1 }).unwrap();
    let err = store.replace_one(&bg(), "c", &doc! { "_id": 1 }, doc! { "$set": { "a": 2 } }, false).unwrap_err();
    assert!(matches!(err, StoreError::UpdateError(_)));
    let err = store.replace_one(&bg(), "c", &doc! { "_id": 1 }, doc! { "_id": 2, "a": 2 }, false).unwrap_err();
    assert!(matches!(err, StoreError::UpdateError(_)));

    let ok = store.replace_one(&bg(), "c", &doc! { "_id": 1 }, doc! { "b": 3 }, false).unwrap();
    assert_eq!(ok.modified_count, 1);
    let d = store.find(&bg(), "c", &doc! { "_id": 1 }, &FindOptions::new()).unwrap().next().unwrap();
    assert_eq!(d, doc! { "_id": 1, "b": 3 });
}

#[test]
fn find_one_and_update_honours_sort() {
    let store = MemoryStore::new("s");
    for n in [3, 1, 2] {
        store.insert_one(&bg(), "c", doc! { "n": n }).unwrap();
    }
    let opts = FindOneAndUpdateOptions {
        sort: Some(vec![doclayer::SortSpec::asc("n")]),
        ..Default::default()
    };
    let before = store
        .find_one_and_update(&bg(), "c", &doc! {}, &doc! { "$set": { "picked": true } }, &opts)
        .unwrap()
        .unwrap();
    assert_eq!(before.get_i32("n").ok(), Some(1));
    assert!(before.get("picked").is_none());
    assert_eq!(store.count(&bg(), "c", &doc! { "picked": true }).unwrap(), 1);
}

#[test]
fn group_stage_accumulators() {
    let store = MemoryStore::new("s");
    for (team, score) in [("a", 1), ("b", 5), ("a", 3)] {
        store.insert_one(&bg(), "c", doc! { "team": team, "score": score }).unwrap();
    }
    let pipeline = [
        doc! { "$group": {
            "_id": "$team",
            "sum": { "$sum": "$score" },
            "avg": { "$avg": "$score" },
            "max": { "$max": "$score" },
            "all": { "$push": "$score" },
        } },
        doc! { "$sort": { "_id": 1 } },
    ];
    let out: Vec<_> = store
        .aggregate(&bg(), "c", &pipeline, &AggregateOptions::default())
        .unwrap()
        .collect();
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].get_str("_id").ok(), Some("a"));
    assert_eq!(out[0].get("sum"), Some(&Bson::Int32(4)));
    assert_eq!(out[0].get_f64("avg").ok(), Some(2.0));
    assert_eq!(out[0].get("max"), Some(&Bson::Int32(3)));
    assert_eq!(out[0].get_array("all").map(Vec::len).ok(), Some(2));
    assert_eq!(store.open_cursors(), 0);
}

#[test]
fn command_monitor_logs_lifecycle() {
    let store = MemoryStore::new("s").with_command_logging(true);
    let _g = devlog::enable_thread_sink();
    store.insert_one(&bg(), "c", doc! { "a": 1 }).unwrap();
    let _ = store.count(&bg(), "c", &doc! { "a": { "$bad": 1 } });
    let lines = devlog::drain();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("[1] insert started on c"));
    assert!(lines[1].starts_with("[1] insert succeeded in"));
    assert!(lines[3].starts_with("[2] count failed in"));

    store.monitor().set_enabled(false);
    store.insert_one(&bg(), "c", doc! { "a": 2 }).unwrap();
    assert!(devlog::drain().is_empty());
    assert_eq!(QUERY_TARGET, "doclayer::query");
}

#[test]
fn open_missing_snapshot_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::open(&dir.path().join("none.bson"), "fresh").unwrap();
    assert_eq!(store.db_name(), "fresh");
    assert!(store.list_collection_names().is_empty());

    let junk = dir.path().join("junk.bson");
    std::fs::write(&junk, b"not bson").unwrap();
    assert!(MemoryStore::open(&junk, "x").is_err());
}

#[test]
fn concurrent_inserts_are_all_kept() {
    let store = Arc::new(MemoryStore::new("s"));
    store.create_unique_index("c", "k").unwrap();
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..50 {
                    store.insert_one(&QueryContext::background(), "c", doc! { "k": t * 100 + i }).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(store.count(&bg(), "c", &doc! {}).unwrap(), 200);
    let dup = store.insert_one(&bg(), "c", doc! { "k": 101 });
    assert!(matches!(dup, Err(StoreError::DuplicateKey { .. })));
}

#[test]
fn dropping_a_collection_forgets_its_index() {
    let store = MemoryStore::new("s");
    store.create_unique_index("c", "k").unwrap();
    store.insert_one(&bg(), "c", doc! { "k": 1 }).unwrap();
    assert!(store.drop_collection("c"));
    assert!(!store.drop_collection("c"));
    store.insert_one(&bg(), "c", doc! { "k": 1 }).unwrap();
    store.insert_one(&bg(), "c", doc! { "k": 1 }).unwrap();
    assert_eq!(store.count(&bg(), "c", &doc! { "k": 1 }).unwrap(), 2);
}
