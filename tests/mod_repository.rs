use bson::oid::ObjectId;
use bson::{DateTime, doc};
use doclayer::query::{BulkWriteOptions, FindOneAndUpdateOptions, ReturnDocument};
use doclayer::utils::devlog;
use doclayer::{
    BaseRepository, BulkOperation, FilterBuilder, FindOptions, MemoryStore, Projection, QueryContext,
    RepositoryError, SortSpec, StoreError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct Product {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    created_at: Option<DateTime>,
    updated_at: Option<DateTime>,
    name: String,
    price: i64,
    tags: Vec<String>,
}

doclayer::impl_model!(Product, "products");

fn product(name: &str, price: i64, tags: &[&str]) -> Product {
    Product {
        name: name.into(),
        price,
        tags: tags.iter().map(|t| (*t).to_string()).collect(),
        ..Product::default()
    }
}

fn setup() -> (Arc<MemoryStore>, BaseRepository, QueryContext) {
    let store = Arc::new(MemoryStore::new("shop"));
    let repo = BaseRepository::new(store.clone());
    (store, repo, QueryContext::background())
}

fn seeded() -> (Arc<MemoryStore>, BaseRepository, QueryContext) {
    let (store, repo, ctx) = setup();
    let mut items = vec![
        product("apple", 3, &["fruit", "red"]),
        product("banana", 1, &["fruit"]),
        product("carrot", 2, &["veg"]),
        product("durian", 9, &["fruit", "smelly"]),
    ];
    repo.insert_many(&ctx, &mut items).unwrap();
    (store, repo, ctx)
}

#[test]
fn save_stamps_system_fields() {
    let (_s, repo, ctx) = setup();
    let mut p = product("apple", 3, &[]);
    repo.save(&ctx, &mut p).unwrap();
    let id = p.id.expect("id assigned");
    assert!(p.created_at.is_some());
    assert_eq!(p.created_at, p.updated_at);

    let back: Product = repo.find_by_id(&ctx, &id.to_hex()).unwrap();
    assert_eq!(back, p);
}

#[test]
fn zero_matches() {
    let (_s, repo, ctx) = seeded();
    let none = FilterBuilder::new().eq("name", "kiwi").build();
    let found: Vec<Product> = repo.find(&ctx, none.clone(), &FindOptions::new()).unwrap();
    assert!(found.is_empty());
    let err = repo.find_one::<Product>(&ctx, none, None).unwrap_err();
    assert!(err.is_not_found());
    let missing = ObjectId::new().to_hex();
    assert!(repo.find_by_id::<Product>(&ctx, &missing).unwrap_err().is_not_found());
}

#[test]
fn find_without_limit_returns_every_match() {
    let (_s, repo, ctx) = setup();
    let mut items: Vec<Product> = (0..10_005).map(|n| product("bulk", n, &[])).collect();
    repo.insert_many(&ctx, &mut items).unwrap();
    let all: Vec<Product> = repo.find(&ctx, doc! {}, &FindOptions::new()).unwrap();
    assert_eq!(all.len() as u64, repo.count_documents::<Product>(&ctx, doc! {}).unwrap());
    assert_eq!(all.len(), 10_005);
    let capped: Vec<Product> = repo.find(&ctx, doc! {}, &FindOptions::new().limit(12_000)).unwrap();
    assert_eq!(capped.len(), 10_005);
}

#[test]
fn large_integer_predicates_are_exact() {
    let (_s, repo, ctx) = setup();
    let big = (1_i64 << 53) + 1;
    repo.save(&ctx, &mut product("wide", big, &[])).unwrap();
    let eq_below = repo.count_documents::<Product>(&ctx, FilterBuilder::new().eq("price", big - 1).build()).unwrap();
    let gt_below = repo.count_documents::<Product>(&ctx, FilterBuilder::new().gt("price", big - 1).build()).unwrap();
    assert_eq!((eq_below, gt_below), (0, 1));
    let ne_below = repo.count_documents::<Product>(&ctx, FilterBuilder::new().ne("price", big - 1).build()).unwrap();
    assert_eq!(ne_below, 1);
}

#[test]
fn malformed_id_never_reaches_the_store() {
    let store = Arc::new(MemoryStore::new("shop").with_command_logging(true));
    let repo = BaseRepository::new(store.clone());
    let ctx = QueryContext::background();
    let _g = devlog::enable_thread_sink();

    let err = repo.find_by_id::<Product>(&ctx, "not-a-valid-id").unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidIdentifier(ref s) if s == "not-a-valid-id"));
    assert!(devlog::drain().is_empty());

    repo.count_documents::<Product>(&ctx, doc! {}).unwrap();
    let lines = devlog::drain();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("count started on products"));
}

#[test]
fn find_options_apply() {
    let (_s, repo, ctx) = seeded();
    let opts = FindOptions::new().sort(SortSpec::desc("price")).skip(1).limit(2);
    let names: Vec<String> = repo
        .find::<Product>(&ctx, doc! {}, &opts)
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, ["apple", "carrot"]);

    let proj = FindOptions::new().projection(Projection::include(&["name"]));
    let first = repo.find_one::<Product>(&ctx, doc! { "name": "durian" }, Some(&proj)).unwrap();
    assert_eq!(first.name, "durian");
    assert_eq!(first.price, 0);
    assert!(first.id.is_some());
}

#[test]
fn builder_filters_through_repository() {
    let (_s, repo, ctx) = seeded();
    let mut fb = FilterBuilder::new();
    fb.gte("price", 2).in_values("tags", ["fruit"]);
    assert_eq!(repo.count_documents::<Product>(&ctx, fb.build()).unwrap(), 2);

    fb.or([doc! { "name": "apple" }, doc! { "name": "carrot" }]);
    // sibling predicates still apply alongside $or
    assert_eq!(repo.count::<Product>(&ctx, fb.build()).unwrap(), 1);

    let ci = FilterBuilder::new().regex("name", "^BAN").build();
    assert_eq!(repo.count_documents::<Product>(&ctx, ci).unwrap(), 1);
}

#[test]
fn unique_index_violation_is_persistence_error() {
    let (store, repo, ctx) = setup();
    store.create_unique_index("products", "name").unwrap();
    repo.save(&ctx, &mut product("apple", 1, &[])).unwrap();
    let err = repo.save(&ctx, &mut product("apple", 2, &[])).unwrap_err();
    assert!(err.is_persistence());
    assert!(matches!(err, RepositoryError::Persistence(StoreError::DuplicateKey { ref field, .. }) if field == "name"));
}

#[test]
fn partial_updates() {
    let (_s, repo, ctx) = seeded();
    let res = repo.update_one::<Product>(&ctx, doc! { "name": "apple" }, doc! { "$inc": { "price": 2 } }).unwrap();
    assert_eq!((res.matched_count, res.modified_count), (1, 1));
    let res = repo
        .update_many::<Product>(&ctx, doc! { "tags": "fruit" }, doc! { "$set": { "sale": true } })
        .unwrap();
    assert_eq!(res.matched_count, 3);
    let res = repo.update_one::<Product>(&ctx, doc! { "name": "kiwi" }, doc! { "$set": { "x": 1 } }).unwrap();
    assert_eq!((res.matched_count, res.modified_count), (0, 0));

    let apple = repo.find_one::<Product>(&ctx, doc! { "name": "apple" }, None).unwrap();
    assert_eq!(apple.price, 5);

    let bad = repo.update_one::<Product>(&ctx, doc! {}, doc! { "name": "x" }).unwrap_err();
    assert!(matches!(bad, RepositoryError::Persistence(StoreError::UpdateError(_))));
}

#[test]
fn find_one_and_update_returns_requested_version() {
    let (_s, repo, ctx) = seeded();
    let before = repo
        .find_one_and_update::<Product>(
            &ctx,
            doc! { "name": "banana" },
            doc! { "$set": { "price": 4 } },
            &FindOneAndUpdateOptions::default(),
        )
        .unwrap();
    assert_eq!(before.price, 1);

    let after_opts = FindOneAndUpdateOptions { return_document: ReturnDocument::After, ..Default::default() };
    let after = repo
        .find_one_and_update::<Product>(&ctx, doc! { "name": "banana" }, doc! { "$inc": { "price": 1 } }, &after_opts)
        .unwrap();
    assert_eq!(after.price, 5);

    let err = repo
        .find_one_and_update::<Product>(&ctx, doc! { "name": "kiwi" }, doc! { "$set": { "price": 1 } }, &after_opts)
        .unwrap_err();
    assert!(err.is_not_found());

    let upsert = FindOneAndUpdateOptions { upsert: true, ..after_opts };
    let kiwi = repo
        .find_one_and_update::<Product>(&ctx, doc! { "name": "kiwi" }, doc! { "$set": { "price": 7 } }, &upsert)
        .unwrap();
    assert_eq!((kiwi.name.as_str(), kiwi.price), ("kiwi", 7));
    assert!(kiwi.id.is_some());
}

#[test]
fn update_by_id_replaces_document() {
    let (_s, repo, ctx) = seeded();
    let mut apple = repo.find_one::<Product>(&ctx, doc! { "name": "apple" }, None).unwrap();
    let stamped = apple.updated_at;
    std::thread::sleep(Duration::from_millis(2));
    apple.price = 42;
    repo.update_by_id(&ctx, &mut apple).unwrap();
    assert!(apple.updated_at > stamped);
    let back = repo.find_one::<Product>(&ctx, doc! { "name": "apple" }, None).unwrap();
    assert_eq!(back, apple);

    let mut fresh = product("ghost", 1, &[]);
    assert!(repo.update_by_id(&ctx, &mut fresh).unwrap_err().is_invalid_identifier());
    fresh.id = Some(ObjectId::new());
    assert!(repo.update_by_id(&ctx, &mut fresh).unwrap_err().is_not_found());
}

#[test]
fn deletes() {
    let (_s, repo, ctx) = seeded();
    assert_eq!(repo.delete_one::<Product>(&ctx, doc! { "tags": "fruit" }).unwrap().deleted_count, 1);
    assert_eq!(repo.delete_one::<Product>(&ctx, doc! { "name": "kiwi" }).unwrap().deleted_count, 0);

    let carrot = repo.find_one::<Product>(&ctx, doc! { "name": "carrot" }, None).unwrap();
    assert_eq!(repo.delete_by_id(&ctx, &carrot).unwrap().deleted_count, 1);
    assert_eq!(repo.delete_by_id(&ctx, &carrot).unwrap().deleted_count, 0);

    assert_eq!(repo.delete_many::<Product>(&ctx, doc! {}).unwrap().deleted_count, 2);
    assert_eq!(repo.count_documents::<Product>(&ctx, doc! {}).unwrap(), 0);
}

#[test]
fn distinct_flattens_arrays_in_first_seen_order() {
    let (_s, repo, ctx) = seeded();
    let tags = repo.distinct::<Product>(&ctx, "tags", doc! {}).unwrap();
    let tags: Vec<&str> = tags.iter().filter_map(|b| b.as_str()).collect();
    assert_eq!(tags, ["fruit", "red", "veg", "smelly"]);
    let cheap = repo.distinct::<Product>(&ctx, "name", doc! { "price": { "$lt": 3 } }).unwrap();
    assert_eq!(cheap.len(), 2);
}

#[test]
fn aggregation() {
    let (_s, repo, ctx) = seeded();
    let pipeline = [
        doc! { "$match": { "tags": "fruit" } },
        doc! { "$group": { "_id": null, "total": { "$sum": "$price" }, "n": { "$sum": 1 } } },
    ];
    let out = repo.aggregate::<Product>(&ctx, &pipeline).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].get_i64("total").ok().or_else(|| out[0].get_i32("total").ok().map(i64::from)), Some(13));

    #[derive(Deserialize)]
    struct Named {
        name: String,
    }
    let sorted = [doc! { "$sort": { "name": -1 } }, doc! { "$project": { "name": 1 } }];
    let names: Vec<Named> = repo.aggregate_as::<Product, Named>(&ctx, &sorted).unwrap();
    assert_eq!(names.first().map(|n| n.name.as_str()), Some("durian"));

    let err = repo.aggregate::<Product>(&ctx, &[doc! { "$lookup": {} }]).unwrap_err();
    assert!(matches!(err, RepositoryError::Persistence(StoreError::UnsupportedStage(_))));
}

#[test]
fn bulk_write_ordered_and_unordered() {
    let (_s, repo, ctx) = setup();
    let fixed = ObjectId::new();
    let ops = || {
        vec![
            BulkOperation::Insert(Product { id: Some(fixed), ..product("a", 1, &[]) }),
            BulkOperation::Insert(Product { id: Some(fixed), ..product("dup", 1, &[]) }),
            BulkOperation::Insert(product("b", 2, &[])),
        ]
    };
    let err = repo.bulk_write(&ctx, ops(), &BulkWriteOptions { ordered: true }).unwrap_err();
    assert!(err.is_persistence());
    assert_eq!(repo.count_documents::<Product>(&ctx, doc! {}).unwrap(), 1);

    repo.delete_many::<Product>(&ctx, doc! {}).unwrap();
    assert!(repo.bulk_write(&ctx, ops(), &BulkWriteOptions { ordered: false }).is_err());
    assert_eq!(repo.count_documents::<Product>(&ctx, doc! {}).unwrap(), 2);

    let mixed = vec![
        BulkOperation::UpdateMany { filter: doc! {}, update: doc! { "$inc": { "price": 10 } } },
        BulkOperation::DeleteOne { filter: doc! { "name": "b" } },
        BulkOperation::Insert(product("c", 3, &[])),
    ];
    let res = repo.bulk_write(&ctx, mixed, &BulkWriteOptions::default()).unwrap();
    assert_eq!((res.matched_count, res.modified_count, res.deleted_count, res.inserted_count), (2, 2, 1, 1));
}

#[test]
fn expired_or_cancelled_context_aborts() {
    let (_s, repo, _) = seeded();
    let expired = repo.with_timeout(Duration::ZERO);
    let err = repo.find::<Product>(&expired, doc! {}, &FindOptions::new()).unwrap_err();
    assert!(matches!(err, RepositoryError::Persistence(StoreError::Timeout)));

    let ctx = QueryContext::background();
    ctx.cancel();
    let err = repo.count_documents::<Product>(&ctx, doc! {}).unwrap_err();
    assert!(matches!(err, RepositoryError::Persistence(StoreError::Cancelled)));

    let bounded = repo.clone().with_default_timeout(Duration::from_secs(5));
    assert!(bounded.context().remaining().is_some());
    assert_eq!(bounded.count_documents::<Product>(&bounded.context(), doc! {}).unwrap(), 4);
}

#[test]
fn cursors_are_released_even_when_decoding_fails() {
    let (store, repo, ctx) = seeded();
    use doclayer::DocumentStore;
    store.insert_one(&ctx, "products", doc! { "name": "broken", "price": "free" }).unwrap();

    let err = repo.find::<Product>(&ctx, doc! {}, &FindOptions::new()).unwrap_err();
    assert!(err.is_persistence());
    assert_eq!(store.open_cursors(), 0);

    repo.aggregate::<Product>(&ctx, &[doc! { "$limit": 2 }]).unwrap();
    repo.find_one::<Product>(&ctx, doc! { "name": "apple" }, None).unwrap();
    assert_eq!(store.open_cursors(), 0);
}
