use std::sync::Arc;

use kiosk_core::{Collection, Fields, KioskError, SortSpec};
use kiosk_source::{CollectionSource, DocumentStore, MemoryStore, PageRequest, PagedQuerySource};

fn fields(v: serde_json::Value) -> Fields { v.as_object().cloned().unwrap_or_default() }

async fn seed_products(store: &MemoryStore, n: usize) {
    for i in 0..n {
        let f = fields(serde_json::json!({ "name": format!("p{}", i), "price": (i as f64) * 1.5, "stock": (n - i) as i64 }));
        store.insert(Collection::Products, f).await.expect("insert");
    }
}

#[tokio::test]
async fn pages_walk_the_collection_in_sort_order() {
    let store = Arc::new(MemoryStore::new());
    seed_products(&store, 5).await;
    let src = CollectionSource::new(store.clone(), Collection::Products);
    let sort = SortSpec::parse("price-asc").unwrap();

    let p1 = src.fetch_page(PageRequest::first(sort.clone(), 2)).await.expect("p1");
    assert_eq!(p1.total_count, 5);
    assert_eq!(p1.records.iter().map(|d| d.label()).collect::<Vec<_>>(), vec!["p0", "p1"]);
    assert!(p1.next_cursor.is_some());

    let p2 = src
        .fetch_page(PageRequest { cursor: p1.next_cursor.clone(), page_size: 2, sort: sort.clone() })
        .await
        .expect("p2");
    assert_eq!(p2.records.iter().map(|d| d.label()).collect::<Vec<_>>(), vec!["p2", "p3"]);

    let p3 = src.fetch_page(PageRequest { cursor: p2.next_cursor, page_size: 2, sort }).await.expect("p3");
    assert_eq!(p3.records.len(), 1);
    assert!(p3.next_cursor.is_none(), "short page ends the collection");
}

#[tokio::test]
async fn default_sort_lists_newest_first() {
    let store = Arc::new(MemoryStore::new());
    seed_products(&store, 3).await;
    let src = CollectionSource::new(store, Collection::Products);
    let page = src.fetch_page(PageRequest::first(SortSpec::default(), 10)).await.unwrap();
    assert_eq!(page.records.iter().map(|d| d.label()).collect::<Vec<_>>(), vec!["p2", "p1", "p0"]);
}

#[tokio::test]
async fn unorderable_field_and_foreign_cursor_are_query_failures() {
    let store = Arc::new(MemoryStore::new());
    seed_products(&store, 3).await;
    let src = CollectionSource::new(store, Collection::Products);

    let err = src.fetch_page(PageRequest::first(SortSpec::parse("description-asc").unwrap(), 2)).await.unwrap_err();
    assert!(matches!(err, KioskError::Query(_)));

    let p1 = src.fetch_page(PageRequest::first(SortSpec::parse("name-asc").unwrap(), 1)).await.unwrap();
    let err = src
        .fetch_page(PageRequest { cursor: p1.next_cursor, page_size: 1, sort: SortSpec::parse("name-desc").unwrap() })
        .await
        .unwrap_err();
    assert!(matches!(err, KioskError::Query(_)));

    let err = src.fetch_page(PageRequest::first(SortSpec::default(), 0)).await.unwrap_err();
    assert!(matches!(err, KioskError::Validation(_)));
}

#[tokio::test]
async fn documents_missing_the_sort_field_are_skipped_but_counted() {
    let store = Arc::new(MemoryStore::new());
    store.insert(Collection::Orders, fields(serde_json::json!({ "customerName": "Ann", "total": 10 }))).await.unwrap();
    store.insert(Collection::Orders, fields(serde_json::json!({ "customerName": "Bob" }))).await.unwrap();
    let src = CollectionSource::new(store, Collection::Orders);
    let page = src.fetch_page(PageRequest::first(SortSpec::parse("total-desc").unwrap(), 5)).await.unwrap();
    assert_eq!(page.records.len(), 1);
    assert_eq!(page.total_count, 2);
    assert!(page.next_cursor.is_none());
}

#[tokio::test]
async fn unique_names_and_missing_ids_are_rejected() {
    let store = MemoryStore::new();
    let a = store.insert(Collection::Categories, fields(serde_json::json!({ "name": "Shoes" }))).await.unwrap();
    let err = store.insert(Collection::Categories, fields(serde_json::json!({ "name": "Shoes" }))).await.unwrap_err();
    assert!(matches!(err, KioskError::Mutation(_)));

    // Renaming to its own name is fine; renaming onto another is not
    store.update(Collection::Categories, &a.id, fields(serde_json::json!({ "name": "Shoes" }))).await.unwrap();
    let b = store.insert(Collection::Categories, fields(serde_json::json!({ "name": "Hats" }))).await.unwrap();
    let err = store.update(Collection::Categories, &b.id, fields(serde_json::json!({ "name": "Shoes" }))).await.unwrap_err();
    assert!(matches!(err, KioskError::Mutation(_)));

    let err = store.delete(Collection::Categories, "nope").await.unwrap_err();
    assert!(matches!(err, KioskError::NotFound(_)));
    // A missing id wins over a name clash, as in the SQLite store
    let err = store.update(Collection::Categories, "nope", fields(serde_json::json!({ "name": "Shoes" }))).await.unwrap_err();
    assert!(matches!(err, KioskError::NotFound(_)));
    let err = store.update(Collection::Tags, "nope", fields(serde_json::json!({ "name": "x" }))).await.unwrap_err();
    assert!(matches!(err, KioskError::NotFound(_)));
    assert_eq!(store.delete(Collection::Categories, &b.id).await.unwrap(), b.id);
}

#[tokio::test]
async fn update_merges_fields_and_bumps_updated_at() {
    let store = MemoryStore::new();
    let d = store
        .insert(Collection::Products, fields(serde_json::json!({ "name": "Mug", "price": 4, "id": "spoofed" })))
        .await
        .unwrap();
    assert_ne!(d.id, "spoofed");
    let u = store.update(Collection::Products, &d.id, fields(serde_json::json!({ "price": 5 }))).await.unwrap();
    assert_eq!(u.fields["name"], "Mug");
    assert_eq!(u.fields["price"], 5);
    assert_eq!(u.created_at, d.created_at);
    assert!(u.updated_at > d.updated_at);
}

#[tokio::test]
async fn offline_store_fails_reads_without_billing() {
    let store = MemoryStore::new();
    seed_products(&store, 1).await;
    store.set_offline(true);
    let err = store.count(Collection::Products).await.unwrap_err();
    assert!(matches!(err, KioskError::Query(_)));
    assert_eq!(store.reads(), 0);
    store.set_offline(false);
    assert_eq!(store.count(Collection::Products).await.unwrap(), 1);
    assert_eq!(store.reads(), 1);
}
