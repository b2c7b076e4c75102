#![forbid(unsafe_code)]

mod common;

use common::{fields, five_products, labels, Probe};
use kiosk_core::{Collection, KioskError, SortOrder, SortSpec};
use kiosk_source::DocumentStore;
use kiosk_store::PaginationController;

fn by_price(probe: std::sync::Arc<Probe>, page_size: usize) -> PaginationController<std::sync::Arc<Probe>> {
    PaginationController::with_default_sort(probe, page_size, SortSpec::parse("price-asc").unwrap())
}

#[tokio::test]
async fn walks_five_records_with_one_fetch_per_new_page() {
    let probe = Probe::new(five_products().await);
    let mut pc = by_price(probe.clone(), 2);
    assert_eq!(pc.total_pages(), None);

    assert!(pc.initial_load().await.unwrap());
    assert_eq!(probe.calls(), 1);
    assert_eq!(labels(pc.current_items()), vec!["A", "B"]);
    assert_eq!(pc.total_pages(), Some(3));

    assert!(pc.next_page().await.unwrap());
    assert_eq!(probe.calls(), 2);
    assert_eq!(labels(pc.current_items()), vec!["C", "D"]);

    assert!(pc.next_page().await.unwrap());
    assert_eq!(probe.calls(), 3);
    assert_eq!(labels(pc.current_items()), vec!["E"]);
    assert!(pc.cache().is_exhausted());

    // End of data: nothing left to fetch, however often we ask
    assert!(!pc.next_page().await.unwrap());
    assert!(!pc.next_page().await.unwrap());
    assert_eq!(probe.calls(), 3);
    assert_eq!(pc.current_page(), 3);

    // Revisiting cached pages is local
    assert!(pc.previous_page());
    assert_eq!(labels(pc.current_items()), vec!["C", "D"]);
    assert!(pc.next_page().await.unwrap());
    assert_eq!(labels(pc.current_items()), vec!["E"]);
    assert!(!pc.initial_load().await.unwrap());
    assert_eq!(probe.calls(), 3);
}

#[tokio::test]
async fn previous_on_first_page_is_a_no_op() {
    let probe = Probe::new(five_products().await);
    let mut pc = by_price(probe.clone(), 2);
    pc.initial_load().await.unwrap();
    assert!(!pc.previous_page());
    assert_eq!(pc.current_page(), 1);
    assert_eq!(probe.calls(), 1);
}

#[tokio::test]
async fn sort_change_restarts_from_page_one_with_a_fresh_cache() {
    let probe = Probe::new(five_products().await);
    let mut pc = by_price(probe.clone(), 2);
    pc.initial_load().await.unwrap();
    pc.next_page().await.unwrap();
    assert_eq!(pc.cache().len(), 4);

    pc.change_sort("name", SortOrder::Desc).await.unwrap();
    assert_eq!(probe.calls(), 3);
    assert_eq!(pc.current_page(), 1);
    assert_eq!(pc.cache().len(), 2, "records of the old ordering are gone");
    assert_eq!(pc.sort().combined(), "name-desc");
    assert_eq!(labels(pc.current_items()), vec!["E", "D"]);

    // A page already seen under the old sort has to be fetched again
    pc.next_page().await.unwrap();
    assert_eq!(probe.calls(), 4);
    assert_eq!(labels(pc.current_items()), vec!["C", "B"]);
}

#[tokio::test]
async fn refresh_reloads_first_page_of_current_sort() {
    let store = five_products().await;
    let probe = Probe::new(store.clone());
    let mut pc = by_price(probe.clone(), 2);
    pc.initial_load().await.unwrap();
    pc.next_page().await.unwrap();

    store.insert(Collection::Products, fields(serde_json::json!({ "name": "Z", "price": 0 }))).await.unwrap();
    pc.refresh().await.unwrap();
    assert_eq!(pc.current_page(), 1);
    assert_eq!(labels(pc.current_items()), vec!["Z", "A"]);
    assert_eq!(pc.cache().total_count(), Some(6));
    assert_eq!(pc.sort().combined(), "price-asc");
}

#[tokio::test]
async fn growing_page_size_fetches_only_the_deficit() {
    let probe = Probe::new(five_products().await);
    let mut pc = by_price(probe.clone(), 2);
    pc.initial_load().await.unwrap();

    pc.set_page_size(3).await.unwrap();
    assert_eq!(probe.calls(), 2);
    assert_eq!(pc.cache().len(), 3);
    assert_eq!(labels(pc.current_items()), vec!["A", "B", "C"]);
    assert_eq!(pc.total_pages(), Some(2));

    // Shrinking is served from the cache
    pc.set_page_size(2).await.unwrap();
    assert_eq!(probe.calls(), 2);
    assert_eq!(labels(pc.current_items()), vec!["A", "B"]);

    let err = pc.set_page_size(0).await.unwrap_err();
    assert!(matches!(err, KioskError::Validation(_)));
    assert_eq!(pc.page_size(), 2);
}

#[tokio::test]
async fn page_size_change_resets_to_first_page() {
    let probe = Probe::new(five_products().await);
    let mut pc = by_price(probe.clone(), 2);
    pc.initial_load().await.unwrap();
    pc.next_page().await.unwrap();
    assert_eq!(pc.current_page(), 2);

    pc.set_page_size(4).await.unwrap();
    assert_eq!(pc.current_page(), 1);
    assert_eq!(probe.calls(), 2, "four records already cached");
    assert_eq!(labels(pc.current_items()), vec!["A", "B", "C", "D"]);
}

#[tokio::test]
async fn failed_transitions_leave_state_untouched() {
    let store = five_products().await;
    let probe = Probe::new(store.clone());
    let mut pc = by_price(probe.clone(), 2);
    pc.initial_load().await.unwrap();
    pc.next_page().await.unwrap();

    store.set_offline(true);
    let err = pc.next_page().await.unwrap_err();
    assert!(matches!(err, KioskError::Query(_)));
    assert_eq!(pc.current_page(), 2);
    assert_eq!(pc.cache().len(), 4);

    assert!(pc.change_sort("name", SortOrder::Asc).await.is_err());
    assert_eq!(pc.sort().combined(), "price-asc");
    assert_eq!(pc.current_page(), 2);

    assert!(pc.set_page_size(5).await.is_err());
    assert_eq!(pc.page_size(), 2);
    assert_eq!(labels(pc.current_items()), vec!["C", "D"]);

    // Retry once the store is back
    store.set_offline(false);
    assert!(pc.next_page().await.unwrap());
    assert_eq!(labels(pc.current_items()), vec!["E"]);
}

#[tokio::test]
async fn unorderable_sort_is_rejected_without_touching_the_cache() {
    let probe = Probe::new(five_products().await);
    let mut pc = by_price(probe.clone(), 2);
    pc.initial_load().await.unwrap();

    let err = pc.change_sort("description", SortOrder::Asc).await.unwrap_err();
    assert!(matches!(err, KioskError::Query(_)));
    let err = pc.change_sort("bad key!", SortOrder::Asc).await.unwrap_err();
    assert!(matches!(err, KioskError::Validation(_)));
    assert_eq!(pc.cache().len(), 2);
}

#[tokio::test]
async fn go_to_page_walks_forward_and_commits_on_success() {
    let store = five_products().await;
    let probe = Probe::new(store.clone());
    let mut pc = by_price(probe.clone(), 2);
    pc.initial_load().await.unwrap();

    assert!(matches!(pc.go_to_page(4).await.unwrap_err(), KioskError::Validation(_)));
    assert!(matches!(pc.go_to_page(0).await.unwrap_err(), KioskError::Validation(_)));

    store.set_offline(true);
    assert!(pc.go_to_page(3).await.is_err());
    assert_eq!(pc.cache().len(), 2);
    assert_eq!(pc.current_page(), 1);
    store.set_offline(false);

    let before = probe.calls();
    assert!(pc.go_to_page(3).await.unwrap());
    assert_eq!(probe.calls() - before, 2);
    assert_eq!(labels(pc.current_items()), vec!["E"]);

    assert!(pc.go_to_page(1).await.unwrap());
    assert_eq!(probe.calls() - before, 2);
    assert_eq!(labels(pc.current_items()), vec!["A", "B"]);
}

#[tokio::test]
async fn empty_collection_is_one_empty_page() {
    let probe = Probe::new(std::sync::Arc::new(kiosk_source::MemoryStore::new()));
    let mut pc = by_price(probe.clone(), 3);
    pc.initial_load().await.unwrap();
    assert!(pc.current_items().is_empty());
    assert_eq!(pc.total_pages(), Some(1));
    assert!(!pc.next_page().await.unwrap());
    assert_eq!(probe.calls(), 1);
}

#[tokio::test]
async fn local_patches_follow_crud_without_refetching() {
    let store = five_products().await;
    let probe = Probe::new(store.clone());
    let mut pc = by_price(probe.clone(), 2);
    pc.initial_load().await.unwrap();
    pc.next_page().await.unwrap();
    pc.next_page().await.unwrap();
    assert_eq!(pc.current_page(), 3);

    // Created on the last (partial) page: lands after E
    let created = store.insert(Collection::Products, fields(serde_json::json!({ "name": "F", "price": 9 }))).await.unwrap();
    pc.apply_created(created);
    assert_eq!(labels(pc.current_items()), vec!["E", "F"]);
    assert_eq!(pc.cache().total_count(), Some(6));

    let mut e = pc.current_items()[0].clone();
    e.fields.insert("name".into(), serde_json::json!("E2"));
    pc.apply_updated(e).unwrap();
    assert_eq!(labels(pc.current_items()), vec!["E2", "F"]);

    let f_id = pc.current_items()[1].id.clone();
    pc.apply_deleted(&f_id).unwrap();
    let e_id = pc.current_items()[0].id.clone();
    pc.apply_deleted(&e_id).unwrap();
    assert_eq!(pc.current_page(), 2, "emptied last page steps back");
    assert_eq!(pc.total_pages(), Some(2));
    assert_eq!(labels(pc.current_items()), vec!["C", "D"]);

    assert!(matches!(pc.apply_deleted("missing"), Err(KioskError::NotFound(_))));
    assert_eq!(probe.calls(), 3);
}
