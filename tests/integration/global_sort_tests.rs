use super::*;
use std::time::Duration;
use unit_price_sorter::SortScope;
use unit_price_sorter::models::ReconcilerState;

fn first_page() -> String {
    listing_page(&[("A", Some("0,50")), ("B", Some("0,20"))], Some(2))
}

fn second_page() -> String {
    listing_page(&[("C", Some("0,30")), ("D", None)], Some(2))
}

async fn with_page_url(h: &Harness) {
    h.reconciler.set_page_url(Url::parse(BASE_URL).unwrap()).await;
}

#[tokio::test(start_paused = true)]
async fn test_global_sort_merges_pages_in_ascending_order() {
    let h = harness(&first_page(), StaticFetcher::new().page(2, second_page()));
    with_page_url(&h).await;

    let outcome = h.reconciler.apply_global_sort(true).await;
    let report = outcome.report().expect("sorted");

    assert_eq!(report.scope, SortScope::Global);
    assert_eq!(report.pages, 2);
    assert_eq!((report.priced, report.unpriced, report.skipped), (3, 1, 0));
    assert_eq!(h.fetcher.requested(), vec![2]);

    // Snapshots from page 2 are now live nodes inside the container.
    let tiles = h.tiles().await;
    assert_eq!(
        tiles,
        vec![
            ("B".to_string(), Some(0)),
            ("C".to_string(), Some(1)),
            ("A".to_string(), Some(2)),
            ("D".to_string(), Some(3)),
        ]
    );
    assert_eq!(
        h.notifier.messages(),
        vec!["Sorted 4 items by unit price (1 without price)".to_string()]
    );
    assert_eq!(h.reconciler.state().await, ReconcilerState::Watching);
}

#[tokio::test(start_paused = true)]
async fn test_global_sort_descending_keeps_unpriced_last() {
    let h = harness(&first_page(), StaticFetcher::new().page(2, second_page()));
    with_page_url(&h).await;

    h.reconciler.apply_global_sort(false).await;

    assert_eq!(h.names_by_rank().await, vec!["A", "C", "B", "D"]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_page_contributes_nothing() {
    let markup = listing_page(&[("A", Some("0,50")), ("B", Some("0,20"))], Some(3));
    let fetcher = StaticFetcher::new()
        .page(2, listing_page(&[("C", Some("0,30"))], Some(3)))
        .failing(3, 500);
    let h = harness(&markup, fetcher);
    with_page_url(&h).await;

    let outcome = h.reconciler.apply_global_sort(true).await;
    let report = outcome.report().expect("sorted despite a failing page");

    assert_eq!(report.pages, 3);
    assert_eq!(report.total(), 3);
    assert_eq!(h.fetcher.requested(), vec![2, 3]);
    assert_eq!(h.names_by_rank().await, vec!["B", "C", "A"]);
}

#[tokio::test(start_paused = true)]
async fn test_global_sort_without_page_url_sorts_live_page() {
    let h = harness(&first_page(), StaticFetcher::new().page(2, second_page()));

    let outcome = h.reconciler.apply_global_sort(true).await;
    let report = outcome.report().expect("sorted");

    assert_eq!(report.scope, SortScope::Local);
    assert_eq!(report.pages, 1);
    assert!(h.fetcher.requested().is_empty());
    assert_eq!(h.names_by_rank().await, vec!["B", "A"]);
}

#[tokio::test(start_paused = true)]
async fn test_merged_result_is_stable_while_watched() {
    let h = harness(&first_page(), StaticFetcher::new().page(2, second_page()));
    with_page_url(&h).await;
    h.reconciler.apply_global_sort(true).await;

    tokio::time::sleep(Duration::from_secs(2)).await;

    let stats = h.reconciler.stats().await;
    assert_eq!(stats.sorts, 1);
    assert_eq!(stats.reapplies, 0);
    assert!(stats.poll_triggers > 0);
    assert_eq!(h.names_by_rank().await, vec!["B", "C", "A", "D"]);
}

#[tokio::test(start_paused = true)]
async fn test_global_intent_reapplies_over_merged_items() {
    let h = harness(&first_page(), StaticFetcher::new().page(2, second_page()));
    with_page_url(&h).await;
    h.reconciler.apply_global_sort(true).await;

    let container = h.container().await;
    h.doc
        .lock()
        .await
        .append_markup(container, &product("E", Some("0,10")));
    tokio::time::sleep(Duration::from_secs(1)).await;

    // No refetch: the reapplied order covers the merged live items.
    assert_eq!(h.fetcher.requested(), vec![2]);
    assert_eq!(h.reconciler.stats().await.reapplies, 1);
    assert_eq!(h.names_by_rank().await, vec!["E", "B", "C", "A", "D"]);
    assert_eq!(h.reconciler.intent().await.unwrap().scope, SortScope::Global);
}
