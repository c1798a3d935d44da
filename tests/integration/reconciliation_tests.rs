use super::*;
use std::time::Duration;
use unit_price_sorter::config::ReconcilerConfig;
use unit_price_sorter::models::ReconcilerState;
use unit_price_sorter::reconciler::NOTHING_TO_SORT;
use unit_price_sorter::tree::ChildEntry;

const PRODUCTS: &[(&str, Option<&str>)] = &[
    ("Mlijeko", Some("1,20")),
    ("Jogurt", Some("2,40")),
    ("Kefir", None),
    ("Vrhnje", Some("0,90")),
];

fn page() -> String {
    listing_page(PRODUCTS, None)
}

async fn sorted_harness() -> Harness {
    let h = harness(&page(), StaticFetcher::new());
    let outcome = h.reconciler.apply_local_sort(true).await;
    assert!(outcome.report().is_some());
    assert_eq!(h.names_by_rank().await, vec!["Vrhnje", "Mlijeko", "Jogurt", "Kefir"]);
    h
}

#[tokio::test(start_paused = true)]
async fn test_host_append_triggers_exactly_one_resort() {
    let h = sorted_harness().await;
    let container = h.container().await;

    h.doc
        .lock()
        .await
        .append_markup(container, &product("Sir", Some("0,50")));
    tokio::time::sleep(Duration::from_secs(2)).await;

    let stats = h.reconciler.stats().await;
    assert_eq!(stats.reapplies, 1);
    assert_eq!(stats.mutation_triggers, 1);
    assert_eq!(
        h.names_by_rank().await,
        vec!["Sir", "Vrhnje", "Mlijeko", "Jogurt", "Kefir"]
    );
    assert_eq!(h.reconciler.state().await, ReconcilerState::Watching);
}

#[tokio::test(start_paused = true)]
async fn test_host_rerender_is_resorted() {
    let h = sorted_harness().await;
    let container = h.container().await;

    // The host throws away the sorted tiles and renders fresh, unmarked ones.
    let fresh: Vec<ChildEntry> = PRODUCTS
        .iter()
        .map(|(name, unit)| ChildEntry::Markup(product(name, *unit)))
        .collect();
    h.doc.lock().await.replace_children(container, fresh);
    assert_eq!(h.marker_count().await, 0);

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(h.reconciler.stats().await.reapplies, 1);
    assert_eq!(h.marker_count().await, PRODUCTS.len());
    assert_eq!(h.names_by_rank().await, vec!["Vrhnje", "Mlijeko", "Jogurt", "Kefir"]);
}

#[tokio::test(start_paused = true)]
async fn test_rerender_just_before_poll_tick_is_resorted_once() {
    let h = sorted_harness().await;
    let container = h.container().await;

    // Lands 10 ms before the first 300 ms poll tick; its debounce window
    // closes after the poll has already re-sorted.
    tokio::time::sleep(Duration::from_millis(290)).await;
    let fresh: Vec<ChildEntry> = PRODUCTS
        .iter()
        .map(|(name, unit)| ChildEntry::Markup(product(name, *unit)))
        .collect();
    h.doc.lock().await.replace_children(container, fresh);
    tokio::time::sleep(Duration::from_secs(1)).await;

    let stats = h.reconciler.stats().await;
    assert_eq!(stats.reapplies, 1);
    assert_eq!(stats.mutation_triggers, 1);
    assert!(stats.poll_triggers >= 1);
    assert_eq!(h.names_by_rank().await, vec!["Vrhnje", "Mlijeko", "Jogurt", "Kefir"]);
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_host_mutations_is_coalesced() {
    let h = sorted_harness().await;
    let container = h.container().await;

    for (name, unit) in [("Sir", "0,50"), ("Maslac", "3,10"), ("Skuta", "0,70")] {
        h.doc
            .lock()
            .await
            .append_markup(container, &product(name, Some(unit)));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(h.reconciler.stats().await.reapplies, 1);
    assert_eq!(h.marker_count().await, 7);
}

#[tokio::test(start_paused = true)]
async fn test_clear_sort_stops_reconciliation() {
    let h = sorted_harness().await;
    h.reconciler.clear_sort().await;

    assert_eq!(h.marker_count().await, 0);
    assert_eq!(h.reconciler.state().await, ReconcilerState::Idle);
    assert_eq!(h.reconciler.intent().await, None);

    let container = h.container().await;
    h.doc
        .lock()
        .await
        .append_markup(container, &product("Sir", Some("0,50")));
    tokio::time::sleep(Duration::from_secs(2)).await;

    let stats = h.reconciler.stats().await;
    assert_eq!(stats.reapplies, 0);
    assert_eq!(stats.mutation_triggers, 0);
    assert_eq!(stats.poll_triggers, 0);
    assert_eq!(h.marker_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_replaced_container_is_reinitialized() {
    let h = sorted_harness().await;
    let container = h.container().await;

    {
        let mut doc = h.doc.lock().await;
        let body = doc.parent_of(container).expect("grid has a parent");
        doc.detach(container);
        let tiles: String = [("Sir", Some("0,50")), ("Maslac", Some("3,10")), ("Kefir", None)]
            .iter()
            .map(|(name, unit)| product(name, *unit))
            .collect();
        doc.append_markup(body, &format!(r#"<div class="product-grid">{tiles}</div>"#));
    }
    tokio::time::sleep(Duration::from_secs(3)).await;

    let stats = h.reconciler.stats().await;
    assert_eq!(stats.reinits, 1);
    assert_eq!(h.reconciler.state().await, ReconcilerState::Watching);
    assert_eq!(h.names_by_rank().await, vec!["Sir", "Maslac", "Kefir"]);

    // The new container is watched in turn.
    let grid = h.container().await;
    assert_ne!(grid, container);
    h.doc
        .lock()
        .await
        .append_markup(grid, &product("Skuta", Some("0,10")));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.names_by_rank().await[0], "Skuta");
}

#[tokio::test(start_paused = true)]
async fn test_reinit_gives_up_when_items_never_return() {
    let config = SorterConfig {
        reconciler: ReconcilerConfig {
            reinit_attempts: 2,
            reinit_delay_ms: 100,
            ..ReconcilerConfig::default()
        },
        ..SorterConfig::default()
    };
    let h = harness_with_config(&page(), StaticFetcher::new(), config);
    h.reconciler.apply_local_sort(true).await;

    let container = h.container().await;
    h.doc.lock().await.detach(container);
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(h.reconciler.state().await, ReconcilerState::Idle);
    assert_eq!(h.reconciler.intent().await, None);
    assert_eq!(h.reconciler.stats().await.reinits, 0);
}

#[tokio::test(start_paused = true)]
async fn test_giving_up_on_reinit_removes_leftover_markers() {
    let config = SorterConfig {
        reconciler: ReconcilerConfig {
            reinit_attempts: 2,
            reinit_delay_ms: 100,
            ..ReconcilerConfig::default()
        },
        ..SorterConfig::default()
    };
    let h = harness_with_config(&page(), StaticFetcher::new(), config);
    h.reconciler.apply_local_sort(true).await;

    {
        let mut doc = h.doc.lock().await;
        let container = doc.find_all(&NodeQuery::class("product-grid"))[0];
        let body = doc.parent_of(container).expect("grid has a parent");
        // The host drops the grid but keeps a marked copy of one tile around.
        doc.detach(container);
        doc.append_markup(
            body,
            &format!(r#"<aside class="recently-viewed"><div {RANK}="0">Vrhnje</div></aside>"#),
        );
    }
    assert_eq!(h.marker_count().await, 1);
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(h.reconciler.state().await, ReconcilerState::Idle);
    assert_eq!(h.marker_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_reapplying_same_intent_is_idempotent() {
    let h = sorted_harness().await;
    let before = h.tiles().await;

    h.reconciler.apply_local_sort(true).await;

    assert_eq!(h.tiles().await, before);
    assert_eq!(h.reconciler.stats().await.sorts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_empty_page_reports_nothing_to_sort() {
    let h = harness(
        "<html><body><p>Nema proizvoda</p></body></html>",
        StaticFetcher::new(),
    );

    let outcome = h.reconciler.apply_local_sort(true).await;

    assert!(outcome.report().is_none());
    assert_eq!(h.notifier.messages(), vec![NOTHING_TO_SORT.to_string()]);
    assert_eq!(h.reconciler.state().await, ReconcilerState::Idle);
}
