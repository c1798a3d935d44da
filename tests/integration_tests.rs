// Integration tests for the unit price sorter
//
// These drive the public reconciler API against parsed listing pages and a
// canned fetcher, covering both sort scopes and the drift signals.

mod integration;

use integration::*;
use unit_price_sorter::SortScope;

#[tokio::test(start_paused = true)]
async fn test_end_to_end_workflow() -> anyhow::Result<()> {
    // 1. Local sort of the live page
    // 2. Widen to a global sort over both pages
    // 3. Host appends an item, the sort is reapplied
    // 4. Clear

    let first = listing_page(
        &[("Mlijeko", Some("1,20")), ("Jogurt", Some("2,40")), ("Kefir", None)],
        Some(2),
    );
    let second = listing_page(&[("Vrhnje", Some("0,90")), ("Sir", Some("4,50"))], Some(2));
    let h = harness(&first, StaticFetcher::new().page(2, second));
    h.reconciler.set_page_url(url::Url::parse(BASE_URL)?).await;

    let local = h.reconciler.apply_local_sort(true).await;
    assert_eq!(local.report().map(|r| r.scope), Some(SortScope::Local));
    assert_eq!(h.names_by_rank().await, vec!["Mlijeko", "Jogurt", "Kefir"]);

    let global = h.reconciler.apply_global_sort(true).await;
    assert_eq!(global.report().map(|r| r.pages), Some(2));
    assert_eq!(
        h.names_by_rank().await,
        vec!["Vrhnje", "Mlijeko", "Jogurt", "Sir", "Kefir"]
    );

    let container = h.container().await;
    h.doc
        .lock()
        .await
        .append_markup(container, &product("Skuta", Some("0,70")));
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    assert_eq!(h.names_by_rank().await[0], "Skuta");

    h.reconciler.clear_sort().await;
    assert_eq!(h.marker_count().await, 0);
    assert_eq!(h.notifier.messages().len(), 2);
    Ok(())
}

#[test]
fn test_pagination_detection_on_fixture() {
    use unit_price_sorter::aggregator::detect_max_page;
    use unit_price_sorter::config::AggregatorConfig;

    let doc = unit_price_sorter::Document::parse(&listing_page(&[("A", Some("1,00"))], Some(4)));
    assert_eq!(detect_max_page(&doc, &AggregatorConfig::default()), 4);
}
