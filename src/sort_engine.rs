use std::cmp::Ordering;
use tracing::{debug, warn};

use crate::models::{Item, PageItems, SortDirection};
use crate::tree::{Document, NodeId, NodeQuery, TreeAdapter};

/// Result of writing ranks into the live tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplyStats {
    pub ranked: usize,
    pub skipped: usize,
}

/// Priced before unpriced regardless of direction; priced values by direction;
/// everything else compares equal so a stable sort keeps discovery order.
pub fn compare(a: Option<f64>, b: Option<f64>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match direction {
            SortDirection::Ascending => a.total_cmp(&b),
            SortDirection::Descending => b.total_cmp(&a),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Indices of `prices` in sorted order. Pure, so reapplying it to an
/// unchanged set always yields the same ranks.
pub fn rank_order(prices: &[Option<f64>], direction: SortDirection) -> Vec<usize> {
    let mut order: Vec<usize> = (0..prices.len()).collect();
    order.sort_by(|a, b| compare(prices[*a], prices[*b], direction));
    order
}

/// Local variant: sort one collection and assign ranks by position.
pub fn sort_items(items: Vec<Item>, direction: SortDirection) -> Vec<Item> {
    let prices: Vec<Option<f64>> = items.iter().map(|item| item.unit_price).collect();
    let order = rank_order(&prices, direction);

    let mut slots: Vec<Option<Item>> = items.into_iter().map(Some).collect();
    let mut sorted = Vec::with_capacity(slots.len());
    for (rank, index) in order.into_iter().enumerate() {
        if let Some(mut item) = slots[index].take() {
            item.rank = Some(rank);
            sorted.push(item);
        }
    }
    sorted
}

/// Global variant: pages in ascending order, priced items across every page
/// sorted, then every unpriced item in discovery order.
pub fn merge_pages(mut pages: Vec<PageItems>, direction: SortDirection) -> Vec<Item> {
    pages.sort_by_key(|page| page.page);

    let (mut priced, unpriced): (Vec<Item>, Vec<Item>) = pages
        .into_iter()
        .flat_map(|page| page.items)
        .partition(Item::has_price);

    priced.sort_by(|a, b| compare(a.unit_price, b.unit_price, direction));
    debug!(
        "Merged {} priced and {} unpriced items",
        priced.len(),
        unpriced.len()
    );

    priced
        .into_iter()
        .chain(unpriced)
        .enumerate()
        .map(|(rank, mut item)| {
            item.rank = Some(rank);
            item
        })
        .collect()
}

/// Write each live item's rank as the rank attribute and the ordering
/// property. Items that are not direct children of `container` are skipped
/// with a warning.
pub fn apply_ranks(doc: &mut Document, container: NodeId, items: &[Item], rank_attr: &str) -> ApplyStats {
    let mut stats = ApplyStats::default();
    for item in items {
        let (Some(node), Some(rank)) = (item.node(), item.rank) else {
            warn!("Skipping item '{}' without a live node or rank", item.name);
            stats.skipped += 1;
            continue;
        };
        if !doc.is_direct_child_of(node, container) {
            warn!(
                "Item '{}' (node {}) is not a direct child of container {}; skipping",
                item.name,
                node.index(),
                container.index()
            );
            stats.skipped += 1;
            continue;
        }
        doc.set_attr(node, rank_attr, &rank.to_string());
        doc.set_order(node, Some(rank as i64));
        stats.ranked += 1;
    }
    stats
}

/// Remove every rank marker in the document. Returns how many were removed.
pub fn clear_ranks(doc: &mut Document, rank_attr: &str) -> usize {
    let marked = doc.find_all(&NodeQuery::HasAttr(rank_attr.to_string()));
    for node in &marked {
        doc.remove_attr(*node, rank_attr);
        doc.set_order(*node, None);
    }
    marked.len()
}
