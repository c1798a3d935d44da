// Item discovery strategies, in the order the locator tries them
pub mod container_scan;
pub mod detail_links;
pub mod selector;

pub use container_scan::ContainerScanStrategy;
pub use detail_links::DetailLinkStrategy;
pub use selector::SelectorStrategy;

use std::collections::HashMap;

use crate::plugins::traits::LocatorStrategy;
use crate::tree::{NodeId, TreeAdapter};

/// The default cascade: strict selector, class-only selector, detail-link
/// ancestors, class substrings, container scan.
pub fn default_strategies() -> Vec<Box<dyn LocatorStrategy>> {
    vec![
        Box::new(SelectorStrategy::strict()),
        Box::new(SelectorStrategy::class_only()),
        Box::new(DetailLinkStrategy::new()),
        Box::new(SelectorStrategy::class_substring()),
        Box::new(ContainerScanStrategy::new()),
    ]
}

/// Keep only the nodes sharing the most common parent. Loose matches pick up
/// wrappers and nested fragments; the real items are the biggest sibling run.
/// Ties go to the parent seen first. Document order is preserved.
pub(crate) fn largest_sibling_group(tree: &dyn TreeAdapter, nodes: Vec<NodeId>) -> Vec<NodeId> {
    let mut counts: HashMap<Option<NodeId>, usize> = HashMap::new();
    let mut first_seen: Vec<Option<NodeId>> = Vec::new();
    for node in &nodes {
        let parent = tree.parent_of(*node);
        let count = counts.entry(parent).or_insert(0);
        if *count == 0 {
            first_seen.push(parent);
        }
        *count += 1;
    }

    let mut best: Option<(Option<NodeId>, usize)> = None;
    for parent in first_seen {
        let count = counts[&parent];
        if best.map(|(_, c)| count > c).unwrap_or(true) {
            best = Some((parent, count));
        }
    }

    match best {
        Some((parent, _)) => nodes
            .into_iter()
            .filter(|node| tree.parent_of(*node) == parent)
            .collect(),
        None => nodes,
    }
}
