use tracing::{debug, info};

use crate::config::LocatorConfig;
use crate::models::Item;
use crate::plugins::strategies::default_strategies;
use crate::plugins::traits::{CandidateSet, LocatorContext, LocatorStrategy};
use crate::price_extractor::PriceExtractor;
use crate::tree::{NodeId, NodeQuery, TreeAdapter};

/// Best-effort discovery of item nodes on a page with no stable schema.
///
/// Strategies run in order and the first accepted candidate set wins. An empty
/// result means "nothing to sort", never an error.
pub struct ItemLocator {
    strategies: Vec<Box<dyn LocatorStrategy>>,
    config: LocatorConfig,
    extractor: PriceExtractor,
}

impl ItemLocator {
    pub fn new(config: LocatorConfig, extractor: PriceExtractor) -> Self {
        Self::with_strategies(config, extractor, default_strategies())
    }

    pub fn with_strategies(
        config: LocatorConfig,
        extractor: PriceExtractor,
        strategies: Vec<Box<dyn LocatorStrategy>>,
    ) -> Self {
        Self {
            strategies,
            config,
            extractor,
        }
    }

    pub fn extractor(&self) -> &PriceExtractor {
        &self.extractor
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    pub fn locate(&self, tree: &dyn TreeAdapter) -> Vec<NodeId> {
        self.locate_within(tree, tree.root())
    }

    pub fn locate_within(&self, tree: &dyn TreeAdapter, scope: NodeId) -> Vec<NodeId> {
        self.winning_set(tree, scope)
            .map(|set| set.nodes)
            .unwrap_or_default()
    }

    /// The accepted candidate set, with the strategy that produced it.
    pub fn winning_set(&self, tree: &dyn TreeAdapter, scope: NodeId) -> Option<CandidateSet> {
        let ctx = LocatorContext {
            tree,
            scope,
            config: &self.config,
            extractor: &self.extractor,
        };

        for strategy in &self.strategies {
            for candidates in strategy.attempt(&ctx) {
                let accepted = strategy.accepts(&candidates, &ctx);
                debug!(
                    "Strategy {} found {} candidates (price marker: {}, currency: {}, accepted: {})",
                    strategy.name(),
                    candidates.confidence.count,
                    candidates.confidence.price_marker,
                    candidates.confidence.currency_marker,
                    accepted
                );
                if accepted {
                    info!(
                        "Located {} items with strategy {}",
                        candidates.nodes.len(),
                        strategy.name()
                    );
                    return Some(candidates);
                }
            }
        }

        debug!("No strategy produced a plausible item set");
        None
    }

    /// Locate items and extract their prices and names. Live trees produce
    /// node-backed items; fetched pages produce snapshots.
    pub fn locate_items(&self, tree: &dyn TreeAdapter, page: u32, live: bool) -> Vec<Item> {
        let nodes = self.locate(tree);
        self.build_items(tree, &nodes, page, live)
    }

    pub fn build_items(&self, tree: &dyn TreeAdapter, nodes: &[NodeId], page: u32, live: bool) -> Vec<Item> {
        nodes
            .iter()
            .map(|node| {
                let unit_price = self.extractor.extract(&tree.text_of(*node));
                let name = self.item_name(tree, *node);
                if live {
                    Item::live(*node, unit_price, name, page)
                } else {
                    Item::snapshot(tree.outer_html(*node), unit_price, name, page)
                }
            })
            .collect()
    }

    /// Display name: the first name/title-classed descendant, then the first
    /// heading, then empty.
    pub fn item_name(&self, tree: &dyn TreeAdapter, node: NodeId) -> String {
        let by_class = NodeQuery::AnyOf(
            self.config
                .name_class_hints
                .iter()
                .map(|hint| NodeQuery::class_contains(hint))
                .collect(),
        );
        let by_tag = NodeQuery::AnyOf(self.config.name_tags.iter().map(|t| NodeQuery::tag(t)).collect());

        [by_class, by_tag]
            .iter()
            .filter_map(|query| tree.find_all_within(node, query).into_iter().next())
            .map(|found| tree.text_of(found))
            .find(|text| !text.is_empty())
            .unwrap_or_default()
    }
}
