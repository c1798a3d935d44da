use serde::Serialize;

use crate::config::LocatorConfig;
use crate::price_extractor::PriceExtractor;
use crate::tree::{NodeId, TreeAdapter};

/// Everything a strategy may consult while searching one tree.
pub struct LocatorContext<'a> {
    pub tree: &'a dyn TreeAdapter,
    /// Search is limited to descendants of this node.
    pub scope: NodeId,
    pub config: &'a LocatorConfig,
    pub extractor: &'a PriceExtractor,
}

impl<'a> LocatorContext<'a> {
    pub fn text_of_first(&self, nodes: &[NodeId]) -> Option<String> {
        nodes.first().map(|node| self.tree.text_of(*node))
    }
}

/// Signals a strategy's acceptance rule is judged on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Confidence {
    pub count: usize,
    /// First node's text carries a unit-price marker.
    pub price_marker: bool,
    /// First node's text carries a currency marker.
    pub currency_marker: bool,
}

/// One strategy's guess at the item nodes, in document order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateSet {
    pub strategy: String,
    pub nodes: Vec<NodeId>,
    pub confidence: Confidence,
}

impl CandidateSet {
    pub fn evaluate(strategy: &str, nodes: Vec<NodeId>, ctx: &LocatorContext<'_>) -> Self {
        let first_text = ctx.text_of_first(&nodes).unwrap_or_default();
        let confidence = Confidence {
            count: nodes.len(),
            price_marker: ctx.extractor.has_price_marker(&first_text),
            currency_marker: ctx.extractor.has_currency_marker(&first_text),
        };
        Self {
            strategy: strategy.to_string(),
            nodes,
            confidence,
        }
    }

    pub fn exceeds(&self, min_items: usize) -> bool {
        self.confidence.count > min_items
    }
}

/// One heuristic for discovering item nodes. Strategies are tried in a fixed
/// order and the first accepted candidate set wins.
pub trait LocatorStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// Zero or more candidate sets, best first.
    fn attempt(&self, ctx: &LocatorContext<'_>) -> Vec<CandidateSet>;

    fn accepts(&self, candidates: &CandidateSet, ctx: &LocatorContext<'_>) -> bool;
}
