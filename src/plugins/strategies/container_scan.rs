use crate::plugins::traits::{CandidateSet, LocatorContext, LocatorStrategy};
use crate::tree::NodeQuery;

/// Last resort: treat the children of a grid/list/results-like element as the
/// items, provided the first child shows a currency.
pub struct ContainerScanStrategy;

impl ContainerScanStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ContainerScanStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl LocatorStrategy for ContainerScanStrategy {
    fn name(&self) -> &str {
        "container_scan"
    }

    fn description(&self) -> &str {
        "Children of generic grid or list containers"
    }

    fn attempt(&self, ctx: &LocatorContext<'_>) -> Vec<CandidateSet> {
        let hints: Vec<NodeQuery> = ctx
            .config
            .container_hints
            .iter()
            .filter(|hint| !hint.is_empty())
            .map(|hint| NodeQuery::class_contains(hint))
            .collect();
        if hints.is_empty() {
            return Vec::new();
        }

        ctx.tree
            .find_all_within(ctx.scope, &NodeQuery::AnyOf(hints))
            .into_iter()
            .map(|container| CandidateSet::evaluate(self.name(), ctx.tree.children_of(container), ctx))
            .collect()
    }

    fn accepts(&self, candidates: &CandidateSet, ctx: &LocatorContext<'_>) -> bool {
        candidates.exceeds(ctx.config.min_items) && candidates.confidence.currency_marker
    }
}
