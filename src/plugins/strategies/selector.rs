use tracing::debug;

use super::largest_sibling_group;
use crate::plugins::traits::{CandidateSet, LocatorContext, LocatorStrategy};
use crate::tree::NodeQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectorMode {
    /// Configured tag and class together.
    Strict,
    /// Configured class on any tag.
    ClassOnly,
    /// Any class containing one of the configured substrings.
    ClassSubstring,
}

/// Class-based item discovery, from the narrowest selector to the loosest.
pub struct SelectorStrategy {
    mode: SelectorMode,
}

impl SelectorStrategy {
    pub fn strict() -> Self {
        Self {
            mode: SelectorMode::Strict,
        }
    }

    pub fn class_only() -> Self {
        Self {
            mode: SelectorMode::ClassOnly,
        }
    }

    pub fn class_substring() -> Self {
        Self {
            mode: SelectorMode::ClassSubstring,
        }
    }
}

impl LocatorStrategy for SelectorStrategy {
    fn name(&self) -> &str {
        match self.mode {
            SelectorMode::Strict => "strict",
            SelectorMode::ClassOnly => "class_only",
            SelectorMode::ClassSubstring => "class_substring",
        }
    }

    fn description(&self) -> &str {
        match self.mode {
            SelectorMode::Strict => "Known item tag and class",
            SelectorMode::ClassOnly => "Known item class on any tag",
            SelectorMode::ClassSubstring => "Classes containing an item-like substring",
        }
    }

    fn attempt(&self, ctx: &LocatorContext<'_>) -> Vec<CandidateSet> {
        let config = ctx.config;
        match self.mode {
            SelectorMode::Strict => {
                let query = NodeQuery::tag_class(&config.item_tag, &config.item_class);
                let nodes = ctx.tree.find_all_within(ctx.scope, &query);
                vec![CandidateSet::evaluate(self.name(), nodes, ctx)]
            }
            SelectorMode::ClassOnly => {
                let nodes = ctx
                    .tree
                    .find_all_within(ctx.scope, &NodeQuery::class(&config.item_class));
                vec![CandidateSet::evaluate(self.name(), nodes, ctx)]
            }
            SelectorMode::ClassSubstring => config
                .class_substrings
                .iter()
                .filter(|fragment| !fragment.trim().is_empty())
                .filter_map(|fragment| {
                    let matches = ctx
                        .tree
                        .find_all_within(ctx.scope, &NodeQuery::class_contains(fragment));
                    if matches.is_empty() {
                        return None;
                    }
                    let nodes = largest_sibling_group(ctx.tree, matches);
                    debug!("Class substring '{}' grouped to {} nodes", fragment, nodes.len());
                    Some(CandidateSet::evaluate(self.name(), nodes, ctx))
                })
                .collect(),
        }
    }

    fn accepts(&self, candidates: &CandidateSet, ctx: &LocatorContext<'_>) -> bool {
        let min_items = ctx.config.min_items;
        let confidence = &candidates.confidence;
        match self.mode {
            SelectorMode::Strict => {
                candidates.exceeds(min_items) || (confidence.count > 0 && confidence.price_marker)
            }
            SelectorMode::ClassOnly => candidates.exceeds(min_items),
            SelectorMode::ClassSubstring => candidates.exceeds(min_items) && confidence.price_marker,
        }
    }
}
