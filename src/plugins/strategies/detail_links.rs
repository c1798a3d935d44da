use std::collections::HashSet;
use tracing::debug;

use super::largest_sibling_group;
use crate::plugins::traits::{CandidateSet, LocatorContext, LocatorStrategy};
use crate::tree::{NodeId, NodeQuery};

/// Derives item containers from links to item detail pages: every link is
/// walked up to its nearest item-like ancestor, and containers reached from
/// several links are kept once.
pub struct DetailLinkStrategy;

impl DetailLinkStrategy {
    pub fn new() -> Self {
        Self
    }

    fn container_for(&self, ctx: &LocatorContext<'_>, link: NodeId) -> Option<NodeId> {
        let config = ctx.config;

        // A structural ancestor beats a class guess.
        let by_tag = self.walk_up(ctx, link, |node| {
            ctx.tree
                .tag_name(node)
                .map(|tag| config.ancestor_tags.iter().any(|t| t.eq_ignore_ascii_case(&tag)))
                .unwrap_or(false)
        });
        if by_tag.is_some() {
            return by_tag;
        }

        self.walk_up(ctx, link, |node| {
            ctx.tree
                .attr(node, "class")
                .map(|classes| {
                    let classes = classes.to_ascii_lowercase();
                    config
                        .class_substrings
                        .iter()
                        .any(|fragment| !fragment.is_empty() && classes.contains(&fragment.to_ascii_lowercase()))
                })
                .unwrap_or(false)
        })
    }

    fn walk_up(
        &self,
        ctx: &LocatorContext<'_>,
        from: NodeId,
        is_container: impl Fn(NodeId) -> bool,
    ) -> Option<NodeId> {
        let mut current = ctx.tree.parent_of(from);
        while let Some(node) = current {
            if node == ctx.scope {
                return None;
            }
            if is_container(node) {
                return Some(node);
            }
            current = ctx.tree.parent_of(node);
        }
        None
    }
}

impl Default for DetailLinkStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl LocatorStrategy for DetailLinkStrategy {
    fn name(&self) -> &str {
        "detail_links"
    }

    fn description(&self) -> &str {
        "Nearest item-like ancestors of detail-page links"
    }

    fn attempt(&self, ctx: &LocatorContext<'_>) -> Vec<CandidateSet> {
        let patterns: Vec<NodeQuery> = ctx
            .config
            .detail_link_patterns
            .iter()
            .filter(|pattern| !pattern.is_empty())
            .map(|pattern| NodeQuery::attr_contains("href", pattern))
            .collect();
        if patterns.is_empty() {
            return Vec::new();
        }

        let links = ctx.tree.find_all_within(ctx.scope, &NodeQuery::AnyOf(patterns));
        let mut seen = HashSet::new();
        let mut containers = Vec::new();
        for link in &links {
            if let Some(container) = self.container_for(ctx, *link) {
                if seen.insert(container) {
                    containers.push(container);
                }
            }
        }
        debug!(
            "{} detail links resolved to {} containers",
            links.len(),
            containers.len()
        );

        if containers.is_empty() {
            return Vec::new();
        }
        let nodes = largest_sibling_group(ctx.tree, containers);
        vec![CandidateSet::evaluate(self.name(), nodes, ctx)]
    }

    fn accepts(&self, candidates: &CandidateSet, ctx: &LocatorContext<'_>) -> bool {
        candidates.exceeds(ctx.config.min_items)
    }
}
