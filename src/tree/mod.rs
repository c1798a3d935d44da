pub mod document;

pub use document::{ChildEntry, Document, MutationRecord, SharedDocument};

use scraper::Selector;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Handle to one node of a [`Document`]. Handles stay valid after the node is
/// detached; use [`Document::contains`] to check whether it is still attached.
/// Nodes dropped by [`Document::replace_children`] are released and their
/// handles stop resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Element predicate used by [`TreeAdapter::find_all`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeQuery {
    Tag(String),
    Class(String),
    TagClass { tag: String, class: String },
    ClassContains(String),
    AttrContains { attr: String, needle: String },
    HasAttr(String),
    AnyOf(Vec<NodeQuery>),
}

impl NodeQuery {
    pub fn tag(tag: &str) -> Self {
        NodeQuery::Tag(tag.to_ascii_lowercase())
    }

    pub fn class(class: &str) -> Self {
        NodeQuery::Class(class.to_string())
    }

    pub fn tag_class(tag: &str, class: &str) -> Self {
        NodeQuery::TagClass {
            tag: tag.to_ascii_lowercase(),
            class: class.to_string(),
        }
    }

    pub fn class_contains(fragment: &str) -> Self {
        NodeQuery::ClassContains(fragment.to_ascii_lowercase())
    }

    pub fn attr_contains(attr: &str, needle: &str) -> Self {
        NodeQuery::AttrContains {
            attr: attr.to_string(),
            needle: needle.to_string(),
        }
    }

    /// CSS selector equivalent of this query. `None` when a tag or attribute
    /// name is not a plain identifier, or when an `AnyOf` has no usable arm.
    pub fn css(&self) -> Option<String> {
        match self {
            NodeQuery::Tag(tag) => ident(tag).map(str::to_string),
            NodeQuery::Class(class) => Some(format!("[class~={}]", quoted(class))),
            NodeQuery::TagClass { tag, class } => {
                ident(tag).map(|tag| format!("{tag}[class~={}]", quoted(class)))
            }
            NodeQuery::ClassContains(fragment) => Some(format!("[class*={} i]", quoted(fragment))),
            NodeQuery::AttrContains { attr, needle } => {
                ident(attr).map(|attr| format!("[{attr}*={}]", quoted(needle)))
            }
            NodeQuery::HasAttr(attr) => ident(attr).map(|attr| format!("[{attr}]")),
            NodeQuery::AnyOf(queries) => {
                let arms: Vec<String> = queries.iter().filter_map(NodeQuery::css).collect();
                (!arms.is_empty()).then(|| arms.join(", "))
            }
        }
    }

    pub fn selector(&self) -> Option<Selector> {
        let css = self.css()?;
        match Selector::parse(&css) {
            Ok(selector) => Some(selector),
            Err(e) => {
                warn!("Unusable query {:?} ({}): {}", self, css, e);
                None
            }
        }
    }
}

fn ident(name: &str) -> Option<&str> {
    let mut chars = name.chars();
    let first = chars.next()?;
    let valid = (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        warn!("Ignoring query on unusable name {:?}", name);
    }
    valid.then_some(name)
}

fn quoted(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\a ");
    format!("\"{escaped}\"")
}

/// Read-only view over a host tree. Keeps item discovery independent of the
/// concrete tree implementation.
pub trait TreeAdapter {
    fn root(&self) -> NodeId;

    /// Elements below `scope` (excluding `scope`) matching `query`, in document order.
    fn find_all_within(&self, scope: NodeId, query: &NodeQuery) -> Vec<NodeId>;

    /// Descendant text concatenated in document order, with whitespace runs
    /// collapsed to single spaces.
    fn text_of(&self, node: NodeId) -> String;

    fn parent_of(&self, node: NodeId) -> Option<NodeId>;

    /// Element children of `node`, in order.
    fn children_of(&self, node: NodeId) -> Vec<NodeId>;

    fn tag_name(&self, node: NodeId) -> Option<String>;

    fn attr(&self, node: NodeId, name: &str) -> Option<String>;

    fn outer_html(&self, node: NodeId) -> String;

    fn find_all(&self, query: &NodeQuery) -> Vec<NodeId> {
        self.find_all_within(self.root(), query)
    }

    fn is_direct_child_of(&self, node: NodeId, container: NodeId) -> bool {
        self.parent_of(node) == Some(container)
    }

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attr(node, "class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }
}
