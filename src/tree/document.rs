use ego_tree::{NodeId as TreeId, NodeRef};
use html5ever::tendril::StrTendril;
use html5ever::{Attribute, LocalName, QualName, namespace_url, ns};
use scraper::node::Element;
use scraper::{ElementRef, Html, Node};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::warn;

use super::{NodeId, NodeQuery, TreeAdapter};

/// Live tree shared between the host renderer and the reconciler.
pub type SharedDocument = Arc<Mutex<Document>>;

const MUTATION_CHANNEL_CAPACITY: usize = 256;

/// One child-list change on `target`. `revision` is the document revision
/// right after the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
    pub revision: u64,
}

/// New content for [`Document::replace_children`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildEntry {
    /// Move a node that already exists in this document.
    Existing(NodeId),
    /// Rehydrate serialized markup into fresh nodes.
    Markup(String),
}

/// Mutable host tree over a parsed [`Html`]. Structural changes bump
/// [`Document::revision`] and are broadcast to [`Document::subscribe`]rs;
/// attribute and ordering writes are not.
///
/// Handles are never reused. Children dropped by [`Document::replace_children`]
/// are released: their handles stop resolving and their tree slots are
/// recycled for later inserts.
#[derive(Debug)]
pub struct Document {
    html: Html,
    root: NodeId,
    handles: HashMap<usize, TreeId>,
    by_node: HashMap<TreeId, usize>,
    order: HashMap<usize, i64>,
    spare: Vec<TreeId>,
    next_handle: usize,
    revision: u64,
    mutations: broadcast::Sender<MutationRecord>,
}

impl Document {
    pub fn new() -> Self {
        Self::from_html(Html::new_document())
    }

    /// Parse a full HTML document.
    pub fn parse(markup: &str) -> Self {
        Self::from_html(Html::parse_document(markup))
    }

    fn from_html(html: Html) -> Self {
        let (mutations, _) = broadcast::channel(MUTATION_CHANNEL_CAPACITY);
        let ids: Vec<TreeId> = html.tree.nodes().map(|node| node.id()).collect();
        let tree_root = html.tree.root().id();
        let mut document = Self {
            html,
            root: NodeId(0),
            handles: HashMap::new(),
            by_node: HashMap::new(),
            order: HashMap::new(),
            spare: Vec::new(),
            next_handle: 0,
            revision: 0,
            mutations,
        };
        for id in ids {
            let handle = document.register(id);
            if id == tree_root {
                document.root = handle;
            }
        }
        document
    }

    pub fn into_shared(self) -> SharedDocument {
        Arc::new(Mutex::new(self))
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MutationRecord> {
        self.mutations.subscribe()
    }

    /// Whether `node` is still attached below the root.
    pub fn contains(&self, node: NodeId) -> bool {
        let Some(node) = self.node(node) else {
            return false;
        };
        let root = self.html.tree.root().id();
        node.id() == root || node.ancestors().any(|ancestor| ancestor.id() == root)
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.node(node).map(|n| n.value().is_element()).unwrap_or(false)
    }

    pub fn order_of(&self, node: NodeId) -> Option<i64> {
        self.order.get(&node.0).copied()
    }

    pub fn set_order(&mut self, node: NodeId, order: Option<i64>) {
        if !self.handles.contains_key(&node.0) {
            return;
        }
        match order {
            Some(order) => self.order.insert(node.0, order),
            None => self.order.remove(&node.0),
        };
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        self.edit_attrs(node, |attrs| {
            let value = StrTendril::from_slice(value);
            match attrs.iter_mut().find(|attr| attr.name.local.as_ref() == name) {
                Some(attr) => attr.value = value,
                None => attrs.push(Attribute {
                    name: QualName::new(None, ns!(), LocalName::from(name)),
                    value,
                }),
            }
        });
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) {
        self.edit_attrs(node, |attrs| {
            attrs.retain(|attr| attr.name.local.as_ref() != name)
        });
    }

    /// Move `child` to the end of `parent`'s children.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let (Some(parent_id), Some(child_id)) = (self.resolve(parent), self.resolve(child)) else {
            warn!("Refusing to append stale node {} under {}", child.0, parent.0);
            return;
        };
        if self.is_ancestor_or_self(child_id, parent_id) {
            warn!("Refusing to append node {} under {}", child.0, parent.0);
            return;
        }

        let old_parent = self.parent_id(child_id).and_then(|id| self.handle(id));
        self.place(parent_id, child_id);
        if let Some(old_parent) = old_parent {
            self.emit(old_parent, Vec::new(), vec![child]);
        }
        self.emit(parent, vec![child], Vec::new());
    }

    /// Remove `node` from its parent. The handle stays valid but detached, so
    /// the host can insert it again.
    pub fn detach(&mut self, node: NodeId) {
        let Some(id) = self.resolve(node) else {
            return;
        };
        let Some(old_parent) = self.parent_id(id).and_then(|p| self.handle(p)) else {
            return;
        };
        if let Some(mut target) = self.html.tree.get_mut(id) {
            target.detach();
        }
        self.emit(old_parent, Vec::new(), vec![node]);
    }

    /// Parse `markup` as a fragment and append the result under `parent`.
    /// Returns the created top-level element nodes.
    pub fn append_markup(&mut self, parent: NodeId, markup: &str) -> Vec<NodeId> {
        let Some(parent_id) = self.resolve(parent) else {
            return Vec::new();
        };
        let created = self.import_fragment(markup, parent_id);
        let added: Vec<NodeId> = created.iter().filter_map(|id| self.handle(*id)).collect();
        let elements = added.iter().copied().filter(|node| self.is_element(*node)).collect();
        self.emit(parent, added, Vec::new());
        elements
    }

    /// Replace all children of `parent` with `entries`, as one mutation.
    /// The result is aligned with `entries`: the placed element for each entry,
    /// or `None` when the entry could not be placed. Old children that are
    /// not placed again are released.
    pub fn replace_children(&mut self, parent: NodeId, entries: Vec<ChildEntry>) -> Vec<Option<NodeId>> {
        let Some(parent_id) = self.resolve(parent) else {
            return vec![None; entries.len()];
        };

        let old_children: Vec<TreeId> = self
            .html
            .tree
            .get(parent_id)
            .map(|node| node.children().map(|child| child.id()).collect())
            .unwrap_or_default();
        let removed: Vec<NodeId> = old_children.iter().filter_map(|id| self.handle(*id)).collect();
        for id in &old_children {
            if let Some(mut child) = self.html.tree.get_mut(*id) {
                child.detach();
            }
        }

        let mut added = Vec::new();
        let mut placed = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry {
                ChildEntry::Existing(node) => {
                    // Already a child here means the entry was listed twice.
                    let movable = self.resolve(node).filter(|id| {
                        self.parent_id(*id) != Some(parent_id) && !self.is_ancestor_or_self(*id, parent_id)
                    });
                    let Some(id) = movable else {
                        warn!("Cannot place node {} under {}", node.0, parent.0);
                        placed.push(None);
                        continue;
                    };
                    self.place(parent_id, id);
                    added.push(node);
                    placed.push(Some(node));
                }
                ChildEntry::Markup(markup) => {
                    let created: Vec<NodeId> = self
                        .import_fragment(&markup, parent_id)
                        .into_iter()
                        .filter_map(|id| self.handle(id))
                        .collect();
                    placed.push(created.iter().copied().find(|node| self.is_element(*node)));
                    added.extend(created);
                }
            }
        }

        for id in old_children {
            if self.parent_id(id).is_none() {
                self.release(id);
            }
        }

        self.emit(parent, added, removed);
        placed
    }

    fn register(&mut self, id: TreeId) -> NodeId {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(handle, id);
        self.by_node.insert(id, handle);
        NodeId(handle)
    }

    fn resolve(&self, node: NodeId) -> Option<TreeId> {
        self.handles.get(&node.0).copied()
    }

    fn handle(&self, id: TreeId) -> Option<NodeId> {
        self.by_node.get(&id).map(|handle| NodeId(*handle))
    }

    fn node(&self, node: NodeId) -> Option<NodeRef<'_, Node>> {
        self.html.tree.get(self.resolve(node)?)
    }

    fn parent_id(&self, id: TreeId) -> Option<TreeId> {
        self.html.tree.get(id)?.parent().map(|parent| parent.id())
    }

    /// Move `child` to the end of `parent`. `append_id` alone mislinks a node
    /// that is already the last child, hence the explicit detach.
    fn place(&mut self, parent: TreeId, child: TreeId) {
        if let Some(mut node) = self.html.tree.get_mut(child) {
            node.detach();
        }
        if let Some(mut target) = self.html.tree.get_mut(parent) {
            target.append_id(child);
        }
    }

    fn is_ancestor_or_self(&self, ancestor: TreeId, node: TreeId) -> bool {
        node == ancestor
            || self
                .html
                .tree
                .get(node)
                .map(|n| n.ancestors().any(|a| a.id() == ancestor))
                .unwrap_or(false)
    }

    /// Rebuild an element with edited attributes. Rebuilding keeps the
    /// element's cached id and class lists consistent with its attributes.
    fn edit_attrs(&mut self, node: NodeId, edit: impl FnOnce(&mut Vec<Attribute>)) {
        let Some(id) = self.resolve(node) else {
            return;
        };
        let Some(mut target) = self.html.tree.get_mut(id) else {
            return;
        };
        if let Node::Element(element) = target.value() {
            let mut attrs: Vec<Attribute> = element
                .attrs
                .iter()
                .map(|(name, value)| Attribute {
                    name: name.clone(),
                    value: StrTendril::from_slice(value),
                })
                .collect();
            edit(&mut attrs);
            *element = Element::new(element.name.clone(), attrs);
        }
    }

    /// Place `value` as the last child of `parent`, reusing a released slot
    /// when one is available.
    fn adopt(&mut self, value: Node, parent: TreeId) -> Option<TreeId> {
        let id = match self.spare.pop() {
            Some(id) => {
                *self.html.tree.get_mut(id)?.value() = value;
                self.place(parent, id);
                id
            }
            None => self.html.tree.get_mut(parent)?.append(value).id(),
        };
        self.register(id);
        Some(id)
    }

    /// Drop the handles of a detached subtree and keep its slots for reuse.
    fn release(&mut self, root: TreeId) {
        let ids: Vec<TreeId> = match self.html.tree.get(root) {
            Some(node) => node.descendants().map(|n| n.id()).collect(),
            None => return,
        };
        for id in &ids {
            if let Some(mut node) = self.html.tree.get_mut(*id) {
                node.detach();
                *node.value() = Node::Fragment;
            }
        }
        for id in ids {
            if let Some(handle) = self.by_node.remove(&id) {
                self.handles.remove(&handle);
                self.order.remove(&handle);
            }
            self.spare.push(id);
        }
    }

    /// Copy the nodes of a parsed fragment under `parent`, depth first.
    /// Returns the nodes created directly under `parent`.
    fn import_fragment(&mut self, markup: &str, parent: TreeId) -> Vec<TreeId> {
        let fragment = Html::parse_fragment(markup);
        let wrapper = fragment.root_element();
        let mut top_level = Vec::new();
        let mut stack: Vec<(NodeRef<'_, Node>, TreeId)> =
            wrapper.children().rev().map(|child| (child, parent)).collect();

        while let Some((source, into)) = stack.pop() {
            if !matches!(source.value(), Node::Element(_) | Node::Text(_) | Node::Comment(_)) {
                continue;
            }
            let Some(id) = self.adopt(source.value().clone(), into) else {
                continue;
            };
            if into == parent {
                top_level.push(id);
            }
            stack.extend(source.children().rev().map(|child| (child, id)));
        }

        top_level
    }

    fn emit(&mut self, target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) {
        self.revision += 1;
        // No receivers is fine: nobody is watching yet.
        let _ = self.mutations.send(MutationRecord {
            target,
            added,
            removed,
            revision: self.revision,
        });
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeAdapter for Document {
    fn root(&self) -> NodeId {
        self.root
    }

    fn find_all_within(&self, scope: NodeId, query: &NodeQuery) -> Vec<NodeId> {
        let (Some(scope), Some(selector)) = (self.node(scope), query.selector()) else {
            return Vec::new();
        };
        let mut found = Vec::new();
        for child in scope.children().filter_map(ElementRef::wrap) {
            if selector.matches(&child) {
                found.extend(self.handle(child.id()));
            }
            found.extend(child.select(&selector).filter_map(|el| self.handle(el.id())));
        }
        found
    }

    fn text_of(&self, node: NodeId) -> String {
        let Some(node) = self.node(node) else {
            return String::new();
        };
        let raw: String = match ElementRef::wrap(node) {
            Some(element) => element.text().collect(),
            None => node
                .descendants()
                .filter_map(|n| n.value().as_text())
                .map(|text| &**text)
                .collect(),
        };
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.node(node)?.parent()?;
        self.handle(parent.id())
    }

    fn children_of(&self, node: NodeId) -> Vec<NodeId> {
        self.node(node)
            .map(|n| {
                n.children()
                    .filter(|child| child.value().is_element())
                    .filter_map(|child| self.handle(child.id()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.node(node)?
            .value()
            .as_element()
            .map(|element| element.name().to_string())
    }

    fn attr(&self, node: NodeId, name: &str) -> Option<String> {
        self.node(node)?
            .value()
            .as_element()?
            .attr(name)
            .map(str::to_string)
    }

    fn outer_html(&self, node: NodeId) -> String {
        self.node(node)
            .and_then(ElementRef::wrap)
            .map(|element| element.html())
            .unwrap_or_default()
    }
}
