use serde::{Deserialize, Serialize};

use crate::tree::NodeId;

/// Where an item's content lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ItemSource {
    /// A node of the live document.
    Live(NodeId),
    /// Serialized markup of an item from a fetched page; it has no live node yet.
    Snapshot(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub source: ItemSource,
    pub unit_price: Option<f64>,
    /// Best-effort display name, empty when none was found.
    pub name: String,
    /// Page the item was discovered on, 1-based.
    pub page: u32,
    pub rank: Option<usize>,
}

impl Item {
    pub fn live(node: NodeId, unit_price: Option<f64>, name: String, page: u32) -> Self {
        Self {
            source: ItemSource::Live(node),
            unit_price,
            name,
            page,
            rank: None,
        }
    }

    pub fn snapshot(markup: String, unit_price: Option<f64>, name: String, page: u32) -> Self {
        Self {
            source: ItemSource::Snapshot(markup),
            unit_price,
            name,
            page,
            rank: None,
        }
    }

    pub fn node(&self) -> Option<NodeId> {
        match &self.source {
            ItemSource::Live(node) => Some(*node),
            ItemSource::Snapshot(_) => None,
        }
    }

    pub fn has_price(&self) -> bool {
        self.unit_price.is_some()
    }
}

/// Items discovered on one page, in discovery order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageItems {
    pub page: u32,
    pub items: Vec<Item>,
}

impl PageItems {
    pub fn new(page: u32, items: Vec<Item>) -> Self {
        Self { page, items }
    }

    pub fn empty(page: u32) -> Self {
        Self {
            page,
            items: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_constructors() {
        let live = Item::live(NodeId(4), Some(0.41), "Jaja".to_string(), 1);
        assert_eq!(live.node(), Some(NodeId(4)));
        assert!(live.has_price());
        assert_eq!(live.rank, None);

        let snapshot = Item::snapshot("<article></article>".to_string(), None, String::new(), 2);
        assert_eq!(snapshot.node(), None);
        assert!(!snapshot.has_price());
        assert_eq!(snapshot.page, 2);
    }

    #[test]
    fn test_item_serialization() {
        let item = Item::live(NodeId(7), Some(1.5), "Sir".to_string(), 1);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["source"]["kind"], "live");
        assert_eq!(json["unit_price"], 1.5);
        assert_eq!(json["name"], "Sir");
    }
}
