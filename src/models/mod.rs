use serde::{Deserialize, Serialize};

pub mod item;
pub mod sort_intent;

// Re-exports for convenience
pub use item::*;
pub use sort_intent::*;

// Common enums used across models
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn from_ascending(ascending: bool) -> Self {
        if ascending {
            SortDirection::Ascending
        } else {
            SortDirection::Descending
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SortScope {
    /// Items of the live collection only.
    Local,
    /// Items aggregated from every page of the collection.
    Global,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReconcilerState {
    Idle,
    Applied,
    Watching,
}

impl std::fmt::Display for ReconcilerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReconcilerState::Idle => "idle",
            ReconcilerState::Applied => "applied",
            ReconcilerState::Watching => "watching",
        };
        f.write_str(name)
    }
}
