use serde::{Deserialize, Serialize};

use crate::models::{SortDirection, SortScope};

/// The single live description of the user's chosen sort. A new trigger
/// replaces it and bumps the epoch; work tagged with an older epoch is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortIntent {
    pub direction: SortDirection,
    pub scope: SortScope,
    pub epoch: u64,
}

impl SortIntent {
    pub fn new(direction: SortDirection, scope: SortScope, epoch: u64) -> Self {
        Self {
            direction,
            scope,
            epoch,
        }
    }
}

/// Summary of one applied ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortReport {
    pub scope: SortScope,
    pub direction: SortDirection,
    /// Items with a unit price, sorted.
    pub priced: usize,
    /// Items without a unit price, appended in discovery order.
    pub unpriced: usize,
    /// Items left out of this pass because they were not where expected.
    pub skipped: usize,
    /// Pages that contributed to the ordering.
    pub pages: u32,
}

impl SortReport {
    pub fn total(&self) -> usize {
        self.priced + self.unpriced
    }

    pub fn summary(&self) -> String {
        format!(
            "Sorted {} items by unit price ({} without price)",
            self.total(),
            self.unpriced
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SortOutcome {
    Sorted(SortReport),
    NothingToSort,
    /// A newer trigger replaced this sort before it could be applied.
    Superseded,
}

impl SortOutcome {
    pub fn report(&self) -> Option<&SortReport> {
        match self {
            SortOutcome::Sorted(report) => Some(report),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_summary() {
        let report = SortReport {
            scope: SortScope::Local,
            direction: SortDirection::Ascending,
            priced: 4,
            unpriced: 1,
            skipped: 0,
            pages: 1,
        };
        assert_eq!(report.total(), 5);
        assert_eq!(report.summary(), "Sorted 5 items by unit price (1 without price)");
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(SortOutcome::NothingToSort).unwrap();
        assert_eq!(json["outcome"], "nothing_to_sort");
        assert_eq!(SortOutcome::Superseded.report(), None);
    }
}
