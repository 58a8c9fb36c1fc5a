//! Snapshot comparison.
//!
//! Two snapshots differ when any item's state differs or the item sets
//! differ. Only items present on both sides count as transitions; an item
//! missing from the previous snapshot was never observed, which is not the
//! same as "was out of stock".

use crate::models::StockSnapshot;

/// One item whose state flipped between two rounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub name: String,
    pub in_stock: bool,
}

/// Result of comparing two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    /// Whole-snapshot inequality
    pub changed: bool,
    /// Items observed on both sides with a different state
    pub transitions: Vec<Transition>,
    /// Items only in the current snapshot
    pub added: Vec<String>,
    /// Items only in the previous snapshot
    pub removed: Vec<String>,
}

impl DiffResult {
    /// Check if there are any changes.
    pub fn has_changes(&self) -> bool {
        self.changed
    }
}

/// Whole-structure inequality between two snapshots.
pub fn has_changed(previous: &StockSnapshot, current: &StockSnapshot) -> bool {
    previous != current
}

/// Items present in both snapshots whose state differs, in current order.
pub fn transitions(previous: &StockSnapshot, current: &StockSnapshot) -> Vec<Transition> {
    current
        .iter()
        .filter_map(|(name, in_stock)| match previous.get(name) {
            Some(before) if before != in_stock => Some(Transition {
                name: name.to_string(),
                in_stock,
            }),
            _ => None,
        })
        .collect()
}

/// Calculate the diff between previous and current snapshots.
pub fn calculate_diff(previous: &StockSnapshot, current: &StockSnapshot) -> DiffResult {
    let added = current
        .iter()
        .filter(|(name, _)| !previous.contains(name))
        .map(|(name, _)| name.to_string())
        .collect();
    let removed = previous
        .iter()
        .filter(|(name, _)| !current.contains(name))
        .map(|(name, _)| name.to_string())
        .collect();

    DiffResult {
        changed: has_changed(previous, current),
        transitions: transitions(previous, current),
        added,
        removed,
    }
}
