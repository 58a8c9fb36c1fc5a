//! Per-round stock state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Item name to "in stock" state observed in one round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockSnapshot {
    items: BTreeMap<String, bool>,
}

impl StockSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the state of an item, replacing any earlier value.
    pub fn record(&mut self, name: impl Into<String>, in_stock: bool) {
        self.items.insert(name.into(), in_stock);
    }

    /// State of an item, or `None` when the item was not observed.
    pub fn get(&self, name: &str) -> Option<bool> {
        self.items.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.items.iter().map(|(name, state)| (name.as_str(), *state))
    }

    /// Number of items currently in stock.
    pub fn in_stock_count(&self) -> usize {
        self.items.values().filter(|state| **state).count()
    }
}

impl<S: Into<String>> FromIterator<(S, bool)> for StockSnapshot {
    fn from_iter<T: IntoIterator<Item = (S, bool)>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
