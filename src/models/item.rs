//! Tracked item data structure.

use serde::{Deserialize, Serialize};

/// A product page whose stock state is tracked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    /// Display name, unique within one target list
    pub name: String,

    /// Product page URL
    pub url: String,
}

impl Item {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}
