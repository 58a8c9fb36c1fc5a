//! Stock transition records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stock state as written to the history file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockStatus {
    #[serde(rename = "OK")]
    InStock,
    #[serde(rename = "NG")]
    OutOfStock,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "OK",
            StockStatus::OutOfStock => "NG",
        }
    }
}

impl From<bool> for StockStatus {
    fn from(in_stock: bool) -> Self {
        if in_stock {
            StockStatus::InStock
        } else {
            StockStatus::OutOfStock
        }
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the history file: `date,time,item_name,status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub date: String,
    pub time: String,
    pub item_name: String,
    pub status: StockStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_bool() {
        assert_eq!(StockStatus::from(true).as_str(), "OK");
        assert_eq!(StockStatus::from(false).to_string(), "NG");
    }
}
