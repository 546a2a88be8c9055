//! Record implementations for the storefront entities.

use chrono::SecondsFormat;

use crate::models::{CartItem, PendingSyncAction, Product};

use super::traits::{IndexValue, Record, Table};

impl Record for Product {
  fn table() -> Table {
    Table::Products
  }

  fn key(&self) -> Option<i64> {
    Some(self.id)
  }

  fn set_key(&mut self, key: i64) {
    self.id = key;
  }

  fn index_values(&self) -> Vec<IndexValue> {
    // Lowercased so category lookups are case-insensitive.
    vec![self.category.to_lowercase().into()]
  }
}

impl Record for CartItem {
  fn table() -> Table {
    Table::CartItems
  }

  fn key(&self) -> Option<i64> {
    self.id
  }

  fn set_key(&mut self, key: i64) {
    self.id = Some(key);
  }

  fn index_values(&self) -> Vec<IndexValue> {
    vec![self.product_id.into()]
  }
}

impl Record for PendingSyncAction {
  fn table() -> Table {
    Table::SyncQueue
  }

  fn key(&self) -> Option<i64> {
    self.id
  }

  fn set_key(&mut self, key: i64) {
    self.id = Some(key);
  }

  fn index_values(&self) -> Vec<IndexValue> {
    vec![
      self.action_type.as_str().into(),
      // Fixed-width UTC so text order is chronological order.
      self
        .timestamp
        .to_rfc3339_opts(SecondsFormat::Nanos, true)
        .into(),
    ]
  }
}
