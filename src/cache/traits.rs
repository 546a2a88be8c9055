//! Core traits and types for the persistent store.

use rusqlite::types::{ToSql, ToSqlOutput};
use serde::{de::DeserializeOwned, Serialize};

/// The durable tables owned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
  Products,
  CartItems,
  SyncQueue,
}

impl Table {
  pub const ALL: [Table; 3] = [Table::Products, Table::CartItems, Table::SyncQueue];

  pub fn name(self) -> &'static str {
    match self {
      Table::Products => "products",
      Table::CartItems => "cart_items",
      Table::SyncQueue => "sync_queue",
    }
  }

  /// Secondary index columns, in the order `Record::index_values` yields them.
  pub fn indexes(self) -> &'static [&'static str] {
    match self {
      Table::Products => &["category"],
      Table::CartItems => &["product_id"],
      Table::SyncQueue => &["action_type", "timestamp"],
    }
  }

  /// Whether the store assigns keys for rows that come without one.
  pub fn auto_key(self) -> bool {
    !matches!(self, Table::Products)
  }

  pub(crate) fn check_index(self, index: &str) -> Option<&'static str> {
    self.indexes().iter().copied().find(|i| *i == index)
  }
}

/// Value of a secondary index column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexValue {
  Integer(i64),
  Text(String),
}

impl From<i64> for IndexValue {
  fn from(v: i64) -> Self {
    IndexValue::Integer(v)
  }
}

impl From<String> for IndexValue {
  fn from(v: String) -> Self {
    IndexValue::Text(v)
  }
}

impl From<&str> for IndexValue {
  fn from(v: &str) -> Self {
    IndexValue::Text(v.to_string())
  }
}

impl ToSql for IndexValue {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    match self {
      IndexValue::Integer(v) => v.to_sql(),
      IndexValue::Text(v) => v.to_sql(),
    }
  }
}

/// Trait for entities that live in one of the store's tables.
///
/// The entity itself is persisted as JSON; the key and index values are
/// mirrored into their own columns so lookups and ordering stay in SQL.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  fn table() -> Table;

  /// Row key. `None` asks the store to assign one (auto-key tables only).
  fn key(&self) -> Option<i64>;

  fn set_key(&mut self, key: i64);

  /// One value per entry of `Table::indexes`.
  fn index_values(&self) -> Vec<IndexValue>;
}
