//! Entities held by the offline core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Catalog product, replaced wholesale on every successful catalog fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
  pub id: i64,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub price: f64,
  pub category: String,
  #[serde(default)]
  pub image_url: String,
  #[serde(default)]
  pub stock: u32,
}

impl Product {
  /// Case-insensitive substring match against name and description.
  /// `needle` must already be lowercased.
  pub fn matches_search(&self, needle: &str) -> bool {
    self.name.to_lowercase().contains(needle)
      || self
        .description
        .as_deref()
        .is_some_and(|d| d.to_lowercase().contains(needle))
  }

  pub fn in_category(&self, category: &str) -> bool {
    self.category.to_lowercase() == category.to_lowercase()
  }
}

/// Catalog filter understood both by the remote API (`q`, `category` query
/// parameters) and by the offline path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
  pub search: Option<String>,
  pub category: Option<String>,
}

impl ProductFilter {
  pub fn is_empty(&self) -> bool {
    self.search.is_none() && self.category.is_none()
  }

  pub fn apply(&self, products: Vec<Product>) -> Vec<Product> {
    let needle = self.search.as_deref().map(str::to_lowercase);
    products
      .into_iter()
      .filter(|p| needle.as_deref().map_or(true, |n| p.matches_search(n)))
      .filter(|p| self.category.as_deref().map_or(true, |c| p.in_category(c)))
      .collect()
  }
}

/// Distinct categories, compared case-insensitively (first spelling wins),
/// sorted.
pub fn distinct_categories<'a, I>(products: I) -> Vec<String>
where
  I: IntoIterator<Item = &'a Product>,
{
  let mut categories: Vec<String> = Vec::new();
  for product in products {
    if !categories
      .iter()
      .any(|c| c.to_lowercase() == product.category.to_lowercase())
    {
      categories.push(product.category.clone());
    }
  }
  categories.sort_by_key(|c| c.to_lowercase());
  categories
}

/// Denormalized product fields kept on a cart line for offline display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
  pub name: String,
  pub price: f64,
  #[serde(default)]
  pub image_url: String,
}

impl From<&Product> for ProductSnapshot {
  fn from(product: &Product) -> Self {
    Self {
      name: product.name.clone(),
      price: product.price,
      image_url: product.image_url.clone(),
    }
  }
}

/// One line of a cart snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
  /// Local storage key, never sent to the remote API.
  #[serde(skip)]
  pub id: Option<i64>,
  pub product_id: i64,
  /// Non-positive means "remove this line".
  pub quantity: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub product: Option<ProductSnapshot>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
}

impl CartItem {
  pub fn new(product_id: i64, quantity: i64) -> Self {
    Self {
      id: None,
      product_id,
      quantity,
      product: None,
      updated_at: None,
    }
  }

  pub fn with_product(mut self, product: &Product) -> Self {
    self.product = Some(ProductSnapshot::from(product));
    self
  }

  /// Line total from the snapshot price, zero when no snapshot is held.
  pub fn line_total(&self) -> f64 {
    self
      .product
      .as_ref()
      .map_or(0.0, |p| p.price * self.quantity as f64)
  }
}

/// Kind of a deferred cart mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncActionType {
  AddToCart,
  UpdateCart,
  ClearCart,
}

impl SyncActionType {
  pub fn as_str(self) -> &'static str {
    match self {
      SyncActionType::AddToCart => "ADD_TO_CART",
      SyncActionType::UpdateCart => "UPDATE_CART",
      SyncActionType::ClearCart => "CLEAR_CART",
    }
  }
}

impl fmt::Display for SyncActionType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A mutation that could not reach the network and waits for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSyncAction {
  #[serde(skip)]
  pub id: Option<i64>,
  #[serde(rename = "type")]
  pub action_type: SyncActionType,
  /// Body the deferred request would have sent. Diagnostic only: replay
  /// pushes the current local cart instead.
  pub payload: serde_json::Value,
  pub timestamp: DateTime<Utc>,
  pub retry_count: u32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_attempt: Option<DateTime<Utc>>,
}

/// A queue entry before it gets an id and a retry counter.
#[derive(Debug, Clone)]
pub struct NewSyncAction {
  pub action_type: SyncActionType,
  pub payload: serde_json::Value,
  pub timestamp: DateTime<Utc>,
}

impl NewSyncAction {
  pub fn new(action_type: SyncActionType, payload: serde_json::Value) -> Self {
    Self {
      action_type,
      payload,
      timestamp: Utc::now(),
    }
  }
}

impl From<NewSyncAction> for PendingSyncAction {
  fn from(action: NewSyncAction) -> Self {
    Self {
      id: None,
      action_type: action.action_type,
      payload: action.payload,
      timestamp: action.timestamp,
      retry_count: 0,
      last_attempt: None,
    }
  }
}
