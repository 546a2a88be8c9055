//! The shopper's local cart, mirrored into the persistent store.

use chrono::Utc;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::Store;
use crate::models::{CartItem, Product};
use crate::signal::Signal;

use super::merge::normalize;

/// Current cart contents as an observable value.
///
/// Every change is normalized (one line per product, positive quantities
/// only) and written to the `cart_items` table. Store failures are logged:
/// the in-memory cart stays authoritative until the next successful write.
pub struct CartState<S: Store> {
  store: Arc<S>,
  items: Signal<Vec<CartItem>>,
  /// Serializes mutate-then-persist so the table never lags an older state.
  write_lock: Mutex<()>,
}

impl<S: Store> CartState<S> {
  /// Start from whatever cart the store holds.
  pub fn load(store: Arc<S>) -> Self {
    let cached = match store.get_all::<CartItem>() {
      Ok(items) => normalize(items),
      Err(e) => {
        warn!(error = %e, "failed to load cached cart, starting empty");
        Vec::new()
      }
    };
    debug!(lines = cached.len(), "loaded cart");

    Self {
      store,
      items: Signal::new(cached),
      write_lock: Mutex::new(()),
    }
  }

  pub fn snapshot(&self) -> Vec<CartItem> {
    self.items.get()
  }

  pub fn subscribe(&self) -> watch::Receiver<Vec<CartItem>> {
    self.items.subscribe()
  }

  /// Add `quantity` of a product, summing into an existing line.
  pub fn add_item(&self, product: &Product, quantity: i64) -> Vec<CartItem> {
    self.mutate(|items| {
      items.push(CartItem::new(product.id, quantity).with_product(product));
    })
  }

  /// Set a line's quantity; zero or less removes it.
  pub fn set_quantity(&self, product_id: i64, quantity: i64) -> Vec<CartItem> {
    self.mutate(|items| {
      for item in items.iter_mut().filter(|i| i.product_id == product_id) {
        item.quantity = quantity;
      }
    })
  }

  pub fn remove_item(&self, product_id: i64) -> Vec<CartItem> {
    self.mutate(|items| items.retain(|i| i.product_id != product_id))
  }

  pub fn clear(&self) {
    self.mutate(Vec::clear);
  }

  /// Replace the whole cart, e.g. with a reconciled snapshot.
  pub fn install(&self, items: Vec<CartItem>) -> Vec<CartItem> {
    self.mutate(move |current| *current = items)
  }

  /// Number of units across all lines.
  pub fn item_count(&self) -> i64 {
    self.items.get().iter().map(|i| i.quantity).sum()
  }

  /// Cart total from the snapshot prices.
  pub fn total(&self) -> f64 {
    self.items.get().iter().map(CartItem::line_total).sum()
  }

  fn mutate<F>(&self, f: F) -> Vec<CartItem>
  where
    F: FnOnce(&mut Vec<CartItem>),
  {
    let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

    let mut next = Vec::new();
    self.items.update(|items| {
      f(items);
      *items = normalize(std::mem::take(items));
      next = items.clone();
    });

    self.persist(&next);
    next
  }

  fn persist(&self, items: &[CartItem]) {
    let now = Utc::now();
    let rows: Vec<CartItem> = items
      .iter()
      .cloned()
      .map(|mut item| {
        item.updated_at = Some(now);
        item
      })
      .collect();

    if let Err(e) = self.store.replace_all(&rows) {
      warn!(error = %e, "failed to persist cart");
    }
  }
}
