//! Cart line aggregation and local/remote snapshot reconciliation.
//!
//! Both the cart state layer and the sync orchestrator go through these
//! functions, so a cart snapshot is deduplicated the same way everywhere.

use serde::Deserialize;
use std::collections::HashMap;

use crate::models::CartItem;

/// How to settle a product that both snapshots contain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
  /// Keep the remote quantity.
  RemoteWins,
  /// Keep the larger quantity, so a pending local increment is never lost.
  #[default]
  MaxQuantity,
}

/// One line per product id with quantities summed.
///
/// Lines keep the position and snapshot of their first occurrence.
pub fn aggregate<I>(items: I) -> Vec<CartItem>
where
  I: IntoIterator<Item = CartItem>,
{
  let mut positions: HashMap<i64, usize> = HashMap::new();
  let mut result: Vec<CartItem> = Vec::new();

  for item in items {
    match positions.get(&item.product_id) {
      Some(&pos) => {
        let line = &mut result[pos];
        line.quantity += item.quantity;
        if line.product.is_none() {
          line.product = item.product;
        }
      }
      None => {
        positions.insert(item.product_id, result.len());
        result.push(item);
      }
    }
  }

  result
}

/// [`aggregate`] sorted by product id, for stable display and comparison.
pub fn aggregate_canonical<I>(items: I) -> Vec<CartItem>
where
  I: IntoIterator<Item = CartItem>,
{
  let mut result = aggregate(items);
  result.sort_by_key(|item| item.product_id);
  result
}

/// Aggregate, then drop lines whose quantity is not positive.
pub fn normalize<I>(items: I) -> Vec<CartItem>
where
  I: IntoIterator<Item = CartItem>,
{
  let mut result = aggregate(items);
  result.retain(|item| item.quantity > 0);
  result
}

/// Reconcile a local cart with the remote one.
///
/// The remote snapshot is the starting point; local lines for products the
/// remote does not have are appended, and shared products are settled by
/// `policy`.
pub fn merge_snapshots(
  local: &[CartItem],
  remote: &[CartItem],
  policy: ConflictPolicy,
) -> Vec<CartItem> {
  let mut merged = aggregate(remote.iter().cloned());
  let mut positions: HashMap<i64, usize> = merged
    .iter()
    .enumerate()
    .map(|(pos, item)| (item.product_id, pos))
    .collect();

  for item in aggregate(local.iter().cloned()) {
    match positions.get(&item.product_id) {
      Some(&pos) => {
        let line = &mut merged[pos];
        if policy == ConflictPolicy::MaxQuantity {
          line.quantity = line.quantity.max(item.quantity);
        }
        if line.product.is_none() {
          line.product = item.product;
        }
      }
      None => {
        positions.insert(item.product_id, merged.len());
        merged.push(item);
      }
    }
  }

  merged
}
