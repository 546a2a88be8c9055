//! Persistent store for offline support.
//!
//! This module owns the durable representation of everything the storefront
//! needs while disconnected:
//! - `products`: the last catalog fetched, indexed by category
//! - `cart_items`: the local cart, indexed by product id
//! - `sync_queue`: mutations waiting for replay, indexed by type and time

mod records;
mod storage;
mod traits;

pub use storage::{SqliteStore, Store};
pub use traits::{IndexValue, Record, Table};
