//! Offline-first cache and synchronization core for a storefront client.
//!
//! Reads are served from the network when possible and from a local SQLite
//! store otherwise; cart mutations made while offline are queued and
//! replayed in order once connectivity returns, after which the local and
//! remote carts are reconciled.

pub mod api;
pub mod cache;
pub mod cart;
pub mod config;
mod error;
pub mod models;
pub mod offline;
pub mod signal;
mod storefront;
pub mod sync;
#[cfg(test)]
mod testing;

pub use error::{Error, Result, StorageError};
pub use storefront::{Storefront, StorefrontOptions};
