//! The surface the UI talks to.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::api::{cart_items_from, ApiResponse, Endpoints, RemoteStore, ResponseSource, Transport};
use crate::cache::Store;
use crate::cart::{merge_snapshots, CartState, ConflictPolicy};
use crate::config::Config;
use crate::error::Result;
use crate::models::{
  distinct_categories, CartItem, NewSyncAction, PendingSyncAction, Product, ProductFilter,
};
use crate::offline::{ConnectivityMonitor, RequestRouter, SyncQueue};
use crate::signal::Signal;
use crate::sync::{SyncContext, SyncOrchestrator, SyncOutcome, SyncStatus};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorefrontOptions {
  pub cart_id: i64,
  pub policy: ConflictPolicy,
  pub replay_timeout: Duration,
  /// Platform connectivity at startup.
  pub online: bool,
}

impl StorefrontOptions {
  pub fn from_config(config: &Config, online: bool) -> Self {
    Self {
      cart_id: config.api.cart_id,
      policy: config.sync.merge_policy,
      replay_timeout: config.sync.replay_timeout(),
      online,
    }
  }
}

/// Catalog, cart and sync operations with offline support wired in.
///
/// Reads go through the request router, so they are answered from the local
/// store when the network is unavailable. Cart mutations update local state
/// first and are then dispatched; offline they land in the sync queue.
pub struct Storefront<T: Transport, R: RemoteStore, S: Store> {
  router: RequestRouter<T, S>,
  endpoints: Endpoints,
  store: Arc<S>,
  queue: Arc<SyncQueue<S>>,
  cart: Arc<CartState<S>>,
  monitor: ConnectivityMonitor,
  status: Signal<SyncStatus>,
  sync: Arc<SyncOrchestrator<R, S>>,
  policy: ConflictPolicy,
}

impl<T: Transport, R: RemoteStore, S: Store> Storefront<T, R, S> {
  pub fn new(transport: T, remote: R, store: Arc<S>, options: StorefrontOptions) -> Self {
    let monitor = ConnectivityMonitor::new(options.online);
    let status = Signal::new(SyncStatus::default());
    let queue = Arc::new(SyncQueue::new(Arc::clone(&store), status.clone()));
    let cart = Arc::new(CartState::load(Arc::clone(&store)));

    let router = RequestRouter::new(
      transport,
      Arc::clone(&store),
      Arc::clone(&queue),
      monitor.clone(),
      options.policy,
    );
    let sync = Arc::new(SyncOrchestrator::new(
      remote,
      SyncContext {
        store: Arc::clone(&store),
        queue: Arc::clone(&queue),
        cart: Arc::clone(&cart),
        monitor: monitor.clone(),
        status: status.clone(),
      },
      options.policy,
      options.replay_timeout,
    ));

    Self {
      router,
      endpoints: Endpoints::new(options.cart_id),
      store,
      queue,
      cart,
      monitor,
      status,
      sync,
      policy: options.policy,
    }
  }

  /// Start syncing automatically whenever connectivity comes back.
  pub fn spawn_reconnect_listener(&self) -> JoinHandle<()> {
    self.sync.spawn_reconnect_listener()
  }

  pub async fn get_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
    self
      .router
      .dispatch(self.endpoints.products(filter))
      .await?
      .json()
  }

  pub async fn get_product(&self, id: i64) -> Result<Product> {
    self.router.dispatch(self.endpoints.product(id)).await?.json()
  }

  /// Current cart. A fresh remote snapshot is merged into local state first.
  pub async fn get_cart(&self) -> Result<Vec<CartItem>> {
    let response = self.router.dispatch(self.endpoints.cart()).await?;
    if response.source != ResponseSource::Network {
      return Ok(self.cart.snapshot());
    }

    let remote = cart_items_from(response.body)?;
    let merged = merge_snapshots(&self.cart.snapshot(), &remote, self.policy);
    debug!(remote = remote.len(), merged = merged.len(), "merged remote cart");
    Ok(self.cart.install(merged))
  }

  pub async fn add_to_cart(&self, product: &Product, quantity: i64) -> Result<ApiResponse> {
    self.cart.add_item(product, quantity);
    let line = CartItem::new(product.id, quantity).with_product(product);
    self.router.dispatch(self.endpoints.add_item(&line)).await
  }

  /// Set a line's quantity; zero or less removes the line.
  pub async fn set_quantity(&self, product_id: i64, quantity: i64) -> Result<ApiResponse> {
    let items = self.cart.set_quantity(product_id, quantity);
    self.router.dispatch(self.endpoints.replace_cart(&items)).await
  }

  pub async fn remove_from_cart(&self, product_id: i64) -> Result<ApiResponse> {
    let items = self.cart.remove_item(product_id);
    self.router.dispatch(self.endpoints.replace_cart(&items)).await
  }

  pub async fn clear_cart(&self) -> Result<ApiResponse> {
    self.cart.clear();
    self.router.dispatch(self.endpoints.clear_cart()).await
  }

  pub fn get_cached_products(&self) -> Result<Vec<Product>> {
    Ok(self.store.get_all()?)
  }

  pub fn get_cached_cart(&self) -> Result<Vec<CartItem>> {
    Ok(self.store.get_all()?)
  }

  /// Distinct categories of the cached catalog.
  pub fn categories(&self) -> Result<Vec<String>> {
    Ok(distinct_categories(&self.get_cached_products()?))
  }

  pub fn enqueue(&self, action: NewSyncAction) -> Result<i64> {
    self.queue.enqueue(action)
  }

  pub fn list_queue(&self) -> Result<Vec<PendingSyncAction>> {
    self.queue.list()
  }

  pub async fn trigger_sync(&self) -> SyncOutcome {
    self.sync.trigger_sync().await
  }

  pub fn cart_snapshot(&self) -> Vec<CartItem> {
    self.cart.snapshot()
  }

  pub fn cart_item_count(&self) -> i64 {
    self.cart.item_count()
  }

  pub fn cart_total(&self) -> f64 {
    self.cart.total()
  }

  pub fn is_online(&self) -> bool {
    self.monitor.is_online()
  }

  /// Feed the platform connectivity signal.
  pub fn set_online(&self, online: bool) -> bool {
    self.monitor.set_online(online)
  }

  pub fn sync_status(&self) -> SyncStatus {
    self.status.get()
  }

  pub fn subscribe_connectivity(&self) -> watch::Receiver<bool> {
    self.monitor.subscribe()
  }

  pub fn subscribe_sync_status(&self) -> watch::Receiver<SyncStatus> {
    self.status.subscribe()
  }

  pub fn subscribe_cart(&self) -> watch::Receiver<Vec<CartItem>> {
    self.cart.subscribe()
  }
}
