//! Routes API calls to the network or to the offline path.

use reqwest::Method;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::{cart_items_from, ApiRequest, ApiResponse, Resource, Transport};
use crate::cache::Store;
use crate::cart::{merge_snapshots, ConflictPolicy};
use crate::error::{Error, Result};
use crate::models::{CartItem, NewSyncAction, Product, ProductFilter, SyncActionType};

use super::connectivity::ConnectivityMonitor;
use super::queue::SyncQueue;

/// Decides, per request, between the network and the local store.
///
/// Online requests go to the transport; successful catalog and cart reads
/// are copied into the store in the background. Connectivity failures
/// (no response, or a 5xx) flip the monitor offline and are answered from
/// the offline path instead of being surfaced. Offline, reads are served
/// from the store and cart mutations are queued for replay.
pub struct RequestRouter<T: Transport, S: Store> {
  transport: T,
  store: Arc<S>,
  queue: Arc<SyncQueue<S>>,
  monitor: ConnectivityMonitor,
  policy: ConflictPolicy,
}

impl<T: Transport, S: Store> RequestRouter<T, S> {
  pub fn new(
    transport: T,
    store: Arc<S>,
    queue: Arc<SyncQueue<S>>,
    monitor: ConnectivityMonitor,
    policy: ConflictPolicy,
  ) -> Self {
    Self {
      transport,
      store,
      queue,
      monitor,
      policy,
    }
  }

  pub async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse> {
    if !self.monitor.is_online() {
      debug!(method = %request.method, path = %request.path, "offline, serving locally");
      return self.handle_offline(&request);
    }

    match self.transport.send(&request).await {
      Ok(response) => {
        self.populate_cache(&request, &response);
        Ok(response)
      }
      Err(e) if e.is_connectivity() => {
        warn!(
          method = %request.method,
          path = %request.path,
          error = %e,
          "network failure, falling back to offline mode"
        );
        self.monitor.report_unreachable();
        self.handle_offline(&request)
      }
      Err(e) if e.is_not_found() && request.is_read() && request.resource() == Resource::Cart => {
        // The remote has no cart yet; that is an empty cart, not an error.
        let response = ApiResponse::network(200, json!({ "items": [] }));
        self.populate_cache(&request, &response);
        Ok(response)
      }
      Err(e) => Err(e),
    }
  }

  fn handle_offline(&self, request: &ApiRequest) -> Result<ApiResponse> {
    match (request.resource(), request.is_read()) {
      (Resource::Products, true) => self.cached_products(request),
      (Resource::Product(id), true) => self.cached_product(id),
      (Resource::Cart, true) => self.cached_cart(),
      (Resource::Cart, false) => self.queue_mutation(request),
      _ => Err(unsupported(request)),
    }
  }

  fn cached_products(&self, request: &ApiRequest) -> Result<ApiResponse> {
    let filter = ProductFilter {
      search: request.query_param("q").map(String::from),
      category: request.query_param("category").map(String::from),
    };

    let products = self.load_products(&filter).map_err(|e| {
      warn!(error = %e, "failed to read cached products");
      not_available("products")
    })?;
    let products = products.ok_or_else(|| not_available("products"))?;

    debug!(count = products.len(), "serving products from cache");
    Ok(ApiResponse::cached(json!(products)))
  }

  /// `None` when nothing is cached at all, as opposed to an empty match.
  fn load_products(&self, filter: &ProductFilter) -> Result<Option<Vec<Product>>> {
    if self.store.count::<Product>()? == 0 {
      return Ok(None);
    }

    let candidates: Vec<Product> = match &filter.category {
      Some(category) => self
        .store
        .find_by("category", category.to_lowercase().into())?,
      None => self.store.get_all()?,
    };

    Ok(Some(filter.apply(candidates)))
  }

  fn cached_product(&self, id: i64) -> Result<ApiResponse> {
    let resource = format!("product {}", id);
    match self.store.get::<Product>(id) {
      Ok(Some(product)) => Ok(ApiResponse::cached(json!(product))),
      Ok(None) => Err(not_available(&resource)),
      Err(e) => {
        warn!(error = %e, id, "failed to read cached product");
        Err(not_available(&resource))
      }
    }
  }

  fn cached_cart(&self) -> Result<ApiResponse> {
    let items: Vec<CartItem> = self.store.get_all().map_err(|e| {
      warn!(error = %e, "failed to read cached cart");
      not_available("cart")
    })?;

    Ok(ApiResponse::cached(json!({ "items": items })))
  }

  fn queue_mutation(&self, request: &ApiRequest) -> Result<ApiResponse> {
    let action_type = match request.method {
      Method::POST => SyncActionType::AddToCart,
      Method::PUT => SyncActionType::UpdateCart,
      Method::DELETE => SyncActionType::ClearCart,
      _ => return Err(unsupported(request)),
    };

    let payload = request.body.clone().unwrap_or_default();
    let action = NewSyncAction::new(action_type, payload);
    let timestamp = action.timestamp;
    self.queue.enqueue(action)?;

    Ok(ApiResponse::queued(json!({
      "message": "Action recorded for later synchronization",
      "queued": true,
      "timestamp": timestamp.to_rfc3339(),
    })))
  }

  /// Copy a successful read into the store without making the caller wait.
  fn populate_cache(&self, request: &ApiRequest, response: &ApiResponse) {
    if !request.is_read() {
      return;
    }

    match request.resource() {
      // Only unfiltered listings describe the whole catalog.
      Resource::Products if request.query.is_empty() => {
        let products: Vec<Product> = match serde_json::from_value(response.body.clone()) {
          Ok(products) => products,
          Err(e) => {
            warn!(error = %e, "product response not cacheable");
            return;
          }
        };

        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
          match store.replace_all(&products) {
            Ok(()) => debug!(count = products.len(), "cached products"),
            Err(e) => warn!(error = %e, "failed to cache products"),
          }
        });
      }
      Resource::Cart => {
        let remote = match cart_items_from(response.body.clone()) {
          Ok(items) => items,
          Err(e) => {
            warn!(error = %e, "cart response not cacheable");
            return;
          }
        };

        // Merge rather than overwrite so a late write cannot drop local
        // lines the cart state has persisted in the meantime.
        let store = Arc::clone(&self.store);
        let policy = self.policy;
        tokio::task::spawn_blocking(move || {
          let result = store.replace_with(|cached: Vec<CartItem>| {
            merge_snapshots(&cached, &remote, policy)
          });
          match result {
            Ok(items) => debug!(lines = items.len(), "cached cart"),
            Err(e) => warn!(error = %e, "failed to cache cart"),
          }
        });
      }
      _ => {}
    }
  }
}

fn unsupported(request: &ApiRequest) -> Error {
  Error::Unsupported {
    method: request.method.to_string(),
    path: request.path.clone(),
  }
}

fn not_available(resource: &str) -> Error {
  Error::NotAvailableOffline {
    resource: resource.to_string(),
  }
}
