//! Remote cart and catalog operations used by the sync orchestrator.

use serde_json::Value;
use std::future::Future;

use crate::error::Result;
use crate::models::{CartItem, Product, ProductFilter};

use super::client::Transport;
use super::endpoints::Endpoints;

/// The remote source of truth, as seen by synchronization.
///
/// Unlike the request router, failures here are never rerouted to the
/// offline path; they reach the caller.
pub trait RemoteStore: Send + Sync + 'static {
  fn fetch_products(&self) -> impl Future<Output = Result<Vec<Product>>> + Send;

  fn fetch_cart(&self) -> impl Future<Output = Result<Vec<CartItem>>> + Send;

  /// Replace the remote cart, returning what the remote now holds.
  fn replace_cart(&self, items: &[CartItem])
    -> impl Future<Output = Result<Vec<CartItem>>> + Send;

  fn clear_cart(&self) -> impl Future<Output = Result<()>> + Send;
}

/// [`RemoteStore`] speaking the storefront HTTP API through a transport.
#[derive(Clone)]
pub struct HttpStoreClient<T: Transport> {
  transport: T,
  endpoints: Endpoints,
}

impl<T: Transport> HttpStoreClient<T> {
  pub fn new(transport: T, endpoints: Endpoints) -> Self {
    Self {
      transport,
      endpoints,
    }
  }
}

impl<T: Transport> RemoteStore for HttpStoreClient<T> {
  async fn fetch_products(&self) -> Result<Vec<Product>> {
    let response = self
      .transport
      .send(&self.endpoints.products(&ProductFilter::default()))
      .await?;
    response.json()
  }

  async fn fetch_cart(&self) -> Result<Vec<CartItem>> {
    match self.transport.send(&self.endpoints.cart()).await {
      Ok(response) => cart_items_from(response.body),
      // A cart that was never created is an empty cart.
      Err(e) if e.is_not_found() => Ok(Vec::new()),
      Err(e) => Err(e),
    }
  }

  async fn replace_cart(&self, items: &[CartItem]) -> Result<Vec<CartItem>> {
    let response = match self
      .transport
      .send(&self.endpoints.replace_cart(items))
      .await
    {
      Ok(response) => response,
      Err(e) if e.is_not_found() => {
        self
          .transport
          .send(&self.endpoints.create_cart(items))
          .await?
      }
      Err(e) => return Err(e),
    };

    let echoed = cart_items_from(response.body)?;
    if echoed.is_empty() && !items.is_empty() {
      // Some backends answer with no body; trust what was sent.
      return Ok(items.to_vec());
    }
    Ok(echoed)
  }

  async fn clear_cart(&self) -> Result<()> {
    match self.transport.send(&self.endpoints.clear_cart()).await {
      Ok(_) => Ok(()),
      Err(e) if e.is_not_found() => Ok(()),
      Err(e) => Err(e),
    }
  }
}

/// Extract cart lines from a cart response body.
///
/// Accepts `{ "items": [...] }`, a bare array, or an empty body.
pub fn cart_items_from(body: Value) -> Result<Vec<CartItem>> {
  match body {
    Value::Null => Ok(Vec::new()),
    Value::Array(_) => Ok(serde_json::from_value(body)?),
    Value::Object(mut map) => match map.remove("items") {
      Some(Value::Null) | None => Ok(Vec::new()),
      Some(items) => Ok(serde_json::from_value(items)?),
    },
    other => Ok(serde_json::from_value(other)?),
  }
}
