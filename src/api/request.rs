//! Request and response types shared by the router and the remote client.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;

/// An outgoing API call, described independently of any transport.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
  pub method: Method,
  /// Resource path relative to the API base, e.g. `products` or `cart/1`.
  pub path: String,
  pub body: Option<Value>,
  pub query: Vec<(String, String)>,
}

impl ApiRequest {
  pub fn new(method: Method, path: impl Into<String>) -> Self {
    Self {
      method,
      path: path.into(),
      body: None,
      query: Vec::new(),
    }
  }

  pub fn get(path: impl Into<String>) -> Self {
    Self::new(Method::GET, path)
  }

  pub fn post(path: impl Into<String>, body: Value) -> Self {
    Self::new(Method::POST, path).with_body(body)
  }

  pub fn put(path: impl Into<String>, body: Value) -> Self {
    Self::new(Method::PUT, path).with_body(body)
  }

  pub fn delete(path: impl Into<String>) -> Self {
    Self::new(Method::DELETE, path)
  }

  pub fn with_body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }

  pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.query.push((name.into(), value.into()));
    self
  }

  /// First value of a query parameter, ignoring empty values.
  pub fn query_param(&self, name: &str) -> Option<&str> {
    self
      .query
      .iter()
      .find(|(k, v)| k == name && !v.is_empty())
      .map(|(_, v)| v.as_str())
  }

  pub fn resource(&self) -> Resource {
    Resource::parse(&self.path)
  }

  pub fn is_read(&self) -> bool {
    self.method == Method::GET
  }
}

/// What a request path points at, as far as the offline path cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
  /// The product collection.
  Products,
  /// A single product.
  Product(i64),
  /// The cart or anything below it (`cart`, `cart/1`, `cart/1/items`).
  Cart,
  Other,
}

impl Resource {
  pub fn parse(path: &str) -> Self {
    let mut segments = path.split('/').filter(|s| !s.is_empty());

    match segments.next() {
      Some("products") => match segments.next() {
        None => Resource::Products,
        Some(id) => id.parse().map_or(Resource::Other, Resource::Product),
      },
      Some("cart") => Resource::Cart,
      _ => Resource::Other,
    }
  }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh data from the network
  Network,
  /// Served from the persistent store
  Cache,
  /// Mutation recorded for later replay
  Queued,
}

/// Result of a routed request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
  pub status: u16,
  pub body: Value,
  pub source: ResponseSource,
}

impl ApiResponse {
  pub fn network(status: u16, body: Value) -> Self {
    Self {
      status,
      body,
      source: ResponseSource::Network,
    }
  }

  pub fn cached(body: Value) -> Self {
    Self {
      status: 200,
      body,
      source: ResponseSource::Cache,
    }
  }

  pub fn queued(body: Value) -> Self {
    Self {
      status: 202,
      body,
      source: ResponseSource::Queued,
    }
  }

  pub fn is_queued(&self) -> bool {
    self.source == ResponseSource::Queued
  }

  /// Deserialize the body.
  pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
    Ok(serde_json::from_value(self.body.clone())?)
  }
}
