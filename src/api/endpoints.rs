//! Request builders for the storefront API.

use serde_json::json;

use crate::models::{CartItem, ProductFilter};

use super::request::ApiRequest;

/// Builds requests for one shopper's cart and the shared catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
  cart_id: i64,
}

impl Endpoints {
  pub fn new(cart_id: i64) -> Self {
    Self { cart_id }
  }

  pub fn products(&self, filter: &ProductFilter) -> ApiRequest {
    let mut request = ApiRequest::get("products");
    if let Some(search) = &filter.search {
      request = request.with_query("q", search.as_str());
    }
    if let Some(category) = &filter.category {
      request = request.with_query("category", category.as_str());
    }
    request
  }

  pub fn product(&self, id: i64) -> ApiRequest {
    ApiRequest::get(format!("products/{}", id))
  }

  pub fn cart(&self) -> ApiRequest {
    ApiRequest::get(self.cart_path())
  }

  /// Add a single line to the remote cart.
  pub fn add_item(&self, item: &CartItem) -> ApiRequest {
    ApiRequest::post(format!("{}/items", self.cart_path()), json!(item))
  }

  /// Replace the remote cart contents.
  pub fn replace_cart(&self, items: &[CartItem]) -> ApiRequest {
    ApiRequest::put(self.cart_path(), self.cart_body(items))
  }

  /// Create the remote cart, used when it does not exist yet.
  pub fn create_cart(&self, items: &[CartItem]) -> ApiRequest {
    ApiRequest::post("cart", self.cart_body(items))
  }

  pub fn clear_cart(&self) -> ApiRequest {
    ApiRequest::delete(self.cart_path())
  }

  fn cart_path(&self) -> String {
    format!("cart/{}", self.cart_id)
  }

  fn cart_body(&self, items: &[CartItem]) -> serde_json::Value {
    json!({ "id": self.cart_id, "items": items })
  }
}
