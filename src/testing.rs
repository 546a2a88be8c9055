//! Scripted stand-ins for the network, shared by unit tests.

use reqwest::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::api::{ApiRequest, ApiResponse, RemoteStore, Transport};
use crate::error::{Error, Result};
use crate::models::{CartItem, Product};

pub fn sample_product(id: i64, name: &str, category: &str) -> Product {
  Product {
    id,
    name: name.to_string(),
    description: None,
    price: 2.5,
    category: category.to_string(),
    image_url: format!("https://img.example/{}.png", id),
    stock: 10,
  }
}

#[derive(Clone)]
enum Scripted {
  Body(Value),
  Status(u16, String),
}

/// Transport answering from a per-route script; unscripted routes look
/// unreachable.
#[derive(Clone, Default)]
pub struct FakeTransport {
  routes: Arc<Mutex<HashMap<(Method, String), Scripted>>>,
  requests: Arc<Mutex<Vec<ApiRequest>>>,
}

impl FakeTransport {
  /// Answer every later request to this route with `answer`.
  pub fn respond(&self, method: Method, path: &str, answer: Result<Value>) {
    let scripted = match answer {
      Ok(body) => Scripted::Body(body),
      Err(Error::Connectivity { status, message } | Error::Application { status, message }) => {
        Scripted::Status(status, message)
      }
      Err(other) => Scripted::Status(0, other.to_string()),
    };
    self
      .routes
      .lock()
      .unwrap()
      .insert((method, path.to_string()), scripted);
  }

  pub fn requests(&self) -> Vec<ApiRequest> {
    self.requests.lock().unwrap().clone()
  }
}

impl Transport for FakeTransport {
  async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
    self.requests.lock().unwrap().push(request.clone());

    let answer = self
      .routes
      .lock()
      .unwrap()
      .get(&(request.method.clone(), request.path.clone()))
      .cloned();

    match answer {
      Some(Scripted::Body(body)) => Ok(ApiResponse::network(200, body)),
      Some(Scripted::Status(status, message)) => Err(Error::from_status(status, message)),
      None => Err(Error::from_status(0, "no route scripted")),
    }
  }
}

#[derive(Default)]
struct RemoteInner {
  cart: Vec<CartItem>,
  products: Vec<Product>,
  calls: Vec<String>,
  /// Mutating calls seen so far, used to pick the failing one.
  mutations: usize,
  fail_mutation: Option<(usize, u16)>,
  fail_fetch: Option<u16>,
}

/// In-memory remote with a call log and optional injected failures.
#[derive(Clone, Default)]
pub struct FakeRemote {
  inner: Arc<Mutex<RemoteInner>>,
  delay: Option<Duration>,
}

impl FakeRemote {
  pub fn with_cart(cart: Vec<CartItem>) -> Self {
    let remote = Self::default();
    remote.inner.lock().unwrap().cart = cart;
    remote
  }

  pub fn with_products(self, products: Vec<Product>) -> Self {
    self.inner.lock().unwrap().products = products;
    self
  }

  /// Every call sleeps this long first.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  /// Fail the `nth` (0-based) mutating call with `status`.
  pub fn fail_mutation(&self, nth: usize, status: u16) {
    self.inner.lock().unwrap().fail_mutation = Some((nth, status));
  }

  pub fn fail_fetch(&self, status: u16) {
    self.inner.lock().unwrap().fail_fetch = Some(status);
  }

  pub fn cart(&self) -> Vec<CartItem> {
    self.inner.lock().unwrap().cart.clone()
  }

  pub fn calls(&self) -> Vec<String> {
    self.inner.lock().unwrap().calls.clone()
  }

  async fn pause(&self) {
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
  }

  fn mutation(&self, call: String) -> Result<()> {
    let mut inner = self.inner.lock().unwrap();
    inner.calls.push(call);
    let nth = inner.mutations;
    inner.mutations += 1;
    match inner.fail_mutation {
      Some((fail_at, status)) if fail_at == nth => {
        Err(Error::from_status(status, "injected failure"))
      }
      _ => Ok(()),
    }
  }

  fn fetch(&self, call: &str) -> Result<()> {
    let mut inner = self.inner.lock().unwrap();
    inner.calls.push(call.to_string());
    match inner.fail_fetch {
      Some(status) => Err(Error::from_status(status, "injected failure")),
      None => Ok(()),
    }
  }
}

impl RemoteStore for FakeRemote {
  async fn fetch_products(&self) -> Result<Vec<Product>> {
    self.pause().await;
    self.fetch("fetch_products")?;
    Ok(self.inner.lock().unwrap().products.clone())
  }

  async fn fetch_cart(&self) -> Result<Vec<CartItem>> {
    self.pause().await;
    self.fetch("fetch_cart")?;
    Ok(self.cart())
  }

  async fn replace_cart(&self, items: &[CartItem]) -> Result<Vec<CartItem>> {
    self.pause().await;
    let quantities: Vec<String> = items
      .iter()
      .map(|i| format!("{}x{}", i.product_id, i.quantity))
      .collect();
    self.mutation(format!("replace_cart[{}]", quantities.join(",")))?;

    self.inner.lock().unwrap().cart = items.to_vec();
    Ok(items.to_vec())
  }

  async fn clear_cart(&self) -> Result<()> {
    self.pause().await;
    self.mutation("clear_cart".to_string())?;

    self.inner.lock().unwrap().cart.clear();
    Ok(())
  }
}
