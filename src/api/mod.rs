//! Storefront API surface: request types, transports and remote operations.

mod client;
mod endpoints;
mod remote;
mod request;

pub use client::{HttpTransport, Transport};
pub use endpoints::Endpoints;
pub use remote::{cart_items_from, HttpStoreClient, RemoteStore};
pub use request::{ApiRequest, ApiResponse, Resource, ResponseSource};
