use color_eyre::{eyre::eyre, Result as EyreResult};
use serde_json::Value;
use std::future::Future;
use tracing::debug;
use url::Url;

use crate::config::{ApiConfig, Config};
use crate::error::{Error, Result};

use super::request::{ApiRequest, ApiResponse};

/// A single request/response exchange with the storefront API.
///
/// Implementations report failures through [`Error::from_status`], so a
/// missing response is status 0 and callers can tell connectivity problems
/// from rejected requests.
pub trait Transport: Send + Sync + 'static {
  fn send(&self, request: &ApiRequest) -> impl Future<Output = Result<ApiResponse>> + Send;
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: Url,
  token: Option<String>,
}

impl HttpTransport {
  pub fn new(config: &ApiConfig) -> EyreResult<Self> {
    let client = reqwest::Client::builder()
      .timeout(config.timeout())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base_url: Self::parse_base_url(&config.base_url)?,
      token: Config::get_api_token(),
    })
  }

  /// Parse the base URL, making sure relative paths join below it.
  fn parse_base_url(raw: &str) -> EyreResult<Url> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
      raw.push('/');
    }
    Url::parse(&raw).map_err(|e| eyre!("Invalid API base URL {}: {}", raw, e))
  }

  fn url_for(&self, path: &str) -> Result<Url> {
    self
      .base_url
      .join(path.trim_start_matches('/'))
      .map_err(|e| Error::Application {
        status: 400,
        message: format!("invalid path {}: {}", path, e),
      })
  }
}

impl Transport for HttpTransport {
  async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
    let url = self.url_for(&request.path)?;
    debug!(method = %request.method, %url, "sending request");

    let mut builder = self.client.request(request.method.clone(), url);
    if !request.query.is_empty() {
      builder = builder.query(&request.query);
    }
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }
    if let Some(token) = &self.token {
      builder = builder.bearer_auth(token);
    }

    // No response at all (refused, DNS, timeout) is reported as status 0.
    let response = builder
      .send()
      .await
      .map_err(|e| Error::from_status(0, e.to_string()))?;

    let status = response.status().as_u16();
    let bytes = response
      .bytes()
      .await
      .map_err(|e| Error::from_status(0, e.to_string()))?;

    if !(200..300).contains(&status) {
      let message = String::from_utf8_lossy(&bytes).into_owned();
      return Err(Error::from_status(status, message));
    }

    let body = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes)?
    };

    Ok(ApiResponse::network(status, body))
  }
}
