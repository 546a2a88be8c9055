use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cart::ConflictPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the storefront API, e.g. `https://shop.example.com/api/`
  pub base_url: String,
  /// Remote cart owned by this client
  #[serde(default = "default_cart_id")]
  pub cart_id: i64,
  /// Per-request timeout in seconds
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// Database file (defaults to $XDG_DATA_HOME/storefront-offline/offline.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// How to settle a product present in both local and remote carts
  #[serde(default)]
  pub merge_policy: ConflictPolicy,
  /// Upper bound for a single replayed request, in seconds
  #[serde(default = "default_replay_timeout_secs")]
  pub replay_timeout_secs: u64,
  /// Run a sync right after startup
  #[serde(default = "default_true")]
  pub on_start: bool,
}

impl SyncConfig {
  pub fn replay_timeout(&self) -> Duration {
    Duration::from_secs(self.replay_timeout_secs)
  }
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      merge_policy: ConflictPolicy::default(),
      replay_timeout_secs: default_replay_timeout_secs(),
      on_start: true,
    }
  }
}

fn default_cart_id() -> i64 {
  1
}

fn default_timeout_secs() -> u64 {
  10
}

fn default_replay_timeout_secs() -> u64 {
  15
}

fn default_true() -> bool {
  true
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./storefront-offline.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/storefront-offline/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/storefront-offline/config.yaml\n\
                 with at least `api: {{ base_url: ... }}`."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("storefront-offline.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("storefront-offline").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Get the storefront API token from the environment, if any.
  ///
  /// Checks STOREFRONT_API_TOKEN.
  pub fn get_api_token() -> Option<String> {
    std::env::var("STOREFRONT_API_TOKEN")
      .ok()
      .filter(|t| !t.is_empty())
  }
}
