mod app;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use storefront_offline::config;

#[derive(Parser, Debug)]
#[command(name = "storefront-offline")]
#[command(about = "Storefront client that keeps working without a network")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/storefront-offline/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Start offline: serve from the local store and queue cart changes
  #[arg(long, global = true)]
  offline: bool,

  /// Write logs to a daily rotated file in the data directory
  #[arg(long, global = true)]
  log_file: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
  /// List products
  Products {
    /// Case-insensitive match on name or description
    #[arg(short, long)]
    search: Option<String>,
    /// Exact category, case-insensitive
    #[arg(short = 'C', long)]
    category: Option<String>,
  },
  /// Show one product
  Product { id: i64 },
  /// List categories of the cached catalog
  Categories,
  /// Show the cart
  Cart,
  /// Add a product to the cart
  Add {
    product_id: i64,
    #[arg(short, long, default_value_t = 1)]
    quantity: i64,
  },
  /// Set the quantity of a cart line (0 removes it)
  Set { product_id: i64, quantity: i64 },
  /// Remove a cart line
  Remove { product_id: i64 },
  /// Empty the cart
  Clear,
  /// List actions waiting for sync
  Queue,
  /// Replay queued actions and reconcile the cart
  Sync,
  /// Show connectivity, sync and cart state
  Status,
}

fn init_logging(to_file: bool) -> Result<Option<WorkerGuard>> {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("storefront_offline=info"));

  if !to_file {
    tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(std::io::stderr)
      .init();
    return Ok(None);
  }

  let dir = dirs::data_dir()
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("storefront-offline")
    .join("logs");
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(dir, "storefront-offline.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();
  Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Held until exit so buffered log lines are flushed
  let _log_guard = init_logging(args.log_file)?;

  let config = config::Config::load(args.config.as_deref())?;

  let app = app::App::new(config, !args.offline)?;
  app.run(args.command).await?;

  Ok(())
}
