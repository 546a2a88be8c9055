use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{debug, info};

use storefront_offline::api::{ApiResponse, Endpoints, HttpStoreClient, HttpTransport};
use storefront_offline::cache::SqliteStore;
use storefront_offline::config::Config;
use storefront_offline::models::{distinct_categories, CartItem, Product, ProductFilter};
use storefront_offline::sync::{SyncOutcome, SyncState};
use storefront_offline::{Storefront, StorefrontOptions};

use crate::Command;

type HttpStorefront = Storefront<HttpTransport, HttpStoreClient<HttpTransport>, SqliteStore>;

/// Command-line front end over the storefront
pub struct App {
  config: Config,
  storefront: HttpStorefront,
}

impl App {
  pub fn new(config: Config, online: bool) -> Result<Self> {
    let store = match &config.storage.path {
      Some(path) => SqliteStore::open(path)
        .map_err(|e| eyre!("Failed to open store at {}: {}", path.display(), e))?,
      None => SqliteStore::open_default().map_err(|e| eyre!("Failed to open store: {}", e))?,
    };

    let transport = HttpTransport::new(&config.api)?;
    let remote = HttpStoreClient::new(transport.clone(), Endpoints::new(config.api.cart_id));
    let storefront = Storefront::new(
      transport,
      remote,
      Arc::new(store),
      StorefrontOptions::from_config(&config, online),
    );

    Ok(Self { config, storefront })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    if self.should_sync_first(&command)? {
      debug!("pending actions found, syncing before command");
      self.storefront.trigger_sync().await;
    }

    match command {
      Command::Products { search, category } => {
        let filter = ProductFilter { search, category };
        let products = self.storefront.get_products(&filter).await?;
        print_products(&products);
      }
      Command::Product { id } => {
        let product = self.storefront.get_product(id).await?;
        print_product(&product);
      }
      Command::Categories => {
        let categories = if self.storefront.is_online() {
          let products = self
            .storefront
            .get_products(&ProductFilter::default())
            .await?;
          distinct_categories(&products)
        } else {
          self.storefront.categories()?
        };
        for category in categories {
          println!("{}", category);
        }
      }
      Command::Cart => {
        let items = self.storefront.get_cart().await?;
        print_cart(&items, self.storefront.cart_total());
      }
      Command::Add {
        product_id,
        quantity,
      } => {
        if quantity <= 0 {
          return Err(eyre!("Quantity must be positive, got {}", quantity));
        }
        let product = self.storefront.get_product(product_id).await?;
        let response = self.storefront.add_to_cart(&product, quantity).await?;
        report(&response, &format!("Added {} x {}", quantity, product.name));
      }
      Command::Set {
        product_id,
        quantity,
      } => {
        let response = self.storefront.set_quantity(product_id, quantity).await?;
        report(&response, &format!("Set product {} to {}", product_id, quantity));
      }
      Command::Remove { product_id } => {
        let response = self.storefront.remove_from_cart(product_id).await?;
        report(&response, &format!("Removed product {}", product_id));
      }
      Command::Clear => {
        let response = self.storefront.clear_cart().await?;
        report(&response, "Cart cleared");
      }
      Command::Queue => {
        let actions = self.storefront.list_queue()?;
        if actions.is_empty() {
          println!("Nothing waiting for sync");
        }
        for action in actions {
          println!(
            "{:>5}  {:<12}  {}  retries: {}",
            action.id.unwrap_or_default(),
            action.action_type,
            action.timestamp.format("%Y-%m-%d %H:%M:%S"),
            action.retry_count
          );
        }
      }
      Command::Sync => match self.storefront.trigger_sync().await {
        SyncOutcome::AlreadyRunning => println!("A sync is already running"),
        SyncOutcome::Completed(report) => {
          println!("Replayed {} action(s)", report.replayed.len());
          if let Some(id) = report.failed {
            println!("Stopped at action {}", id);
          }
          if report.reconciled {
            println!("Cart reconciled ({} line(s))", self.storefront.cart_snapshot().len());
          }
          if let Some(error) = self.storefront.sync_status().last_error {
            return Err(eyre!("Sync incomplete: {}", error));
          }
        }
      },
      Command::Status => self.print_status()?,
    }

    Ok(())
  }

  /// Replay leftovers from an earlier offline session before talking to the
  /// network again.
  fn should_sync_first(&self, command: &Command) -> Result<bool> {
    if !self.config.sync.on_start || !self.storefront.is_online() {
      return Ok(false);
    }
    if matches!(command, Command::Sync | Command::Queue | Command::Status) {
      return Ok(false);
    }
    Ok(!self.storefront.list_queue()?.is_empty())
  }

  fn print_status(&self) -> Result<()> {
    let status = self.storefront.sync_status();
    let state = match status.state {
      SyncState::Idle => "idle",
      SyncState::Syncing => "syncing",
    };

    println!(
      "Connectivity: {}",
      if self.storefront.is_online() {
        "online"
      } else {
        "offline"
      }
    );
    println!("Sync:         {} ({} pending)", state, status.pending);
    if let Some(at) = status.last_synced_at {
      println!("Last sync:    {}", at.format("%Y-%m-%d %H:%M:%S"));
    }
    println!(
      "Cart:         {} item(s), {:.2}",
      self.storefront.cart_item_count(),
      self.storefront.cart_total()
    );
    println!(
      "Catalog:      {} cached product(s)",
      self.storefront.get_cached_products()?.len()
    );
    Ok(())
  }
}

fn report(response: &ApiResponse, done: &str) {
  if response.is_queued() {
    info!("change queued until the network is back");
    println!("{} (queued for sync)", done);
  } else {
    println!("{}", done);
  }
}

fn print_products(products: &[Product]) {
  if products.is_empty() {
    println!("No products found");
    return;
  }
  for product in products {
    println!(
      "{:>5}  {:<32}  {:<16}  {:>8.2}  stock: {}",
      product.id, product.name, product.category, product.price, product.stock
    );
  }
}

fn print_product(product: &Product) {
  println!("{} (#{})", product.name, product.id);
  println!("Category: {}", product.category);
  println!("Price:    {:.2}", product.price);
  println!("Stock:    {}", product.stock);
  if let Some(description) = &product.description {
    println!();
    println!("{}", description);
  }
}

fn print_cart(items: &[CartItem], total: f64) {
  if items.is_empty() {
    println!("Cart is empty");
    return;
  }
  for item in items {
    let name = item
      .product
      .as_ref()
      .map(|p| p.name.as_str())
      .unwrap_or("(unknown product)");
    println!(
      "{:>5}  {:<32}  x{:<4}  {:>8.2}",
      item.product_id,
      name,
      item.quantity,
      item.line_total()
    );
  }
  println!("Total: {:.2}", total);
}
