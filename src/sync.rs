//! Queue replay and cart reconciliation.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::RemoteStore;
use crate::cache::Store;
use crate::cart::{merge_snapshots, CartState, ConflictPolicy};
use crate::error::{Error, Result};
use crate::models::{CartItem, PendingSyncAction, Product, SyncActionType};
use crate::offline::{ConnectivityMonitor, SyncQueue};
use crate::signal::Signal;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncState {
  #[default]
  Idle,
  Syncing,
}

/// What the UI shows about synchronization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStatus {
  pub state: SyncState,
  /// Queue length, kept current by [`SyncQueue`].
  pub pending: usize,
  /// End of the last run that replayed everything and reconciled.
  pub last_synced_at: Option<DateTime<Utc>>,
  pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
  /// Queue ids replayed and removed, in replay order.
  pub replayed: Vec<i64>,
  /// The action that halted the run, if any.
  pub failed: Option<i64>,
  pub reconciled: bool,
  /// Products cached by the catalog refresh that follows reconciliation.
  pub products_cached: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
  /// Another run holds the guard; nothing was done.
  AlreadyRunning,
  Completed(SyncReport),
}

/// Local state a sync run reads and writes, shared with the rest of the
/// storefront.
pub struct SyncContext<S: Store> {
  pub store: Arc<S>,
  pub queue: Arc<SyncQueue<S>>,
  pub cart: Arc<CartState<S>>,
  pub monitor: ConnectivityMonitor,
  pub status: Signal<SyncStatus>,
}

/// Drives the sync state machine: replay the queue in order, then reconcile
/// the cart with the remote.
pub struct SyncOrchestrator<R: RemoteStore, S: Store> {
  remote: R,
  store: Arc<S>,
  queue: Arc<SyncQueue<S>>,
  cart: Arc<CartState<S>>,
  monitor: ConnectivityMonitor,
  status: Signal<SyncStatus>,
  policy: ConflictPolicy,
  replay_timeout: Duration,
  running: AtomicBool,
}

/// Returns the orchestrator to idle however the run ends.
struct RunGuard<'a> {
  running: &'a AtomicBool,
  status: &'a Signal<SyncStatus>,
}

impl Drop for RunGuard<'_> {
  fn drop(&mut self) {
    self.status.update(|status| status.state = SyncState::Idle);
    self.running.store(false, Ordering::Release);
  }
}

impl<R: RemoteStore, S: Store> SyncOrchestrator<R, S> {
  pub fn new(
    remote: R,
    context: SyncContext<S>,
    policy: ConflictPolicy,
    replay_timeout: Duration,
  ) -> Self {
    Self {
      remote,
      store: context.store,
      queue: context.queue,
      cart: context.cart,
      monitor: context.monitor,
      status: context.status,
      policy,
      replay_timeout,
      running: AtomicBool::new(false),
    }
  }

  pub fn is_running(&self) -> bool {
    self.running.load(Ordering::Acquire)
  }

  /// Run one sync unless one is already in progress.
  ///
  /// Failures never escape: they are logged and recorded in
  /// [`SyncStatus::last_error`].
  pub async fn trigger_sync(&self) -> SyncOutcome {
    // Claimed before the first await so two triggers cannot both start.
    if self
      .running
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      debug!("sync already running, ignoring trigger");
      return SyncOutcome::AlreadyRunning;
    }
    let _guard = RunGuard {
      running: &self.running,
      status: &self.status,
    };
    self.status.update(|status| status.state = SyncState::Syncing);
    info!("sync started");

    let mut report = SyncReport::default();
    let result = self.run(&mut report).await;

    match result {
      Ok(()) => {
        info!(
          replayed = report.replayed.len(),
          reconciled = report.reconciled,
          "sync finished"
        );
        self.status.update(|status| {
          status.last_synced_at = Some(Utc::now());
          status.last_error = None;
        });
      }
      Err(e) => {
        warn!(
          error = %e,
          replayed = report.replayed.len(),
          failed = ?report.failed,
          "sync stopped"
        );
        self
          .status
          .update(|status| status.last_error = Some(e.to_string()));
      }
    }

    SyncOutcome::Completed(report)
  }

  async fn run(&self, report: &mut SyncReport) -> Result<()> {
    let mut halted = None;

    for action in self.queue.list()? {
      let Some(id) = action.id else { continue };

      match self.replay(&action).await {
        Ok(()) => {
          self.monitor.set_online(true);
          self.queue.remove(id)?;
          info!(id, action_type = %action.action_type, "replayed action");
          report.replayed.push(id);
        }
        Err(e) => {
          if e.is_connectivity() {
            self.monitor.report_unreachable();
          }
          report.failed = Some(id);
          if let Err(store_err) = self.queue.record_failure(id) {
            warn!(id, error = %store_err, "failed to record replay failure");
          }
          // Later actions wait for the next run; order is never broken.
          halted = Some(Error::SyncAction {
            id,
            action_type: action.action_type,
            source: Box::new(e),
          });
          break;
        }
      }
    }

    match self.reconcile().await {
      Ok(_) => {
        report.reconciled = true;
        self.monitor.set_online(true);
        report.products_cached = self.refresh_catalog().await;
      }
      Err(e) => {
        if e.is_connectivity() {
          self.monitor.report_unreachable();
        }
        match halted {
          None => return Err(e),
          Some(_) => warn!(error = %e, "cart reconciliation failed"),
        }
      }
    }

    match halted {
      Some(e) => Err(e),
      None => Ok(()),
    }
  }

  async fn replay(&self, action: &PendingSyncAction) -> Result<()> {
    debug!(
      id = ?action.id,
      action_type = %action.action_type,
      retry_count = action.retry_count,
      "replaying action"
    );

    match action.action_type {
      SyncActionType::ClearCart => self.bounded(self.remote.clear_cart()).await,
      // The stored payload is diagnostic; the current cart is what counts.
      SyncActionType::AddToCart | SyncActionType::UpdateCart => {
        let items = self.cart.snapshot();
        self.bounded(self.remote.replace_cart(&items)).await?;
        Ok(())
      }
    }
  }

  async fn reconcile(&self) -> Result<Vec<CartItem>> {
    let remote = self.bounded(self.remote.fetch_cart()).await?;
    let local = self.cart.snapshot();
    let merged = merge_snapshots(&local, &remote, self.policy);
    debug!(
      local = local.len(),
      remote = remote.len(),
      merged = merged.len(),
      policy = ?self.policy,
      "reconciling cart"
    );

    let installed = self.cart.install(merged);
    self.bounded(self.remote.replace_cart(&installed)).await?;
    Ok(installed)
  }

  /// Best effort: a stale catalog is still a usable catalog.
  async fn refresh_catalog(&self) -> Option<usize> {
    let products: Vec<Product> = match self.bounded(self.remote.fetch_products()).await {
      Ok(products) => products,
      Err(e) => {
        warn!(error = %e, "catalog refresh failed");
        return None;
      }
    };

    match self.store.replace_all(&products) {
      Ok(()) => Some(products.len()),
      Err(e) => {
        warn!(error = %e, "failed to cache refreshed catalog");
        None
      }
    }
  }

  async fn bounded<T, F>(&self, call: F) -> Result<T>
  where
    F: Future<Output = Result<T>>,
  {
    tokio::time::timeout(self.replay_timeout, call)
      .await
      .map_err(|_| Error::Timeout(self.replay_timeout))?
  }

  /// Sync on every offline to online transition of the monitor.
  pub fn spawn_reconnect_listener(self: &Arc<Self>) -> JoinHandle<()> {
    let orchestrator = Arc::clone(self);
    let mut reconnects = Box::pin(orchestrator.monitor.reconnects());

    tokio::spawn(async move {
      while reconnects.next().await.is_some() {
        info!("back online, starting sync");
        orchestrator.trigger_sync().await;
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStore;
  use crate::models::NewSyncAction;
  use crate::testing::{sample_product, FakeRemote};
  use serde_json::json;

  struct Fixture {
    store: Arc<SqliteStore>,
    queue: Arc<SyncQueue<SqliteStore>>,
    cart: Arc<CartState<SqliteStore>>,
    monitor: ConnectivityMonitor,
    status: Signal<SyncStatus>,
    remote: FakeRemote,
    sync: Arc<SyncOrchestrator<FakeRemote, SqliteStore>>,
  }

  fn fixture(remote: FakeRemote, policy: ConflictPolicy) -> Fixture {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let status = Signal::new(SyncStatus::default());
    let queue = Arc::new(SyncQueue::new(Arc::clone(&store), status.clone()));
    let cart = Arc::new(CartState::load(Arc::clone(&store)));
    let monitor = ConnectivityMonitor::new(true);
    let sync = Arc::new(SyncOrchestrator::new(
      remote.clone(),
      SyncContext {
        store: Arc::clone(&store),
        queue: Arc::clone(&queue),
        cart: Arc::clone(&cart),
        monitor: monitor.clone(),
        status: status.clone(),
      },
      policy,
      Duration::from_millis(200),
    ));
    Fixture {
      store,
      queue,
      cart,
      monitor,
      status,
      remote,
      sync,
    }
  }

  fn enqueue(queue: &SyncQueue<SqliteStore>, types: &[SyncActionType]) -> Vec<i64> {
    let base = Utc::now();
    types
      .iter()
      .enumerate()
      .map(|(i, action_type)| {
        let mut action = NewSyncAction::new(*action_type, json!({"seq": i}));
        action.timestamp = base + chrono::Duration::milliseconds(i as i64);
        queue.enqueue(action).unwrap()
      })
      .collect()
  }

  fn completed(outcome: SyncOutcome) -> SyncReport {
    match outcome {
      SyncOutcome::Completed(report) => report,
      SyncOutcome::AlreadyRunning => panic!("sync did not run"),
    }
  }

  #[tokio::test]
  async fn test_replays_whole_queue_in_order() {
    let f = fixture(FakeRemote::default(), ConflictPolicy::MaxQuantity);
    f.cart.add_item(&sample_product(1, "Soap", "Bath"), 2);
    let ids = enqueue(
      &f.queue,
      &[
        SyncActionType::AddToCart,
        SyncActionType::ClearCart,
        SyncActionType::UpdateCart,
      ],
    );

    let report = completed(f.sync.trigger_sync().await);

    assert_eq!(report.replayed, ids);
    assert_eq!(report.failed, None);
    assert!(report.reconciled);
    assert!(f.queue.is_empty().unwrap());
    assert_eq!(
      f.remote.calls(),
      vec![
        "replace_cart[1x2]",
        "clear_cart",
        "replace_cart[1x2]",
        "fetch_cart",
        "replace_cart[1x2]",
        "fetch_products",
      ]
    );

    let status = f.status.get();
    assert_eq!(status.state, SyncState::Idle);
    assert_eq!(status.pending, 0);
    assert!(status.last_synced_at.is_some());
    assert_eq!(status.last_error, None);
  }

  #[tokio::test]
  async fn test_failed_replay_halts_queue() {
    let f = fixture(FakeRemote::default(), ConflictPolicy::MaxQuantity);
    let ids = enqueue(&f.queue, &[SyncActionType::UpdateCart; 5]);
    f.remote.fail_mutation(2, 503);

    let report = completed(f.sync.trigger_sync().await);

    assert_eq!(report.replayed, ids[..2].to_vec());
    assert_eq!(report.failed, Some(ids[2]));
    assert!(report.reconciled);
    // Nothing after the failing action was replayed; the cart still
    // reconciles.
    let calls = f.remote.calls();
    assert!(calls[..3].iter().all(|c| c.starts_with("replace_cart")));
    assert_eq!(calls[3..], ["fetch_cart", "replace_cart[]", "fetch_products"]);

    let remaining = f.queue.list().unwrap();
    let remaining_ids: Vec<i64> = remaining.iter().filter_map(|a| a.id).collect();
    assert_eq!(remaining_ids, ids[2..].to_vec());
    assert_eq!(remaining[0].retry_count, 1);
    assert!(remaining[0].last_attempt.is_some());
    assert!(remaining[1..].iter().all(|a| a.retry_count == 0));

    let status = f.status.get();
    assert_eq!(status.pending, 3);
    assert_eq!(status.state, SyncState::Idle);
    assert!(status.last_error.is_some_and(|e| e.contains("replay")));
    assert!(status.last_synced_at.is_none());
    // Reconciliation reached the remote after the failed replay.
    assert!(f.monitor.is_online());
  }

  #[tokio::test]
  async fn test_rejected_replay_keeps_connectivity() {
    let f = fixture(FakeRemote::default(), ConflictPolicy::MaxQuantity);
    enqueue(&f.queue, &[SyncActionType::ClearCart]);
    f.remote.fail_mutation(0, 409);

    let report = completed(f.sync.trigger_sync().await);

    assert!(report.failed.is_some());
    assert!(report.reconciled);
    assert_eq!(
      f.remote.calls(),
      vec!["clear_cart", "fetch_cart", "replace_cart[]", "fetch_products"]
    );
    assert!(f.monitor.is_online());
    assert_eq!(f.queue.list().unwrap()[0].retry_count, 1);
    assert!(f.status.get().last_error.is_some());
  }

  #[tokio::test]
  async fn test_failed_replay_still_merges_cart() {
    let remote = FakeRemote::with_cart(vec![CartItem::new(2, 3)]);
    let f = fixture(remote, ConflictPolicy::MaxQuantity);
    f.cart.add_item(&sample_product(1, "Soap", "Bath"), 1);
    enqueue(&f.queue, &[SyncActionType::UpdateCart]);
    f.remote.fail_mutation(0, 409);

    let report = completed(f.sync.trigger_sync().await);

    assert_eq!(report.replayed, Vec::<i64>::new());
    assert!(report.failed.is_some());
    assert!(report.reconciled);
    let lines: Vec<(i64, i64)> = f
      .cart
      .snapshot()
      .iter()
      .map(|i| (i.product_id, i.quantity))
      .collect();
    assert_eq!(lines, vec![(2, 3), (1, 1)]);
    assert_eq!(f.queue.len().unwrap(), 1);
  }

  #[tokio::test]
  async fn test_next_run_resumes_after_failure() {
    let f = fixture(FakeRemote::default(), ConflictPolicy::MaxQuantity);
    enqueue(&f.queue, &[SyncActionType::AddToCart, SyncActionType::ClearCart]);
    f.remote.fail_mutation(0, 500);
    completed(f.sync.trigger_sync().await);
    assert_eq!(f.queue.len().unwrap(), 2);

    let report = completed(f.sync.trigger_sync().await);
    assert_eq!(report.replayed.len(), 2);
    assert!(f.queue.is_empty().unwrap());
    assert!(f.monitor.is_online());
  }

  #[tokio::test]
  async fn test_concurrent_trigger_is_a_noop() {
    let remote = FakeRemote::default().with_delay(Duration::from_millis(30));
    let f = fixture(remote, ConflictPolicy::MaxQuantity);
    enqueue(&f.queue, &[SyncActionType::UpdateCart, SyncActionType::UpdateCart]);

    let first = tokio::spawn({
      let sync = Arc::clone(&f.sync);
      async move { sync.trigger_sync().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(f.sync.is_running());
    assert_eq!(f.status.get().state, SyncState::Syncing);

    let pending_before = f.queue.len().unwrap();
    assert_eq!(f.sync.trigger_sync().await, SyncOutcome::AlreadyRunning);
    assert_eq!(f.queue.len().unwrap(), pending_before);

    let report = completed(first.await.unwrap());
    assert_eq!(report.replayed.len(), 2);
    assert!(!f.sync.is_running());
  }

  #[tokio::test]
  async fn test_slow_replay_times_out() {
    let remote = FakeRemote::default().with_delay(Duration::from_millis(500));
    let f = fixture(remote, ConflictPolicy::MaxQuantity);
    enqueue(&f.queue, &[SyncActionType::ClearCart]);

    let report = completed(f.sync.trigger_sync().await);

    assert!(report.failed.is_some());
    assert_eq!(f.queue.list().unwrap()[0].retry_count, 1);
    assert!(f
      .status
      .get()
      .last_error
      .is_some_and(|e| e.contains("timed out")));
  }

  #[tokio::test]
  async fn test_reconcile_max_quantity() {
    let remote = FakeRemote::with_cart(vec![CartItem::new(1, 5), CartItem::new(2, 1)]);
    let f = fixture(remote, ConflictPolicy::MaxQuantity);
    f.cart.add_item(&sample_product(1, "Soap", "Bath"), 2);
    f.cart.add_item(&sample_product(3, "Spatula", "Kitchen"), 4);

    let report = completed(f.sync.trigger_sync().await);
    assert!(report.reconciled);

    let lines: Vec<(i64, i64)> = f
      .cart
      .snapshot()
      .iter()
      .map(|i| (i.product_id, i.quantity))
      .collect();
    assert_eq!(lines, vec![(1, 5), (2, 1), (3, 4)]);

    let pushed: Vec<(i64, i64)> = f
      .remote
      .cart()
      .iter()
      .map(|i| (i.product_id, i.quantity))
      .collect();
    assert_eq!(pushed, lines);

    let cached: Vec<CartItem> = f.store.get_all().unwrap();
    assert_eq!(cached.len(), 3);
  }

  #[tokio::test]
  async fn test_reconcile_remote_wins() {
    let remote = FakeRemote::with_cart(vec![CartItem::new(1, 1)]);
    let f = fixture(remote, ConflictPolicy::RemoteWins);
    f.cart.add_item(&sample_product(1, "Soap", "Bath"), 7);

    completed(f.sync.trigger_sync().await);

    assert_eq!(f.cart.snapshot()[0].quantity, 1);
    // The local snapshot survives the merge.
    assert_eq!(f.cart.snapshot()[0].product.as_ref().unwrap().name, "Soap");
  }

  #[tokio::test]
  async fn test_unreachable_reconcile_is_recorded() {
    let f = fixture(FakeRemote::default(), ConflictPolicy::MaxQuantity);
    f.remote.fail_fetch(0);

    let report = completed(f.sync.trigger_sync().await);

    assert!(!report.reconciled);
    assert!(f.status.get().last_error.is_some());
    assert_eq!(f.status.get().state, SyncState::Idle);
    assert!(!f.monitor.is_online());
  }

  #[tokio::test]
  async fn test_catalog_refresh_after_reconcile() {
    let remote = FakeRemote::default().with_products(vec![
      sample_product(1, "Soap", "Bath"),
      sample_product(2, "Spatula", "Kitchen"),
    ]);
    let f = fixture(remote, ConflictPolicy::MaxQuantity);

    let report = completed(f.sync.trigger_sync().await);

    assert_eq!(report.products_cached, Some(2));
    assert_eq!(f.store.count::<Product>().unwrap(), 2);
  }

  #[tokio::test]
  async fn test_reconnect_triggers_sync() {
    let f = fixture(FakeRemote::default(), ConflictPolicy::MaxQuantity);
    f.monitor.set_online(false);
    enqueue(&f.queue, &[SyncActionType::ClearCart]);
    let listener = f.sync.spawn_reconnect_listener();

    f.monitor.set_online(true);

    for _ in 0..100 {
      if f.queue.is_empty().unwrap() && !f.sync.is_running() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(f.queue.is_empty().unwrap());
    assert!(f.remote.calls().contains(&"clear_cart".to_string()));
    listener.abort();
  }

  #[tokio::test]
  async fn test_flap_before_listener_polls_still_syncs() {
    let f = fixture(FakeRemote::default(), ConflictPolicy::MaxQuantity);
    enqueue(&f.queue, &[SyncActionType::ClearCart]);
    let listener = f.sync.spawn_reconnect_listener();

    // Offline and back before the listener task gets to run.
    f.monitor.report_unreachable();
    f.monitor.set_online(true);

    for _ in 0..100 {
      if f.queue.is_empty().unwrap() && !f.sync.is_running() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(f.queue.is_empty().unwrap());
    assert_eq!(f.remote.calls()[0], "clear_cart");
    listener.abort();
  }

  #[tokio::test]
  async fn test_reconnect_during_sync_is_a_noop() {
    let remote = FakeRemote::default().with_delay(Duration::from_millis(30));
    let f = fixture(remote, ConflictPolicy::MaxQuantity);
    enqueue(&f.queue, &[SyncActionType::UpdateCart, SyncActionType::UpdateCart]);
    let listener = f.sync.spawn_reconnect_listener();

    let first = tokio::spawn({
      let sync = Arc::clone(&f.sync);
      async move { sync.trigger_sync().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(f.sync.is_running());

    f.monitor.report_unreachable();
    f.monitor.set_online(true);
    // Let the listener see the reconnect while the first run is in flight.
    tokio::time::sleep(Duration::from_millis(5)).await;

    let report = completed(first.await.unwrap());
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(report.replayed.len(), 2);
    assert_eq!(
      f.remote.calls(),
      vec![
        "replace_cart[]",
        "replace_cart[]",
        "fetch_cart",
        "replace_cart[]",
        "fetch_products"
      ]
    );
    assert!(f.queue.is_empty().unwrap());
    assert!(!f.sync.is_running());
    listener.abort();
  }
}
