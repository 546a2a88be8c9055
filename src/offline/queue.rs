//! Durable FIFO of cart mutations waiting for replay.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::Store;
use crate::error::{Result, StorageError};
use crate::models::{NewSyncAction, PendingSyncAction};
use crate::signal::Signal;
use crate::sync::SyncStatus;

/// Queue of [`PendingSyncAction`]s, ordered by creation time.
///
/// Entries are only ever appended, removed, or have their retry bookkeeping
/// updated; nothing reorders them. Every mutation publishes the new queue
/// length into the shared sync status.
pub struct SyncQueue<S: Store> {
  store: Arc<S>,
  status: Signal<SyncStatus>,
}

impl<S: Store> SyncQueue<S> {
  pub fn new(store: Arc<S>, status: Signal<SyncStatus>) -> Self {
    let queue = Self { store, status };
    // Entries may survive from a previous run.
    if let Ok(len) = queue.len() {
      queue.publish(len);
    }
    queue
  }

  /// Persist a new action with `retry_count = 0`, returning its id.
  pub fn enqueue(&self, action: NewSyncAction) -> Result<i64> {
    let action_type = action.action_type;
    let id = self.store.add(&PendingSyncAction::from(action))?;
    info!(id, %action_type, "queued action for sync");

    self.refresh();
    Ok(id)
  }

  /// All actions, oldest first.
  pub fn list(&self) -> Result<Vec<PendingSyncAction>> {
    Ok(self.store.get_all_ordered("timestamp")?)
  }

  pub fn remove(&self, id: i64) -> Result<()> {
    if !self.store.remove::<PendingSyncAction>(id)? {
      return Err(
        StorageError::NotFound {
          table: "sync_queue",
          key: id,
        }
        .into(),
      );
    }
    debug!(id, "removed action from queue");

    self.refresh();
    Ok(())
  }

  /// Bump the retry counter and stamp the attempt time.
  pub fn record_failure(&self, id: i64) -> Result<PendingSyncAction> {
    let action = self.store.modify(id, |action: &mut PendingSyncAction| {
      action.retry_count += 1;
      action.last_attempt = Some(Utc::now());
    })?;
    debug!(id, retry_count = action.retry_count, "recorded failed replay");

    self.refresh();
    Ok(action)
  }

  pub fn clear(&self) -> Result<()> {
    self.store.clear::<PendingSyncAction>()?;
    info!("cleared sync queue");

    self.publish(0);
    Ok(())
  }

  pub fn len(&self) -> Result<usize> {
    Ok(self.store.count::<PendingSyncAction>()?)
  }

  pub fn is_empty(&self) -> Result<bool> {
    Ok(self.len()? == 0)
  }

  fn refresh(&self) {
    if let Ok(len) = self.len() {
      self.publish(len);
    }
  }

  fn publish(&self, len: usize) {
    self.status.update(|status| status.pending = len);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStore;
  use crate::error::Error;
  use crate::models::SyncActionType;
  use chrono::Duration;
  use serde_json::json;

  fn queue() -> (Signal<SyncStatus>, SyncQueue<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let status = Signal::new(SyncStatus::default());
    (status.clone(), SyncQueue::new(store, status))
  }

  #[test]
  fn test_enqueue_assigns_id_and_zero_retries() {
    let (status, queue) = queue();
    let id = queue
      .enqueue(NewSyncAction::new(SyncActionType::AddToCart, json!({"productId": 1})))
      .unwrap();

    let actions = queue.list().unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].id, Some(id));
    assert_eq!(actions[0].retry_count, 0);
    assert_eq!(actions[0].last_attempt, None);
    assert_eq!(actions[0].payload, json!({"productId": 1}));
    assert_eq!(status.get().pending, 1);
  }

  #[test]
  fn test_list_is_ordered_by_creation_time() {
    let (_, queue) = queue();
    let base = Utc::now();

    for (offset, action_type) in [
      (2, SyncActionType::ClearCart),
      (0, SyncActionType::AddToCart),
      (1, SyncActionType::UpdateCart),
    ] {
      let mut action = NewSyncAction::new(action_type, json!(null));
      action.timestamp = base + Duration::milliseconds(offset);
      queue.enqueue(action).unwrap();
    }

    let types: Vec<_> = queue.list().unwrap().iter().map(|a| a.action_type).collect();
    assert_eq!(
      types,
      vec![
        SyncActionType::AddToCart,
        SyncActionType::UpdateCart,
        SyncActionType::ClearCart
      ]
    );
  }

  #[test]
  fn test_same_timestamp_keeps_insertion_order() {
    let (_, queue) = queue();
    let at = Utc::now();

    let mut ids = Vec::new();
    for _ in 0..3 {
      let mut action = NewSyncAction::new(SyncActionType::UpdateCart, json!(null));
      action.timestamp = at;
      ids.push(queue.enqueue(action).unwrap());
    }

    let listed: Vec<_> = queue.list().unwrap().iter().filter_map(|a| a.id).collect();
    assert_eq!(listed, ids);
  }

  #[test]
  fn test_record_failure_and_remove() {
    let (status, queue) = queue();
    let id = queue
      .enqueue(NewSyncAction::new(SyncActionType::UpdateCart, json!([])))
      .unwrap();

    let action = queue.record_failure(id).unwrap();
    assert_eq!(action.retry_count, 1);
    assert!(action.last_attempt.is_some());
    assert_eq!(queue.record_failure(id).unwrap().retry_count, 2);

    queue.remove(id).unwrap();
    assert!(queue.is_empty().unwrap());
    assert_eq!(status.get().pending, 0);

    assert!(matches!(queue.remove(id), Err(Error::Storage(_))));
    assert!(queue.record_failure(id).is_err());
  }

  #[test]
  fn test_clear_empties_queue() {
    let (status, queue) = queue();
    for _ in 0..3 {
      queue
        .enqueue(NewSyncAction::new(SyncActionType::AddToCart, json!(null)))
        .unwrap();
    }
    assert_eq!(status.get().pending, 3);

    queue.clear().unwrap();
    assert_eq!(queue.len().unwrap(), 0);
    assert_eq!(status.get().pending, 0);
  }
}
