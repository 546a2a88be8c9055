//! Observable values: a current value plus a change stream.

use tokio::sync::watch;

/// A value that subscribers can watch.
///
/// Every write goes through [`Signal::set`] or [`Signal::update`], which
/// store the new value and wake all subscribers before returning.
#[derive(Debug, Clone)]
pub struct Signal<T> {
  tx: watch::Sender<T>,
}

impl<T: Clone> Signal<T> {
  pub fn new(initial: T) -> Self {
    let (tx, _rx) = watch::channel(initial);
    Self { tx }
  }

  /// Current value.
  pub fn get(&self) -> T {
    self.tx.borrow().clone()
  }

  /// Replace the value, returning the previous one.
  pub fn set(&self, value: T) -> T {
    self.tx.send_replace(value)
  }

  /// Mutate the value in place and publish it.
  pub fn update<F: FnOnce(&mut T)>(&self, f: F) {
    self.tx.send_modify(f);
  }

  /// Receiver that sees the current value and every later change.
  pub fn subscribe(&self) -> watch::Receiver<T> {
    self.tx.subscribe()
  }
}
