//! Online/offline state shared by the router and the sync orchestrator.

use futures::stream::{self, Stream};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::signal::Signal;

/// Single source of truth for "can we reach the network".
///
/// Two inputs feed it: the platform connectivity signal
/// ([`ConnectivityMonitor::set_online`]) and failed requests observed by the
/// router ([`ConnectivityMonitor::report_unreachable`]). The monitor itself
/// never probes the network.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
  online: Signal<bool>,
  /// One message per offline to online transition, sent by `set_online`.
  reconnected: broadcast::Sender<()>,
}

impl ConnectivityMonitor {
  pub fn new(initially_online: bool) -> Self {
    let (reconnected, _) = broadcast::channel(16);
    Self {
      online: Signal::new(initially_online),
      reconnected,
    }
  }

  pub fn is_online(&self) -> bool {
    self.online.get()
  }

  /// Change stream; subscribers see every transition.
  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.online.subscribe()
  }

  /// Yields once per offline to online transition after the call, including
  /// flaps that complete before the stream is polled. Transitions a slow
  /// consumer missed collapse into one item.
  pub fn reconnects(&self) -> impl Stream<Item = ()> + Send + 'static {
    let rx = self.reconnected.subscribe();

    stream::unfold(rx, |mut rx| async move {
      match rx.recv().await {
        Ok(()) => Some(((), rx)),
        Err(broadcast::error::RecvError::Lagged(_)) => {
          rx = rx.resubscribe();
          Some(((), rx))
        }
        Err(broadcast::error::RecvError::Closed) => None,
      }
    })
  }

  /// Platform reports a connectivity change. Returns whether this was a
  /// transition.
  pub fn set_online(&self, online: bool) -> bool {
    let was_online = self.online.set(online);
    if was_online == online {
      return false;
    }

    if online {
      info!("connectivity restored");
      // No receivers just means nobody listens for reconnects yet.
      let _ = self.reconnected.send(());
    } else {
      info!("connectivity lost");
    }
    true
  }

  /// A request failed in a way that means the network is unusable, whatever
  /// the platform claims.
  pub fn report_unreachable(&self) {
    if self.online.set(false) {
      warn!("request failed while online, switching to offline mode");
    }
  }
}
