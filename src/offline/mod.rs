//! Offline support: connectivity tracking, request routing and the queue of
//! mutations waiting for the network.

mod connectivity;
mod queue;
mod router;

pub use connectivity::ConnectivityMonitor;
pub use queue::SyncQueue;
pub use router::RequestRouter;
