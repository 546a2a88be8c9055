//! Cart state and the merge engine behind it.

pub mod merge;
mod state;

pub use merge::{aggregate, aggregate_canonical, merge_snapshots, normalize, ConflictPolicy};
pub use state::CartState;
