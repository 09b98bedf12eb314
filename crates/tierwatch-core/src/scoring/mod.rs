//! Power index, percentile and tier placement.
//!
//! Everything here is pure and synchronous; the resolver scores single
//! characters inline and the batch orchestrator scores whole servers.

pub mod baseline;
pub mod power;
pub mod rank;

pub use baseline::baseline_for;
pub use power::{PowerIndex, compute};
pub use rank::{next_rank_gap, percentile, relaxed_tier, tier_for_percentile};
