//! Stripe-Aware I/O
//!
//! Layout planning, `lfs` layout tooling, the parallel chunk engine and the
//! object store decorator that ties them together for striped filesystems.
//!
//! # Architecture
//!
//! ```text
//! StripedObjectStore ──► plan_striping_for_size ──► StripeLayoutTool (lfs)
//!         │
//!         ▼
//!    ParallelIo ──► decompose_range ──► bounded positional chunk I/O
//! ```

mod layout;
mod parallel_io;
mod planner;
#[cfg(test)]
mod proptest;
mod striped_store;

pub use layout::{parse_getstripe, setstripe_argv, LfsStripeTool, StripeLayoutTool};
pub use parallel_io::ParallelIo;
pub use planner::{
    decompose_range, large_object_threshold, plan_striping_for_size, StripeChunk, StripeDescriptor,
    DEFAULT_LARGE_OBJECT_THRESHOLD,
};
pub use striped_store::StripedObjectStore;

/// Default stripe size (1 MiB)
pub const DEFAULT_STRIPE_SIZE: u64 = 1024 * 1024;
