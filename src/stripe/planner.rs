//! Stripe Planner
//!
//! Pure functions choosing a layout for a new object and splitting a byte
//! range into stripe-aligned chunks.

use serde::{Deserialize, Serialize};

use super::DEFAULT_STRIPE_SIZE;
use crate::error::{Error, Result};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

const MAX_PREALLOCATED_CHUNKS: usize = 1024;

/// Threshold used when no stripe size is configured.
pub const DEFAULT_LARGE_OBJECT_THRESHOLD: u64 = 10 * MIB;

/// Layout of a file across storage targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeDescriptor {
    /// Number of targets the file is spread over
    pub stripe_count: u32,
    /// Bytes written to one target before moving to the next
    pub stripe_size: u64,
    /// First target, `None` to let the filesystem choose
    pub preferred_stripe_index: Option<u32>,
}

impl StripeDescriptor {
    pub fn new(stripe_count: u32, stripe_size: u64) -> Self {
        Self {
            stripe_count,
            stripe_size,
            preferred_stripe_index: None,
        }
    }

    /// Replace the stripe size.
    pub fn with_stripe_size(mut self, stripe_size: u64) -> Self {
        self.stripe_size = stripe_size;
        self
    }

    pub fn with_preferred_index(mut self, index: u32) -> Self {
        self.preferred_stripe_index = Some(index);
        self
    }

    /// Whether a transfer over this layout can run in parallel.
    pub fn is_parallel(&self) -> bool {
        self.stripe_count > 1
    }

    fn validate(&self) -> Result<()> {
        if self.stripe_size == 0 {
            return Err(Error::InvalidStripeLayout("stripe size is zero".into()));
        }
        if self.stripe_count == 0 {
            return Err(Error::InvalidStripeLayout("stripe count is zero".into()));
        }
        Ok(())
    }
}

impl Default for StripeDescriptor {
    fn default() -> Self {
        Self::new(1, DEFAULT_STRIPE_SIZE)
    }
}

/// A contiguous piece of a range confined to a single stripe unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripeChunk {
    /// Absolute file offset
    pub offset: u64,
    pub len: u64,
    /// Target the chunk lives on
    pub stripe_index: u32,
}

impl StripeChunk {
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Choose a stripe count from the object size.
///
/// Tiers: under 1 MiB one stripe, under 100 MiB two, under 1 GiB four,
/// otherwise eight. A non-zero `configured_max_stripes` caps the result.
pub fn plan_striping_for_size(size: u64, configured_max_stripes: u32) -> StripeDescriptor {
    let tiered = if size < MIB {
        1
    } else if size < 100 * MIB {
        2
    } else if size < GIB {
        4
    } else {
        8
    };

    let stripe_count = if configured_max_stripes > 0 {
        tiered.min(configured_max_stripes)
    } else {
        tiered
    };

    StripeDescriptor::new(stripe_count, DEFAULT_STRIPE_SIZE)
}

/// Split `[offset, offset + length)` into chunks that never cross a stripe unit.
pub fn decompose_range(offset: u64, length: u64, descriptor: &StripeDescriptor) -> Result<Vec<StripeChunk>> {
    descriptor.validate()?;
    let end = offset
        .checked_add(length)
        .ok_or_else(|| Error::InvalidStripeLayout(format!("range {}+{} overflows", offset, length)))?;

    let stripe_size = descriptor.stripe_size;
    let stripe_count = u64::from(descriptor.stripe_count);

    let mut chunks = Vec::with_capacity(chunk_capacity(length, stripe_size));
    let mut position = offset;
    while position < end {
        let within_unit = position % stripe_size;
        let len = (stripe_size - within_unit).min(end - position);
        chunks.push(StripeChunk {
            offset: position,
            len,
            stripe_index: ((position / stripe_size) % stripe_count) as u32,
        });
        position += len;
    }
    Ok(chunks)
}

/// Up-front allocation for a decomposition; large ranges grow on demand.
fn chunk_capacity(length: u64, stripe_size: u64) -> usize {
    let chunks = (length / stripe_size).saturating_add(2);
    usize::try_from(chunks)
        .unwrap_or(MAX_PREALLOCATED_CHUNKS)
        .min(MAX_PREALLOCATED_CHUNKS)
}

/// Size above which an object takes the striped path.
///
/// Twice the stripe size, or 10 MiB when no stripe size is configured.
pub fn large_object_threshold(stripe_size: u64) -> u64 {
    if stripe_size > 0 {
        stripe_size.saturating_mul(2)
    } else {
        DEFAULT_LARGE_OBJECT_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_tiers() {
        assert_eq!(plan_striping_for_size(500 * 1024, 0).stripe_count, 1);
        assert_eq!(plan_striping_for_size(MIB, 0).stripe_count, 2);
        assert_eq!(plan_striping_for_size(100 * MIB - 1, 0).stripe_count, 2);
        assert_eq!(plan_striping_for_size(100 * MIB, 0).stripe_count, 4);
        assert_eq!(plan_striping_for_size(GIB, 0).stripe_count, 8);
        assert_eq!(plan_striping_for_size(2 * GIB, 0).stripe_count, 8);
    }

    #[test]
    fn test_cap_applies() {
        let plan = plan_striping_for_size(2 * GIB, 3);
        assert_eq!(plan.stripe_count, 3);
        assert_eq!(plan.preferred_stripe_index, None);
        assert_eq!(plan.stripe_size, DEFAULT_STRIPE_SIZE);
    }

    #[test]
    fn test_decompose_unaligned_range() {
        let d = StripeDescriptor::new(2, 4);
        let chunks = decompose_range(3, 7, &d).unwrap();
        assert_eq!(
            chunks,
            vec![
                StripeChunk { offset: 3, len: 1, stripe_index: 0 },
                StripeChunk { offset: 4, len: 4, stripe_index: 1 },
                StripeChunk { offset: 8, len: 2, stripe_index: 0 },
            ]
        );
    }

    #[test]
    fn test_decompose_empty_range() {
        let d = StripeDescriptor::new(4, 1024);
        assert!(decompose_range(100, 0, &d).unwrap().is_empty());
    }

    #[test]
    fn test_zero_stripe_size_rejected() {
        let d = StripeDescriptor::new(4, 0);
        assert_matches!(decompose_range(0, 10, &d), Err(Error::InvalidStripeLayout(_)));
        let d = StripeDescriptor::new(0, 1024);
        assert_matches!(decompose_range(0, 10, &d), Err(Error::InvalidStripeLayout(_)));
    }

    #[test]
    fn test_chunk_capacity_is_bounded() {
        assert_eq!(chunk_capacity(7, 4), 3);
        assert_eq!(chunk_capacity(u64::MAX, 1), MAX_PREALLOCATED_CHUNKS);
        assert_eq!(chunk_capacity(u64::MAX - 1, 1), MAX_PREALLOCATED_CHUNKS);
    }

    #[test]
    fn test_decompose_near_end_of_offset_space() {
        let d = StripeDescriptor::new(4, 1);
        let chunks = decompose_range(u64::MAX - 10, 10, &d).unwrap();
        assert_eq!(chunks.len(), 10);
        assert!(chunks.iter().all(|c| c.len == 1));
    }

    #[test]
    fn test_large_object_threshold() {
        assert_eq!(large_object_threshold(MIB), 2 * MIB);
        assert_eq!(large_object_threshold(0), 10 * MIB);
    }
}
