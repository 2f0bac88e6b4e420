//! Property-Based Tests for Stripe Planning
//!
//! # Test Properties
//!
//! 1. **Exact Cover**: chunk lengths sum to the requested length
//! 2. **Contiguity**: chunks are ordered and gap-free
//! 3. **Confinement**: no chunk crosses a stripe unit boundary
//! 4. **Monotone Planning**: larger objects never get fewer stripes
//! 5. **Cap**: a configured maximum is never exceeded

#![cfg(test)]

use proptest::prelude::*;

use super::planner::{decompose_range, plan_striping_for_size, StripeDescriptor};

// =============================================================================
// Property Strategies
// =============================================================================

/// Stripe layouts with small units so ranges span many chunks.
fn descriptor_strategy() -> impl Strategy<Value = StripeDescriptor> {
    (1u32..=16, 1u64..=4096).prop_map(|(count, size)| StripeDescriptor::new(count, size))
}

/// Object sizes spanning every planning tier.
fn size_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![
        0u64..(1 << 20),
        (1u64 << 20)..(100 << 20),
        (100u64 << 20)..(1 << 30),
        (1u64 << 30)..(1 << 40),
    ]
}

// =============================================================================
// Decomposition Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_chunks_cover_range_exactly(
        d in descriptor_strategy(),
        offset in 0u64..1_000_000,
        length in 0u64..200_000,
    ) {
        let chunks = decompose_range(offset, length, &d).unwrap();
        prop_assert_eq!(chunks.iter().map(|c| c.len).sum::<u64>(), length);

        let mut expected = offset;
        for chunk in &chunks {
            prop_assert_eq!(chunk.offset, expected);
            prop_assert!(chunk.len > 0);
            expected = chunk.end();
        }
        prop_assert_eq!(expected, offset + length);
    }

    #[test]
    fn prop_chunks_confined_to_one_stripe_unit(
        d in descriptor_strategy(),
        offset in 0u64..1_000_000,
        length in 1u64..200_000,
    ) {
        for chunk in decompose_range(offset, length, &d).unwrap() {
            let unit = chunk.offset / d.stripe_size;
            prop_assert_eq!((chunk.end() - 1) / d.stripe_size, unit);
            prop_assert_eq!(u64::from(chunk.stripe_index), unit % u64::from(d.stripe_count));
            prop_assert!(chunk.stripe_index < d.stripe_count);
        }
    }
}

// =============================================================================
// Planning Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_planning_is_monotone(a in size_strategy(), b in size_strategy(), cap in 0u32..=10) {
        let (small, large) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(
            plan_striping_for_size(small, cap).stripe_count
                <= plan_striping_for_size(large, cap).stripe_count
        );
    }

    #[test]
    fn prop_cap_respected(size in size_strategy(), cap in 1u32..=10) {
        let plan = plan_striping_for_size(size, cap);
        prop_assert!(plan.stripe_count <= cap);
        prop_assert!(plan.stripe_count >= 1);
        prop_assert_eq!(plan.preferred_stripe_index, None);
    }
}
