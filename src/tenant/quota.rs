//! Quota Guard
//!
//! Pre-flight authorization of writes against a [`StorageRecord`].
//!
//! The check is advisory: no lock spans the check-then-write window, so
//! concurrent writers of one tenant can jointly overshoot the quota by at
//! most the sum of their in-flight sizes. That race is accepted.

use crate::error::{Error, Result};

use super::record::StorageRecord;

/// Authorize `additional_bytes` of new data for the record's tenant.
pub fn check_quota(record: &StorageRecord, additional_bytes: u64) -> Result<()> {
    if record.quota_bytes == 0 {
        return Ok(());
    }

    let within = record
        .used_bytes
        .checked_add(additional_bytes)
        .is_some_and(|total| total <= record.quota_bytes);

    if within {
        Ok(())
    } else {
        Err(Error::QuotaExceeded {
            tenant: record.tenant_id.to_string(),
            used_bytes: record.used_bytes,
            requested_bytes: additional_bytes,
            quota_bytes: record.quota_bytes,
        })
    }
}

/// Apply a usage delta after a write or delete completes, clamping at zero.
///
/// Returns the new used byte count.
pub fn update_used_space(record: &mut StorageRecord, delta: i64) -> u64 {
    record.used_bytes = if delta >= 0 {
        record.used_bytes.saturating_add(delta.unsigned_abs())
    } else {
        record.used_bytes.saturating_sub(delta.unsigned_abs())
    };
    record.used_bytes
}

/// Bytes still available, or `None` when the tenant is unlimited.
pub fn remaining(record: &StorageRecord) -> Option<u64> {
    (record.quota_bytes != 0).then(|| record.quota_bytes.saturating_sub(record.used_bytes))
}
