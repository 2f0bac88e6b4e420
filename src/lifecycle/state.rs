//! Mount state transitions on a shared record.

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::Result;
use crate::tenant::{MountState, StorageRecord};

/// Move the shared record to `next`, returning the previous state.
pub(crate) fn advance(record: &RwLock<StorageRecord>, next: MountState) -> Result<MountState> {
    let mut guard = record.write();
    let previous = guard.transition(next)?;
    debug!(tenant = %guard.tenant_id, from = %previous, to = %next, "Mount state changed");
    Ok(previous)
}

/// Record a failure; a record already in `Error` stays there.
pub(crate) fn fail(record: &RwLock<StorageRecord>) {
    let mut guard = record.write();
    if guard.mount_state() == MountState::Error {
        return;
    }
    if let Err(e) = guard.transition(MountState::Error) {
        warn!(tenant = %guard.tenant_id, error = %e, "Cannot mark record as failed");
    }
}

pub(crate) fn current(record: &RwLock<StorageRecord>) -> MountState {
    record.read().mount_state()
}
