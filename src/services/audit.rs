//! Best-effort audit trail.
//!
//! Entries are written after the guarded mutation has committed. A failed
//! write is logged and counted, never returned to the caller.

use tracing::{debug, error};

use crate::db::{AuditEntry, Store};
use crate::domain::{AuditAction, TargetType};

#[derive(Clone)]
pub struct AuditRecorder {
    store: Store,
}

impl AuditRecorder {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn record(
        &self,
        action: AuditAction,
        target_type: TargetType,
        target_id: Option<i32>,
        actor_id: Option<i32>,
    ) -> Option<AuditEntry> {
        match self
            .store
            .audit_repo()
            .add(actor_id, action, target_type, target_id)
            .await
        {
            Ok(entry) => {
                debug!(
                    audit_id = entry.id,
                    action = %action,
                    target_type = %target_type,
                    target_id,
                    user_id = actor_id,
                    "Audit entry recorded"
                );
                Some(entry)
            }
            Err(e) => {
                metrics::counter!("audit_write_failures_total").increment(1);
                error!(
                    error = ?e,
                    action = %action,
                    target_type = %target_type,
                    target_id,
                    user_id = actor_id,
                    "Failed to record audit entry"
                );
                None
            }
        }
    }
}
