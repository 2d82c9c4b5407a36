pub mod sqlite;
pub mod supabase;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

use crate::errors::StoreError;
use crate::models::{Appointment, ConversationTurn, ListFilter, Role};

pub use sqlite::SqliteStore;
pub use supabase::SupabaseStore;

/// Repository for appointments. Lookups for `cancel` and `reschedule` go by
/// case-insensitive title fragment; the write itself is keyed by id and only
/// applies while the row is still active.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn create(
        &self,
        title: &str,
        scheduled_at: DateTime<FixedOffset>,
    ) -> Result<Appointment, StoreError>;

    async fn cancel(&self, title_fragment: &str) -> Result<Appointment, StoreError>;

    async fn reschedule(
        &self,
        title_fragment: &str,
        new_instant: DateTime<FixedOffset>,
    ) -> Result<Appointment, StoreError>;

    async fn list(&self, filter: ListFilter) -> Result<Vec<Appointment>, StoreError>;
}

#[async_trait]
pub trait ConversationLog: Send + Sync {
    async fn append_turn(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError>;

    async fn recent_turns(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError>;
}

/// Picks the lookup target from candidates ordered newest first.
pub(crate) fn pick_target(
    candidates: Vec<Appointment>,
    fragment: &str,
) -> Result<Appointment, StoreError> {
    let mut matching = candidates
        .into_iter()
        .filter(|a| ListFilter::Active.accepts(a.status) && a.matches(fragment));

    let target = matching
        .next()
        .ok_or_else(|| StoreError::NotFound(fragment.to_string()))?;

    let others = matching.count();
    if others > 0 {
        tracing::warn!(
            fragment,
            candidates = others + 1,
            appointment_id = %target.id,
            "title fragment is ambiguous, using the most recent appointment"
        );
    }
    Ok(target)
}
