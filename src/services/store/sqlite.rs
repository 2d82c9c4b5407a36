use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use rusqlite::Connection;

use super::{pick_target, AppointmentStore, ConversationLog};
use crate::db::queries;
use crate::errors::StoreError;
use crate::models::{Appointment, ConversationTurn, ListFilter, Role};

/// Embedded store. One connection shared behind a mutex, so every
/// lookup-then-write runs without interleaving.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.db
            .lock()
            .map_err(|_| StoreError::Backend(anyhow::anyhow!("database mutex poisoned")))
    }

    fn reload(db: &Connection, id: &str) -> Result<Appointment, StoreError> {
        queries::get_appointment(db, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl AppointmentStore for SqliteStore {
    async fn create(
        &self,
        title: &str,
        scheduled_at: DateTime<FixedOffset>,
    ) -> Result<Appointment, StoreError> {
        let appt = Appointment::new(title, scheduled_at);
        let db = self.lock()?;
        queries::insert_appointment(&db, &appt)?;
        tracing::info!(appointment_id = %appt.id, title = %appt.title, "appointment created");
        Ok(appt)
    }

    async fn cancel(&self, title_fragment: &str) -> Result<Appointment, StoreError> {
        let db = self.lock()?;
        let target = pick_target(queries::active_appointments_newest_first(&db)?, title_fragment)?;

        if !queries::cancel_if_active(&db, &target.id)? {
            return Err(StoreError::NotFound(title_fragment.to_string()));
        }
        tracing::info!(appointment_id = %target.id, "appointment cancelled");
        Self::reload(&db, &target.id)
    }

    async fn reschedule(
        &self,
        title_fragment: &str,
        new_instant: DateTime<FixedOffset>,
    ) -> Result<Appointment, StoreError> {
        let db = self.lock()?;
        let target = pick_target(queries::active_appointments_newest_first(&db)?, title_fragment)?;

        if !queries::reschedule_if_active(&db, &target.id, &new_instant)? {
            return Err(StoreError::NotFound(title_fragment.to_string()));
        }
        tracing::info!(appointment_id = %target.id, to = %new_instant, "appointment rescheduled");
        Self::reload(&db, &target.id)
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<Appointment>, StoreError> {
        let db = self.lock()?;
        Ok(queries::list_appointments(&db, filter)?)
    }
}

#[async_trait]
impl ConversationLog for SqliteStore {
    async fn append_turn(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError> {
        let turn = ConversationTurn {
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let db = self.lock()?;
        queries::insert_turn(&db, &turn)?;
        Ok(())
    }

    async fn recent_turns(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let db = self.lock()?;
        Ok(queries::recent_turns(&db, conversation_id, limit)?)
    }
}
