use anyhow::Context;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection};

use crate::models::{Appointment, AppointmentStatus, ConversationTurn, ListFilter, Role};

const APPOINTMENT_COLUMNS: &str = "id, title, scheduled_at, status, created_at, updated_at";

// ── Appointments ──

pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO appointments (id, title, scheduled_at, scheduled_ts, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            appt.id,
            appt.title,
            appt.scheduled_at.to_rfc3339(),
            appt.scheduled_at.timestamp(),
            appt.status.as_str(),
            utc_text(&appt.created_at),
            utc_text(&appt.updated_at),
        ],
    )?;
    Ok(())
}

pub fn list_appointments(conn: &Connection, filter: ListFilter) -> anyhow::Result<Vec<Appointment>> {
    let (clause, status) = match filter {
        ListFilter::Active => ("WHERE status != 'cancelled'", None),
        ListFilter::Status(status) => ("WHERE status = ?1", Some(status.as_str())),
        ListFilter::All => ("", None),
    };
    let sql = format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments {clause} ORDER BY scheduled_ts ASC, created_at ASC"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(status.iter()), |row| {
        Ok(parse_appointment_row(row))
    })?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row??);
    }
    Ok(appointments)
}

/// Active appointments, most recently created first. This is the candidate
/// order for title-fragment lookups.
pub fn active_appointments_newest_first(conn: &Connection) -> anyhow::Result<Vec<Appointment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE status != 'cancelled' ORDER BY created_at DESC, rowid DESC"
    ))?;
    let rows = stmt.query_map([], |row| Ok(parse_appointment_row(row)))?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row??);
    }
    Ok(appointments)
}

pub fn get_appointment(conn: &Connection, id: &str) -> anyhow::Result<Option<Appointment>> {
    let result = conn.query_row(
        &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
        params![id],
        |row| Ok(parse_appointment_row(row)),
    );

    match result {
        Ok(appt) => Ok(Some(appt?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Marks the appointment cancelled unless it already is. Returns whether a
/// row changed.
pub fn cancel_if_active(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE appointments SET status = ?1, updated_at = ?2
         WHERE id = ?3 AND status != 'cancelled'",
        params![
            AppointmentStatus::Cancelled.as_str(),
            utc_text(&Utc::now()),
            id
        ],
    )?;
    Ok(count > 0)
}

pub fn reschedule_if_active(
    conn: &Connection,
    id: &str,
    scheduled_at: &DateTime<FixedOffset>,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE appointments SET scheduled_at = ?1, scheduled_ts = ?2, status = ?3, updated_at = ?4
         WHERE id = ?5 AND status != 'cancelled'",
        params![
            scheduled_at.to_rfc3339(),
            scheduled_at.timestamp(),
            AppointmentStatus::Rescheduled.as_str(),
            utc_text(&Utc::now()),
            id
        ],
    )?;
    Ok(count > 0)
}

fn parse_appointment_row(row: &rusqlite::Row) -> anyhow::Result<Appointment> {
    let id: String = row.get(0)?;
    let title: String = row.get(1)?;
    let scheduled_at_str: String = row.get(2)?;
    let status_str: String = row.get(3)?;
    let created_at_str: String = row.get(4)?;
    let updated_at_str: String = row.get(5)?;

    let scheduled_at = DateTime::parse_from_rfc3339(&scheduled_at_str)
        .with_context(|| format!("bad scheduled_at on appointment {id}"))?;

    Ok(Appointment {
        title,
        scheduled_at,
        status: AppointmentStatus::parse(&status_str),
        created_at: parse_utc(&created_at_str)?,
        updated_at: parse_utc(&updated_at_str)?,
        id,
    })
}

// ── Conversation turns ──

pub fn insert_turn(conn: &Connection, turn: &ConversationTurn) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO conversation_turns (conversation_id, role, content, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            turn.conversation_id,
            turn.role.as_str(),
            turn.content,
            utc_text(&turn.created_at),
        ],
    )?;
    Ok(())
}

/// The last `limit` turns of a conversation, oldest first.
pub fn recent_turns(
    conn: &Connection,
    conversation_id: &str,
    limit: usize,
) -> anyhow::Result<Vec<ConversationTurn>> {
    let mut stmt = conn.prepare(
        "SELECT conversation_id, role, content, created_at FROM conversation_turns
         WHERE conversation_id = ?1 ORDER BY id DESC LIMIT ?2",
    )?;

    let rows = stmt.query_map(params![conversation_id, limit as i64], |row| {
        let created_at: String = row.get(3)?;
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            created_at,
        ))
    })?;

    let mut turns = vec![];
    for row in rows {
        let (conversation_id, role, content, created_at) = row?;
        turns.push(ConversationTurn {
            conversation_id,
            role: Role::parse(&role),
            content,
            created_at: parse_utc(&created_at)?,
        });
    }
    turns.reverse();
    Ok(turns)
}

fn utc_text(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_utc(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("bad timestamp: {s}"))?
        .with_timezone(&Utc))
}
