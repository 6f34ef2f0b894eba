//! Call logs and dashboard counters.

use crate::error::DispatchError;
use dialhawk_types::{CallLog, CallStatus, DashboardStat};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Parameters for one call log row, written from the telephony status
/// callback.
#[derive(Debug, Clone)]
pub struct CallLogParams {
    pub agent_id: i64,
    pub call_duration_seconds: u32,
    pub call_outcome: CallStatus,
    pub contact_phone: String,
    pub contact_name: Option<String>,
    pub notes: Option<String>,
}

/// Inserts one call log row.
pub fn insert_call_log(conn: &Connection, log: &CallLogParams) -> Result<(), DispatchError> {
    conn.execute(
        "INSERT INTO call_logs
            (agent_id, call_duration_seconds, call_outcome, contact_phone, contact_name, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            log.agent_id,
            log.call_duration_seconds,
            log.call_outcome.as_str(),
            log.contact_phone,
            log.contact_name,
            log.notes,
        ],
    )?;
    Ok(())
}

fn map_row_to_call_log(row: &Row<'_>) -> rusqlite::Result<CallLog> {
    let outcome: String = row.get(4)?;
    Ok(CallLog {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        call_date: row.get(2)?,
        call_duration_seconds: row.get(3)?,
        call_outcome: CallStatus::parse(&outcome).unwrap_or_default(),
        contact_phone: row.get(5)?,
        contact_name: row.get(6)?,
        notes: row.get(7)?,
    })
}

/// Most recent call logs for an agent, newest first.
pub fn recent_call_logs(
    conn: &Connection,
    agent_id: i64,
    limit: u32,
) -> Result<Vec<CallLog>, DispatchError> {
    let mut stmt = conn.prepare(
        "SELECT id, agent_id, call_date, call_duration_seconds, call_outcome,
                contact_phone, contact_name, notes
         FROM call_logs WHERE agent_id = ?1 ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![agent_id, limit], map_row_to_call_log)?;
    let mut logs = Vec::new();
    for row in rows {
        logs.push(row?);
    }
    Ok(logs)
}

/// Upserts the day's dial counter. At most one row exists per
/// (agent, date); racing workers both land on the same row and the
/// increments serialize.
pub fn record_dial(conn: &Connection, agent_id: i64, date: &str) -> Result<(), DispatchError> {
    conn.execute(
        "INSERT INTO dashboard_stats (agent_id, date, dials_count)
         VALUES (?1, ?2, 1)
         ON CONFLICT(agent_id, date) DO UPDATE SET dials_count = dials_count + 1",
        params![agent_id, date],
    )?;
    Ok(())
}

/// Upserts the day's conversation counter (a session saw a final
/// transcript — somebody actually talked).
pub fn record_conversation(
    conn: &Connection,
    agent_id: i64,
    date: &str,
) -> Result<(), DispatchError> {
    conn.execute(
        "INSERT INTO dashboard_stats (agent_id, date, conversation_count)
         VALUES (?1, ?2, 1)
         ON CONFLICT(agent_id, date) DO UPDATE SET conversation_count = conversation_count + 1",
        params![agent_id, date],
    )?;
    Ok(())
}

/// Upserts the day's appointments counter.
pub fn record_appointment(
    conn: &Connection,
    agent_id: i64,
    date: &str,
) -> Result<(), DispatchError> {
    conn.execute(
        "INSERT INTO dashboard_stats (agent_id, date, appointments_set)
         VALUES (?1, ?2, 1)
         ON CONFLICT(agent_id, date) DO UPDATE SET appointments_set = appointments_set + 1",
        params![agent_id, date],
    )?;
    Ok(())
}

/// Number of dials placed by an agent on a given date. The per-day
/// `dial_limit` admission check reads this.
pub fn dials_on(conn: &Connection, agent_id: i64, date: &str) -> Result<u32, DispatchError> {
    let count = conn
        .query_row(
            "SELECT dials_count FROM dashboard_stats WHERE agent_id = ?1 AND date = ?2",
            params![agent_id, date],
            |row| row.get::<_, u32>(0),
        )
        .optional()?;
    Ok(count.unwrap_or(0))
}

/// The full stat row for one (agent, date), if any.
pub fn get_stat(
    conn: &Connection,
    agent_id: i64,
    date: &str,
) -> Result<Option<DashboardStat>, DispatchError> {
    let stat = conn
        .query_row(
            "SELECT id, agent_id, date, dials_count, conversation_count, appointments_set
             FROM dashboard_stats WHERE agent_id = ?1 AND date = ?2",
            params![agent_id, date],
            |row| {
                Ok(DashboardStat {
                    id: row.get(0)?,
                    agent_id: row.get(1)?,
                    date: row.get(2)?,
                    dials_count: row.get(3)?,
                    conversation_count: row.get(4)?,
                    appointments_set: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(stat)
}
