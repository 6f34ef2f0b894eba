//! Call attempt persistence and the atomic per-contact admission gate.

use crate::error::DispatchError;
use dialhawk_types::CallStatus;
use rusqlite::{params, Connection, OptionalExtension};

/// Attempts the (agent, phone) admission gate and, when admitted,
/// records the attempt — in one statement.
///
/// The increment and the `max_calls_per_contact` bound are a single
/// upsert whose changed-row count is the verdict, so two workers racing
/// on the same pair can never both slip past the limit: SQLite
/// serializes the writes and the second one sees the first one's count.
///
/// Returns `true` when the attempt was admitted and recorded.
pub fn try_claim_attempt(
    conn: &Connection,
    agent_id: i64,
    lead_phone: &str,
    max_calls_per_contact: u32,
    now_iso: &str,
) -> Result<bool, DispatchError> {
    if max_calls_per_contact == 0 {
        // The INSERT arm below always records attempt 1; a zero cap
        // must short-circuit before it.
        return Ok(false);
    }

    let changed = conn.execute(
        "INSERT INTO call_attempts
            (agent_id, lead_phone, attempt_count, last_attempt_time, status, created_at, modified_at)
         VALUES (?1, ?2, 1, ?3, 'initiated', ?3, ?3)
         ON CONFLICT(agent_id, lead_phone) DO UPDATE SET
            attempt_count = attempt_count + 1,
            last_attempt_time = excluded.last_attempt_time,
            status = 'initiated',
            modified_at = excluded.modified_at
         WHERE call_attempts.attempt_count < ?4",
        params![agent_id, lead_phone, now_iso, max_calls_per_contact],
    )?;
    Ok(changed == 1)
}

/// Current attempt count for an (agent, phone) pair; zero when no
/// record exists. Used by the coarse (read-only) admission pass.
pub fn attempt_count(
    conn: &Connection,
    agent_id: i64,
    lead_phone: &str,
) -> Result<u32, DispatchError> {
    let count = conn
        .query_row(
            "SELECT attempt_count FROM call_attempts WHERE agent_id = ?1 AND lead_phone = ?2",
            params![agent_id, lead_phone],
            |row| row.get::<_, u32>(0),
        )
        .optional()?;
    Ok(count.unwrap_or(0))
}

/// Records the terminal status of the latest attempt for a pair.
pub fn mark_attempt_status(
    conn: &Connection,
    agent_id: i64,
    lead_phone: &str,
    status: CallStatus,
    now_iso: &str,
) -> Result<(), DispatchError> {
    conn.execute(
        "UPDATE call_attempts SET status = ?1, modified_at = ?2
         WHERE agent_id = ?3 AND lead_phone = ?4",
        params![status.as_str(), now_iso, agent_id, lead_phone],
    )?;
    Ok(())
}

/// Claims the single no-answer redial for a pair.
///
/// Returns `true` exactly once per (agent, phone) record: the flag flip
/// and the not-yet-flipped check are one statement, so a duplicated
/// status callback cannot enqueue a second retry.
pub fn try_mark_redialed(
    conn: &Connection,
    agent_id: i64,
    lead_phone: &str,
) -> Result<bool, DispatchError> {
    let changed = conn.execute(
        "UPDATE call_attempts SET redialed = 1, modified_at = datetime('now')
         WHERE agent_id = ?1 AND lead_phone = ?2 AND redialed = 0",
        params![agent_id, lead_phone],
    )?;
    Ok(changed == 1)
}

/// Deletes an agent's attempts created at or after the given UTC
/// cutoff — the daily reset. Returns the number of rows cleared.
pub fn clear_attempts_since(
    conn: &Connection,
    agent_id: i64,
    utc_cutoff_iso: &str,
) -> Result<usize, DispatchError> {
    let deleted = conn.execute(
        "DELETE FROM call_attempts WHERE agent_id = ?1 AND created_at >= ?2",
        params![agent_id, utc_cutoff_iso],
    )?;
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialhawk_db::run_migrations;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory db");
        run_migrations(&conn).expect("migrations");
        conn.execute("INSERT INTO agents (name) VALUES ('a')", [])
            .unwrap();
        conn
    }

    const NOW: &str = "2025-06-02T15:00:00Z";

    #[test]
    fn gate_admits_up_to_the_cap() {
        let conn = test_conn();
        assert!(try_claim_attempt(&conn, 1, "+15550001", 2, NOW).unwrap());
        assert!(try_claim_attempt(&conn, 1, "+15550001", 2, NOW).unwrap());
        assert!(!try_claim_attempt(&conn, 1, "+15550001", 2, NOW).unwrap());
        assert_eq!(attempt_count(&conn, 1, "+15550001").unwrap(), 2);
    }

    #[test]
    fn zero_cap_admits_nothing() {
        let conn = test_conn();
        assert!(!try_claim_attempt(&conn, 1, "+15550001", 0, NOW).unwrap());
        assert_eq!(attempt_count(&conn, 1, "+15550001").unwrap(), 0);
    }

    #[test]
    fn pairs_are_independent() {
        let conn = test_conn();
        assert!(try_claim_attempt(&conn, 1, "+15550001", 1, NOW).unwrap());
        assert!(try_claim_attempt(&conn, 1, "+15550002", 1, NOW).unwrap());
        assert!(!try_claim_attempt(&conn, 1, "+15550001", 1, NOW).unwrap());
    }

    #[test]
    fn status_updates_apply() {
        let conn = test_conn();
        try_claim_attempt(&conn, 1, "+15550001", 2, NOW).unwrap();
        mark_attempt_status(&conn, 1, "+15550001", CallStatus::NoAnswer, NOW).unwrap();

        let status: String = conn
            .query_row(
                "SELECT status FROM call_attempts WHERE agent_id = 1 AND lead_phone = '+15550001'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(status, "no_answer");
    }

    #[test]
    fn redial_flag_flips_exactly_once() {
        let conn = test_conn();
        try_claim_attempt(&conn, 1, "+15550001", 2, NOW).unwrap();
        assert!(try_mark_redialed(&conn, 1, "+15550001").unwrap());
        assert!(!try_mark_redialed(&conn, 1, "+15550001").unwrap());
    }

    #[test]
    fn clearing_respects_the_cutoff() {
        let conn = test_conn();
        conn.execute(
            "INSERT INTO call_attempts (agent_id, lead_phone, attempt_count, created_at)
             VALUES (1, '+15550001', 1, '2025-06-01 08:00:00'),
                    (1, '+15550002', 1, '2025-06-02 09:30:00')",
            [],
        )
        .unwrap();

        let cleared = clear_attempts_since(&conn, 1, "2025-06-02 00:00:00").unwrap();
        assert_eq!(cleared, 1);
        assert_eq!(attempt_count(&conn, 1, "+15550001").unwrap(), 1);
        assert_eq!(attempt_count(&conn, 1, "+15550002").unwrap(), 0);
    }
}
