//! The usage reset scheduler.
//!
//! Ticks once a minute. For each agent the current UTC time is
//! converted to the agent's timezone; at local 03:00 the agent's call
//! attempts from the local day are cleared, and on the 1st of the month
//! `minutes_used` is zeroed as well.
//!
//! Idempotence is guarded explicitly, not by timer luck: the
//! `last_reset_on` column flips to the local date in the same statement
//! that performs the reset, so a second tick inside the same minute (or
//! a crash-restart straddling the boundary) matches zero rows and does
//! nothing.

use crate::error::DispatchError;
use crate::time::sql_timestamp;
use crate::{agents, attempts};
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use dialhawk_db::DbPool;
use rusqlite::{params, Connection};
use tokio::time::{sleep, Duration};

/// Local hour at which resets run.
const RESET_HOUR: u32 = 3;

/// What one reset pass did for one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetOutcome {
    pub agent_id: i64,
    /// True on the 1st of the month, when `minutes_used` was also zeroed.
    pub monthly: bool,
    pub attempts_cleared: usize,
}

/// Runs one reset pass against every agent at the given instant.
///
/// Separated from the ticking loop (and parameterized on `utc_now`) so
/// boundary behavior is testable with fixed timestamps.
pub fn run_reset_pass(
    conn: &Connection,
    utc_now: DateTime<Utc>,
) -> Result<Vec<ResetOutcome>, DispatchError> {
    let mut outcomes = Vec::new();

    for agent in agents::list_agents(conn)? {
        let tz: chrono_tz::Tz = agent
            .timezone
            .parse()
            .unwrap_or(chrono_tz::America::New_York);
        let local = utc_now.with_timezone(&tz);

        if local.hour() != RESET_HOUR || local.minute() != 0 {
            continue;
        }

        let today = local.format("%Y-%m-%d").to_string();
        let monthly = local.day() == 1;

        // The idempotence gate: flip last_reset_on and apply the
        // monthly zeroing in one statement. A repeated tick inside the
        // same minute sees last_reset_on already set and changes
        // nothing.
        let changed = conn.execute(
            "UPDATE agents SET
                last_reset_on = ?1,
                minutes_used = CASE WHEN ?2 THEN 0 ELSE minutes_used END,
                modified_at = datetime('now')
             WHERE id = ?3 AND (last_reset_on IS NULL OR last_reset_on <> ?1)",
            params![today, monthly, agent.id],
        )?;
        if changed == 0 {
            continue;
        }

        // Clear the attempts created since local midnight, compared in
        // UTC because that is how created_at is stored.
        let midnight_utc = tz
            .with_ymd_and_hms(local.year(), local.month(), local.day(), 0, 0, 0)
            .earliest()
            .map(|midnight| midnight.with_timezone(&Utc))
            .unwrap_or(utc_now - chrono::Duration::hours(RESET_HOUR as i64));
        let attempts_cleared =
            attempts::clear_attempts_since(conn, agent.id, &sql_timestamp(midnight_utc))?;

        tracing::info!(
            agent_id = agent.id,
            timezone = %agent.timezone,
            monthly,
            attempts_cleared,
            "agent usage reset"
        );
        outcomes.push(ResetOutcome {
            agent_id: agent.id,
            monthly,
            attempts_cleared,
        });
    }

    Ok(outcomes)
}

/// Starts the reset scheduler background task. Runs indefinitely;
/// failures are logged and the next tick proceeds.
pub async fn start_usage_reset_task(pool: DbPool, interval_seconds: u64) {
    if interval_seconds == 0 {
        tracing::warn!("usage reset task disabled (interval=0)");
        return;
    }
    let interval = Duration::from_secs(interval_seconds);
    tracing::info!(interval_seconds, "starting usage reset task");

    loop {
        sleep(interval).await;

        let pool = pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            run_reset_pass(&conn, Utc::now())
        })
        .await;

        match result {
            Ok(Ok(outcomes)) if !outcomes.is_empty() => {
                tracing::info!(count = outcomes.len(), "usage resets applied");
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!("usage reset pass failed: {e}"),
            Err(e) => tracing::error!("usage reset task failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::CreateAgentParams;
    use dialhawk_db::run_migrations;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory db");
        run_migrations(&conn).expect("migrations");
        conn
    }

    fn new_york_agent(conn: &Connection) -> i64 {
        let agent = agents::create_agent(
            conn,
            &CreateAgentParams {
                name: "Ava".into(),
                timezone: "America/New_York".into(),
                ..CreateAgentParams::default()
            },
        )
        .unwrap();
        agents::add_minutes_used(conn, agent.id, 120).unwrap();
        agent.id
    }

    fn seed_attempts(conn: &Connection, agent_id: i64) {
        // One attempt from the local day (after 04:00 UTC = midnight
        // EDT), one from the previous local day.
        conn.execute(
            "INSERT INTO call_attempts (agent_id, lead_phone, attempt_count, created_at)
             VALUES (?1, '+15550001', 1, '2025-07-01 06:00:00'),
                    (?1, '+15550002', 1, '2025-07-01 02:00:00')",
            [agent_id],
        )
        .unwrap();
    }

    /// 03:00 EDT on the given July 2025 day, expressed in UTC.
    fn three_am_edt(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, day, 7, 0, 0).unwrap()
    }

    #[test]
    fn first_of_month_resets_minutes_and_attempts() {
        let conn = test_conn();
        let agent_id = new_york_agent(&conn);
        seed_attempts(&conn, agent_id);

        let outcomes = run_reset_pass(&conn, three_am_edt(1)).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].monthly);
        assert_eq!(outcomes[0].attempts_cleared, 1, "only the local day's attempt");

        let agent = agents::get_agent(&conn, agent_id).unwrap();
        assert_eq!(agent.minutes_used, 0);
        assert_eq!(
            attempts::attempt_count(&conn, agent_id, "+15550002").unwrap(),
            1,
            "previous day's attempt survives"
        );
    }

    #[test]
    fn mid_month_reset_keeps_minutes() {
        let conn = test_conn();
        let agent_id = new_york_agent(&conn);
        conn.execute(
            "INSERT INTO call_attempts (agent_id, lead_phone, attempt_count, created_at)
             VALUES (?1, '+15550001', 1, '2025-07-15 06:00:00')",
            [agent_id],
        )
        .unwrap();

        let outcomes = run_reset_pass(&conn, three_am_edt(15)).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].monthly);
        assert_eq!(outcomes[0].attempts_cleared, 1);

        let agent = agents::get_agent(&conn, agent_id).unwrap();
        assert_eq!(agent.minutes_used, 120, "minutes survive a daily reset");
    }

    #[test]
    fn repeated_ticks_in_the_same_minute_are_idempotent() {
        let conn = test_conn();
        let agent_id = new_york_agent(&conn);
        seed_attempts(&conn, agent_id);

        let first = run_reset_pass(&conn, three_am_edt(1)).unwrap();
        assert_eq!(first.len(), 1);

        // Seed a fresh attempt to prove the second tick touches nothing.
        conn.execute(
            "INSERT INTO call_attempts (agent_id, lead_phone, attempt_count, created_at)
             VALUES (?1, '+15550009', 1, '2025-07-01 07:00:30')",
            [agent_id],
        )
        .unwrap();

        let second = run_reset_pass(&conn, three_am_edt(1)).unwrap();
        assert!(second.is_empty(), "same-minute tick must be a no-op");
        assert_eq!(attempts::attempt_count(&conn, agent_id, "+15550009").unwrap(), 1);
    }

    #[test]
    fn off_hours_ticks_do_nothing() {
        let conn = test_conn();
        let agent_id = new_york_agent(&conn);
        seed_attempts(&conn, agent_id);

        // 12:00 UTC = 08:00 EDT.
        let noon = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();
        assert!(run_reset_pass(&conn, noon).unwrap().is_empty());
        assert_eq!(agents::get_agent(&conn, agent_id).unwrap().minutes_used, 120);
    }
}
