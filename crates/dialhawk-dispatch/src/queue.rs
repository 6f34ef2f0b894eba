//! The durable dial job queue.
//!
//! Jobs live in the `dial_jobs` table. Enqueue inserts; a worker claims
//! the oldest queued row inside an immediate transaction and deletes it
//! once the dial decision is recorded. Rows left `claimed` by a crash
//! are recovered to `queued` at startup — delivery is at-least-once,
//! which is safe because the attempt-count gate is idempotent.

use crate::error::DispatchError;
use dialhawk_types::DialJob;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

/// A job taken off the queue, with the row that must be completed or
/// recovered.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub row_id: i64,
    pub job: DialJob,
}

/// Inserts one job at the tail of the queue.
pub fn enqueue(conn: &Connection, job: &DialJob) -> Result<(), DispatchError> {
    let payload = serde_json::to_string(job)?;
    conn.execute(
        "INSERT INTO dial_jobs (job_id, agent_id, payload) VALUES (?1, ?2, ?3)",
        params![job.job_id, job.agent_id, payload],
    )?;
    Ok(())
}

/// Claims the oldest queued job, if any.
///
/// The select and the status flip run inside one immediate transaction,
/// so two workers polling concurrently cannot claim the same row.
pub fn claim_next(conn: &mut Connection) -> Result<Option<ClaimedJob>, DispatchError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let row = tx
        .query_row(
            "SELECT id, payload FROM dial_jobs WHERE status = 'queued' ORDER BY id ASC LIMIT 1",
            [],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;

    let Some((row_id, payload)) = row else {
        tx.commit()?;
        return Ok(None);
    };

    tx.execute(
        "UPDATE dial_jobs SET status = 'claimed', claimed_at = datetime('now') WHERE id = ?1",
        [row_id],
    )?;
    tx.commit()?;

    let job: DialJob = serde_json::from_str(&payload)?;
    Ok(Some(ClaimedJob { row_id, job }))
}

/// Removes a consumed job.
pub fn complete(conn: &Connection, row_id: i64) -> Result<(), DispatchError> {
    conn.execute("DELETE FROM dial_jobs WHERE id = ?1", [row_id])?;
    Ok(())
}

/// Requeues jobs stranded in `claimed` by a crash. Run once at process
/// start, before any worker polls.
pub fn recover_claimed(conn: &Connection) -> Result<usize, DispatchError> {
    let recovered = conn.execute(
        "UPDATE dial_jobs SET status = 'queued', claimed_at = NULL WHERE status = 'claimed'",
        [],
    )?;
    Ok(recovered)
}

/// Number of jobs waiting to be claimed.
pub fn depth(conn: &Connection) -> Result<u32, DispatchError> {
    let depth = conn.query_row(
        "SELECT COUNT(*) FROM dial_jobs WHERE status = 'queued'",
        [],
        |row| row.get(0),
    )?;
    Ok(depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialhawk_db::run_migrations;
    use dialhawk_types::Lead;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory db");
        run_migrations(&conn).expect("migrations");
        conn.execute("INSERT INTO agents (name) VALUES ('a')", [])
            .unwrap();
        conn
    }

    fn job(n: u32) -> DialJob {
        DialJob {
            job_id: format!("job-{n}"),
            agent_id: 1,
            lead: Lead {
                id: n as i64,
                phone: format!("+1555000{n}"),
                name: None,
                email: None,
            },
            redial: false,
            enqueued_at: "2025-06-02 15:00:00".into(),
        }
    }

    #[test]
    fn fifo_claim_and_complete() {
        let mut conn = test_conn();
        enqueue(&conn, &job(1)).unwrap();
        enqueue(&conn, &job(2)).unwrap();
        assert_eq!(depth(&conn).unwrap(), 2);

        let first = claim_next(&mut conn).unwrap().expect("first job");
        assert_eq!(first.job.job_id, "job-1");
        assert_eq!(depth(&conn).unwrap(), 1);

        // The claimed row is invisible to the next claim.
        let second = claim_next(&mut conn).unwrap().expect("second job");
        assert_eq!(second.job.job_id, "job-2");
        assert!(claim_next(&mut conn).unwrap().is_none());

        complete(&conn, first.row_id).unwrap();
        complete(&conn, second.row_id).unwrap();
        assert_eq!(depth(&conn).unwrap(), 0);
    }

    #[test]
    fn recovery_requeues_stranded_claims() {
        let mut conn = test_conn();
        enqueue(&conn, &job(1)).unwrap();
        let claimed = claim_next(&mut conn).unwrap().expect("claim");

        // Simulated crash: the row is still claimed.
        assert_eq!(recover_claimed(&conn).unwrap(), 1);
        let again = claim_next(&mut conn).unwrap().expect("requeued job");
        assert_eq!(again.row_id, claimed.row_id);
    }

    #[test]
    fn payload_round_trip() {
        let mut conn = test_conn();
        let mut original = job(7);
        original.redial = true;
        original.lead.name = Some("Pat".into());
        enqueue(&conn, &original).unwrap();

        let claimed = claim_next(&mut conn).unwrap().expect("claim");
        assert_eq!(claimed.job, original);
    }
}
