//! The call worker pool and the telephony status callback.
//!
//! A fixed number of workers poll the dial job queue. On each claimed
//! job a worker re-runs admission authoritatively — policy checks
//! against fresh agent rows (a pause that happened while the job was
//! queued is honored here), then the atomic per-contact gate — and only
//! then places the outbound call. Terminal call status arrives later
//! through [`handle_status_callback`].

use crate::admission::{agent_local_clock, check_policy, Admission, SkipReason};
use crate::error::DispatchError;
use crate::queue::ClaimedJob;
use crate::time::sql_timestamp;
use crate::{agents, attempts, history, queue};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialhawk_db::DbPool;
use dialhawk_types::{Agent, CallLog, CallStatus, DialJob, Lead, StatusCallback};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use uuid::Uuid;

/// The external telephony collaborator: places one outbound call and
/// returns the provider's call identifier.
#[async_trait]
pub trait Telephony: Send + Sync {
    async fn place_call(&self, agent: &Agent, job: &DialJob) -> Result<String, DispatchError>;
}

/// Worker pool tunables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent call workers.
    pub workers: usize,
    /// How long an idle worker waits before polling the queue again.
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            poll_interval_ms: 500,
        }
    }
}

/// What the worker decided for one claimed job.
#[derive(Debug)]
enum DialVerdict {
    /// Admission passed and the attempt was recorded; place the call.
    Proceed(Box<Agent>),
    /// A normal skip, not an error.
    Skip(SkipReason),
}

/// Spawns the worker pool. Handles run until the process shuts down.
pub fn spawn_worker_pool(
    pool: DbPool,
    telephony: Arc<dyn Telephony>,
    config: WorkerConfig,
) -> Vec<JoinHandle<()>> {
    (0..config.workers.max(1))
        .map(|worker_id| {
            let pool = pool.clone();
            let telephony = telephony.clone();
            let poll = config.poll_interval_ms;
            tokio::spawn(run_call_worker(worker_id, pool, telephony, poll))
        })
        .collect()
}

/// One worker's poll loop.
pub async fn run_call_worker(
    worker_id: usize,
    pool: DbPool,
    telephony: Arc<dyn Telephony>,
    poll_interval_ms: u64,
) {
    tracing::info!(worker_id, "call worker started");
    loop {
        let claim_pool = pool.clone();
        let claimed = tokio::task::spawn_blocking(move || {
            let mut conn = claim_pool.get()?;
            queue::claim_next(&mut conn)
        })
        .await;

        let claimed = match claimed {
            Ok(Ok(claimed)) => claimed,
            Ok(Err(e)) => {
                tracing::error!(worker_id, "queue claim failed: {e}");
                sleep(Duration::from_millis(poll_interval_ms)).await;
                continue;
            }
            Err(e) => {
                tracing::error!(worker_id, "queue claim task failed: {e}");
                sleep(Duration::from_millis(poll_interval_ms)).await;
                continue;
            }
        };

        match claimed {
            None => sleep(Duration::from_millis(poll_interval_ms)).await,
            Some(claimed) => {
                if let Err(e) = process_job(&pool, telephony.as_ref(), &claimed).await {
                    tracing::error!(
                        worker_id,
                        job_id = %claimed.job.job_id,
                        "job processing failed: {e}"
                    );
                }
            }
        }
    }
}

/// Processes one claimed job to completion. The job row is always
/// removed — skips and failures are terminal outcomes, not retries
/// (the single no-answer redial goes through the status callback).
async fn process_job(
    pool: &DbPool,
    telephony: &dyn Telephony,
    claimed: &ClaimedJob,
) -> Result<(), DispatchError> {
    let job = claimed.job.clone();
    let row_id = claimed.row_id;

    let verdict_pool = pool.clone();
    let verdict_job = job.clone();
    let verdict = tokio::task::spawn_blocking(move || {
        let conn = verdict_pool.get()?;
        authorize_dial(&conn, &verdict_job, Utc::now())
    })
    .await
    .map_err(|e| DispatchError::Pool(format!("authorize task failed: {e}")))??;

    match verdict {
        DialVerdict::Skip(reason) => {
            tracing::info!(
                job_id = %job.job_id,
                agent_id = job.agent_id,
                phone = %job.lead.phone,
                reason = reason.as_str(),
                "dial skipped"
            );
        }
        DialVerdict::Proceed(agent) => match telephony.place_call(&agent, &job).await {
            Ok(call_sid) => {
                tracing::info!(
                    job_id = %job.job_id,
                    agent_id = agent.id,
                    phone = %job.lead.phone,
                    call_sid = %call_sid,
                    redial = job.redial,
                    "outbound call placed"
                );
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %job.job_id,
                    phone = %job.lead.phone,
                    "call placement failed: {e}"
                );
                let fail_pool = pool.clone();
                let agent_id = agent.id;
                let phone = job.lead.phone.clone();
                let persisted = tokio::task::spawn_blocking(move || {
                    let conn = fail_pool.get()?;
                    attempts::mark_attempt_status(
                        &conn,
                        agent_id,
                        &phone,
                        CallStatus::Failed,
                        &sql_timestamp(Utc::now()),
                    )
                })
                .await;
                if let Ok(Err(e)) = persisted {
                    // Losing the audit record is preferable to retry loops.
                    tracing::warn!("failed to mark attempt failed: {e}");
                }
            }
        },
    }

    let done_pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = done_pool.get()?;
        queue::complete(&conn, row_id)
    })
    .await
    .map_err(|e| DispatchError::Pool(format!("complete task failed: {e}")))??;

    Ok(())
}

/// The authoritative admission pass: fresh policy checks, the day's
/// dial limit, the atomic per-contact gate, and the dial counter bump.
/// Exactly one attempt-record mutation happens per admitted decision.
fn authorize_dial(
    conn: &rusqlite::Connection,
    job: &DialJob,
    utc_now: DateTime<Utc>,
) -> Result<DialVerdict, DispatchError> {
    let agent = agents::get_agent(conn, job.agent_id)?;
    let clock = agent_local_clock(&agent, utc_now);

    if let Admission::Skip(reason) = check_policy(&agent, &clock) {
        return Ok(DialVerdict::Skip(reason));
    }
    if history::dials_on(conn, agent.id, &clock.date)? >= agent.dial_limit {
        return Ok(DialVerdict::Skip(SkipReason::DailyLimitReached));
    }
    if !attempts::try_claim_attempt(
        conn,
        agent.id,
        &job.lead.phone,
        agent.max_calls_per_contact,
        &sql_timestamp(utc_now),
    )? {
        return Ok(DialVerdict::Skip(SkipReason::ContactLimitReached));
    }
    history::record_dial(conn, agent.id, &clock.date)?;

    Ok(DialVerdict::Proceed(Box::new(agent)))
}

/// Handles one terminal status report from the telephony provider:
/// writes the call log, charges minutes, records the attempt outcome,
/// and performs the single conditional no-answer redial.
///
/// Returns `true` when a redial job was enqueued.
pub fn handle_status_callback(
    conn: &rusqlite::Connection,
    callback: &StatusCallback,
    utc_now: DateTime<Utc>,
) -> Result<bool, DispatchError> {
    let Some(status) = CallStatus::parse(&callback.call_status) else {
        tracing::debug!(status = %callback.call_status, "ignoring unknown call status");
        return Ok(false);
    };
    if !status.is_terminal() {
        return Ok(false);
    }

    let agent = agents::get_agent(conn, callback.agent_id)?;
    let now_iso = sql_timestamp(utc_now);

    // Audit record first; a failure here is logged by the caller but
    // must not block the rest of the bookkeeping.
    if let Err(e) = history::insert_call_log(
        conn,
        &history::CallLogParams {
            agent_id: agent.id,
            call_duration_seconds: callback.call_duration_seconds,
            call_outcome: status,
            contact_phone: callback.to_phone.clone(),
            contact_name: None,
            notes: None,
        },
    ) {
        tracing::warn!(agent_id = agent.id, "call log insert failed: {e}");
    }

    let minutes = callback.call_duration_seconds.div_ceil(60);
    if minutes > 0 {
        agents::add_minutes_used(conn, agent.id, minutes)?;
    }

    attempts::mark_attempt_status(conn, agent.id, &callback.to_phone, status, &now_iso)?;

    if status == CallStatus::NoAnswer
        && agent.double_dial_no_answer
        && attempts::try_mark_redialed(conn, agent.id, &callback.to_phone)?
    {
        let job = DialJob {
            job_id: Uuid::new_v4().to_string(),
            agent_id: agent.id,
            lead: Lead {
                id: callback.contact_id.unwrap_or(0),
                phone: callback.to_phone.clone(),
                name: None,
                email: None,
            },
            redial: true,
            enqueued_at: now_iso,
        };
        queue::enqueue(conn, &job)?;
        tracing::info!(
            agent_id = agent.id,
            phone = %callback.to_phone,
            "no-answer redial enqueued"
        );
        return Ok(true);
    }

    Ok(false)
}

/// Convenience for dashboards: recent logs for an agent.
pub fn recent_logs(
    conn: &rusqlite::Connection,
    agent_id: i64,
    limit: u32,
) -> Result<Vec<CallLog>, DispatchError> {
    history::recent_call_logs(conn, agent_id, limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::CreateAgentParams;
    use chrono::TimeZone;
    use dialhawk_db::run_migrations;
    use dialhawk_types::BotStatus;
    use rusqlite::Connection;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory db");
        run_migrations(&conn).expect("migrations");
        conn
    }

    fn running_agent(conn: &Connection) -> Agent {
        let agent = agents::create_agent(
            conn,
            &CreateAgentParams {
                name: "Ava".into(),
                dial_limit: 5,
                max_calls_per_contact: 2,
                call_time_start: 9,
                call_time_end: 17,
                call_days: vec!["monday".into()],
                double_dial_no_answer: true,
                timezone: "UTC".into(),
                ..CreateAgentParams::default()
            },
        )
        .unwrap();
        agents::set_bot_status(conn, agent.id, BotStatus::Running).unwrap();
        agents::get_agent(conn, agent.id).unwrap()
    }

    fn job_for(agent: &Agent, phone: &str) -> DialJob {
        DialJob {
            job_id: Uuid::new_v4().to_string(),
            agent_id: agent.id,
            lead: Lead {
                id: 1,
                phone: phone.into(),
                name: None,
                email: None,
            },
            redial: false,
            enqueued_at: "2025-06-02 10:00:00".into(),
        }
    }

    /// Monday 10:00 UTC.
    fn monday_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap()
    }

    #[test]
    fn authorize_admits_and_records_attempt_and_dial() {
        let conn = test_conn();
        let agent = running_agent(&conn);
        let job = job_for(&agent, "+15550001");

        match authorize_dial(&conn, &job, monday_morning()).unwrap() {
            DialVerdict::Proceed(a) => assert_eq!(a.id, agent.id),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(attempts::attempt_count(&conn, agent.id, "+15550001").unwrap(), 1);
        assert_eq!(history::dials_on(&conn, agent.id, "2025-06-02").unwrap(), 1);
    }

    #[test]
    fn authorize_skips_paused_agent_at_dequeue_time() {
        let conn = test_conn();
        let agent = running_agent(&conn);
        let job = job_for(&agent, "+15550001");

        // Agent paused after the job was enqueued.
        agents::set_bot_status(&conn, agent.id, BotStatus::Paused).unwrap();

        match authorize_dial(&conn, &job, monday_morning()).unwrap() {
            DialVerdict::Skip(SkipReason::BotNotRunning) => {}
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(attempts::attempt_count(&conn, agent.id, "+15550001").unwrap(), 0);
    }

    #[test]
    fn authorize_enforces_contact_cap() {
        let conn = test_conn();
        let agent = running_agent(&conn);
        let job = job_for(&agent, "+15550001");

        assert!(matches!(
            authorize_dial(&conn, &job, monday_morning()).unwrap(),
            DialVerdict::Proceed(_)
        ));
        assert!(matches!(
            authorize_dial(&conn, &job, monday_morning()).unwrap(),
            DialVerdict::Proceed(_)
        ));
        assert!(matches!(
            authorize_dial(&conn, &job, monday_morning()).unwrap(),
            DialVerdict::Skip(SkipReason::ContactLimitReached)
        ));
    }

    fn no_answer_callback(agent_id: i64) -> StatusCallback {
        StatusCallback {
            call_status: "no-answer".into(),
            agent_id,
            contact_id: Some(1),
            to_phone: "+15550001".into(),
            call_duration_seconds: 0,
        }
    }

    #[test]
    fn no_answer_redials_exactly_once() {
        let conn = test_conn();
        let agent = running_agent(&conn);
        let job = job_for(&agent, "+15550001");
        authorize_dial(&conn, &job, monday_morning()).unwrap();

        // First no-answer: one redial job appears.
        assert!(handle_status_callback(&conn, &no_answer_callback(agent.id), monday_morning()).unwrap());
        assert_eq!(queue::depth(&conn).unwrap(), 1);

        // Duplicate callback (or the redial also going unanswered):
        // no further jobs.
        assert!(!handle_status_callback(&conn, &no_answer_callback(agent.id), monday_morning()).unwrap());
        assert_eq!(queue::depth(&conn).unwrap(), 1);
    }

    #[test]
    fn completed_call_charges_minutes_and_logs() {
        let conn = test_conn();
        let agent = running_agent(&conn);
        let job = job_for(&agent, "+15550001");
        authorize_dial(&conn, &job, monday_morning()).unwrap();

        let callback = StatusCallback {
            call_status: "completed".into(),
            agent_id: agent.id,
            contact_id: Some(1),
            to_phone: "+15550001".into(),
            call_duration_seconds: 95,
        };
        assert!(!handle_status_callback(&conn, &callback, monday_morning()).unwrap());

        let fresh = agents::get_agent(&conn, agent.id).unwrap();
        assert_eq!(fresh.minutes_used, 2, "95 s rounds up to 2 minutes");

        let logs = history::recent_call_logs(&conn, agent.id, 10).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].call_outcome, CallStatus::Completed);

        let status: String = conn
            .query_row(
                "SELECT status FROM call_attempts WHERE agent_id = ?1",
                [agent.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(status, "completed");
    }

    #[test]
    fn non_terminal_statuses_are_ignored() {
        let conn = test_conn();
        let agent = running_agent(&conn);
        let callback = StatusCallback {
            call_status: "ringing".into(),
            agent_id: agent.id,
            contact_id: None,
            to_phone: "+15550001".into(),
            call_duration_seconds: 0,
        };
        assert!(!handle_status_callback(&conn, &callback, monday_morning()).unwrap());
        assert!(history::recent_call_logs(&conn, agent.id, 10).unwrap().is_empty());
    }
}
