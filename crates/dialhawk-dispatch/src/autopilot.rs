//! The autopilot sweep: periodically fetch leads for every running
//! agent inside its calling window and enqueue dial jobs.
//!
//! This is the coarse admission pass — read-only checks that keep
//! obviously inadmissible candidates out of the queue. The call worker
//! repeats admission authoritatively before dialing, so a candidate
//! that becomes inadmissible while queued is still caught.

use crate::admission::{agent_local_clock, check_admission, Admission};
use crate::error::DispatchError;
use crate::leads::LeadSource;
use crate::time::sql_timestamp;
use crate::{agents, queue};
use chrono::Utc;
use dialhawk_db::DbPool;
use dialhawk_types::{Agent, DialJob, Lead};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use uuid::Uuid;

/// Enqueues every admissible lead for one agent. Returns the number of
/// jobs enqueued. Used by both the sweep and the queue-start API.
pub fn enqueue_admissible_leads(
    conn: &rusqlite::Connection,
    agent: &Agent,
    leads: &[Lead],
) -> Result<usize, DispatchError> {
    let clock = agent_local_clock(agent, Utc::now());
    let mut enqueued = 0;

    for lead in leads {
        if lead.phone.is_empty() {
            tracing::debug!(agent_id = agent.id, lead_id = lead.id, "lead has no phone, skipped");
            continue;
        }
        match check_admission(conn, agent, &lead.phone, &clock)? {
            Admission::Admit => {
                let job = DialJob {
                    job_id: Uuid::new_v4().to_string(),
                    agent_id: agent.id,
                    lead: lead.clone(),
                    redial: false,
                    enqueued_at: sql_timestamp(Utc::now()),
                };
                queue::enqueue(conn, &job)?;
                enqueued += 1;
            }
            Admission::Skip(reason) => {
                tracing::debug!(
                    agent_id = agent.id,
                    phone = %lead.phone,
                    reason = reason.as_str(),
                    "lead not admissible at enqueue"
                );
            }
        }
    }
    Ok(enqueued)
}

/// One sweep over all running agents. Returns total jobs enqueued.
pub async fn run_sweep(
    pool: &DbPool,
    lead_source: &Arc<dyn LeadSource>,
) -> Result<usize, DispatchError> {
    let pool_for_list = pool.clone();
    let running = tokio::task::spawn_blocking(move || {
        let conn = pool_for_list.get()?;
        agents::list_running_agents(&conn)
    })
    .await
    .map_err(|e| DispatchError::Pool(format!("agent list task failed: {e}")))??;

    let mut total = 0;
    for agent in running {
        let leads = match lead_source.fetch_leads(agent.id).await {
            Ok(leads) => leads,
            Err(e) => {
                tracing::warn!(agent_id = agent.id, "lead fetch failed: {e}");
                continue;
            }
        };
        if leads.is_empty() {
            continue;
        }

        let pool_for_agent = pool.clone();
        let enqueued = tokio::task::spawn_blocking(move || {
            let conn = pool_for_agent.get()?;
            enqueue_admissible_leads(&conn, &agent, &leads)
        })
        .await
        .map_err(|e| DispatchError::Pool(format!("enqueue task failed: {e}")))??;

        total += enqueued;
    }
    Ok(total)
}

/// Starts the autopilot background task. Runs indefinitely; failures
/// are logged and the next sweep proceeds.
pub async fn start_autopilot_task(
    pool: DbPool,
    lead_source: Arc<dyn LeadSource>,
    interval_seconds: u64,
) {
    if interval_seconds == 0 {
        tracing::warn!("autopilot task disabled (interval=0)");
        return;
    }
    let interval = Duration::from_secs(interval_seconds);
    tracing::info!(interval_seconds, "starting autopilot sweep task");

    loop {
        sleep(interval).await;
        match run_sweep(&pool, &lead_source).await {
            Ok(0) => tracing::debug!("autopilot sweep enqueued nothing"),
            Ok(count) => tracing::info!(count, "autopilot sweep enqueued dial jobs"),
            Err(e) => tracing::error!("autopilot sweep failed: {e}"),
        }
    }
}
