//! Agent configuration and bot-control API handlers.

use crate::AppState;
use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use dialhawk_dispatch::{agents, autopilot, history, leads, worker, CreateAgentParams, DispatchError};
use dialhawk_types::{Agent, BotStatus, CallLog, DashboardStat};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Maps a dispatch error onto an HTTP status.
fn error_response(e: DispatchError) -> (StatusCode, Json<Value>) {
    let status = match e {
        DispatchError::AgentNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": e.to_string() })))
}

/// Runs a closure against a pooled connection on the blocking pool.
async fn with_conn<T, F>(state: &Arc<AppState>, f: F) -> Result<T, (StatusCode, Json<Value>)>
where
    T: Send + 'static,
    F: FnOnce(&rusqlite::Connection) -> Result<T, DispatchError> + Send + 'static,
{
    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(DispatchError::from)?;
        f(&conn)
    })
    .await
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": format!("task failed: {e}") })),
        )
    })?
    .map_err(error_response)
}

#[derive(Debug, Deserialize)]
pub struct CreateAgentRequest {
    pub name: String,
    #[serde(default)]
    pub prompt_script: String,
    #[serde(default = "default_dial_limit")]
    pub dial_limit: u32,
    #[serde(default = "default_max_calls")]
    pub max_calls_per_contact: u32,
    #[serde(default = "default_call_start")]
    pub call_time_start: u32,
    #[serde(default = "default_call_end")]
    pub call_time_end: u32,
    #[serde(default)]
    pub call_days: Vec<String>,
    #[serde(default)]
    pub double_dial_no_answer: bool,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default = "default_minutes_cap")]
    pub minutes_cap: u32,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_dial_limit() -> u32 {
    50
}
fn default_max_calls() -> u32 {
    2
}
fn default_call_start() -> u32 {
    9
}
fn default_call_end() -> u32 {
    17
}
fn default_minutes_cap() -> u32 {
    500
}
fn default_timezone() -> String {
    "America/New_York".to_string()
}

/// `POST /api/agents`
pub async fn create_agent_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<CreateAgentRequest>,
) -> Result<Json<Agent>, (StatusCode, Json<Value>)> {
    if request.name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "agent name is required" })),
        ));
    }
    let params = CreateAgentParams {
        name: request.name,
        prompt_script: request.prompt_script,
        dial_limit: request.dial_limit,
        max_calls_per_contact: request.max_calls_per_contact,
        call_time_start: request.call_time_start,
        call_time_end: request.call_time_end,
        call_days: request.call_days.iter().map(|d| d.to_lowercase()).collect(),
        double_dial_no_answer: request.double_dial_no_answer,
        voice_id: request.voice_id,
        minutes_cap: request.minutes_cap,
        timezone: request.timezone,
    };
    let agent = with_conn(&state, move |conn| agents::create_agent(conn, &params)).await?;
    Ok(Json(agent))
}

/// `GET /api/agents`
pub async fn list_agents_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<Agent>>, (StatusCode, Json<Value>)> {
    let all = with_conn(&state, agents::list_agents).await?;
    Ok(Json(all))
}

/// `GET /api/agents/{agentId}`
pub async fn get_agent_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(agent_id): Path<i64>,
) -> Result<Json<Agent>, (StatusCode, Json<Value>)> {
    let agent = with_conn(&state, move |conn| agents::get_agent(conn, agent_id)).await?;
    Ok(Json(agent))
}

/// `POST /api/agents/{agentId}/start` — marks the bot running and
/// enqueues the agent's admissible leads (the coarse pass).
pub async fn start_agent_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(agent_id): Path<i64>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let agent = with_conn(&state, move |conn| {
        agents::set_bot_status(conn, agent_id, BotStatus::Running)?;
        agents::get_agent(conn, agent_id)
    })
    .await?;

    let fetched = state
        .lead_source
        .fetch_leads(agent.id)
        .await
        .map_err(error_response)?;

    let queued = with_conn(&state, move |conn| {
        autopilot::enqueue_admissible_leads(conn, &agent, &fetched)
    })
    .await?;

    Ok(Json(json!({ "status": "running", "queued": queued })))
}

/// `POST /api/agents/{agentId}/pause`
pub async fn pause_agent_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(agent_id): Path<i64>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    with_conn(&state, move |conn| {
        agents::set_bot_status(conn, agent_id, BotStatus::Paused)
    })
    .await?;
    Ok(Json(json!({ "status": "paused" })))
}

/// `POST /api/agents/{agentId}/stop`
pub async fn stop_agent_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(agent_id): Path<i64>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    with_conn(&state, move |conn| {
        agents::set_bot_status(conn, agent_id, BotStatus::Stopped)
    })
    .await?;
    Ok(Json(json!({ "status": "stopped" })))
}

#[derive(Debug, Deserialize)]
pub struct LeadRequest {
    pub phone: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// `POST /api/agents/{agentId}/leads` — loads a lead list for the agent.
pub async fn load_leads_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(agent_id): Path<i64>,
    Json(requests): Json<Vec<LeadRequest>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let loaded = with_conn(&state, move |conn| {
        // Agent must exist before leads attach to it.
        agents::get_agent(conn, agent_id)?;
        let mut loaded = 0usize;
        for lead in &requests {
            if lead.phone.trim().is_empty() {
                continue;
            }
            leads::insert_lead(
                conn,
                agent_id,
                lead.phone.trim(),
                lead.name.as_deref(),
                lead.email.as_deref(),
            )?;
            loaded += 1;
        }
        Ok(loaded)
    })
    .await?;
    Ok(Json(json!({ "loaded": loaded })))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// `YYYY-MM-DD`; defaults to the agent's local date.
    pub date: Option<String>,
}

/// `GET /api/agents/{agentId}/stats`
pub async fn agent_stats_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(agent_id): Path<i64>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Option<DashboardStat>>, (StatusCode, Json<Value>)> {
    let stat = with_conn(&state, move |conn| {
        let agent = agents::get_agent(conn, agent_id)?;
        let date = query.date.unwrap_or_else(|| {
            dialhawk_dispatch::agent_local_clock(&agent, Utc::now()).date
        });
        history::get_stat(conn, agent_id, &date)
    })
    .await?;
    Ok(Json(stat))
}

/// `GET /api/agents/{agentId}/logs`
pub async fn agent_logs_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(agent_id): Path<i64>,
) -> Result<Json<Vec<CallLog>>, (StatusCode, Json<Value>)> {
    let logs = with_conn(&state, move |conn| {
        agents::get_agent(conn, agent_id)?;
        worker::recent_logs(conn, agent_id, 50)
    })
    .await?;
    Ok(Json(logs))
}
