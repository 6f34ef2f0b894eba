//! Dialhawk server library logic.

pub mod api_agents;
pub mod api_dispatch;
pub mod api_stream;
pub mod config;
pub mod wiring;

use axum::{
    routing::{get, post},
    Extension, Json, Router,
};
use dialhawk_db::DbPool;
use dialhawk_dispatch::{DbLeadSource, LeadSource};
use dialhawk_session::{SessionConfig, SessionDeps};
use dialhawk_voice::{ReplyGenerator, SynthesisClient, VoiceError};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use wiring::{
    CalendarWebhook, LiveReplySource, LiveSynthesizer, LiveTranscriberFactory, StatsObserver,
};

/// Application state shared across all request handlers.
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Collaborators handed to every new session.
    pub session_deps: SessionDeps,
    /// Session tunables.
    pub session_config: SessionConfig,
    /// Where dial candidates come from.
    pub lead_source: Arc<dyn LeadSource>,
    /// Public base URL, used in call-instruction documents.
    pub public_url: String,
}

/// Builds the application state from configuration: the real upstream
/// clients wired into the session seams, and the DB-backed lead source.
pub fn build_state(config: &Config, pool: DbPool) -> Result<AppState, VoiceError> {
    let session_deps = SessionDeps {
        transcribers: Arc::new(LiveTranscriberFactory::new(config.stt.clone())),
        replies: Arc::new(LiveReplySource(ReplyGenerator::new(config.reply.clone())?)),
        synthesis: Arc::new(LiveSynthesizer(SynthesisClient::new(config.tts.clone())?)),
        booking: Arc::new(CalendarWebhook::new(config.booking_url.clone())),
        observer: Arc::new(StatsObserver::new(pool.clone())),
    };

    Ok(AppState {
        pool: pool.clone(),
        session_deps,
        session_config: SessionConfig::default(),
        lead_source: Arc::new(DbLeadSource::new(pool)),
        public_url: config.telephony.public_url.clone(),
    })
}

/// Health check handler.
///
/// Returns `200 OK` with server status and version. Used by load
/// balancers, monitoring, and CI to verify the server is running.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/agents",
            post(api_agents::create_agent_handler).get(api_agents::list_agents_handler),
        )
        .route("/api/agents/{agentId}", get(api_agents::get_agent_handler))
        .route(
            "/api/agents/{agentId}/start",
            post(api_agents::start_agent_handler),
        )
        .route(
            "/api/agents/{agentId}/pause",
            post(api_agents::pause_agent_handler),
        )
        .route(
            "/api/agents/{agentId}/stop",
            post(api_agents::stop_agent_handler),
        )
        .route(
            "/api/agents/{agentId}/leads",
            post(api_agents::load_leads_handler),
        )
        .route(
            "/api/agents/{agentId}/stats",
            get(api_agents::agent_stats_handler),
        )
        .route(
            "/api/agents/{agentId}/logs",
            get(api_agents::agent_logs_handler),
        )
        .route("/api/queue/depth", get(api_dispatch::queue_depth_handler))
        .route(
            "/api/calls/status",
            post(api_dispatch::status_callback_handler),
        )
        .route("/twiml", post(api_stream::twiml_handler))
        .route("/ws", get(api_stream::media_ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
