//! Media stream endpoints: the WebSocket that carries call audio, and
//! the call-instructions document the telephony provider fetches when
//! an outbound call is answered.

use crate::wiring::WsOutbound;
use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Extension, Query};
use axum::response::{IntoResponse, Response};
use dialhawk_session::{decode_text_frame, Session, TransportEvent};
use dialhawk_types::Agent;
use futures_util::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Capacity of the inbound transport event channel. Telephony delivers
/// one media frame per 20 ms; 256 frames buffers several seconds of
/// processing lag before backpressure.
const TRANSPORT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(rename = "agentId")]
    pub agent_id: Option<i64>,
}

/// `GET /ws` — the bidirectional media stream. Telephony providers
/// speak JSON control frames; browsers send raw binary audio. The
/// session identifies which from the first event.
pub async fn media_ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    // Resolve the agent before upgrading so a bad agentId fails the
    // HTTP request instead of a silent socket close.
    let agent = match query.agent_id {
        None => None,
        Some(agent_id) => {
            let pool = state.pool.clone();
            let loaded = tokio::task::spawn_blocking(move || {
                let conn = pool.get().map_err(dialhawk_dispatch::DispatchError::from)?;
                dialhawk_dispatch::agents::get_agent(&conn, agent_id)
            })
            .await;
            match loaded {
                Ok(Ok(agent)) => Some(agent),
                Ok(Err(e)) => {
                    tracing::warn!(agent_id, "media stream for unknown agent: {e}");
                    return axum::http::StatusCode::NOT_FOUND.into_response();
                }
                Err(e) => {
                    tracing::error!("agent lookup task failed: {e}");
                    return axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            }
        }
    };

    ws.on_upgrade(move |socket| handle_media_socket(socket, state, agent))
}

/// Pumps the socket into a session: decode each frame once, forward the
/// tagged event, and let the state machine do the rest.
async fn handle_media_socket(socket: WebSocket, state: Arc<AppState>, agent: Option<Agent>) {
    let agent_id = agent.as_ref().map(|a| a.id);
    let (ws_tx, mut ws_rx) = socket.split();

    let session = Session::new(
        agent,
        state.session_deps.clone(),
        state.session_config.clone(),
        WsOutbound::new(ws_tx),
    );
    let session_id = session.id().to_string();
    tracing::info!(session = %session_id, ?agent_id, "media stream connected");

    let (event_tx, event_rx) = mpsc::channel(TRANSPORT_CHANNEL_CAPACITY);
    let session_task = tokio::spawn(session.run(event_rx));

    while let Some(Ok(message)) = ws_rx.next().await {
        let event = match message {
            Message::Text(text) => match decode_text_frame(text.as_ref()) {
                Some(control) => TransportEvent::Control(control),
                None => continue, // dropped with a log inside the decoder
            },
            Message::Binary(audio) => TransportEvent::BrowserMedia(audio.to_vec()),
            Message::Close(_) => break,
            _ => continue,
        };
        if event_tx.send(event).await.is_err() {
            break; // session ended first (fatal error or stop event)
        }
    }

    // Dropping the sender closes the session's transport channel; the
    // state machine tears down timers and the transcription connection.
    drop(event_tx);
    match session_task.await {
        Ok(Ok(())) => tracing::info!(session = %session_id, "media stream closed"),
        Ok(Err(e)) => tracing::warn!(session = %session_id, "session ended with error: {e}"),
        Err(e) => tracing::error!(session = %session_id, "session task panicked: {e}"),
    }
}

#[derive(Debug, Deserialize)]
pub struct TwimlQuery {
    #[serde(rename = "agentId")]
    pub agent_id: Option<i64>,
    #[serde(rename = "contactId")]
    pub contact_id: Option<i64>,
}

/// `POST /twiml` — call instructions for an answered outbound call:
/// connect the call's audio to our media WebSocket and keep the line
/// open.
pub async fn twiml_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<TwimlQuery>,
) -> Response {
    let ws_base = state
        .public_url
        .replace("https://", "wss://")
        .replace("http://", "ws://");
    let agent_param = query
        .agent_id
        .map(|id| format!("?agentId={id}"))
        .unwrap_or_default();
    let status_url = format!("{}/api/calls/status", state.public_url);

    let twiml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Connect>
    <Stream url="{ws_base}/ws{agent_param}" statusCallback="{status_url}" statusCallbackMethod="POST">
      <Parameter name="contactId" value="{contact}"/>
    </Stream>
  </Connect>
  <Pause length="120"/>
</Response>"#,
        contact = query.contact_id.unwrap_or(0),
    );

    (
        [(axum::http::header::CONTENT_TYPE, "text/xml")],
        twiml,
    )
        .into_response()
}
