//! Production implementations of the session and dispatch seams.
//!
//! The session and worker crates talk to traits; this module plugs in
//! the real upstream clients from `dialhawk-voice`, the telephony REST
//! API, the calendar webhook, and the dashboard-stat observer.

use async_trait::async_trait;
use chrono::Utc;
use dialhawk_db::DbPool;
use dialhawk_dispatch::{agent_local_clock, history, DispatchError, Telephony};
use dialhawk_session::{
    BookingSink, OutboundSink, ReplySource, SessionError, SessionObserver, Synthesizer,
    TranscriberFactory, TranscriberHandle,
};
use dialhawk_types::{Agent, BookingIntent, DialJob};
use dialhawk_voice::reply::{ChatTurn, ReplyEvent};
use dialhawk_voice::stt::{SttEvent, StreamParams};
use dialhawk_voice::{
    ReplyGenerator, SttConfig, SynthesisClient, TranscriberClient, VoiceError,
};
use serde_json::json;
use tokio::sync::mpsc;

use crate::config::TelephonyConfig;

// ---------------------------------------------------------------------
// Speech recognition
// ---------------------------------------------------------------------

/// Opens live transcription connections with the configured provider.
pub struct LiveTranscriberFactory {
    config: SttConfig,
}

impl LiveTranscriberFactory {
    pub fn new(config: SttConfig) -> Self {
        Self { config }
    }
}

struct LiveTranscriber(TranscriberClient);

#[async_trait]
impl TranscriberHandle for LiveTranscriber {
    async fn send(&mut self, chunk: &[u8]) -> Result<(), VoiceError> {
        self.0.send(chunk).await
    }

    async fn keepalive(&mut self) -> Result<(), VoiceError> {
        self.0.keepalive().await
    }

    async fn finish(self: Box<Self>) {
        self.0.finish().await;
    }
}

#[async_trait]
impl TranscriberFactory for LiveTranscriberFactory {
    async fn open(
        &self,
        params: &StreamParams,
    ) -> Result<(Box<dyn TranscriberHandle>, mpsc::Receiver<SttEvent>), VoiceError> {
        let (client, events) = TranscriberClient::start(&self.config, params).await?;
        Ok((Box::new(LiveTranscriber(client)), events))
    }
}

// ---------------------------------------------------------------------
// Reply generation and synthesis
// ---------------------------------------------------------------------

pub struct LiveReplySource(pub ReplyGenerator);

#[async_trait]
impl ReplySource for LiveReplySource {
    async fn stream_reply(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
    ) -> Result<mpsc::Receiver<ReplyEvent>, VoiceError> {
        self.0.stream_reply(system_prompt, turns).await
    }
}

pub struct LiveSynthesizer(pub SynthesisClient);

#[async_trait]
impl Synthesizer for LiveSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: Option<&str>,
    ) -> Result<Vec<u8>, VoiceError> {
        self.0.synthesize(text, voice_id).await
    }

    fn output_format(&self) -> &str {
        self.0.output_format()
    }
}

// ---------------------------------------------------------------------
// Calendar booking
// ---------------------------------------------------------------------

/// Forwards booking intents to the external calendar collaborator as a
/// webhook POST. An empty URL disables booking (logged, not an error).
pub struct CalendarWebhook {
    http: reqwest::Client,
    url: String,
}

impl CalendarWebhook {
    pub fn new(url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl BookingSink for CalendarWebhook {
    async fn book(&self, agent_id: Option<i64>, intent: BookingIntent) -> Result<(), String> {
        if self.url.is_empty() {
            tracing::info!(?agent_id, "booking intent dropped: no calendar webhook configured");
            return Ok(());
        }
        let response = self
            .http
            .post(&self.url)
            .json(&json!({
                "action": "book_calendar",
                "agentId": agent_id,
                "email": intent.email,
                "time": intent.time,
                "details": intent.details,
            }))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("calendar webhook returned {}", response.status()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Dashboard observer
// ---------------------------------------------------------------------

/// Writes session milestones into the dashboard counters. All DB work
/// is deferred to blocking tasks; failures are logged and swallowed —
/// losing a counter bump must not disturb a live call.
pub struct StatsObserver {
    pool: DbPool,
}

impl StatsObserver {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn record(&self, agent_id: i64, which: &'static str) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || -> Result<(), DispatchError> {
                let conn = pool.get()?;
                let agent = dialhawk_dispatch::agents::get_agent(&conn, agent_id)?;
                let clock = agent_local_clock(&agent, Utc::now());
                match which {
                    "conversation" => history::record_conversation(&conn, agent_id, &clock.date),
                    _ => history::record_appointment(&conn, agent_id, &clock.date),
                }
            })
            .await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(agent_id, "stat update failed: {e}"),
                Err(e) => tracing::warn!(agent_id, "stat task failed: {e}"),
            }
        });
    }
}

impl SessionObserver for StatsObserver {
    fn conversation_started(&self, agent_id: i64) {
        self.record(agent_id, "conversation");
    }

    fn appointment_booked(&self, agent_id: i64) {
        self.record(agent_id, "appointment");
    }
}

// ---------------------------------------------------------------------
// Telephony
// ---------------------------------------------------------------------

/// Places outbound calls through the provider's REST API. The provider
/// answers by fetching call instructions from `public_url` and streams
/// call audio into the `/ws` media endpoint.
pub struct RestTelephony {
    http: reqwest::Client,
    config: TelephonyConfig,
}

impl RestTelephony {
    pub fn new(config: TelephonyConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Telephony for RestTelephony {
    async fn place_call(&self, agent: &Agent, job: &DialJob) -> Result<String, DispatchError> {
        if job.lead.phone.is_empty() {
            return Err(DispatchError::Telephony("lead has no phone number".into()));
        }
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.config.api_url, self.config.account_sid
        );
        let instructions_url = format!(
            "{}/twiml?agentId={}&contactId={}",
            self.config.public_url, agent.id, job.lead.id
        );

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", job.lead.phone.as_str()),
                ("From", self.config.from_number.as_str()),
                ("Url", instructions_url.as_str()),
                ("Method", "POST"),
            ])
            .send()
            .await
            .map_err(|e| DispatchError::Telephony(format!("request failed: {e}")))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .unwrap_or_else(|_| json!({}));

        if !status.is_success() {
            return Err(DispatchError::Telephony(format!(
                "provider returned {status}: {body}"
            )));
        }

        Ok(body["sid"].as_str().unwrap_or("unknown").to_string())
    }
}

// ---------------------------------------------------------------------
// WebSocket outbound sink
// ---------------------------------------------------------------------

/// The send half of a media WebSocket as a session outbound sink.
pub struct WsOutbound {
    tx: futures_util::stream::SplitSink<axum::extract::ws::WebSocket, axum::extract::ws::Message>,
}

impl WsOutbound {
    pub fn new(
        tx: futures_util::stream::SplitSink<
            axum::extract::ws::WebSocket,
            axum::extract::ws::Message,
        >,
    ) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl OutboundSink for WsOutbound {
    async fn send_text(&mut self, frame: String) -> Result<(), SessionError> {
        use futures_util::SinkExt;
        self.tx
            .send(axum::extract::ws::Message::Text(frame.into()))
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))
    }

    async fn send_binary(&mut self, frame: Vec<u8>) -> Result<(), SessionError> {
        use futures_util::SinkExt;
        self.tx
            .send(axum::extract::ws::Message::Binary(frame.into()))
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))
    }
}
