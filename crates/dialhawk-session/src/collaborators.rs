//! Collaborator seams of the session pipeline.
//!
//! The session state machine drives four external services. Each is an
//! object-safe async trait so tests can substitute fakes and the server
//! can wire the real clients from `dialhawk-voice`; the boundary types
//! (`SttEvent`, `ReplyEvent`, `VoiceError`) are shared with that crate.

use crate::error::SessionError;
use async_trait::async_trait;
use dialhawk_types::BookingIntent;
use dialhawk_voice::reply::{ChatTurn, ReplyEvent};
use dialhawk_voice::stt::{SttEvent, StreamParams};
use dialhawk_voice::VoiceError;
use std::sync::Arc;
use tokio::sync::mpsc;

/// An open transcription connection owned by one session.
#[async_trait]
pub trait TranscriberHandle: Send {
    async fn send(&mut self, chunk: &[u8]) -> Result<(), VoiceError>;
    async fn keepalive(&mut self) -> Result<(), VoiceError>;
    /// Flushes and closes. Best-effort by design; failures are the
    /// implementation's to log.
    async fn finish(self: Box<Self>);
}

/// Opens transcription connections. The session calls this once at
/// stream start and once more if the connection drops (single retry).
#[async_trait]
pub trait TranscriberFactory: Send + Sync {
    async fn open(
        &self,
        params: &StreamParams,
    ) -> Result<(Box<dyn TranscriberHandle>, mpsc::Receiver<SttEvent>), VoiceError>;
}

/// Streams reply tokens for one conversational turn.
#[async_trait]
pub trait ReplySource: Send + Sync {
    async fn stream_reply(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
    ) -> Result<mpsc::Receiver<ReplyEvent>, VoiceError>;
}

/// Synthesizes one flushed text fragment.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice_id: Option<&str>)
        -> Result<Vec<u8>, VoiceError>;

    /// Encoding of the returned audio (`ulaw_8000`, `pcm_8000`, ...).
    fn output_format(&self) -> &str;
}

/// The external calendar-booking collaborator. Invoked at most once per
/// reply when the generator surfaces a booking intent.
#[async_trait]
pub trait BookingSink: Send + Sync {
    async fn book(&self, agent_id: Option<i64>, intent: BookingIntent) -> Result<(), String>;
}

/// Observability hooks the session fires for dashboard counters.
/// Implementations must be cheap and non-blocking; failures are theirs
/// to log.
pub trait SessionObserver: Send + Sync {
    /// First final transcript of the session arrived — a conversation
    /// actually happened.
    fn conversation_started(&self, agent_id: i64);

    /// A booking intent was forwarded to the calendar collaborator.
    fn appointment_booked(&self, agent_id: i64);
}

/// No-op observer for sessions without an associated agent.
pub struct NullObserver;

impl SessionObserver for NullObserver {
    fn conversation_started(&self, _agent_id: i64) {}
    fn appointment_booked(&self, _agent_id: i64) {}
}

/// The outbound half of the transport: JSON frames for telephony,
/// binary frames for browsers.
#[async_trait]
pub trait OutboundSink: Send {
    async fn send_text(&mut self, frame: String) -> Result<(), SessionError>;
    async fn send_binary(&mut self, frame: Vec<u8>) -> Result<(), SessionError>;
}

/// Everything a session needs besides its transport.
#[derive(Clone)]
pub struct SessionDeps {
    pub transcribers: Arc<dyn TranscriberFactory>,
    pub replies: Arc<dyn ReplySource>,
    pub synthesis: Arc<dyn Synthesizer>,
    pub booking: Arc<dyn BookingSink>,
    pub observer: Arc<dyn SessionObserver>,
}
