//! The per-call session state machine.
//!
//! One `Session` owns one live audio connection: it identifies the
//! transport from the first event, opens the transcription connection,
//! forwards inbound audio, and — on each completed utterance — runs the
//! reply pipeline (generate → synthesize → transcode → pace out).
//!
//! The session runs as a single task; the only concurrent piece is the
//! reply pipeline, which is spawned so inbound audio keeps flowing
//! while the agent talks. The `responding` flag (an atomic, not a lock
//! — there is exactly one task that checks it) guarantees at most one
//! reply is in flight; transcripts arriving mid-reply become context
//! for the next turn instead of triggering a second pipeline.

use crate::collaborators::{OutboundSink, SessionDeps};
use crate::error::SessionError;
use crate::message::{decode_media_payload, encode_media_frame, ControlMessage, TransportEvent};
use dialhawk_audio::{encode_mulaw, silence_buffer};
use dialhawk_types::Agent;
use dialhawk_voice::reply::{should_flush, ChatTurn, ReplyEvent};
use dialhawk_voice::stt::{SttEvent, StreamParams};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use uuid::Uuid;

/// Tunables for one session. The defaults are the production values;
/// tests shrink the time constants.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often the idle timer checks for inbound silence.
    pub idle_check_interval_ms: u64,
    /// Inbound quiet gap after which silence is injected.
    pub idle_silence_threshold_ms: u64,
    /// Length of the injected silence buffer. Must exceed the
    /// provider's utterance-end gap or the endpoint never fires.
    pub injected_silence_ms: u64,
    /// Trailing silence flushed into the transcriber at teardown.
    pub trailing_silence_ms: u64,
    /// Outbound chunk size in bytes (160 ≈ 20 ms of 8 kHz mu-law).
    pub chunk_bytes: usize,
    /// Pacing interval between outbound chunks.
    pub chunk_interval_ms: u64,
    /// Keepalive cadence for an idle transcription connection.
    pub keepalive_interval_secs: u64,
    /// Spoken when the reply pipeline fails; the caller is never left
    /// in silence.
    pub apology_line: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_check_interval_ms: 250,
            idle_silence_threshold_ms: 1_000,
            injected_silence_ms: 1_000,
            trailing_silence_ms: 200,
            chunk_bytes: 160,
            chunk_interval_ms: 20,
            keepalive_interval_secs: dialhawk_voice::KEEPALIVE_INTERVAL_SECS,
            apology_line: "I'm sorry, I'm having a little trouble right now. \
                           Could you say that again?"
                .to_string(),
        }
    }
}

/// Transport flavor, determined from the first event on the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Telephony,
    Browser,
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection open, transport type unknown.
    Idle,
    /// Transport identified, transcription not yet streaming.
    Identified,
    /// Audio flowing to the transcriber.
    Streaming,
    /// A reply is being generated/synthesized/sent.
    Responding,
    Closed,
}

/// Result of one spawned reply pipeline, reported back to the session
/// task so the conversation context stays single-writer.
struct ReplyOutcome {
    assistant_text: Option<String>,
}

enum Flow {
    Continue,
    Stop,
}

enum Wake {
    Transport(Option<TransportEvent>),
    Stt(Option<SttEvent>),
    ReplyDone(Option<ReplyOutcome>),
    IdleTick,
    KeepaliveTick,
}

/// One live audio session.
pub struct Session<S: OutboundSink + 'static> {
    id: String,
    agent: Option<Agent>,
    config: SessionConfig,
    deps: SessionDeps,
    sink: Arc<Mutex<S>>,

    state: SessionState,
    kind: Option<TransportKind>,
    stream_sid: Option<String>,

    transcriber: Option<Box<dyn crate::collaborators::TranscriberHandle>>,
    stt_events: Option<mpsc::Receiver<SttEvent>>,
    stt_params: Option<StreamParams>,
    stt_retry_used: bool,
    keepalive_failures: u32,

    responding: Arc<AtomicBool>,
    chunk_counter: Arc<AtomicU64>,
    reply_task: Option<JoinHandle<()>>,
    reply_done_tx: mpsc::Sender<ReplyOutcome>,
    reply_done_rx: Option<mpsc::Receiver<ReplyOutcome>>,

    last_audio_at: Instant,
    silence_injected: bool,
    pending_utterance: String,
    turns: Vec<ChatTurn>,
    conversation_seen: bool,
}

impl<S: OutboundSink + 'static> Session<S> {
    pub fn new(agent: Option<Agent>, deps: SessionDeps, config: SessionConfig, sink: S) -> Self {
        // Capacity 1 is enough: at most one reply pipeline exists.
        let (reply_done_tx, reply_done_rx) = mpsc::channel(1);
        Self {
            id: Uuid::new_v4().to_string(),
            agent,
            config,
            deps,
            sink: Arc::new(Mutex::new(sink)),
            state: SessionState::Idle,
            kind: None,
            stream_sid: None,
            transcriber: None,
            stt_events: None,
            stt_params: None,
            stt_retry_used: false,
            keepalive_failures: 0,
            responding: Arc::new(AtomicBool::new(false)),
            chunk_counter: Arc::new(AtomicU64::new(0)),
            reply_task: None,
            reply_done_tx,
            reply_done_rx: Some(reply_done_rx),
            last_audio_at: Instant::now(),
            silence_injected: false,
            pending_utterance: String::new(),
            turns: Vec::new(),
            conversation_seen: false,
        }
    }

    /// Current lifecycle state, `Responding` while a reply is in flight.
    pub fn state(&self) -> SessionState {
        if self.responding.load(Ordering::SeqCst) && self.state == SessionState::Streaming {
            SessionState::Responding
        } else {
            self.state
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Drives the session until the transport closes or a fatal error
    /// occurs. Consumes the session; all timers and the in-flight reply
    /// pipeline die with it.
    pub async fn run(
        mut self,
        mut transport_rx: mpsc::Receiver<TransportEvent>,
    ) -> Result<(), SessionError> {
        let mut reply_done_rx = self
            .reply_done_rx
            .take()
            .expect("run() is called exactly once");

        let mut idle_tick = interval(Duration::from_millis(self.config.idle_check_interval_ms));
        idle_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut keepalive_tick = interval(Duration::from_secs(self.config.keepalive_interval_secs));
        keepalive_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            let wake = tokio::select! {
                m = transport_rx.recv() => Wake::Transport(m),
                m = maybe_recv(&mut self.stt_events) => Wake::Stt(m),
                m = reply_done_rx.recv() => Wake::ReplyDone(m),
                _ = idle_tick.tick() => Wake::IdleTick,
                _ = keepalive_tick.tick() => Wake::KeepaliveTick,
            };

            match wake {
                Wake::Transport(None) => break Ok(()),
                Wake::Transport(Some(event)) => match self.on_transport(event).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Stop) => break Ok(()),
                    Err(e) => break Err(e),
                },
                Wake::Stt(event) => {
                    if let Err(e) = self.on_stt(event).await {
                        break Err(e);
                    }
                }
                Wake::ReplyDone(outcome) => {
                    if let Some(ReplyOutcome {
                        assistant_text: Some(text),
                    }) = outcome
                    {
                        self.turns.push(ChatTurn::assistant(text));
                    }
                    self.reply_task = None;
                }
                Wake::IdleTick => self.check_idle_silence().await,
                Wake::KeepaliveTick => {
                    if let Err(e) = self.keepalive_if_idle().await {
                        break Err(e);
                    }
                }
            }
        };

        self.shutdown().await;
        result
    }

    async fn on_transport(&mut self, event: TransportEvent) -> Result<Flow, SessionError> {
        match event {
            TransportEvent::Control(ControlMessage::Connected) => {
                tracing::info!(session = %self.id, "media stream connected");
                Ok(Flow::Continue)
            }
            TransportEvent::Control(ControlMessage::Start { stream_sid }) => {
                if self.kind.is_some() {
                    tracing::debug!(session = %self.id, "duplicate start event dropped");
                    return Ok(Flow::Continue);
                }
                tracing::info!(session = %self.id, stream_sid = %stream_sid, "telephony stream started");
                self.kind = Some(TransportKind::Telephony);
                self.stream_sid = Some(stream_sid);
                self.state = SessionState::Identified;
                self.open_transcriber(StreamParams::telephony()).await?;
                self.state = SessionState::Streaming;
                self.speak_greeting();
                Ok(Flow::Continue)
            }
            TransportEvent::Control(ControlMessage::Media { payload, .. }) => {
                if self.kind != Some(TransportKind::Telephony) {
                    tracing::debug!(session = %self.id, "media before start dropped");
                    return Ok(Flow::Continue);
                }
                let audio = decode_media_payload(&payload);
                if !audio.is_empty() {
                    self.forward_audio(&audio).await?;
                }
                Ok(Flow::Continue)
            }
            TransportEvent::Control(ControlMessage::Stop) => {
                tracing::info!(session = %self.id, "stop event received");
                Ok(Flow::Stop)
            }
            TransportEvent::BrowserMedia(audio) => {
                if self.kind.is_none() {
                    tracing::info!(session = %self.id, "browser stream identified");
                    self.kind = Some(TransportKind::Browser);
                    self.state = SessionState::Identified;
                    self.open_transcriber(StreamParams::browser()).await?;
                    self.state = SessionState::Streaming;
                }
                if self.kind == Some(TransportKind::Browser) && !audio.is_empty() {
                    self.forward_audio(&audio).await?;
                }
                Ok(Flow::Continue)
            }
        }
    }

    /// Forwards one inbound audio buffer to the transcriber and marks
    /// the stream active again.
    async fn forward_audio(&mut self, audio: &[u8]) -> Result<(), SessionError> {
        self.last_audio_at = Instant::now();
        self.silence_injected = false;

        let Some(transcriber) = self.transcriber.as_mut() else {
            return Ok(());
        };
        if let Err(e) = transcriber.send(audio).await {
            tracing::warn!(session = %self.id, "transcriber send failed: {e}");
            self.reconnect_stt(e.to_string()).await?;
        }
        Ok(())
    }

    async fn on_stt(&mut self, event: Option<SttEvent>) -> Result<(), SessionError> {
        match event {
            None => {
                // Reader task ended without a close event.
                self.stt_events = None;
                self.reconnect_stt("event channel closed".to_string()).await
            }
            Some(SttEvent::Transcript(t)) => {
                if !t.is_final && !t.text.is_empty() {
                    // Interim results are advisory only.
                    tracing::trace!(session = %self.id, text = %t.text, "interim transcript");
                }
                if t.is_final && !t.text.trim().is_empty() {
                    if !self.pending_utterance.is_empty() {
                        self.pending_utterance.push(' ');
                    }
                    self.pending_utterance.push_str(t.text.trim());
                    self.mark_conversation();
                }
                if t.utterance_end && !self.pending_utterance.trim().is_empty() {
                    let utterance = std::mem::take(&mut self.pending_utterance);
                    tracing::info!(session = %self.id, utterance = %utterance, "utterance complete");
                    self.turns.push(ChatTurn::user(utterance));
                    self.try_start_reply();
                }
                Ok(())
            }
            Some(SttEvent::Error(e)) => {
                tracing::warn!(session = %self.id, "transcription error: {e}");
                self.stt_events = None;
                self.reconnect_stt(e).await
            }
            Some(SttEvent::Closed) => {
                tracing::warn!(session = %self.id, "transcription connection closed by remote");
                self.stt_events = None;
                self.reconnect_stt("closed by remote".to_string()).await
            }
        }
    }

    fn mark_conversation(&mut self) {
        if self.conversation_seen {
            return;
        }
        self.conversation_seen = true;
        if let Some(agent) = &self.agent {
            self.deps.observer.conversation_started(agent.id);
        }
    }

    /// Opens the transcription connection for the current transport.
    /// One extra attempt is allowed over the session's lifetime; after
    /// that, failure is fatal.
    async fn open_transcriber(&mut self, params: StreamParams) -> Result<(), SessionError> {
        match self.deps.transcribers.open(&params).await {
            Ok((handle, events)) => {
                self.transcriber = Some(handle);
                self.stt_events = Some(events);
                self.stt_params = Some(params);
                Ok(())
            }
            Err(e) => {
                if self.stt_retry_used {
                    return Err(SessionError::TranscriptionLost(e.to_string()));
                }
                self.stt_retry_used = true;
                tracing::warn!(session = %self.id, "transcriber open failed, retrying once: {e}");
                let (handle, events) = self
                    .deps
                    .transcribers
                    .open(&params)
                    .await
                    .map_err(|e| SessionError::TranscriptionLost(e.to_string()))?;
                self.transcriber = Some(handle);
                self.stt_events = Some(events);
                self.stt_params = Some(params);
                Ok(())
            }
        }
    }

    /// Replaces a failed transcription connection. The single retry
    /// budget is shared with `open_transcriber`; a second failure
    /// surfaces a fatal session error.
    async fn reconnect_stt(&mut self, reason: String) -> Result<(), SessionError> {
        if self.stt_retry_used {
            return Err(SessionError::TranscriptionLost(reason));
        }
        self.stt_retry_used = true;
        let Some(params) = self.stt_params.clone() else {
            // Nothing was ever open; losing the channel is not fatal.
            return Ok(());
        };
        tracing::info!(session = %self.id, "reopening transcription connection");
        self.transcriber = None;
        let (handle, events) = self
            .deps
            .transcribers
            .open(&params)
            .await
            .map_err(|e| SessionError::TranscriptionLost(format!("{reason}; retry failed: {e}")))?;
        self.transcriber = Some(handle);
        self.stt_events = Some(events);
        Ok(())
    }

    /// Injects silence into the transcriber after a quiet gap so the
    /// remote endpointer emits an utterance boundary. Telephony audio
    /// has no natural end marker; this is the deliberate affordance
    /// that closes each turn.
    async fn check_idle_silence(&mut self) {
        if self.kind != Some(TransportKind::Telephony)
            || self.silence_injected
            || self.transcriber.is_none()
            || self.state != SessionState::Streaming
        {
            return;
        }
        if self.last_audio_at.elapsed()
            < Duration::from_millis(self.config.idle_silence_threshold_ms)
        {
            return;
        }

        let buffer = silence_buffer(self.config.injected_silence_ms as u32, 8_000);
        if let Some(transcriber) = self.transcriber.as_mut() {
            if let Err(e) = transcriber.send(&buffer).await {
                tracing::debug!(session = %self.id, "silence injection failed: {e}");
            } else {
                tracing::debug!(session = %self.id, "injected {} ms of silence", self.config.injected_silence_ms);
            }
        }
        self.silence_injected = true;
    }

    /// Sends a keepalive while no audio is flowing. Two consecutive
    /// failures force a reconnect (which consumes the single retry).
    async fn keepalive_if_idle(&mut self) -> Result<(), SessionError> {
        if self.last_audio_at.elapsed() < Duration::from_secs(self.config.keepalive_interval_secs)
        {
            return Ok(());
        }
        let Some(transcriber) = self.transcriber.as_mut() else {
            return Ok(());
        };
        match transcriber.keepalive().await {
            Ok(()) => {
                self.keepalive_failures = 0;
                Ok(())
            }
            Err(e) => {
                self.keepalive_failures += 1;
                tracing::warn!(
                    session = %self.id,
                    failures = self.keepalive_failures,
                    "keepalive failed: {e}"
                );
                if self.keepalive_failures >= 2 {
                    self.keepalive_failures = 0;
                    self.reconnect_stt(format!("keepalive failed: {e}")).await
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Starts the reply pipeline for the buffered conversation unless
    /// one is already in flight.
    fn try_start_reply(&mut self) {
        if self.responding.swap(true, Ordering::SeqCst) {
            tracing::debug!(
                session = %self.id,
                "reply already in flight; transcript kept as context only"
            );
            return;
        }
        self.spawn_reply(ReplyWork::Generate {
            turns: self.turns.clone(),
        });
    }

    /// Speaks the agent's opening line when a telephony stream starts.
    fn speak_greeting(&mut self) {
        let Some(agent) = &self.agent else { return };
        let Some(line) = opening_line(&agent.prompt_script) else {
            return;
        };
        if self.responding.swap(true, Ordering::SeqCst) {
            return;
        }
        self.spawn_reply(ReplyWork::Speak { text: line });
    }

    fn spawn_reply(&mut self, work: ReplyWork) {
        let job = ReplyJob {
            session_id: self.id.clone(),
            agent_id: self.agent.as_ref().map(|a| a.id),
            prompt: self
                .agent
                .as_ref()
                .map(|a| a.prompt_script.clone())
                .unwrap_or_else(|| "You are a helpful AI voice assistant.".to_string()),
            voice: self.agent.as_ref().and_then(|a| a.voice_id.clone()),
            kind: self.kind.unwrap_or(TransportKind::Telephony),
            stream_sid: self.stream_sid.clone(),
            deps: self.deps.clone(),
            sink: self.sink.clone(),
            responding: self.responding.clone(),
            chunk_counter: self.chunk_counter.clone(),
            chunk_bytes: self.config.chunk_bytes,
            chunk_interval_ms: self.config.chunk_interval_ms,
            apology: self.config.apology_line.clone(),
            done_tx: self.reply_done_tx.clone(),
        };
        self.reply_task = Some(tokio::spawn(run_reply(job, work)));
    }

    /// Tears the session down: trailing silence into the transcriber,
    /// graceful close, in-flight reply aborted, state discarded.
    async fn shutdown(&mut self) {
        if let Some(task) = self.reply_task.take() {
            task.abort();
        }
        if let Some(mut transcriber) = self.transcriber.take() {
            let trailing = match self.stt_params.as_ref().map(|p| p.encoding) {
                Some("mulaw") => silence_buffer(self.config.trailing_silence_ms as u32, 8_000),
                // Linear PCM silence is zero-valued samples.
                _ => vec![
                    0u8;
                    (self.config.trailing_silence_ms as usize * 16_000 / 1_000) * 2
                ],
            };
            let _ = transcriber.send(&trailing).await;
            transcriber.finish().await;
        }
        self.stt_events = None;
        self.state = SessionState::Closed;
        tracing::info!(session = %self.id, "session closed");
    }
}

async fn maybe_recv<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

enum ReplyWork {
    /// Full pipeline: generate tokens, synthesize flushed fragments.
    Generate { turns: Vec<ChatTurn> },
    /// Fixed line (greeting): synthesize and send, no generation.
    Speak { text: String },
}

/// Everything the spawned reply pipeline needs, detached from the
/// session borrow.
struct ReplyJob<S: OutboundSink> {
    session_id: String,
    agent_id: Option<i64>,
    prompt: String,
    voice: Option<String>,
    kind: TransportKind,
    stream_sid: Option<String>,
    deps: SessionDeps,
    sink: Arc<Mutex<S>>,
    responding: Arc<AtomicBool>,
    chunk_counter: Arc<AtomicU64>,
    chunk_bytes: usize,
    chunk_interval_ms: u64,
    apology: String,
    done_tx: mpsc::Sender<ReplyOutcome>,
}

async fn run_reply<S: OutboundSink>(job: ReplyJob<S>, work: ReplyWork) {
    let assistant_text = match work {
        ReplyWork::Speak { text } => match speak_fragment(&job, &text).await {
            Ok(()) => Some(text),
            Err(e) => {
                tracing::warn!(session = %job.session_id, "greeting failed: {e}");
                None
            }
        },
        ReplyWork::Generate { turns } => match stream_and_speak(&job, &turns).await {
            Ok(full_text) => Some(full_text),
            Err(e) => {
                // Reported once per turn; the caller hears the apology
                // instead of dead air.
                tracing::warn!(session = %job.session_id, "reply pipeline failed: {e}");
                let apology = job.apology.clone();
                if let Err(e) = speak_fragment(&job, &apology).await {
                    tracing::warn!(session = %job.session_id, "apology failed too: {e}");
                }
                None
            }
        },
    };

    // Cleared no matter how the pipeline ended.
    job.responding.store(false, Ordering::SeqCst);
    let _ = job.done_tx.send(ReplyOutcome { assistant_text }).await;
}

/// Streams one reply, flushing buffered tokens to synthesis on sentence
/// boundaries. Returns the full reply text.
async fn stream_and_speak<S: OutboundSink>(
    job: &ReplyJob<S>,
    turns: &[ChatTurn],
) -> Result<String, String> {
    let mut events = job
        .deps
        .replies
        .stream_reply(&job.prompt, turns)
        .await
        .map_err(|e| e.to_string())?;

    let mut buffer = String::new();
    let mut accumulated = String::new();
    let mut booking_fired = false;

    while let Some(event) = events.recv().await {
        match event {
            ReplyEvent::Token(token) => {
                buffer.push_str(&token);
                accumulated.push_str(&token);
                if should_flush(&buffer) {
                    let fragment = std::mem::take(&mut buffer);
                    speak_fragment(job, &fragment).await?;
                }
            }
            ReplyEvent::Booking(intent) => {
                // One booking per reply, even if the structured fragment
                // surfaces more than once in the streamed output.
                if booking_fired {
                    continue;
                }
                booking_fired = true;
                tracing::info!(session = %job.session_id, "booking intent detected");
                match job.deps.booking.book(job.agent_id, intent).await {
                    Ok(()) => {
                        if let Some(agent_id) = job.agent_id {
                            job.deps.observer.appointment_booked(agent_id);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(session = %job.session_id, "booking failed: {e}");
                    }
                }
            }
            ReplyEvent::Error(e) => return Err(e),
            ReplyEvent::Done { full_text } => {
                if !buffer.trim().is_empty() {
                    speak_fragment(job, &buffer).await?;
                }
                return Ok(full_text);
            }
        }
    }

    // Channel closed without a terminal event; flush what we have.
    if !buffer.trim().is_empty() {
        speak_fragment(job, &buffer).await?;
    }
    Ok(accumulated)
}

/// Synthesizes one text fragment, converts it to the line format, and
/// sends it out paced at real time.
async fn speak_fragment<S: OutboundSink>(job: &ReplyJob<S>, text: &str) -> Result<(), String> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(());
    }

    let audio = job
        .deps
        .synthesis
        .synthesize(text, job.voice.as_deref())
        .await
        .map_err(|e| e.to_string())?;

    match job.kind {
        TransportKind::Browser => {
            // Browser clients play provider-native audio; no transcode,
            // no pacing — the browser buffers.
            let mut sink = job.sink.lock().await;
            sink.send_binary(audio).await.map_err(|e| e.to_string())
        }
        TransportKind::Telephony => {
            let line_audio = transcode_to_line(audio, job.deps.synthesis.output_format());
            send_paced(job, &line_audio).await.map_err(|e| e.to_string())
        }
    }
}

/// Converts provider audio to 8 kHz mu-law for the telephony line.
fn transcode_to_line(audio: Vec<u8>, format: &str) -> Vec<u8> {
    match format {
        "ulaw_8000" => audio,
        "pcm_8000" => {
            let samples: Vec<i16> = audio
                .chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            encode_mulaw(&samples)
        }
        other => {
            tracing::warn!(format = other, "unsupported synthesis format for telephony; passing through");
            audio
        }
    }
}

/// Streams line audio in fixed-size chunks, one per pacing interval, so
/// playback never outruns the receiving transport's buffer. The sink
/// lock is held for the whole send: chunks of one fragment are never
/// interleaved with anything else.
async fn send_paced<S: OutboundSink>(
    job: &ReplyJob<S>,
    line_audio: &[u8],
) -> Result<(), SessionError> {
    let stream_sid = job.stream_sid.clone().unwrap_or_default();
    let mut sink = job.sink.lock().await;
    let mut ticker = interval(Duration::from_millis(job.chunk_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    for chunk in line_audio.chunks(job.chunk_bytes) {
        ticker.tick().await;
        let ordinal = job.chunk_counter.fetch_add(1, Ordering::SeqCst);
        let timestamp_ms = ordinal * job.chunk_interval_ms;
        let frame = encode_media_frame(&stream_sid, ordinal, timestamp_ms, chunk);
        sink.send_text(frame).await?;
    }
    Ok(())
}

/// First sentence of the instruction profile, spoken as the greeting
/// when a telephony call is answered.
fn opening_line(prompt: &str) -> Option<String> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(end) = trimmed.find(['.', '!', '?']) {
        return Some(trimmed[..=end].to_string());
    }
    // No sentence end: cap at 100 characters (not bytes).
    Some(trimmed.chars().take(100).collect())
}
