//! Live speech-recognition client.
//!
//! Wraps one bidirectional WebSocket to the transcription provider:
//! audio frames go up, transcript events come down. The connection
//! walks `NotStarted → Open → Streaming → Closing → Closed`; sending
//! audio is only legal while `Open` or `Streaming`.
//!
//! The session owns the receive side of an [`SttEvent`] channel. Remote
//! errors are delivered as events rather than tearing anything down —
//! the session decides to reconnect once, then gives up.

use crate::config::SttConfig;
use crate::error::VoiceError;
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Interval at which `keepalive` should be invoked while the
/// connection is idle. The provider drops connections silent for ~10s;
/// half that is comfortable.
pub const KEEPALIVE_INTERVAL_SECS: u64 = 5;

/// Capacity of the transcript event channel. Transcripts are small and
/// consumed promptly; this only buffers bursts.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttState {
    NotStarted,
    Open,
    Streaming,
    Closing,
    Closed,
}

impl SttState {
    fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Open => "open",
            Self::Streaming => "streaming",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

/// Codec parameters fixed for the lifetime of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamParams {
    /// Wire encoding of the audio frames ("mulaw", "linear16").
    pub encoding: &'static str,
    pub sample_rate: u32,
    /// Whether interim (non-final) transcripts should be delivered.
    pub interim_results: bool,
    /// Silence gap, in milliseconds, after which the provider emits an
    /// utterance-end marker.
    pub utterance_end_ms: u32,
}

impl StreamParams {
    /// Parameters for a telephony media stream (G.711 mu-law, 8 kHz).
    pub fn telephony() -> Self {
        Self {
            encoding: "mulaw",
            sample_rate: 8_000,
            interim_results: true,
            utterance_end_ms: 1_000,
        }
    }

    /// Parameters for a browser microphone stream (linear PCM, 16 kHz).
    pub fn browser() -> Self {
        Self {
            encoding: "linear16",
            sample_rate: 16_000,
            interim_results: true,
            utterance_end_ms: 1_000,
        }
    }
}

/// One transcript delivery from the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    pub text: String,
    /// The provider will not revise this text further.
    pub is_final: bool,
    /// The speaker stopped; accumulated final text forms one utterance.
    pub utterance_end: bool,
}

/// Events delivered to the session from the reader task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SttEvent {
    Transcript(TranscriptEvent),
    /// The remote connection failed. Non-fatal: the session reopens the
    /// connection once before surfacing a session error.
    Error(String),
    /// The remote closed the connection.
    Closed,
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// A live transcription connection.
pub struct TranscriberClient {
    state: SttState,
    sink: WsSink,
    reader: JoinHandle<()>,
}

impl TranscriberClient {
    /// Opens the connection and spawns the reader task.
    ///
    /// Returns the client (owning the send side) and the event channel
    /// the transcripts arrive on.
    pub async fn start(
        config: &SttConfig,
        params: &StreamParams,
    ) -> Result<(Self, mpsc::Receiver<SttEvent>), VoiceError> {
        let url = format!(
            "{}?encoding={}&sample_rate={}&interim_results={}&utterance_end_ms={}&punctuate=true",
            config.url,
            params.encoding,
            params.sample_rate,
            params.interim_results,
            params.utterance_end_ms,
        );

        let mut request = url
            .into_client_request()
            .map_err(|e| VoiceError::Config(format!("bad transcription url: {e}")))?;
        if !config.api_key.is_empty() {
            let value = format!("Token {}", config.api_key)
                .parse()
                .map_err(|_| VoiceError::Config("api key is not header-safe".to_string()))?;
            request.headers_mut().insert("Authorization", value);
        }

        let (ws, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| VoiceError::Stt(format!("connect failed: {e}")))?;
        let (sink, mut stream) = ws.split();

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if let Some(event) = parse_server_event(text.as_ref()) {
                            if tx.send(event).await.is_err() {
                                break; // session gone
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        let _ = tx.send(SttEvent::Closed).await;
                        break;
                    }
                    Ok(_) => {} // binary/ping/pong: nothing to do
                    Err(e) => {
                        let _ = tx.send(SttEvent::Error(e.to_string())).await;
                        break;
                    }
                }
            }
        });

        tracing::debug!(
            encoding = params.encoding,
            sample_rate = params.sample_rate,
            "transcription connection open"
        );

        Ok((
            Self {
                state: SttState::Open,
                sink,
                reader,
            },
            rx,
        ))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SttState {
        self.state
    }

    /// Forwards one raw audio chunk. Valid only while `Open` or
    /// `Streaming`; the first chunk moves the connection to `Streaming`.
    pub async fn send(&mut self, chunk: &[u8]) -> Result<(), VoiceError> {
        match self.state {
            SttState::Open | SttState::Streaming => {
                self.state = SttState::Streaming;
                self.sink
                    .send(Message::Binary(chunk.to_vec().into()))
                    .await
                    .map_err(|e| VoiceError::Stt(format!("send failed: {e}")))
            }
            other => Err(VoiceError::Stt(format!(
                "audio sent while connection is {}",
                other.label()
            ))),
        }
    }

    /// Keeps an idle connection alive. Must be called roughly every
    /// [`KEEPALIVE_INTERVAL_SECS`] while no audio is flowing.
    pub async fn keepalive(&mut self) -> Result<(), VoiceError> {
        match self.state {
            SttState::Open | SttState::Streaming => self
                .sink
                .send(Message::Text(r#"{"type":"KeepAlive"}"#.into()))
                .await
                .map_err(|e| VoiceError::Stt(format!("keepalive failed: {e}"))),
            other => Err(VoiceError::Stt(format!(
                "keepalive while connection is {}",
                other.label()
            ))),
        }
    }

    /// Flushes pending audio and closes the connection. Best-effort:
    /// the remote may already be gone, and a failed goodbye changes
    /// nothing for the session.
    pub async fn finish(mut self) {
        self.state = SttState::Closing;
        // Ask the provider to flush and finalize anything buffered.
        let _ = self
            .sink
            .send(Message::Text(r#"{"type":"CloseStream"}"#.into()))
            .await;
        if let Err(e) = self.sink.close().await {
            tracing::debug!("transcription close failed: {e}");
        }
        self.state = SttState::Closed;
        // Reader exits on the close frame; don't leave it dangling if
        // the remote never acknowledges.
        self.reader.abort();
    }
}

#[derive(Deserialize)]
struct ServerMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    speech_final: bool,
    channel: Option<ServerChannel>,
}

#[derive(Deserialize)]
struct ServerChannel {
    alternatives: Vec<ServerAlternative>,
}

#[derive(Deserialize)]
struct ServerAlternative {
    transcript: String,
}

/// Decodes one provider message into an [`SttEvent`].
///
/// `Results` messages carry transcript text plus finality flags;
/// `UtteranceEnd` marks the silence boundary when the last `Results`
/// did not already carry `speech_final`. Unknown message types (and
/// unparseable frames) are dropped — bad input from the provider must
/// not disturb the call.
fn parse_server_event(raw: &str) -> Option<SttEvent> {
    let message: ServerMessage = match serde_json::from_str(raw) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!("dropping unparseable transcription frame: {e}");
            return None;
        }
    };

    match message.kind.as_str() {
        "Results" => {
            let text = message
                .channel
                .as_ref()
                .and_then(|c| c.alternatives.first())
                .map(|a| a.transcript.clone())
                .unwrap_or_default();
            Some(SttEvent::Transcript(TranscriptEvent {
                text,
                is_final: message.is_final,
                utterance_end: message.speech_final,
            }))
        }
        "UtteranceEnd" => Some(SttEvent::Transcript(TranscriptEvent {
            text: String::new(),
            is_final: false,
            utterance_end: true,
        })),
        _ => None,
    }
}
