//! Streaming reply generation.
//!
//! Sends the conversation context to an OpenAI-compatible
//! chat-completions endpoint with `stream: true` and forwards the delta
//! tokens as they arrive. The caller buffers tokens and flushes them to
//! synthesis on sentence boundaries (see [`should_flush`]) to keep
//! time-to-first-audio low.
//!
//! While streaming, the accumulated text is watched for an inline
//! `{"action":"book_calendar",...}` fragment; the first (and only the
//! first) match per reply is emitted as a [`ReplyEvent::Booking`] side
//! channel.

use crate::config::ReplyConfig;
use crate::error::VoiceError;
use dialhawk_types::BookingIntent;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;

/// Capacity of the reply token channel.
const TOKEN_CHANNEL_CAPACITY: usize = 256;

/// Flush to synthesis once the pending buffer holds this many words,
/// even without a sentence boundary.
const FLUSH_WORD_COUNT: usize = 10;

/// One turn of conversation context.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    /// "user" or "assistant".
    pub role: &'static str,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: content.into(),
        }
    }
}

/// Events emitted while a reply streams.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyEvent {
    /// One delta token of reply text.
    Token(String),
    /// The model asked to book an appointment. At most one per reply.
    Booking(BookingIntent),
    /// The stream finished; carries the complete reply text.
    Done { full_text: String },
    /// The upstream call failed. Reported once per turn; the session
    /// falls back to the apology utterance.
    Error(String),
}

/// Client for the reply generation endpoint.
#[derive(Debug, Clone)]
pub struct ReplyGenerator {
    http: reqwest::Client,
    config: ReplyConfig,
}

impl ReplyGenerator {
    pub fn new(config: ReplyConfig) -> Result<Self, VoiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| VoiceError::Config(format!("http client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Starts streaming one reply.
    ///
    /// The returned channel yields [`ReplyEvent::Token`]s in generation
    /// order, at most one `Booking`, and exactly one terminal event
    /// (`Done` or `Error`). The stream is finite and not restartable.
    pub async fn stream_reply(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
    ) -> Result<mpsc::Receiver<ReplyEvent>, VoiceError> {
        let mut messages = vec![json!({"role": "system", "content": system_prompt})];
        for turn in turns {
            messages.push(json!({"role": turn.role, "content": turn.content}));
        }

        let response = self
            .http
            .post(&self.config.url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "model": self.config.model,
                "messages": messages,
                "stream": true,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VoiceError::Timeout("reply generation", self.config.timeout_seconds)
                } else {
                    VoiceError::Reply(format!("request failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            return Err(VoiceError::Reply(format!(
                "upstream returned {}",
                response.status()
            )));
        }

        let (tx, rx) = mpsc::channel(TOKEN_CHANNEL_CAPACITY);
        let mut body = response.bytes_stream();

        tokio::spawn(async move {
            let mut pending = String::new();
            let mut full_text = String::new();
            let mut booked = false;

            while let Some(chunk) = body.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(ReplyEvent::Error(e.to_string())).await;
                        return;
                    }
                };
                pending.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(pos) = pending.find('\n') {
                    let line: String = pending.drain(..=pos).collect();
                    match parse_sse_line(line.trim()) {
                        SseLine::Done => {
                            let _ = tx.send(ReplyEvent::Done { full_text }).await;
                            return;
                        }
                        SseLine::Token(token) => {
                            full_text.push_str(&token);
                            if !booked {
                                if let Some(intent) = detect_booking_intent(&full_text) {
                                    booked = true;
                                    let _ = tx.send(ReplyEvent::Booking(intent)).await;
                                }
                            }
                            if tx.send(ReplyEvent::Token(token)).await.is_err() {
                                return; // session hung up
                            }
                        }
                        SseLine::Skip => {}
                    }
                }
            }

            // Stream ended without a [DONE] marker; still terminal.
            let _ = tx.send(ReplyEvent::Done { full_text }).await;
        });

        Ok(rx)
    }
}

enum SseLine {
    Done,
    Token(String),
    Skip,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data: ") else {
        return SseLine::Skip;
    };
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => match chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
            Some(content) if !content.is_empty() => SseLine::Token(content),
            _ => SseLine::Skip,
        },
        Err(_) => SseLine::Skip,
    }
}

#[derive(Deserialize)]
struct BookingFragment {
    action: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Scans streamed reply text for a flat `{"action":"book_calendar",...}`
/// JSON fragment and parses it into a [`BookingIntent`].
///
/// Returns `None` until a complete, parseable fragment is present. The
/// fragment is a flat object, so scanning to the nearest enclosing
/// braces is sufficient.
pub fn detect_booking_intent(text: &str) -> Option<BookingIntent> {
    let marker = text.find("\"book_calendar\"")?;
    let start = text[..marker].rfind('{')?;
    let end = marker + text[marker..].find('}')?;
    let fragment: BookingFragment = serde_json::from_str(&text[start..=end]).ok()?;
    if fragment.action != "book_calendar" {
        return None;
    }
    Some(BookingIntent {
        email: fragment.email,
        time: fragment.time,
        details: fragment.details,
    })
}

/// Whether the pending synthesis buffer should be flushed after
/// appending the latest token: at a sentence boundary, or once the
/// buffer grows past a bounded word count.
pub fn should_flush(buffer: &str) -> bool {
    let trimmed = buffer.trim_end();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.ends_with(['.', '!', '?']) {
        return true;
    }
    buffer.split_whitespace().count() >= FLUSH_WORD_COUNT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_token_parsing() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#;
        match parse_sse_line(line) {
            SseLine::Token(t) => assert_eq!(t, "Hi"),
            _ => panic!("expected token"),
        }
        assert!(matches!(parse_sse_line("data: [DONE]"), SseLine::Done));
        assert!(matches!(parse_sse_line(""), SseLine::Skip));
        assert!(matches!(
            parse_sse_line(r#"data: {"choices":[{"delta":{}}]}"#),
            SseLine::Skip
        ));
    }

    #[test]
    fn booking_intent_detected_in_context() {
        let text = r#"Sure, I'll set that up. {"action":"book_calendar","email":"lead@example.com","time":"2025-06-02T15:00:00Z","details":"Intro call"} Talk soon!"#;
        let intent = detect_booking_intent(text).expect("should detect");
        assert_eq!(intent.email.as_deref(), Some("lead@example.com"));
        assert_eq!(intent.time.as_deref(), Some("2025-06-02T15:00:00Z"));
        assert_eq!(intent.details.as_deref(), Some("Intro call"));
    }

    #[test]
    fn booking_intent_requires_complete_fragment() {
        // Mid-stream: the closing brace has not arrived yet.
        let partial = r#"{"action":"book_calendar","email":"a@b.c"#;
        assert!(detect_booking_intent(partial).is_none());
        assert!(detect_booking_intent("no intent here").is_none());
    }

    #[test]
    fn booking_intent_ignores_other_actions() {
        let text = r#"{"action":"send_email","note":"book_calendar"}"#;
        // The marker appears but the enclosing object's action differs.
        assert!(detect_booking_intent(text).is_none());
    }

    #[test]
    fn flush_on_sentence_boundary() {
        assert!(should_flush("Hello there."));
        assert!(should_flush("Really?"));
        assert!(should_flush("Stop! "));
        assert!(!should_flush("Hello there"));
        assert!(!should_flush(""));
    }

    #[test]
    fn flush_on_word_count() {
        let long = "one two three four five six seven eight nine ten";
        assert!(should_flush(long));
        assert!(!should_flush("one two three"));
    }
}
